use serde::Serialize;

/// One listed streamer together with the game (group) it is live under.
/// The upstream payload repeats the group fields on every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub user_id: String,
    pub user_name: String,
    pub group_id: String,
    pub group_name: String,
    pub room_ref: String,
}

/// One fetched page of the live listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub total_pages: u32,
    pub entities: Vec<Entity>,
}

/// An emitted output tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Group {
        id: String,
        name: String,
    },
    User {
        id: String,
        name: String,
        group_id: String,
        room: String,
    },
}

impl Record {
    pub fn group(entity: &Entity) -> Self {
        Record::Group {
            id: entity.group_id.clone(),
            name: entity.group_name.clone(),
        }
    }

    pub fn user(entity: &Entity) -> Self {
        Record::User {
            id: entity.user_id.clone(),
            name: entity.user_name.clone(),
            group_id: entity.group_id.clone(),
            room: entity.room_ref.clone(),
        }
    }
}
