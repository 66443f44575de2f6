use std::io;

use tokio::sync::mpsc;
use tracing::debug;

use super::dedup::DedupIndex;
use super::models::{Page, Record};
use super::output::RecordSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub pages_absorbed: usize,
    pub groups_emitted: usize,
    pub users_emitted: usize,
    pub duplicates_skipped: usize,
}

/// Single consumer of fetched pages. Owns the dedup index and the sink.
pub struct Aggregator<S: RecordSink> {
    index: DedupIndex,
    sink: S,
    pages_absorbed: usize,
    duplicates_skipped: usize,
}

impl<S: RecordSink> Aggregator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            index: DedupIndex::new(),
            sink,
            pages_absorbed: 0,
            duplicates_skipped: 0,
        }
    }

    /// Emit records for every not-yet-seen user of `page`, in page order,
    /// preceded by its group the first time that group appears.
    pub fn absorb(&mut self, page: &Page) -> io::Result<()> {
        self.pages_absorbed += 1;
        for entity in &page.entities {
            // a user id maps to exactly one group across the listing
            if self.index.has_user(&entity.user_id) {
                self.duplicates_skipped += 1;
                continue;
            }
            if self.index.mark_group(&entity.group_id) {
                self.sink.emit(&Record::group(entity))?;
            }
            self.index.mark_user(&entity.user_id);
            self.sink.emit(&Record::user(entity))?;
        }
        Ok(())
    }

    /// Consume pages until every sender is gone, then flush the sink.
    pub async fn drain(&mut self, rx: &mut mpsc::Receiver<Page>) -> io::Result<()> {
        while let Some(page) = rx.recv().await {
            debug!(
                page = page.page_number,
                entities = page.entities.len(),
                "aggregating page"
            );
            self.absorb(&page)?;
        }
        self.sink.finish()
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats {
            pages_absorbed: self.pages_absorbed,
            groups_emitted: self.index.group_count(),
            users_emitted: self.index.user_count(),
            duplicates_skipped: self.duplicates_skipped,
        }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::models::Entity;
    use crate::listing::output::MemorySink;

    fn entity(uid: &str, gid: &str) -> Entity {
        Entity {
            user_id: uid.into(),
            user_name: format!("nick-{uid}"),
            group_id: gid.into(),
            group_name: format!("game-{gid}"),
            room_ref: format!("room-{uid}"),
        }
    }

    fn page(n: u32, entities: Vec<Entity>) -> Page {
        Page {
            page_number: n,
            total_pages: 2,
            entities,
        }
    }

    #[test]
    fn group_precedes_its_first_user_and_is_emitted_once() {
        let mut agg = Aggregator::new(MemorySink::default());
        agg.absorb(&page(1, vec![entity("1", "g1"), entity("2", "g1"), entity("3", "g2")]))
            .unwrap();
        let stats = agg.stats();
        let records = agg.into_sink().records;
        assert_eq!(
            records,
            vec![
                Record::group(&entity("1", "g1")),
                Record::user(&entity("1", "g1")),
                Record::user(&entity("2", "g1")),
                Record::group(&entity("3", "g2")),
                Record::user(&entity("3", "g2")),
            ]
        );
        assert_eq!(stats.groups_emitted, 2);
        assert_eq!(stats.users_emitted, 3);
    }

    #[test]
    fn repeated_user_on_later_page_adds_nothing() {
        let mut agg = Aggregator::new(MemorySink::default());
        agg.absorb(&page(1, vec![entity("1", "g1")])).unwrap();
        let before = agg.stats();
        agg.absorb(&page(2, vec![entity("1", "g1")])).unwrap();
        let after = agg.stats();
        assert_eq!(before.users_emitted, after.users_emitted);
        assert_eq!(after.duplicates_skipped, 1);
        assert_eq!(agg.into_sink().records.len(), 2);
    }

    #[test]
    fn duplicate_user_does_not_emit_its_group() {
        // The second sighting of user 1 names a different group; the user is
        // skipped wholesale so g9 never appears without a user.
        let mut agg = Aggregator::new(MemorySink::default());
        agg.absorb(&page(1, vec![entity("1", "g1"), entity("1", "g9")]))
            .unwrap();
        let records = agg.into_sink().records;
        assert!(!records.iter().any(|r| matches!(r, Record::Group { id, .. } if id == "g9")));
    }

    #[tokio::test]
    async fn drain_runs_until_channel_closes() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(page(2, vec![entity("1", "g1"), entity("2", "g1")]))
            .await
            .unwrap();
        tx.send(page(1, vec![entity("1", "g1")])).await.unwrap();
        drop(tx);

        let mut agg = Aggregator::new(MemorySink::default());
        agg.drain(&mut rx).await.unwrap();
        let stats = agg.stats();
        assert_eq!(stats.pages_absorbed, 2);
        assert_eq!(stats.groups_emitted, 1);
        assert_eq!(stats.users_emitted, 2);
        assert_eq!(stats.duplicates_skipped, 1);
    }
}
