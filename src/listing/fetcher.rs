use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use super::error::FetchError;
use super::models::{Entity, Page};
use super::ListingConfig;

/// Anything that can produce one listing page by number.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    async fn fetch(&self, page: u32) -> Result<Page, FetchError>;
}

/// Listing endpoint client: one GET per page, no retries.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    http: Client,
    base_url: String,
}

impl HttpPageFetcher {
    pub fn new(cfg: &ListingConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, page: u32) -> Result<Page, FetchError> {
        let transport = move |source| FetchError::Transport { page, source };
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("page", page)])
            .send()
            .await
            .map_err(transport)?;
        let body = resp.bytes().await.map_err(transport)?;
        decode_page(page, &body)
    }
}

/// Decode a listing envelope.
///
/// Only a body that is not a JSON object is a hard failure. Individual fields
/// are read leniently: keys match case-insensitively, numbers and strings are
/// interchangeable, and anything missing or mistyped falls back to zero/empty.
pub fn decode_page(page: u32, body: &[u8]) -> Result<Page, FetchError> {
    let root: Value = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        page,
        reason: e.to_string(),
    })?;
    let Some(envelope) = root.as_object() else {
        return Err(FetchError::Decode {
            page,
            reason: format!("expected a JSON object, got {}", kind_of(&root)),
        });
    };

    let status = value_as_i64(field(envelope, "status"));
    if status != 200 {
        return Err(FetchError::Api {
            page,
            status,
            message: value_as_string(field(envelope, "message")),
        });
    }

    let empty = Map::new();
    let data = field(envelope, "data")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let wire_page = clamp_u32(value_as_i64(field(data, "page")));
    let entities = field(data, "datas")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(decode_entity).collect())
        .unwrap_or_default();

    Ok(Page {
        page_number: if wire_page > 0 { wire_page } else { page },
        total_pages: clamp_u32(value_as_i64(field(data, "totalPage"))),
        entities,
    })
}

fn decode_entity(row: &Value) -> Entity {
    let Some(obj) = row.as_object() else {
        return Entity::default();
    };
    Entity {
        user_id: value_as_string(field(obj, "uid")),
        user_name: value_as_string(field(obj, "nick")),
        group_id: value_as_string(field(obj, "gid")),
        group_name: value_as_string(field(obj, "gameFullName")),
        room_ref: value_as_string(field(obj, "profileRoom")),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

fn value_as_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn value_as_i64(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn clamp_u32(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
