use crate::config::{NotionConfig, PropertyNames};
use crate::external::record_store::{RecordStore, RecordUpdate, StoreError};
use crate::models::TickerRecord;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use tracing::{debug, warn};

const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionStore {
    client: reqwest::Client,
    token: String,
    database_id: String,
    base_url: String,
    properties: PropertyNames,
}

impl NotionStore {
    pub fn new(config: &NotionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
            database_id: config.database_id.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            properties: config.properties.clone(),
        }
    }

    async fn query_page(&self, cursor: Option<&str>) -> Result<QueryResponse, StoreError> {
        let url = format!("{}/v1/databases/{}/query", self.base_url, self.database_id);

        let mut body = Map::new();
        if let Some(cursor) = cursor {
            body.insert("start_cursor".to_string(), json!(cursor));
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        resp.json::<QueryResponse>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionErrorBody {
    code: Option<String>,
    message: Option<String>,
}

fn status_error(status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<NotionErrorBody>(body)
        .ok()
        .map(|e| match (e.code, e.message) {
            (Some(code), Some(msg)) => format!("{}: {}", code, msg),
            (None, Some(msg)) => msg,
            (Some(code), None) => code,
            (None, None) => status.to_string(),
        })
        .unwrap_or_else(|| format!("{}: {}", status, body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Rejected(message)
        }
        _ => StoreError::Network(message),
    }
}

/// Read the ticker out of a page's title property. Returns an empty string when
/// the property is missing, is not a title, or has no text.
pub(crate) fn parse_ticker(page: &Value, property: &str) -> String {
    let prop = &page["properties"][property];
    if prop["type"].as_str() != Some("title") {
        return String::new();
    }

    let first = &prop["title"][0];
    let text = first["text"]["content"]
        .as_str()
        .or_else(|| first["plain_text"].as_str())
        .unwrap_or_default();

    crate::models::normalize_symbol(text)
}

pub(crate) fn parse_record(page: &Value, props: &PropertyNames) -> Option<TickerRecord> {
    let record_id = page["id"].as_str()?;

    let mut record = TickerRecord::new(record_id, &parse_ticker(page, &props.ticker));
    record.last_price = page["properties"][&props.price]["number"].as_f64();
    record.last_updated = page["properties"][&props.updated_at]["date"]["start"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());

    Some(record)
}

/// Follow `next_cursor` until the database reports no more results. A page
/// that claims `has_more` without a cursor ends the listing.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<Value>, StoreError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<QueryResponse, StoreError>>,
{
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = fetch(cursor.take()).await?;
        debug!("Fetched {} pages from Notion", page.results.len());
        results.extend(page.results);

        match (page.has_more, page.next_cursor) {
            (true, Some(next)) => cursor = Some(next),
            (true, None) => {
                warn!("Notion reported more results without a cursor, stopping");
                break;
            }
            _ => break,
        }
    }

    Ok(results)
}

pub(crate) fn build_properties(update: &RecordUpdate, props: &PropertyNames) -> Value {
    let mut out = Map::new();
    out.insert(props.price.clone(), json!({ "number": update.price }));
    out.insert(props.previous_close.clone(), json!({ "number": update.previous_close }));
    out.insert(props.market_cap.clone(), json!({ "number": update.market_cap_eok }));
    out.insert(
        props.updated_at.clone(),
        json!({ "date": { "start": update.updated_at.to_rfc3339() } }),
    );
    out.insert(
        props.name.clone(),
        json!({ "rich_text": [{ "text": { "content": update.name } }] }),
    );
    if let Some(rate) = update.exchange_rate {
        out.insert(props.exchange_rate.clone(), json!({ "number": rate }));
    }

    json!({ "properties": Value::Object(out) })
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn list_records(&self) -> Result<Vec<TickerRecord>, StoreError> {
        let results = collect_pages(move |cursor| async move {
            self.query_page(cursor.as_deref()).await
        })
        .await?;

        let mut records = Vec::with_capacity(results.len());
        for result in &results {
            match parse_record(result, &self.properties) {
                Some(record) => records.push(record),
                None => warn!("Skipping Notion result without an id"),
            }
        }

        Ok(records)
    }

    async fn update_record(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        let url = format!("{}/v1/pages/{}", self.base_url, record_id);

        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&build_properties(update, &self.properties))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        Ok(())
    }
}
