//! Indexer GraphQL client.
//!
//! Events come from the indexer's `events` table filtered by `indexed_type`.
//! The table cannot express "strictly after `(version, index)`", so pages are
//! requested from the cursor's version onwards and the already-handled events
//! of that version are dropped client-side.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use paytos_core::error::{PaytosError, Result};
use paytos_core::traits::EventSource;
use paytos_core::types::{AptosAddress, AssetType, EventCursor, EventId, TransferEvent};

use crate::config::AptosConfig;

const EVENTS_QUERY: &str = r#"query PaytosTransferEvents($event_type: String!, $min_version: bigint!, $limit: Int!, $offset: Int!) {
  events(
    where: { indexed_type: { _eq: $event_type }, transaction_version: { _gte: $min_version } }
    order_by: [{ transaction_version: asc }, { event_index: asc }]
    limit: $limit
    offset: $offset
  ) {
    transaction_version
    transaction_block_height
    event_index
    type
    data
  }
}"#;

/// Event data keys that may carry the asset's metadata object or coin type.
const TOKEN_FIELDS: [&str; 4] = ["metadata", "asset", "token", "coin_type"];

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<EventsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct EventsData {
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct RawEvent {
    transaction_version: Value,
    transaction_block_height: Value,
    event_index: Value,
    #[serde(rename = "type")]
    event_type: String,
    data: Value,
}

/// [`EventSource`] backed by the Aptos indexer.
pub struct AptosEventSource {
    config: AptosConfig,
    http_client: reqwest::Client,
}

impl AptosEventSource {
    /// Creates a source with the given config.
    ///
    /// Fails with `ConfigError` when `page_size` or `max_pages` is zero.
    pub fn new(config: AptosConfig) -> Result<Self> {
        if config.page_size == 0 {
            return Err(PaytosError::ConfigError("page_size must be at least 1".into()));
        }
        if config.max_pages == 0 {
            return Err(PaytosError::ConfigError("max_pages must be at least 1".into()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PaytosError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the config.
    pub fn config(&self) -> &AptosConfig {
        &self.config
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, event_type: &str, min_version: u64, offset: usize) -> Result<Vec<RawEvent>> {
        let body = json!({
            "query": EVENTS_QUERY,
            "variables": {
                "event_type": event_type,
                "min_version": min_version,
                "limit": self.config.page_size,
                "offset": offset,
            }
        });

        let mut request = self.http_client.post(&self.config.indexer_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaytosError::EventSourceUnavailable(format!("indexer request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaytosError::EventSourceUnavailable(format!(
                "indexer returned {}: {}",
                status, text
            )));
        }

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| PaytosError::EventSourceUnavailable(format!("indexer response: {}", e)))?;

        if !parsed.errors.is_empty() {
            let messages: Vec<_> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(PaytosError::EventSourceUnavailable(format!(
                "indexer query failed: {}",
                messages.join("; ")
            )));
        }

        parsed
            .data
            .map(|data| data.events)
            .ok_or_else(|| PaytosError::EventSourceUnavailable("indexer response has no data".into()))
    }

    fn decode_event(&self, raw: &RawEvent) -> Result<TransferEvent> {
        let id = EventId::new(
            to_u64(&raw.transaction_block_height, "transaction_block_height")?,
            to_u64(&raw.transaction_version, "transaction_version")?,
            to_u64(&raw.event_index, "event_index")?,
        );
        let data = &raw.data;

        let (asset_type, type_token) = match asset_from_event_type(&raw.event_type) {
            Some(found) => found,
            None => match self.config.asset_type {
                Some(asset_type) => (asset_type, None),
                None => {
                    return Err(PaytosError::InvalidEvent(format!(
                        "cannot tell the asset type of {}",
                        raw.event_type
                    )))
                }
            },
        };

        let view_tag = match data.get("view_tag") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                u8::try_from(to_u64(v, "view_tag")?)
                    .map_err(|_| PaytosError::InvalidEvent(format!("view_tag {} out of range", v)))?,
            ),
        };

        Ok(TransferEvent {
            id,
            tx_hash: None,
            sender: AptosAddress::parse(str_field(data, "sender")?)?,
            receiver: AptosAddress::parse(str_field(data, "receiver")?)?,
            ephemeral_public_key: decode_hex(str_field(data, "ephemeral_public_key")?)?,
            value: to_u128(field(data, "value")?, "value")?,
            view_tag,
            asset_type,
            token_address: token_from_data(data).or(type_token),
        })
    }
}

#[async_trait]
impl EventSource for AptosEventSource {
    #[instrument(skip(self))]
    async fn fetch_events(
        &self,
        event_type: &str,
        since: Option<&EventCursor>,
    ) -> Result<Vec<TransferEvent>> {
        let min_version = since.map_or(0, |cursor| cursor.transaction_version);
        let mut offset = 0;
        let mut pages = 0;
        let mut events = Vec::new();

        loop {
            let page = self.fetch_page(event_type, min_version, offset).await?;
            let page_len = page.len();

            for raw in &page {
                match self.decode_event(raw) {
                    Ok(event) if since.map_or(true, |cursor| cursor.is_before(&event.id)) => {
                        events.push(event)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            version = %raw.transaction_version,
                            index = %raw.event_index,
                            error = %e,
                            "Skipping undecodable event"
                        );
                    }
                }
            }

            if page_len < self.config.page_size {
                break;
            }
            pages += 1;
            if pages >= self.config.max_pages {
                debug!(pages, "Page cap reached, rest of the backlog left for the next fetch");
                break;
            }
            offset += page_len;
        }

        debug!(count = events.len(), "Fetched events");
        Ok(events)
    }
}

/// Reads the asset type from an event type's generic parameter.
///
/// - `…<0x1::fungible_asset::Metadata>`: fungible asset
/// - `…<…::token::…>` or `…<…::collection::…>`: token object
/// - any other parameter is a coin type, returned as the token
///
/// Returns `None` for a non-generic event type.
pub fn asset_from_event_type(event_type: &str) -> Option<(AssetType, Option<String>)> {
    let start = event_type.find('<')?;
    let end = event_type.rfind('>')?;
    if end <= start + 1 {
        return None;
    }
    let generic = event_type[start + 1..end].trim();

    if generic.ends_with("fungible_asset::Metadata") {
        Some((AssetType::Ft, None))
    } else if generic.contains("::token::") || generic.contains("::collection::") {
        Some((AssetType::Nft, None))
    } else {
        Some((AssetType::Coin, Some(generic.to_string())))
    }
}

fn field<'a>(data: &'a Value, name: &str) -> Result<&'a Value> {
    data.get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| PaytosError::InvalidEvent(format!("missing field {}", name)))
}

fn str_field<'a>(data: &'a Value, name: &str) -> Result<&'a str> {
    field(data, name)?
        .as_str()
        .ok_or_else(|| PaytosError::InvalidEvent(format!("field {} is not a string", name)))
}

/// Indexer numbers arrive as JSON numbers or as decimal strings.
fn to_u64(value: &Value, name: &str) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| PaytosError::InvalidEvent(format!("field {} is not an unsigned integer: {}", name, value)))
}

fn to_u128(value: &Value, name: &str) -> Result<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| PaytosError::InvalidEvent(format!("field {} is not an unsigned integer: {}", name, value)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

/// Object references serialize as `{"inner": "0x…"}`.
fn token_from_data(data: &Value) -> Option<String> {
    TOKEN_FIELDS.iter().find_map(|name| match data.get(*name)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("inner")?.as_str().map(str::to_string),
        _ => None,
    })
}
