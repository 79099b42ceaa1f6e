use reqwest::Client;
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use super::{CollectionItem, MetadataSource, UpstreamError};
use crate::types::NftAttribute;

pub const DEFAULT_API_BASE: &str = "https://api.howrare.is/v0.1";

/// HowRare collection metadata client.
///
/// The API wraps everything as `{"result": {"data": {...}}}`; collection
/// items live under `data.items` as
/// `{"mint", "name", "rank", "image", "attributes": [{"name", "value", ...}]}`.
pub struct HowRareClient {
    client: Client,
    api_base: String,
}

impl HowRareClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
        }
    }

    fn parse_items(body: &Value) -> Result<Vec<CollectionItem>, UpstreamError> {
        let items = body
            .pointer("/result/data/items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                UpstreamError::Malformed("missing result.data.items array".to_string())
            })?;

        Ok(items.iter().map(parse_item).collect())
    }
}

impl Default for HowRareClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

#[async_trait::async_trait]
impl MetadataSource for HowRareClient {
    async fn fetch_collection(&self, slug: &str) -> Result<Vec<CollectionItem>, UpstreamError> {
        let url = format!("{}/collections/{}", self.api_base, slug);
        debug!("Fetching collection metadata from {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        Self::parse_items(&body)
    }
}

fn parse_item(item: &Value) -> CollectionItem {
    CollectionItem {
        mint: item
            .get("mint")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        name: item
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        rank: item
            .get("rank")
            .and_then(|v| v.as_i64())
            .map(|r| r as i32),
        image_url: item
            .get("image")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        attributes: parse_attributes(item.get("attributes")),
    }
}

fn parse_attributes(attributes: Option<&Value>) -> Vec<NftAttribute> {
    let Some(entries) = attributes.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(|v| v.as_str())?;
            let value = entry.get("value").map(stringify_value)?;
            Some(NftAttribute::new(name, value))
        })
        .collect()
}

/// Trait values arrive as strings, numbers, or booleans; flatten everything
/// into a string without surrounding quotes.
fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_items_full_shape() {
        let body = json!({
            "result": {
                "data": {
                    "items": [
                        {
                            "mint": "MintA",
                            "name": "Growerz #1",
                            "rank": 1,
                            "image": "https://img.example/1.png",
                            "attributes": [
                                {"name": "Background", "value": "Purple", "rarity": 0.02},
                                {"name": "Signed by haizeel", "value": true}
                            ]
                        },
                        {"name": "No Mint Entry", "rank": 7}
                    ]
                }
            }
        });

        let items = HowRareClient::parse_items(&body).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.mint.as_deref(), Some("MintA"));
        assert_eq!(first.name, "Growerz #1");
        assert_eq!(first.rank, Some(1));
        assert_eq!(first.attributes.len(), 2);
        assert_eq!(first.attributes[0], NftAttribute::new("Background", "Purple"));
        // Boolean trait values are flattened to bare strings.
        assert_eq!(
            first.attributes[1],
            NftAttribute::new("Signed by haizeel", "true")
        );

        assert!(items[1].mint.is_none());
        assert!(items[1].attributes.is_empty());
    }

    #[test]
    fn test_parse_items_rejects_missing_items() {
        let body = json!({"result": {"data": {}}});
        let err = HowRareClient::parse_items(&body).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let body = json!({
            "result": {"data": {"items": [{"mint": "MintB"}]}}
        });
        let items = HowRareClient::parse_items(&body).unwrap();
        assert_eq!(items[0].name, "Unknown");
        assert_eq!(items[0].rank, None);
        assert_eq!(items[0].image_url, None);
    }
}
