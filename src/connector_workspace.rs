//! Workspace-docs connector (Notion API).
//!
//! Lists database pages edited since a checkpoint and extracts plain text
//! from their block children. Only text-bearing block types contribute:
//! paragraphs, headings, and list items.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::connector::SourceConnector;
use crate::error::{Error, Result};
use crate::models::{SourceDocument, SourceKind, SourceType};

pub const API_KEY_ENV: &str = "NOTION_API_KEY";

const API_BASE: &str = "https://api.notion.com/v1";
const API_VERSION: &str = "2022-06-28";

pub struct WorkspaceConnector {
    database_id: String,
    client: reqwest::Client,
    token: String,
}

impl WorkspaceConnector {
    /// Create a connector for one workspace database. Requires
    /// `NOTION_API_KEY`.
    pub fn new(database_id: String) -> Result<Self> {
        let token = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", API_KEY_ENV)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::UpstreamFetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            database_id,
            client,
            token,
        })
    }

    async fn query_database(&self, since: DateTime<Utc>) -> Result<Value> {
        let url = format!("{}/databases/{}/query", API_BASE, self.database_id);
        let body = json!({
            "filter": {
                "timestamp": "last_edited_time",
                "last_edited_time": { "on_or_after": since.to_rfc3339() }
            },
            "sorts": [
                { "timestamp": "last_edited_time", "direction": "descending" }
            ]
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("workspace query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFetch(format!(
                "workspace API error {}: {}",
                status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("invalid workspace response: {}", e)))
    }

    async fn fetch_block_text(&self, page_id: &str) -> Result<String> {
        let url = format!("{}/blocks/{}/children", API_BASE, page_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("block fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFetch(format!(
                "workspace API error {}: {}",
                status, body_text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("invalid block response: {}", e)))?;

        Ok(extract_block_text(&body))
    }
}

#[async_trait]
impl SourceConnector for WorkspaceConnector {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Workspace
    }

    async fn list_changed(&self, since: DateTime<Utc>) -> Result<Vec<SourceDocument>> {
        let body = self.query_database(since).await?;

        let pages = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut documents = Vec::with_capacity(pages.len());
        for page in &pages {
            let Some(id) = page.get("id").and_then(Value::as_str) else {
                continue;
            };
            let last_modified_at = page
                .get("last_edited_time")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                .unwrap_or(since);

            documents.push(SourceDocument {
                source_type: SourceType::WorkspaceDoc,
                external_id: id.to_string(),
                title: extract_title(page),
                // Filled by hydrate(); pages need a second call for text.
                raw_text: String::new(),
                last_modified_at,
            });
        }

        Ok(documents)
    }

    async fn hydrate(&self, doc: &mut SourceDocument) -> Result<()> {
        doc.raw_text = self.fetch_block_text(&doc.external_id).await?;
        Ok(())
    }
}

/// Pull the page title out of the dynamic property map: the first property
/// of type `title`, first rich-text fragment. Falls back to `Untitled`.
fn extract_title(page: &Value) -> String {
    page.get("properties")
        .and_then(Value::as_object)
        .and_then(|props| {
            props
                .values()
                .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        })
        .and_then(|p| p.get("title"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("plain_text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string())
}

const TEXT_BLOCK_TYPES: [&str; 6] = [
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
];

/// Join the plain text of all text-bearing blocks, one block per line.
fn extract_block_text(body: &Value) -> String {
    let blocks = body
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let texts: Vec<String> = blocks
        .iter()
        .filter_map(|block| {
            let block_type = block.get("type").and_then(Value::as_str)?;
            if !TEXT_BLOCK_TYPES.contains(&block_type) {
                return None;
            }
            let fragments = block
                .get(block_type)
                .and_then(|b| b.get("rich_text"))
                .and_then(Value::as_array)?;
            let text: String = fragments
                .iter()
                .filter_map(|f| f.get("plain_text").and_then(Value::as_str))
                .collect();
            if text.trim().is_empty() {
                None
            } else {
                Some(text)
            }
        })
        .collect();

    texts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_from_properties() {
        let page = json!({
            "properties": {
                "Name": {
                    "type": "title",
                    "title": [ { "plain_text": "Deployment Guide" } ]
                },
                "Status": { "type": "select" }
            }
        });
        assert_eq!(extract_title(&page), "Deployment Guide");
    }

    #[test]
    fn test_extract_title_falls_back_to_untitled() {
        let page = json!({ "properties": { "Status": { "type": "select" } } });
        assert_eq!(extract_title(&page), "Untitled");
        assert_eq!(extract_title(&json!({})), "Untitled");
    }

    #[test]
    fn test_extract_block_text_joins_text_blocks() {
        let body = json!({
            "results": [
                {
                    "type": "heading_1",
                    "heading_1": { "rich_text": [ { "plain_text": "Overview" } ] }
                },
                {
                    "type": "paragraph",
                    "paragraph": { "rich_text": [
                        { "plain_text": "First " },
                        { "plain_text": "sentence." }
                    ] }
                },
                {
                    "type": "code",
                    "code": { "rich_text": [ { "plain_text": "ignored" } ] }
                },
                {
                    "type": "bulleted_list_item",
                    "bulleted_list_item": { "rich_text": [ { "plain_text": "Item one" } ] }
                }
            ]
        });
        assert_eq!(
            extract_block_text(&body),
            "Overview\nFirst sentence.\nItem one"
        );
    }

    #[test]
    fn test_extract_block_text_skips_blank_blocks() {
        let body = json!({
            "results": [
                { "type": "paragraph", "paragraph": { "rich_text": [ { "plain_text": "  " } ] } },
                { "type": "paragraph", "paragraph": { "rich_text": [] } }
            ]
        });
        assert_eq!(extract_block_text(&body), "");
    }
}
