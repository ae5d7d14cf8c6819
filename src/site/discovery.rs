//! Discovery stage: surname search

use crate::config::validation::SURNAME_PLACEHOLDER;
use crate::crawler::{fingerprint, HandlerError, StageHandler, StageOutput, PROFILE_PREFIX};
use crate::site::parser::{parse_search_results, SearchTile};
use crate::site::payload::ProfilePayload;
use crate::site::SiteClient;
use crate::state::Stage;
use crate::storage::TaskRecord;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Searches the site for a surname and registers one profile per result tile
pub struct SurnameSearch {
    client: SiteClient,
    search_url: String,
    delay: Duration,
}

impl SurnameSearch {
    /// `search_url` must contain the `{surname}` placeholder
    pub fn new(client: SiteClient, search_url: impl Into<String>, delay: Duration) -> Self {
        Self {
            client,
            search_url: search_url.into(),
            delay,
        }
    }

    fn url_for(&self, surname: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(surname.as_bytes()).collect();
        self.search_url.replace(SURNAME_PLACEHOLDER, &encoded)
    }
}

/// Identifier of the profile a tile describes
///
/// Derived from the fields that define the profile, so the same tile found
/// again on a later run maps to the same record.
pub fn profile_id(surname: &str, tile: &SearchTile) -> String {
    fingerprint(
        PROFILE_PREFIX,
        [
            ("surname", surname),
            ("client_id", tile.client_id.as_str()),
            ("data_url", tile.data_url.as_str()),
        ],
    )
}

fn profile_record(
    surname_id: &str,
    surname: &str,
    search_url: &str,
    tile: SearchTile,
) -> Result<TaskRecord, HandlerError> {
    let id = profile_id(surname, &tile);
    let locked = tile.is_locked();
    let payload = ProfilePayload {
        surname: surname.to_string(),
        search_url: search_url.to_string(),
        client_id: tile.client_id,
        data_url: tile.data_url,
        name: tile.name,
        profile_pic_url: tile.profile_pic_url,
        profile_pic_style: tile.profile_pic_style,
        result_page_placement: tile.placement,
        photo_count_on_site: 0,
        images: Vec::new(),
    };

    Ok(TaskRecord::profile(
        id,
        Some(surname_id.to_string()),
        serde_json::to_value(payload)?,
        locked,
    ))
}

#[async_trait]
impl StageHandler for SurnameSearch {
    fn stage(&self) -> Stage {
        Stage::Discovery
    }

    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError> {
        let surname = record
            .payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(record.id.as_str())
            .to_string();

        let url = self.url_for(&surname);
        let base = Url::parse(&url).map_err(|e| HandlerError::Parse {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let page = self.client.get_text(&url).await?;
        tokio::time::sleep(self.delay).await;

        let (tiles, skipped) = parse_search_results(&page, &base);
        for tile in &skipped {
            tracing::warn!(
                placement = tile.placement,
                reason = tile.reason,
                "Skipping search tile"
            );
        }
        tracing::info!(surname = %surname, found = tiles.len(), "Families found");

        let discovered = tiles
            .into_iter()
            .map(|tile| profile_record(&record.id, &surname, &url, tile))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StageOutput::done()
            .with_payload(json!({
                "search_url": url,
                "profiles_found": discovered.len(),
            }))
            .with_discovered(discovered))
    }
}
