//! Enrichment stage: gallery metadata

use crate::crawler::{HandlerError, StageHandler, StageOutput};
use crate::site::parser::{extract_album_ref, is_gallery_locked};
use crate::site::payload::{AlbumResponse, ProfilePayload};
use crate::site::SiteClient;
use crate::state::Stage;
use crate::storage::TaskRecord;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Loads a profile's gallery page and records its image list
pub struct GalleryInfo {
    client: SiteClient,
    api_url: String,
    page_size: u32,
    delay: Duration,
}

impl GalleryInfo {
    pub fn new(
        client: SiteClient,
        api_url: impl Into<String>,
        page_size: u32,
        delay: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            page_size,
            delay,
        }
    }
}

#[async_trait]
impl StageHandler for GalleryInfo {
    fn stage(&self) -> Stage {
        Stage::Enrichment
    }

    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError> {
        let profile: ProfilePayload = serde_json::from_value(record.payload.clone())?;

        let page = self.client.get_text(&profile.data_url).await?;
        tokio::time::sleep(self.delay).await;

        if is_gallery_locked(&page) {
            tracing::info!("Gallery is locked");
            return Ok(StageOutput::done().locked());
        }

        let album = extract_album_ref(&page).ok_or_else(|| HandlerError::Parse {
            url: profile.data_url.clone(),
            message: "albumId/albumKey not found in page".to_string(),
        })?;

        let query = [
            ("galleryType", "album".to_string()),
            ("albumId", album.id),
            ("albumKey", album.key),
            ("PageNumber", "1".to_string()),
            ("returnModelList", "true".to_string()),
            ("PageSize", self.page_size.to_string()),
            ("method", "rpc.gallery.getalbum".to_string()),
        ];
        let response: AlbumResponse = self.client.get_json(&self.api_url, &query).await?;

        tracing::info!(
            total = response.pagination.total_items,
            listed = response.images.len(),
            "Gallery info retrieved"
        );

        Ok(StageOutput::done().with_payload(json!({
            "photo_count_on_site": response.pagination.total_items,
            "images": serde_json::to_value(&response.images)?,
        })))
    }
}
