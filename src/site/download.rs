//! Asset-fetch stage: image downloads

use crate::crawler::{AssetLayout, HandlerError, StageHandler, StageOutput};
use crate::site::payload::ProfilePayload;
use crate::site::SiteClient;
use crate::state::Stage;
use crate::storage::TaskRecord;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::json;
use std::time::Duration;

/// Downloads every size variant of a random sample of a profile's images
pub struct ImageDownloader {
    client: SiteClient,
    photo_url: String,
    variants: Vec<String>,
    extension: String,
    layout: AssetLayout,
    items_per_record: usize,
    delay: Duration,
}

impl ImageDownloader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: SiteClient,
        photo_url: impl Into<String>,
        variants: Vec<String>,
        extension: impl Into<String>,
        layout: AssetLayout,
        items_per_record: usize,
        delay: Duration,
    ) -> Self {
        Self {
            client,
            photo_url: photo_url.into(),
            variants,
            extension: extension.into(),
            layout,
            items_per_record,
            delay,
        }
    }

    fn url_for(&self, key: &str, variant: &str) -> String {
        self.photo_url
            .replace("{key}", key)
            .replace("{variant}", variant)
            .replace("{ext}", &self.extension)
    }

    /// Indices of not-yet-downloaded images, shuffled and capped
    fn pick(&self, profile: &ProfilePayload) -> Vec<usize> {
        let mut pending: Vec<usize> = profile
            .images
            .iter()
            .enumerate()
            .filter(|(_, image)| !image.downloaded)
            .map(|(index, _)| index)
            .collect();
        pending.shuffle(&mut rand::thread_rng());
        pending.truncate(self.items_per_record);
        pending
    }
}

#[async_trait]
impl StageHandler for ImageDownloader {
    fn stage(&self) -> Stage {
        Stage::AssetFetch
    }

    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError> {
        let mut profile: ProfilePayload = serde_json::from_value(record.payload.clone())?;
        let picked = self.pick(&profile);

        let mut downloaded = 0usize;
        for index in picked {
            let image = &profile.images[index];
            let item_id = image.image_id.to_string();
            let key = image.image_key.clone();

            for variant in &self.variants {
                let url = self.url_for(&key, variant);
                let saved = match self.client.get_bytes(&url).await {
                    Ok(bytes) => self
                        .layout
                        .write(&record.id, variant, &item_id, &self.extension, &bytes)
                        .await
                        .map_err(HandlerError::from),
                    Err(e) => Err(e),
                };
                if let Err(e) = saved {
                    tracing::warn!(
                        image_id = %item_id,
                        %variant,
                        error = %e,
                        "Failed to fetch image variant"
                    );
                }
                tokio::time::sleep(self.delay).await;
            }

            profile.images[index].downloaded = true;
            downloaded += 1;
        }

        tracing::info!(downloaded, "Finished gathering images");

        Ok(StageOutput::done().with_payload(json!({
            "images": serde_json::to_value(&profile.images)?,
            "images_downloaded": downloaded,
        })))
    }
}
