//! Handlers for the gallery site
//!
//! One handler per stage, all sharing a single [`SiteClient`]:
//! - discovery: [`SurnameSearch`]
//! - enrichment: [`GalleryInfo`]
//! - asset-fetch: [`ImageDownloader`]

mod client;
mod discovery;
mod download;
mod enrichment;
pub mod parser;
pub mod payload;

pub use client::{build_http_client, SiteClient};
pub use discovery::{profile_id, SurnameSearch};
pub use download::ImageDownloader;
pub use enrichment::GalleryInfo;

use crate::config::Config;
use crate::crawler::{AssetLayout, Pipeline};
use std::sync::Arc;
use std::time::Duration;

/// Wires the site handlers from configuration
pub fn build_pipeline(config: &Config) -> crate::Result<Pipeline> {
    let client = SiteClient::new(&config.site.user_agent)?;
    let politeness = &config.politeness;

    let discovery = SurnameSearch::new(
        client.clone(),
        config.site.search_url.clone(),
        Duration::from_millis(politeness.search_delay_ms),
    );
    let enrichment = GalleryInfo::new(
        client.clone(),
        config.site.api_url.clone(),
        config.site.page_size,
        Duration::from_millis(politeness.gallery_delay_ms),
    );
    let asset_fetch = ImageDownloader::new(
        client,
        config.site.photo_url.clone(),
        config.site.variants.clone(),
        config.site.extension.clone(),
        AssetLayout::new(&config.output.assets_root),
        config.pipeline.items_per_record as usize,
        Duration::from_millis(politeness.download_delay_ms),
    );

    Ok(Pipeline::new(
        Arc::new(discovery),
        Arc::new(enrichment),
        Arc::new(asset_fetch),
    )?)
}
