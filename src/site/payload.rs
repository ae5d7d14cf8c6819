//! Payload shapes stored on profile records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Profile payload written by discovery and extended by later stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub surname: String,
    pub search_url: String,
    pub client_id: String,
    pub data_url: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub profile_pic_style: Option<String>,
    pub result_page_placement: usize,
    #[serde(default)]
    pub photo_count_on_site: u64,
    #[serde(default)]
    pub images: Vec<GalleryImage>,
}

/// Image identifier as returned by the album API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One entry of the album API's `Images` list
///
/// Fields other than the id and key are kept as returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryImage {
    #[serde(rename = "ImageID")]
    pub image_id: ImageId,
    #[serde(rename = "ImageKey")]
    pub image_key: String,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Album API response, reduced to what enrichment keeps
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumResponse {
    #[serde(rename = "Pagination")]
    pub pagination: Pagination,
    #[serde(rename = "Images", default)]
    pub images: Vec<GalleryImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(rename = "TotalItems")]
    pub total_items: u64,
}
