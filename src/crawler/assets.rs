//! On-disk layout for fetched assets
//!
//! Files land at `{root}/{record_id}/{variant}/{item_id}.{ext}`. Directory
//! creation is idempotent and safe when several workers write under the same
//! record at once.

use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AssetLayout {
    root: PathBuf,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path for one asset variant
    ///
    /// Each component is sanitized so it stays a single path segment.
    pub fn path_for(&self, record_id: &str, variant: &str, item_id: &str, ext: &str) -> PathBuf {
        self.root
            .join(sanitize(record_id))
            .join(sanitize(variant))
            .join(format!("{}.{}", sanitize(item_id), sanitize(ext)))
    }

    /// Writes `bytes` to the asset path, creating directories as needed
    pub async fn write(
        &self,
        record_id: &str,
        variant: &str,
        item_id: &str,
        ext: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.path_for(record_id, variant, item_id, ext);
        if let Some(parent) = path.parent() {
            // create_dir_all succeeds if another task created it first
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
