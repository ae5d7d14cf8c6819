//! HTML extraction for search result and gallery pages
//!
//! Pure functions over page text. Selectors are fixed by the site's markup,
//! so a selector that fails to compile simply yields no matches.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Inline style the site puts on a profile tile whose gallery is private
pub const LOCKED_TILE_STYLE: &str = r#"background-image: url("");"#;

/// One profile tile from a surname search page
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTile {
    pub client_id: String,
    pub data_url: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub profile_pic_style: Option<String>,
    /// 1-based position among all tiles on the page
    pub placement: usize,
}

impl SearchTile {
    pub fn is_locked(&self) -> bool {
        self.profile_pic_style.as_deref().map(str::trim) == Some(LOCKED_TILE_STYLE)
    }
}

/// Album reference embedded in a gallery page's inline scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRef {
    pub id: String,
    pub key: String,
}

/// Tiles that could not be read, with their placement and what was missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTile {
    pub placement: usize,
    pub reason: &'static str,
}

/// Extracts profile tiles from a search result page
///
/// Relative URLs are resolved against `base_url`. Tiles lacking a client id
/// or data url are returned in the second list instead.
pub fn parse_search_results(html: &str, base_url: &Url) -> (Vec<SearchTile>, Vec<SkippedTile>) {
    let document = Html::parse_document(html);
    let mut tiles = Vec::new();
    let mut skipped = Vec::new();

    let Some(tile_selector) = selector("div.sm-search-resultset > ul.sm-search-tiles > li") else {
        return (tiles, skipped);
    };

    for (index, item) in document.select(&tile_selector).enumerate() {
        let placement = index + 1;
        match parse_tile(item, base_url, placement) {
            Ok(tile) => tiles.push(tile),
            Err(reason) => skipped.push(SkippedTile { placement, reason }),
        }
    }

    (tiles, skipped)
}

fn parse_tile(
    item: ElementRef<'_>,
    base_url: &Url,
    placement: usize,
) -> Result<SearchTile, &'static str> {
    let info = first(item, "div[data-clientid]").ok_or("missing tile div")?;
    let client_id =
        non_empty(info.value().attr("data-clientid")).ok_or("missing data-clientid")?;
    let data_url = non_empty(info.value().attr("data-url"))
        .and_then(|href| resolve(&href, base_url))
        .ok_or("missing data-url")?;

    let name = first(item, "div.sm-search-tile-info p")
        .map(|p| p.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let anchor = first(item, r#"div[class*="sm-search-tile"] a"#);
    let profile_pic_url = anchor
        .and_then(|a| non_empty(a.value().attr("href")))
        .and_then(|href| resolve(&href, base_url));
    let profile_pic_style = anchor.and_then(|a| a.value().attr("style")).map(str::to_string);

    Ok(SearchTile {
        client_id,
        data_url,
        name,
        profile_pic_url,
        profile_pic_style,
        placement,
    })
}

/// True if the gallery page asks the visitor to unlock it
pub fn is_gallery_locked(html: &str) -> bool {
    let document = Html::parse_document(html);
    let Some(heading) = selector("h1") else {
        return false;
    };

    document
        .select(&heading)
        .any(|h1| h1.text().collect::<String>().contains("Unlock Gallery"))
}

/// Finds `"albumId":<digits>` and `"albumKey":"<key>"` in the page source
pub fn extract_album_ref(html: &str) -> Option<AlbumRef> {
    let id_pattern = Regex::new(r#""albumId":(\d+)"#).ok()?;
    let key_pattern = Regex::new(r#""albumKey":"([^"]*)""#).ok()?;

    let id = id_pattern.captures(html)?.get(1)?.as_str().to_string();
    let key = key_pattern.captures(html)?.get(1)?.as_str().to_string();
    Some(AlbumRef { id, key })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    element.select(&sel).next()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve(href: &str, base_url: &Url) -> Option<String> {
    base_url.join(href).ok().map(|url| url.to_string())
}
