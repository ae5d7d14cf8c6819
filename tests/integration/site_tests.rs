//! Site handler tests against a mock gallery site
//!
//! These tests use wiremock to serve search pages, gallery pages, the album
//! API and image files, then run the full harvest end-to-end.

use crate::common::{find, TestDb};
use gallery_harvest::config::{
    Config, OutputConfig, PipelineConfig, PolitenessConfig, SeedConfig, SiteConfig,
};
use gallery_harvest::crawler::{run_harvest, AssetLayout, StageHandler};
use gallery_harvest::site::{GalleryInfo, ImageDownloader, SiteClient, SurnameSearch};
use gallery_harvest::state::{Stage, StageStatus};
use gallery_harvest::storage::{RecordFilter, RecordKind, StatusMatch, TaskRecord, TaskStore};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_page(base: &str) -> String {
    format!(
        r#"<html><body>
<div class="sm-search-resultset">
  <ul class="sm-search-tiles">
    <li>
      <div data-clientid="11" data-url="{base}/Families/Smith-John">
        <div class="sm-search-tile"><a href="{base}/Families/Smith-John" style="background-image: url(&quot;{base}/cover.jpg&quot;);"></a></div>
        <div class="sm-search-tile-info"><p>John Smith</p></div>
      </div>
    </li>
    <li>
      <div data-clientid="12" data-url="{base}/Families/Smith-Ann">
        <div class="sm-search-tile"><a href="{base}/Families/Smith-Ann" style='background-image: url("");'></a></div>
        <div class="sm-search-tile-info"><p>Ann Smith</p></div>
      </div>
    </li>
    <li>
      <div data-clientid="13" data-url="{base}/Families/Smith-Bob">
        <div class="sm-search-tile"><a href="{base}/Families/Smith-Bob" style="background-image: url(&quot;{base}/bob.jpg&quot;);"></a></div>
        <div class="sm-search-tile-info"><p>Bob Smith</p></div>
      </div>
    </li>
  </ul>
</div>
</body></html>"#,
        base = base
    )
}

const OPEN_GALLERY: &str = r#"<html><head><script>
window.cfg = {"albumId":4321,"albumKey":"kEy42","title":"Smith"};
</script></head><body><h1>John Smith</h1></body></html>"#;

const LOCKED_GALLERY: &str = r#"<html><body><h1>Unlock Gallery</h1><form></form></body></html>"#;

fn album_response() -> serde_json::Value {
    json!({
        "Pagination": {"TotalItems": 2, "PageNumber": 1},
        "Images": [
            {"ImageID": 101, "ImageKey": "aaa", "Caption": "one"},
            {"ImageID": 102, "ImageKey": "bbb", "Caption": "two"}
        ]
    })
}

async fn mount_site(server: &MockServer) {
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("q", "smith"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(&base)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Families/Smith-John"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OPEN_GALLERY))
        .expect(1)
        .mount(server)
        .await;

    // Locked at discovery: never visited
    Mock::given(method("GET"))
        .and(path("/Families/Smith-Ann"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OPEN_GALLERY))
        .expect(0)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Families/Smith-Bob"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOCKED_GALLERY))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("method", "rpc.gallery.getalbum"))
        .and(query_param("albumId", "4321"))
        .and(query_param("albumKey", "kEy42"))
        .and(query_param("PageSize", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(album_response()))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/photos/i-[a-z]+/0/[A-Za-z0-9]+/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
        .mount(server)
        .await;
}

fn test_config(base: &str, db: &TestDb, names: &Path) -> Config {
    Config {
        pipeline: PipelineConfig {
            workers: 2,
            worker_stagger_ms: 0,
            items_per_record: 10,
            lease_secs: None,
        },
        seed: SeedConfig {
            name_list: names.display().to_string(),
            name_count: 50,
        },
        site: SiteConfig {
            search_url: format!("{}/search/?q={{surname}}", base),
            api_url: format!("{}/api/", base),
            photo_url: format!(
                "{}/photos/i-{{key}}/0/{{variant}}/i-{{key}}-{{variant}}.{{ext}}",
                base
            ),
            variants: vec!["X2".to_string(), "Th".to_string()],
            extension: "jpg".to_string(),
            page_size: 500,
            user_agent: "TestAgent/1.0".to_string(),
        },
        politeness: PolitenessConfig {
            search_delay_ms: 0,
            gallery_delay_ms: 0,
            download_delay_ms: 0,
        },
        output: OutputConfig {
            database_path: db.path.display().to_string(),
            assets_root: db.dir().join("photos").display().to_string(),
            log_file: None,
        },
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_harvest_against_mock_site() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let db = TestDb::new();
    let names = db.dir().join("names.json");
    std::fs::write(&names, r#"["Smith"]"#).unwrap();

    let config = test_config(&server.uri(), &db, &names);
    let assets_root = config.output.assets_root.clone();
    let (_tx, rx) = watch::channel(false);
    let report = run_harvest(config, rx).await.unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let store = db.open();
    let surname = find(&store, "smith");
    assert_eq!(surname.status(Stage::Discovery), Some(StageStatus::Done));
    assert_eq!(surname.payload["profiles_found"], 3);

    let profiles = RecordFilter::new().kind(RecordKind::Profile);
    assert_eq!(store.count(&profiles).unwrap(), 3);
    // Ann locked by her tile, Bob by his gallery page
    assert_eq!(store.count(&profiles.clone().locked()).unwrap(), 2);

    let fetched = store
        .find_one(
            &RecordFilter::new()
                .kind(RecordKind::Profile)
                .stage(Stage::AssetFetch, StatusMatch::Is(StageStatus::Done)),
        )
        .unwrap()
        .expect("one profile should finish asset-fetch");
    assert_eq!(fetched.payload["name"], "John Smith");
    assert_eq!(fetched.payload["photo_count_on_site"], 2);
    assert_eq!(fetched.payload["images_downloaded"], 2);
    let images = fetched.payload["images"].as_array().unwrap();
    assert!(images.iter().all(|image| image["downloaded"] == true));
    assert!(images.iter().any(|image| image["Caption"] == "one"));

    for variant in ["X2", "Th"] {
        for image_id in ["101", "102"] {
            let file = Path::new(&assets_root)
                .join(&fetched.id)
                .join(variant)
                .join(format!("{}.jpg", image_id));
            assert_eq!(std::fs::read(&file).unwrap(), b"JPEGDATA", "{}", file.display());
        }
    }

    // Mock expectations (exactly-once visits) are verified on drop
    drop(server);
}

#[tokio::test]
async fn test_search_failure_marks_surname_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let search = SurnameSearch::new(
        SiteClient::new("TestAgent/1.0").unwrap(),
        format!("{}/search/?q={{surname}}", server.uri()),
        Duration::ZERO,
    );
    let result = search.handle(&TaskRecord::surname("smith")).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("503"));
}

#[tokio::test]
async fn test_gallery_without_album_ref_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Families/Nobody"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><h1>Nobody</h1></html>"))
        .mount(&server)
        .await;

    let handler = GalleryInfo::new(
        SiteClient::new("TestAgent/1.0").unwrap(),
        format!("{}/api/", server.uri()),
        500,
        Duration::ZERO,
    );
    let record = TaskRecord::profile(
        "P1".to_string(),
        None,
        json!({
            "surname": "nobody",
            "search_url": server.uri(),
            "client_id": "1",
            "data_url": format!("{}/Families/Nobody", server.uri()),
            "name": "Nobody",
            "profile_pic_url": null,
            "profile_pic_style": null,
            "result_page_placement": 1
        }),
        false,
    );

    let result = handler.handle(&record).await;
    assert!(result.unwrap_err().to_string().contains("albumId"));
}

#[tokio::test]
async fn test_downloader_continues_past_missing_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/X2/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/Th/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"thumb".to_vec()))
        .mount(&server)
        .await;

    let db = TestDb::new();
    let root = db.dir().join("photos");
    let handler = ImageDownloader::new(
        SiteClient::new("TestAgent/1.0").unwrap(),
        format!("{}/photos/i-{{key}}/0/{{variant}}/i-{{key}}-{{variant}}.{{ext}}", server.uri()),
        vec!["X2".to_string(), "Th".to_string()],
        "jpg",
        AssetLayout::new(&root),
        1,
        Duration::ZERO,
    );
    let record = TaskRecord::profile(
        "P9".to_string(),
        None,
        json!({
            "surname": "x",
            "search_url": "",
            "client_id": "9",
            "data_url": "",
            "name": "",
            "profile_pic_url": null,
            "profile_pic_style": null,
            "result_page_placement": 1,
            "images": [
                {"ImageID": 1, "ImageKey": "one"},
                {"ImageID": 2, "ImageKey": "two"}
            ]
        }),
        false,
    );

    let output = handler.handle(&record).await.unwrap();
    let payload = output.payload.unwrap();
    assert_eq!(payload["images_downloaded"], 1);

    let downloaded: Vec<&serde_json::Value> = payload["images"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|image| image["downloaded"] == true)
        .collect();
    assert_eq!(downloaded.len(), 1);

    let id = downloaded[0]["ImageID"].to_string();
    assert!(root.join("P9/Th").join(format!("{}.jpg", id)).exists());
    assert!(!root.join("P9/X2").exists());
}
