//! End-to-end flow: release metadata fetch -> asset download -> manifest ->
//! index ingestion, against a local mock upstream.

use relmirror::cancellation::CancellationToken;
use relmirror::download::{AssetDownloader, DownloadUrlPolicy, FetchOptions, SilentProgress};
use relmirror::github::ReleaseClient;
use relmirror::index::VersionIndex;
use relmirror::manifest::Manifest;
use std::time::Duration;
use tempfile::TempDir;

fn release_body(server_url: &str, tag: &str, size: usize) -> String {
    format!(
        r#"{{
            "id": 1,
            "tag_name": "{tag}",
            "name": "Release {tag}",
            "published_at": "2024-06-01T12:00:00Z",
            "assets": [
                {{"name": "app.apk", "browser_download_url": "{server_url}/dl/{tag}/app.apk", "size": {size}}}
            ]
        }}"#
    )
}

fn downloader() -> AssetDownloader {
    let options = FetchOptions {
        timeout: Duration::from_secs(10),
        retry_delay: Duration::from_millis(10),
        url_policy: DownloadUrlPolicy {
            base_url: Some("http://mirror.example".to_string()),
            server_address: None,
            server_port: 0,
        },
        ..FetchOptions::default()
    };
    AssetDownloader::new(options)
        .unwrap()
        .with_progress(Box::new(SilentProgress))
}

#[test]
fn test_full_mirror_cycle_and_supersede() {
    let mut server = mockito::Server::new();
    let base = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let fetcher = downloader();
    let index = VersionIndex::new(base.path().to_path_buf());

    // First release.
    let release_mock = server
        .mock("GET", "/repos/o/r/releases/latest")
        .with_status(200)
        .with_body(release_body(&server.url(), "v1.0.0", 5))
        .create();
    let asset_mock = server
        .mock("GET", "/dl/v1.0.0/app.apk")
        .with_status(200)
        .with_body("aaaaa")
        .create();

    let client = ReleaseClient::new(None).with_base_url(server.url());
    let (release, _rate) = client.latest_release("o", "r").unwrap();
    let manifest_path = fetcher
        .fetch("fcl", &release, base.path(), true, &token)
        .unwrap();
    index.update("fcl", &release.version_label(), &manifest_path);

    release_mock.assert();
    asset_mock.assert();
    assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.0.0"));
    let manifest = Manifest::load(&manifest_path).unwrap();
    assert!(manifest.is_latest);
    assert_eq!(
        manifest.assets[0].url,
        "http://mirror.example/download/fcl/v1.0.0/app.apk"
    );

    // A newer release supersedes it: clear the old flag, fetch, ingest.
    let release2 = {
        let _m = server
            .mock("GET", "/repos/o/r/releases/latest")
            .with_status(200)
            .with_body(release_body(&server.url(), "v1.1.0", 5))
            .create();
        let _a = server
            .mock("GET", "/dl/v1.1.0/app.apk")
            .with_status(200)
            .with_body("bbbbb")
            .create();
        let (release2, _) = client.latest_release("o", "r").unwrap();
        let path2 = fetcher
            .fetch("fcl", &release2, base.path(), true, &token)
            .unwrap();
        index.clear_latest_flags("fcl").unwrap();
        index.update("fcl", &release2.version_label(), &path2);
        release2
    };

    assert_eq!(index.latest_version("fcl").as_deref(), Some("v1.1.0"));
    assert!(!Manifest::load(&manifest_path).unwrap().is_latest);

    // A cold index rebuilt from the directory tree answers identically.
    let rebuilt = VersionIndex::new(base.path().to_path_buf());
    rebuilt.init_from_disk().unwrap();
    assert_eq!(rebuilt.latest_map(), index.latest_map());
    assert_eq!(rebuilt.all_manifests(), index.all_manifests());
    assert_eq!(
        rebuilt.latest_manifests()["fcl"].tag_name,
        release2.tag_name
    );
}

#[test]
fn test_refetch_skips_assets_already_on_disk() {
    let mut server = mockito::Server::new();
    let base = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let fetcher = downloader();

    let asset_mock = server
        .mock("GET", "/dl/v2.0.0/app.apk")
        .with_status(200)
        .with_body("ccccc")
        .expect(1)
        .create();
    let release: relmirror::github::Release =
        serde_json::from_str(&release_body(&server.url(), "v2.0.0", 5)).unwrap();

    fetcher.fetch("zl", &release, base.path(), false, &token).unwrap();
    // Re-fetching the same release only rewrites the manifest.
    fetcher.fetch("zl", &release, base.path(), false, &token).unwrap();

    asset_mock.assert();
    assert_eq!(fetcher.transfer_count(), 1);
}
