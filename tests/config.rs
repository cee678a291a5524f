use std::fs;

use assert_matches::assert_matches;

use catalog_mirror::config::{ConfigLoader, ConfigOverrides};
use catalog_mirror::domain::{DateGranularity, FeedKind};
use catalog_mirror::error::MirrorError;

#[test]
fn resolves_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("builders.json");
    fs::write(
        &path,
        r#"{
            "name": "builders",
            "feed": "builders",
            "basePath": "/srv/mirror",
            "cache": { "localPath": "state", "age": 60 },
            "local": { "localPath": "docs", "archiveName": "old" },
            "remote": {
                "urlLoc": "https://example.com/api/search",
                "urlParameters": { "size": "25", "item.locale": "en_US" },
                "pageParameter": "p"
            },
            "fetch": { "workers": 2, "timeoutSecs": 5, "filenameDate": "month" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(&path, &ConfigOverrides::default()).unwrap();

    assert_eq!(resolved.feed, FeedKind::Builders);
    assert_eq!(resolved.workers, 2);
    assert_eq!(resolved.cache_age_secs, 60);
    assert_eq!(resolved.page_parameter, "p");
    assert_eq!(resolved.filename_date, DateGranularity::Month);
    assert_eq!(resolved.http.timeout_secs, 5);
    assert_eq!(resolved.paths.cache_dir.as_str(), "/srv/mirror/state/builders");
    assert_eq!(resolved.paths.downloads_dir.as_str(), "/srv/mirror/docs/builders");
    assert_eq!(resolved.paths.archive_dir.as_str(), "/srv/mirror/docs/builders/old");
    assert_eq!(resolved.paths.extras_file.as_str(), "/srv/mirror/state/builders.extra.csv");
    assert!(resolved.paths.report_file.as_str().starts_with("/srv/mirror/state/builders.report."));
}

#[test]
fn missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let result = ConfigLoader::resolve(&temp.path().join("absent.json"), &ConfigOverrides::default());
    assert_matches!(result, Err(MirrorError::ConfigRead(_)));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.json");
    fs::write(&path, "{ name: ").unwrap();
    let result = ConfigLoader::resolve(&path, &ConfigOverrides::default());
    assert_matches!(result, Err(MirrorError::ConfigParse(_)));
}

#[test]
fn unknown_feed_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("feed.json");
    fs::write(
        &path,
        r#"{ "name": "x", "feed": "podcasts", "remote": { "urlLoc": "https://example.com" } }"#,
    )
    .unwrap();
    let result = ConfigLoader::resolve(&path, &ConfigOverrides::default());
    assert_matches!(result, Err(MirrorError::ConfigParse(_)));
}

#[test]
fn blank_name_or_url_is_invalid() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("blank.json");
    for body in [
        r#"{ "name": " ", "feed": "answers", "basePath": "/b", "remote": { "urlLoc": "https://example.com" } }"#,
        r#"{ "name": "a/b", "feed": "answers", "basePath": "/b", "remote": { "urlLoc": "https://example.com" } }"#,
        r#"{ "name": "answers", "feed": "answers", "basePath": "/b", "remote": { "urlLoc": "" } }"#,
    ] {
        fs::write(&path, body).unwrap();
        let result = ConfigLoader::resolve(&path, &ConfigOverrides::default());
        assert_matches!(result, Err(MirrorError::InvalidConfig(_)));
    }
}
