use std::fs;

use assert_matches::assert_matches;

use adx_bundler::config::{Config, ConfigLoader, ItemEntry, SettingsEntry};
use adx_bundler::domain::ResourceRole;
use adx_bundler::error::AdxError;

#[test]
fn resolve_manifest_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("adx.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "settings": { "timeout_secs": 30, "user_agent": "gallery/2" },
            "items": [
                {
                    "artist": " xi ",
                    "title": "Halcyon",
                    "jacket": "https://cdn/halcyon.webp",
                    "audio": "https://cdn/halcyon.mp3",
                    "chart": "https://cdn/halcyon.txt"
                },
                {
                    "artist": "Camellia",
                    "title": "Xevel",
                    "mv": "https://cdn/xevel.mp4",
                    "chart": "https://cdn/xevel.txt",
                    "include_mv": false
                }
            ]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.settings.timeout_secs, 30);
    assert_eq!(resolved.settings.user_agent, "gallery/2");
    assert_eq!(resolved.items.len(), 2);
    assert_eq!(resolved.items[0].item.artist, "xi");
    assert_eq!(
        resolved.items[0].resources.get(ResourceRole::Image),
        Some("https://cdn/halcyon.webp")
    );
    assert_eq!(resolved.items[1].resources.requested_count(), 1);
}

#[test]
fn missing_explicit_file_is_read_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/adx.json")).unwrap_err();
    assert_matches!(err, AdxError::ConfigRead(_));
    assert!(err.is_configuration());
}

#[test]
fn malformed_json_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("adx.json");
    fs::write(&path, "{ items: ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AdxError::ConfigParse(_));
}

#[test]
fn blank_title_is_rejected() {
    let config = Config {
        schema_version: None,
        settings: None,
        items: vec![ItemEntry {
            artist: "someone".to_string(),
            title: "  ".to_string(),
            mv: None,
            jacket: None,
            audio: None,
            chart: Some("https://cdn/x.txt".to_string()),
            include_mv: None,
        }],
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, AdxError::InvalidItem(_));
}

#[test]
fn zero_timeout_is_rejected() {
    let config = Config {
        schema_version: None,
        settings: Some(SettingsEntry {
            timeout_secs: Some(0),
            user_agent: None,
        }),
        items: Vec::new(),
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, AdxError::ConfigParse(_));
}
