use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{ItemIdentity, ResourceRequests};
use crate::error::AdxError;

pub const DEFAULT_CONFIG_FILE: &str = "adx.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub settings: Option<SettingsEntry>,
    #[serde(default)]
    pub items: Vec<ItemEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SettingsEntry {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// One chart as it appears in the gallery's front matter.
#[derive(Debug, Deserialize, Serialize)]
pub struct ItemEntry {
    pub artist: String,
    pub title: String,
    #[serde(default, alias = "mv_link", alias = "video")]
    pub mv: Option<String>,
    #[serde(default, alias = "image")]
    pub jacket: Option<String>,
    #[serde(default, alias = "audio_link")]
    pub audio: Option<String>,
    #[serde(default, alias = "chart_link", alias = "data")]
    pub chart: Option<String>,
    #[serde(default)]
    pub include_mv: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("adx-dl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemRequest {
    pub item: ItemIdentity,
    pub resources: ResourceRequests,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub settings: FetchSettings,
    pub items: Vec<ItemRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AdxError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(AdxError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AdxError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| AdxError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AdxError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let settings = resolve_settings(config.settings.unwrap_or_default())?;

        let items = config
            .items
            .into_iter()
            .map(resolve_item)
            .collect::<Result<Vec<_>, AdxError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            settings,
            items,
        })
    }
}

fn resolve_settings(entry: SettingsEntry) -> Result<FetchSettings, AdxError> {
    let defaults = FetchSettings::default();
    let timeout_secs = entry.timeout_secs.unwrap_or(defaults.timeout_secs);
    if timeout_secs == 0 {
        return Err(AdxError::ConfigParse(
            "settings.timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(FetchSettings {
        timeout_secs,
        user_agent: entry
            .user_agent
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.user_agent),
    })
}

fn resolve_item(entry: ItemEntry) -> Result<ItemRequest, AdxError> {
    let artist = entry.artist.trim();
    let title = entry.title.trim();
    if artist.is_empty() || title.is_empty() {
        return Err(AdxError::InvalidItem(format!(
            "artist and title are required (got {:?} / {:?})",
            entry.artist, entry.title
        )));
    }

    let resources = ResourceRequests {
        video: entry.mv,
        image: entry.jacket,
        audio: entry.audio,
        data: entry.chart,
    };
    let resources = if entry.include_mv.unwrap_or(true) {
        resources
    } else {
        resources.without_video()
    };

    Ok(ItemRequest {
        item: ItemIdentity::new(artist, title),
        resources,
    })
}
