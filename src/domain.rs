use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AdxError;

/// Kind of asset requested for one item. Declaration order is archive order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRole {
    Video,
    Image,
    Audio,
    Data,
}

impl ResourceRole {
    pub const ALL: [ResourceRole; 4] = [
        ResourceRole::Video,
        ResourceRole::Image,
        ResourceRole::Audio,
        ResourceRole::Data,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceRole::Video => "video",
            ResourceRole::Image => "image",
            ResourceRole::Audio => "audio",
            ResourceRole::Data => "data",
        }
    }

    /// Name of the entry this role occupies inside the archive.
    ///
    /// Video and data names are fixed. Image and audio keep the extension
    /// discovered from their URL and fall back to `jpg` / `mp3`.
    pub fn entry_name(self, extension: &str) -> String {
        match self {
            ResourceRole::Video => "bg.mp4".to_string(),
            ResourceRole::Image if extension.is_empty() => "bg.jpg".to_string(),
            ResourceRole::Image => format!("bg.{extension}"),
            ResourceRole::Audio if extension.is_empty() => "track.mp3".to_string(),
            ResourceRole::Audio => format!("track.{extension}"),
            ResourceRole::Data => "maidata.txt".to_string(),
        }
    }
}

impl fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ResourceRole {
    type Err = AdxError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" | "mv" => Ok(ResourceRole::Video),
            "image" | "jacket" => Ok(ResourceRole::Image),
            "audio" => Ok(ResourceRole::Audio),
            "data" | "chart" => Ok(ResourceRole::Data),
            _ => Err(AdxError::InvalidItem(format!("unknown resource role: {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemIdentity {
    pub artist: String,
    pub title: String,
}

impl ItemIdentity {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }

    pub fn archive_filename(&self) -> String {
        format!("{} - {}.adx", self.artist, self.title)
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Role to URL mapping for one item. A missing or blank URL means the role
/// was not requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ResourceRequests {
    pub fn get(&self, role: ResourceRole) -> Option<&str> {
        let url = match role {
            ResourceRole::Video => self.video.as_deref(),
            ResourceRole::Image => self.image.as_deref(),
            ResourceRole::Audio => self.audio.as_deref(),
            ResourceRole::Data => self.data.as_deref(),
        };
        url.map(str::trim).filter(|url| !url.is_empty())
    }

    pub fn set(&mut self, role: ResourceRole, url: Option<String>) {
        let slot = match role {
            ResourceRole::Video => &mut self.video,
            ResourceRole::Image => &mut self.image,
            ResourceRole::Audio => &mut self.audio,
            ResourceRole::Data => &mut self.data,
        };
        *slot = url;
    }

    /// Present roles in archive order.
    pub fn present(&self) -> Vec<(ResourceRole, &str)> {
        ResourceRole::ALL
            .into_iter()
            .filter_map(|role| self.get(role).map(|url| (role, url)))
            .collect()
    }

    pub fn requested_count(&self) -> usize {
        self.present().len()
    }

    pub fn without_video(mut self) -> Self {
        self.video = None;
        self
    }

    /// The gallery only offers a download when there is something to play:
    /// an audio track or a chart.
    pub fn is_downloadable(&self) -> bool {
        self.get(ResourceRole::Audio).is_some() || self.get(ResourceRole::Data).is_some()
    }
}

/// Why a single resource could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("transport error: HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport error: invalid URL {0}")]
    InvalidUrl(String),

    #[error("transport error: timed out")]
    TimedOut,

    #[error("transport error: cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Bytes { payload: Vec<u8>, extension: String },
    Failed(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleFailure {
    pub role: ResourceRole,
    pub reason: FetchFailure,
}

/// Extension of the last path segment of `url`, without the dot.
///
/// Query and fragment are ignored. Unparseable URLs and segments without a
/// dot yield an empty string.
pub fn file_extension(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let segment = parsed.path().rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn extension_from_path() {
        assert_eq!(file_extension("https://cdn.example.com/jackets/a.png"), "png");
        assert_eq!(
            file_extension("https://cdn.example.com/track.ogg?token=abc.def#x.y"),
            "ogg"
        );
        assert_eq!(file_extension("https://cdn.example.com/v1.2/cover"), "");
        assert_eq!(file_extension("https://cdn.example.com/"), "");
        assert_eq!(file_extension("not a url"), "");
    }

    #[test]
    fn entry_names() {
        assert_eq!(ResourceRole::Video.entry_name("webm"), "bg.mp4");
        assert_eq!(ResourceRole::Image.entry_name("png"), "bg.png");
        assert_eq!(ResourceRole::Image.entry_name(""), "bg.jpg");
        assert_eq!(ResourceRole::Audio.entry_name("ogg"), "track.ogg");
        assert_eq!(ResourceRole::Audio.entry_name(""), "track.mp3");
        assert_eq!(ResourceRole::Data.entry_name("md"), "maidata.txt");
    }

    #[test]
    fn blank_urls_are_absent() {
        let requests = ResourceRequests {
            video: Some("  ".to_string()),
            image: None,
            audio: Some("https://a/x.mp3".to_string()),
            data: Some(String::new()),
        };
        assert_eq!(requests.requested_count(), 1);
        assert_eq!(requests.present()[0].0, ResourceRole::Audio);
    }

    #[test]
    fn parse_role_aliases() {
        assert_eq!("mv".parse::<ResourceRole>().unwrap(), ResourceRole::Video);
        assert_eq!("Chart".parse::<ResourceRole>().unwrap(), ResourceRole::Data);
        let err = "lyrics".parse::<ResourceRole>().unwrap_err();
        assert_matches!(err, AdxError::InvalidItem(_));
    }

    #[test]
    fn archive_filename_is_verbatim() {
        let item = ItemIdentity::new("xi", "Halcyon");
        assert_eq!(item.archive_filename(), "xi - Halcyon.adx");
    }
}
