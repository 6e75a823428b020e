//! Delivery URL candidates for assets on the media host.
//!
//! When the rendering service does not hand back a canonical URL, the
//! video can only be found by trying the delivery URLs it could live
//! under. [`candidate_urls`] builds that list deterministically: every
//! combination of folder, version token and extension, in a fixed
//! priority order and without duplicates.

use serde::Serialize;

/// Default delivery host for the media service.
pub const DEFAULT_DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// Extensions tried for video assets, most likely first.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

/// Folder prefixes tried when none are configured. The empty folder means
/// "no prefix".
pub const DEFAULT_FOLDERS: &[&str] = &["", "virtual_tours", "videos"];

/// Media kind as used in delivery paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Video,
    Image,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

/// Everything needed to enumerate where an asset might be delivered from.
#[derive(Debug, Clone)]
pub struct MediaLocator {
    pub delivery_base: String,
    pub cloud_name: String,
    pub resource_type: ResourceType,
    pub public_id: String,
    pub folders: Vec<String>,
    /// Version tokens without the leading `v`. `None` is always tried first.
    pub versions: Vec<u64>,
    pub extensions: Vec<String>,
}

impl MediaLocator {
    /// Locator for a rendered tour video named after its job id.
    pub fn for_video(cloud_name: impl Into<String>, public_id: impl Into<String>) -> Self {
        Self {
            delivery_base: DEFAULT_DELIVERY_BASE.to_string(),
            cloud_name: cloud_name.into(),
            resource_type: ResourceType::Video,
            public_id: public_id.into(),
            folders: DEFAULT_FOLDERS.iter().map(|s| s.to_string()).collect(),
            versions: Vec::new(),
            extensions: DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_folders(mut self, folders: Vec<String>) -> Self {
        self.folders = folders;
        self
    }

    pub fn with_versions(mut self, versions: Vec<u64>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_delivery_base(mut self, base: impl Into<String>) -> Self {
        self.delivery_base = base.into();
        self
    }
}

/// Where a resolved video URL came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "url", rename_all = "snake_case")]
pub enum VideoSource {
    /// Returned by the rendering service.
    Canonical(String),
    /// Found by probing delivery candidates.
    Probed(String),
}

impl VideoSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Canonical(url) | Self::Probed(url) => url,
        }
    }
}

/// Build the ordered, de-duplicated candidate list for `locator`.
///
/// Order: folder, then version (unversioned first), then extension. A
/// public id that already ends in one of the candidate extensions is not
/// given a second one.
pub fn candidate_urls(locator: &MediaLocator) -> Vec<String> {
    let base = locator.delivery_base.trim_end_matches('/');
    let public_id = locator.public_id.trim_matches('/');

    let folders: Vec<&str> = if locator.folders.is_empty() {
        vec![""]
    } else {
        locator.folders.iter().map(|f| f.trim_matches('/')).collect()
    };

    let mut versions: Vec<Option<u64>> = vec![None];
    versions.extend(locator.versions.iter().copied().map(Some));

    let has_extension = locator
        .extensions
        .iter()
        .any(|ext| public_id.ends_with(&format!(".{}", ext.trim_start_matches('.'))));
    let extensions: Vec<String> = if has_extension || locator.extensions.is_empty() {
        vec![String::new()]
    } else {
        locator
            .extensions
            .iter()
            .map(|e| format!(".{}", e.trim_start_matches('.')))
            .collect()
    };

    let mut urls: Vec<String> = Vec::new();
    for folder in &folders {
        for version in &versions {
            for ext in &extensions {
                let mut url = format!(
                    "{base}/{}/{}/upload/",
                    locator.cloud_name,
                    locator.resource_type.as_str()
                );
                if let Some(v) = version {
                    url.push_str(&format!("v{v}/"));
                }
                if !folder.is_empty() && !public_id.starts_with(&format!("{folder}/")) {
                    url.push_str(folder);
                    url.push('/');
                }
                url.push_str(public_id);
                url.push_str(ext);
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
    }
    urls
}
