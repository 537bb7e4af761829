//! Resource classification from URL shape
//!
//! A pure function of the canonical URL and the configured target domains.

use url::Url;

use crate::types::ResourceKind;

/// Query keys that make a URL a dynamic endpoint whatever its extension
pub const FILE_PARAM_KEYS: &[&str] = &[
    "file", "filename", "path", "resource", "download", "view", "src", "url",
];

const JS_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx"];
const CSS_EXTENSIONS: &[&str] = &["css", "less", "scss"];
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "ico", "tif", "tiff", "avif",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "flv", "wmv", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "rtf", "csv", "txt",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz"];
const OTHER_STATIC_EXTENSIONS: &[&str] = &["map", "swf", "exe", "dmg", "apk", "bin", "iso", "wasm"];
const API_EXTENSIONS: &[&str] = &["json"];

/// Classifies canonical URLs into [`ResourceKind`]s
#[derive(Debug, Clone, Default)]
pub struct ResourceClassifier {
    target_domains: Vec<String>,
}

impl ResourceClassifier {
    /// `target_domains` holds exact hosts or `*.suffix` wildcards. Empty means
    /// no host is external.
    pub fn new(target_domains: &[String]) -> Self {
        Self {
            target_domains: target_domains.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, url: &Url) -> ResourceKind {
        if self.is_external(url) {
            return ResourceKind::External;
        }

        let path = url.path().to_lowercase();
        let api_path = is_api_path(&path);

        if has_file_param(url) {
            return if api_path {
                ResourceKind::Api
            } else {
                ResourceKind::Page
            };
        }

        if api_path {
            return ResourceKind::Api;
        }

        match extension_of(&path) {
            Some(ext) => kind_for_extension(ext),
            None => ResourceKind::Page,
        }
    }

    fn is_external(&self, url: &Url) -> bool {
        if self.target_domains.is_empty() {
            return false;
        }
        let Some(host) = url.host_str() else {
            return true;
        };
        !self.target_domains.iter().any(|domain| {
            if let Some(suffix) = domain.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{}", suffix))
            } else {
                host == domain || host.ends_with(&format!(".{}", domain))
            }
        })
    }
}

/// Lowercased extension of the last path segment, if any
pub fn extension_of(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next().unwrap_or("");
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

pub fn kind_for_extension(ext: &str) -> ResourceKind {
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if JS_EXTENSIONS.contains(&ext) {
        ResourceKind::Javascript
    } else if CSS_EXTENSIONS.contains(&ext) {
        ResourceKind::Css
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        ResourceKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        ResourceKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        ResourceKind::Audio
    } else if FONT_EXTENSIONS.contains(&ext) {
        ResourceKind::Font
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        ResourceKind::Document
    } else if ARCHIVE_EXTENSIONS.contains(&ext) {
        ResourceKind::Archive
    } else if OTHER_STATIC_EXTENSIONS.contains(&ext) {
        ResourceKind::OtherStatic
    } else if API_EXTENSIONS.contains(&ext) {
        ResourceKind::Api
    } else {
        ResourceKind::Page
    }
}

/// `/api/`, `/v1/`..`/v9/`, `/rest/`, `/graphql`, `/ajax/`
pub fn is_api_path(lower_path: &str) -> bool {
    if lower_path.contains("/api/")
        || lower_path.ends_with("/api")
        || lower_path.contains("/rest/")
        || lower_path.contains("/graphql")
        || lower_path.contains("/ajax/")
    {
        return true;
    }
    lower_path
        .as_bytes()
        .windows(4)
        .any(|w| w[0] == b'/' && w[1] == b'v' && (b'1'..=b'9').contains(&w[2]) && w[3] == b'/')
}

/// Whether any query key is a file-carrying parameter name
pub fn has_file_param(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, _)| FILE_PARAM_KEYS.contains(&key.to_ascii_lowercase().as_str()))
}
