//! Key conventions for the flat object namespace.
//!
//! Object stores only know keys. Folders are inferred from `/`-separated
//! prefixes, kept alive by zero-byte `.keep` markers, and every logical folder
//! `P` owns two physical sub-prefixes: `P/original/` and `P/thumb/`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const MARKER_NAME: &str = ".keep";
pub const THUMB_SEGMENT: &str = "thumb";
pub const ORIGINAL_SEGMENT: &str = "original";
pub const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

const KEY_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixPair {
    pub base: String,
    pub original: String,
    pub thumb: String,
}

impl PrefixPair {
    pub fn thumb_key(&self, name: &str) -> String {
        format!("{}{}", self.thumb, name)
    }

    pub fn original_key(&self, name: &str) -> String {
        format!("{}{}", self.original, name)
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Strips one trailing `thumb/` or `original/` segment, if present.
///
/// The segment must be whole: `mythumb/` is a folder of its own.
pub fn strip_pair_segment(prefix: &str) -> &str {
    for segment in [THUMB_SEGMENT, ORIGINAL_SEGMENT] {
        if let Some(rest) = prefix
            .strip_suffix('/')
            .and_then(|p| p.strip_suffix(segment))
        {
            if rest.is_empty() || rest.ends_with('/') {
                return rest;
            }
        }
    }
    prefix
}

/// Derives the original/thumb pair for any active prefix.
///
/// Every operation that needs a paired path goes through here: the content
/// pane, selection delete, upload, and preview.
pub fn pair_paths(active_prefix: &str) -> PrefixPair {
    let normalized = normalize_prefix(active_prefix);
    let base = strip_pair_segment(&normalized).to_string();
    PrefixPair {
        original: format!("{base}{ORIGINAL_SEGMENT}/"),
        thumb: format!("{base}{THUMB_SEGMENT}/"),
        base,
    }
}

pub fn ends_in_pair_segment(prefix: &str) -> bool {
    strip_pair_segment(prefix).len() != prefix.len()
}

/// The prefix the content pane lists for a folder: the folder itself when it
/// already names a `thumb/`/`original/` level, else its `thumb/` child.
pub fn display_prefix(folder_path: &str) -> String {
    let normalized = normalize_prefix(folder_path);
    if ends_in_pair_segment(&normalized) {
        normalized
    } else {
        format!("{normalized}{THUMB_SEGMENT}/")
    }
}

/// `a/b/c/` -> `["a/", "a/b/", "a/b/c/"]`
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let mut current = String::new();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            current.push_str(segment);
            current.push('/');
            current.clone()
        })
        .collect()
}

/// Drops the last non-empty segment. Top-level folders return the root (`""`).
pub fn parent_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() <= 1 {
        return String::new();
    }
    format!("{}/", parts[..parts.len() - 1].join("/"))
}

pub fn is_marker_key(key: &str) -> bool {
    key.rsplit('/').next() == Some(MARKER_NAME)
}

pub fn is_reserved_segment(segment: &str) -> bool {
    segment == THUMB_SEGMENT || segment == ORIGINAL_SEGMENT
}

pub fn has_reserved_segment(path: &str) -> bool {
    path.split('/').any(is_reserved_segment)
}

pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub fn mime_type_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub fn encode_key_path(key: &str) -> String {
    utf8_percent_encode(key, KEY_PATH_ENCODE_SET).to_string()
}
