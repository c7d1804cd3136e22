//! The content pane: the thumbnails of one folder.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;

use crate::config::ConnectionConfig;
use crate::keys::{
    display_prefix, is_image_file, is_marker_key, normalize_prefix, pair_paths, PrefixPair,
    THUMB_SEGMENT,
};
use crate::store::{any_key, ObjectStat, ObjectStore, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageItem {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub preview_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    NoFolder,
    /// The display prefix holds no images.
    Empty,
    /// No thumbnails, but the paired original prefix holds images.
    Unthumbed { originals: usize },
    Items,
    /// Listing failed; the pane shows a placeholder.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentView {
    pub folder: String,
    pub display_prefix: String,
    pub items: Vec<ImageItem>,
    pub mode: DisplayMode,
}

impl ContentView {
    pub fn no_folder() -> Self {
        Self {
            folder: String::new(),
            display_prefix: String::new(),
            items: Vec::new(),
            mode: DisplayMode::NoFolder,
        }
    }

    pub fn failed(folder: &str, message: impl Into<String>) -> Self {
        let folder = normalize_prefix(folder);
        Self {
            display_prefix: if folder.is_empty() {
                String::new()
            } else {
                display_prefix(&folder)
            },
            folder,
            items: Vec::new(),
            mode: DisplayMode::Failed(message.into()),
        }
    }

    pub fn pair(&self) -> PrefixPair {
        pair_paths(&self.display_prefix)
    }

    pub fn item(&self, name: &str) -> Option<&ImageItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }

    /// Orders by modification time; equal times fall back to the name so a
    /// reload renders identically.
    pub fn sort(&mut self, order: SortOrder) {
        self.items.sort_by(|a, b| {
            let by_time = match order {
                SortOrder::Ascending => a.modified.cmp(&b.modified),
                SortOrder::Descending => b.modified.cmp(&a.modified),
            };
            by_time.then_with(|| a.name.cmp(&b.name))
        });
    }

    pub fn render(&self, show_dates: bool) -> String {
        let mut out = String::new();
        match &self.mode {
            DisplayMode::NoFolder => out.push_str("(select a folder)\n"),
            DisplayMode::Empty => {
                let _ = writeln!(out, "{}\n(no thumbnails)", self.display_prefix);
            }
            DisplayMode::Unthumbed { originals } => {
                let _ = writeln!(
                    out,
                    "{}\n(no thumbnails; {originals} original(s) without thumbnails)",
                    self.display_prefix
                );
            }
            DisplayMode::Failed(message) => {
                let _ = writeln!(out, "{}\n(listing failed: {message})", self.display_prefix);
            }
            DisplayMode::Items => {
                let _ = writeln!(out, "{} ({} images)", self.display_prefix, self.items.len());
                for item in &self.items {
                    if show_dates {
                        let _ = writeln!(
                            out,
                            "{}  {}  {}",
                            item.modified.format("%Y-%m-%d %H:%M:%S"),
                            item.name,
                            item.preview_url
                        );
                    } else {
                        let _ = writeln!(out, "{}  {}", item.name, item.preview_url);
                    }
                }
            }
        }
        out
    }
}

pub async fn load_content(
    store: &dyn ObjectStore,
    config: &ConnectionConfig,
    bucket: &str,
    folder_path: &str,
    order: SortOrder,
) -> Result<ContentView, StoreError> {
    if folder_path.is_empty() {
        return Ok(ContentView::no_folder());
    }
    let folder = normalize_prefix(folder_path);
    let prefix = display_prefix(&folder);

    let has_thumbs = any_key(store, bucket, &prefix, false, |entry| {
        !is_marker_key(&entry.key)
    })
    .await?;

    if !has_thumbs {
        let pair = pair_paths(&prefix);
        let mode = if prefix == pair.thumb {
            match count_images(store, bucket, &pair.original).await? {
                0 => DisplayMode::Empty,
                originals => DisplayMode::Unthumbed { originals },
            }
        } else {
            DisplayMode::Empty
        };
        tracing::debug!(bucket, prefix = %prefix, ?mode, "no thumbnails");
        return Ok(ContentView {
            folder,
            display_prefix: prefix,
            items: Vec::new(),
            mode,
        });
    }

    let mut by_name: BTreeMap<String, ImageItem> = BTreeMap::new();
    let mut listed = 0usize;
    let mut stream = store.list_objects(bucket, &prefix, false);
    while let Some(entry) = stream.try_next().await? {
        listed += 1;
        if is_marker_key(&entry.key) {
            continue;
        }
        let Some(name) = entry.key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if name.is_empty() || name.contains('/') || !is_image_file(name) {
            continue;
        }
        by_name.insert(
            name.to_string(),
            ImageItem {
                name: name.to_string(),
                modified: entry.last_modified,
                preview_url: config.object_url(bucket, &entry.key),
            },
        );
    }

    let items: Vec<ImageItem> = by_name.into_values().collect();
    tracing::debug!(bucket, prefix = %prefix, listed, kept = items.len(), "loaded content");

    let mut view = ContentView {
        folder,
        display_prefix: prefix,
        mode: if items.is_empty() {
            DisplayMode::Empty
        } else {
            DisplayMode::Items
        },
        items,
    };
    view.sort(order);
    Ok(view)
}

async fn count_images(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> Result<usize, StoreError> {
    let mut count = 0;
    let mut stream = store.list_objects(bucket, prefix, false);
    while let Some(entry) = stream.try_next().await? {
        let name = &entry.key[prefix.len().min(entry.key.len())..];
        if !name.contains('/') && is_image_file(name) {
            count += 1;
        }
    }
    Ok(count)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewInfo {
    pub name: String,
    pub thumb_key: String,
    pub original_key: String,
    pub thumb_url: String,
    pub original_url: String,
    pub thumb: Option<ObjectStat>,
    pub original: Option<ObjectStat>,
}

impl PreviewInfo {
    /// Upload time shown in the dialog comes from the original.
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        self.original.as_ref().map(|stat| stat.last_modified)
    }

    pub fn render(&self) -> String {
        fn size(stat: &Option<ObjectStat>) -> String {
            stat.as_ref()
                .map(|s| format!("{:.1} KB", s.size as f64 / 1024.0))
                .unwrap_or_else(|| "unavailable".to_string())
        }
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.name);
        if let Some(time) = self.uploaded_at() {
            let _ = writeln!(out, "uploaded: {}", time.format("%Y-%m-%d %H:%M:%S"));
        }
        let _ = writeln!(out, "{}: {}  {}", THUMB_SEGMENT, size(&self.thumb), self.thumb_url);
        let _ = writeln!(out, "original: {}  {}", size(&self.original), self.original_url);
        out
    }
}

pub async fn preview(
    store: &dyn ObjectStore,
    config: &ConnectionConfig,
    bucket: &str,
    active_prefix: &str,
    name: &str,
) -> PreviewInfo {
    let pair = pair_paths(active_prefix);
    let thumb_key = pair.thumb_key(name);
    let original_key = pair.original_key(name);

    let (thumb, original) = tokio::join!(
        store.stat_object(bucket, &thumb_key),
        store.stat_object(bucket, &original_key)
    );
    let thumb = thumb
        .map_err(|err| tracing::warn!(%err, "thumbnail stat failed"))
        .ok();
    let original = original
        .map_err(|err| tracing::warn!(%err, "original stat failed"))
        .ok();

    PreviewInfo {
        name: name.to_string(),
        thumb_url: config.object_url(bucket, &thumb_key),
        original_url: config.object_url(bucket, &original_key),
        thumb_key,
        original_key,
        thumb,
        original,
    }
}
