//! Picking files from disk and writing them as original/thumb pairs.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::keys::{is_image_file, mime_type_for, pair_paths};
use crate::store::ObjectStore;
use crate::thumbnail::{make_thumbnail, THUMBNAIL_CONTENT_TYPE};

/// A file chosen for upload. `relative_path` records where it sat inside a
/// picked directory; uploads always land by `file_name` alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub relative_path: String,
}

fn normalize_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn picked(path: &Path, relative: &Path) -> Option<PickedFile> {
    let file_name = path.file_name()?.to_str()?.to_string();
    if !is_image_file(&file_name) {
        return None;
    }
    Some(PickedFile {
        path: path.to_path_buf(),
        file_name,
        relative_path: normalize_slashes(relative),
    })
}

/// Expands picked paths into a flat list of image files. Directories are
/// walked depth-first in name order; non-image files are dropped.
pub fn collect_upload_files(paths: &[PathBuf]) -> Vec<PickedFile> {
    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            if let Some(name) = root.file_name() {
                files.extend(picked(root, Path::new(name)));
            }
            continue;
        }

        let base = root.parent().unwrap_or(root);
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(%err, "skipping unreadable entry");
                    None
                }
            })
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(base) else {
                continue;
            };
            files.extend(picked(entry.path(), relative));
        }
    }
    files
}

/// [`collect_upload_files`] off the async runtime. Resolves only after every
/// directory has been fully read.
pub async fn pick_files(paths: Vec<PathBuf>) -> Result<Vec<PickedFile>> {
    tokio::task::spawn_blocking(move || collect_upload_files(&paths))
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub done: usize,
    pub succeeded: usize,
    pub total: usize,
    pub file_name: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<(String, String)>,
}

impl UploadReport {
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!("uploaded {} / {} image(s)", self.succeeded, self.total)
        } else {
            format!(
                "uploaded {} / {} image(s), {} failed",
                self.succeeded,
                self.total,
                self.failures.len()
            )
        }
    }
}

async fn upload_one(
    store: &dyn ObjectStore,
    bucket: &str,
    original_key: &str,
    thumb_key: &str,
    file: &PickedFile,
) -> Result<()> {
    let bytes = Bytes::from(tokio::fs::read(&file.path).await?);

    store
        .put_object(bucket, original_key, bytes.clone(), mime_type_for(&file.file_name))
        .await?;

    let thumb = tokio::task::spawn_blocking(move || make_thumbnail(&bytes))
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))??;

    store
        .put_object(bucket, thumb_key, Bytes::from(thumb), THUMBNAIL_CONTENT_TYPE)
        .await?;
    Ok(())
}

/// Uploads each file in turn to the original prefix paired with
/// `active_prefix`, followed by its thumbnail. A failed file is recorded and
/// the batch moves on.
pub async fn upload_batch(
    store: &dyn ObjectStore,
    bucket: &str,
    active_prefix: &str,
    files: &[PickedFile],
    mut on_progress: impl FnMut(&UploadProgress),
) -> UploadReport {
    let pair = pair_paths(active_prefix);
    let mut report = UploadReport {
        total: files.len(),
        ..UploadReport::default()
    };

    for (index, file) in files.iter().enumerate() {
        let original_key = pair.original_key(&file.file_name);
        let thumb_key = pair.thumb_key(&file.file_name);

        let error = match upload_one(store, bucket, &original_key, &thumb_key, file).await {
            Ok(()) => {
                report.succeeded += 1;
                tracing::debug!(bucket, key = %original_key, "uploaded");
                None
            }
            Err(err) => {
                tracing::warn!(bucket, file = %file.path.display(), %err, "upload failed");
                report.failures.push((file.file_name.clone(), err.to_string()));
                Some(err.to_string())
            }
        };

        on_progress(&UploadProgress {
            done: index + 1,
            succeeded: report.succeeded,
            total: report.total,
            file_name: file.file_name.clone(),
            error,
        });
    }

    tracing::info!(
        bucket,
        prefix = %pair.original,
        succeeded = report.succeeded,
        total = report.total,
        "upload batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use image::{GenericImageView, ImageFormat, RgbImage};
    use std::fs;

    fn write_png(path: &Path, width: u32, height: u32) {
        image::DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn directories_expand_depth_first_to_images_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("drop");
        fs::create_dir_all(root.join("b_sub")).unwrap();
        fs::write(root.join("a.jpg"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("b_sub").join("c.PNG"), b"x").unwrap();
        fs::write(root.join("d.webp"), b"x").unwrap();

        let files = collect_upload_files(&[root]);
        let relative: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(relative, vec!["drop/a.jpg", "drop/b_sub/c.PNG", "drop/d.webp"]);
        assert_eq!(files[1].file_name, "c.PNG");
    }

    #[tokio::test]
    async fn single_files_are_kept_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("p.png");
        fs::write(&file, b"x").unwrap();
        let files = pick_files(vec![file.clone(), dir.path().join("missing.jpg")])
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, file);
        assert_eq!(files[0].relative_path, "p.png");
    }

    #[tokio::test]
    async fn upload_writes_original_and_bounded_thumb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        write_png(&path, 1600, 900);
        let store = MemoryStore::new().with_bucket("b");
        let files = collect_upload_files(&[path.clone()]);

        let mut seen = Vec::new();
        let report = upload_batch(&store, "b", "f/original/", &files, |p| seen.push(p.clone())).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.failures.is_empty());

        let original = store.object("b", "f/original/p.png").unwrap();
        assert_eq!(original.body, fs::read(&path).unwrap());
        assert_eq!(original.content_type, "image/png");

        let thumb = store.object("b", "f/thumb/p.png").unwrap();
        assert_eq!(thumb.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&thumb.body).unwrap();
        assert_eq!(decoded.dimensions(), (480, 270));

        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].done, seen[0].succeeded, seen[0].total), (1, 1, 1));
    }

    #[tokio::test]
    async fn one_bad_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.png");
        let broken = dir.path().join("b.jpg");
        let rejected = dir.path().join("c.png");
        write_png(&good, 10, 10);
        fs::write(&broken, b"not really a jpeg").unwrap();
        write_png(&rejected, 10, 10);

        let store = MemoryStore::new().with_bucket("b");
        store.fail_puts_containing("c.png");
        let files = collect_upload_files(&[good, broken, rejected]);

        let mut counters = Vec::new();
        let report = upload_batch(&store, "b", "f/", &files, |p| {
            counters.push((p.done, p.succeeded, p.error.is_some()))
        })
        .await;

        assert_eq!(counters, vec![(1, 1, false), (2, 1, true), (3, 1, true)]);
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["b.jpg", "c.png"]);
        assert!(store.object("b", "f/thumb/a.png").is_some());
        assert!(store.object("b", "f/thumb/b.jpg").is_none());
        assert_eq!(report.summary(), "uploaded 1 / 3 image(s), 2 failed");
    }
}
