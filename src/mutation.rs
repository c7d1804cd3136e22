//! Writes against the bucket: deleting image pairs, creating and deleting
//! folders.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::keys::{is_reserved_segment, normalize_prefix, pair_paths, MARKER_NAME};
use crate::store::{any_key, collect_listing, ObjectStore};

pub fn pair_keys<'a>(active_prefix: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let pair = pair_paths(active_prefix);
    names
        .into_iter()
        .flat_map(|name| [pair.thumb_key(name), pair.original_key(name)])
        .collect()
}

/// Removes the thumb and original of each name in one batch request.
/// Returns the keys that were requested for removal.
pub async fn delete_images(
    store: &dyn ObjectStore,
    bucket: &str,
    active_prefix: &str,
    names: &[String],
) -> Result<Vec<String>> {
    if names.is_empty() {
        return Err(Error::NothingSelected);
    }
    let keys = pair_keys(active_prefix, names.iter().map(String::as_str));
    store.remove_objects(bucket, &keys).await?;
    tracing::info!(bucket, prefix = active_prefix, images = names.len(), "deleted image pairs");
    Ok(keys)
}

/// Trims and checks a user-entered folder name. Nested names (`a/b`) are
/// allowed; returns the name with surrounding slashes removed.
pub fn validate_folder_name(raw: &str) -> Result<String> {
    let invalid = |reason| Error::InvalidFolderName {
        name: raw.to_string(),
        reason,
    };
    let name = raw.trim().trim_matches('/');
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    for segment in name.split('/') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if is_reserved_segment(segment) {
            return Err(invalid("thumb and original are reserved"));
        }
        if segment == MARKER_NAME {
            return Err(invalid(".keep is reserved"));
        }
    }
    Ok(name.to_string())
}

/// Creates `parent + name/` by writing its `.keep` marker. Fails if anything
/// already lives under that prefix. Returns the new folder path.
pub async fn create_folder(
    store: &dyn ObjectStore,
    bucket: &str,
    parent: &str,
    name: &str,
) -> Result<String> {
    let name = validate_folder_name(name)?;
    let folder = format!("{}{}/", normalize_prefix(parent), name);

    if any_key(store, bucket, &folder, true, |_| true).await? {
        return Err(Error::FolderExists(folder));
    }

    let marker = format!("{folder}{MARKER_NAME}");
    store
        .put_object(bucket, &marker, Bytes::new(), "application/octet-stream")
        .await?;
    tracing::info!(bucket, folder = %folder, "created folder");
    Ok(folder)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderDeletion {
    /// Nothing lived under the prefix; nothing was sent.
    AlreadyEmpty,
    Deleted { keys: usize },
}

pub async fn delete_folder(
    store: &dyn ObjectStore,
    bucket: &str,
    path: &str,
) -> Result<FolderDeletion> {
    let folder = normalize_prefix(path);
    if folder.is_empty() {
        return Err(Error::RootDeletion);
    }

    let keys: Vec<String> = collect_listing(store.list_objects(bucket, &folder, true))
        .await?
        .into_iter()
        .map(|entry| entry.key)
        .collect();

    if keys.is_empty() {
        tracing::info!(bucket, folder = %folder, "folder already empty");
        return Ok(FolderDeletion::AlreadyEmpty);
    }

    store.remove_objects(bucket, &keys).await?;
    tracing::info!(bucket, folder = %folder, keys = keys.len(), "deleted folder");
    Ok(FolderDeletion::Deleted { keys: keys.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::ObjectEntry;
    use crate::tree::build_tree;
    use chrono::{TimeZone, Utc};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new().with_bucket("b");
        let at = |s| Utc.timestamp_opt(s, 0).single().unwrap();
        store.insert_at("b", "f/.keep", b"", at(1));
        store.insert_at("b", "f/thumb/x.jpg", b"t", at(2));
        store.insert_at("b", "f/original/x.jpg", b"o", at(2));
        store.insert_at("b", "f/thumb/y.jpg", b"t", at(3));
        store.insert_at("b", "f/original/y.jpg", b"o", at(3));
        store
    }

    async fn tree_paths(store: &MemoryStore) -> Vec<String> {
        let entries: Vec<ObjectEntry> = collect_listing(store.list_objects("b", "", true))
            .await
            .unwrap();
        build_tree(&entries).folder_paths()
    }

    #[tokio::test]
    async fn deleting_a_name_removes_exactly_its_pair() {
        let store = seeded();
        let keys = delete_images(&store, "b", "f/thumb/", &["x.jpg".to_string()])
            .await
            .unwrap();
        assert_eq!(keys, vec!["f/thumb/x.jpg", "f/original/x.jpg"]);
        assert_eq!(store.remove_calls(), vec![keys]);
        assert!(store.object("b", "f/thumb/y.jpg").is_some());
        assert!(store.object("b", "f/original/x.jpg").is_none());
    }

    #[tokio::test]
    async fn several_names_go_in_one_batch() {
        let store = seeded();
        let names = vec!["x.jpg".to_string(), "y.jpg".to_string()];
        delete_images(&store, "b", "f/", &names).await.unwrap();
        assert_eq!(store.remove_calls().len(), 1);
        assert_eq!(store.remove_calls()[0].len(), 4);
        assert_eq!(store.keys("b"), vec!["f/.keep"]);
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let store = seeded();
        let err = delete_images(&store, "b", "f/thumb/", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NothingSelected));
        assert!(store.remove_calls().is_empty());
    }

    #[test]
    fn folder_names_are_validated() {
        assert_eq!(validate_folder_name("  2024-01 ").unwrap(), "2024-01");
        assert_eq!(validate_folder_name("a/b/").unwrap(), "a/b");
        assert!(validate_folder_name("   ").is_err());
        assert!(validate_folder_name("a//b").is_err());
        assert!(validate_folder_name("thumb").is_err());
        assert!(validate_folder_name("x/original").is_err());
    }

    #[tokio::test]
    async fn create_writes_a_marker() {
        let store = seeded();
        let folder = create_folder(&store, "b", "f/", "2024-01").await.unwrap();
        assert_eq!(folder, "f/2024-01/");
        let marker = store.object("b", "f/2024-01/.keep").unwrap();
        assert!(marker.body.is_empty());
    }

    #[tokio::test]
    async fn create_refuses_existing_prefix() {
        let store = seeded();
        store.insert_at("b", "g/thumb/z.jpg", b"", Utc::now());
        let err = create_folder(&store, "b", "", "g").await.unwrap_err();
        assert!(matches!(err, Error::FolderExists(ref p) if p == "g/"));
        assert!(err.is_user_correctable());
        assert!(store.object("b", "g/.keep").is_none());
    }

    #[tokio::test]
    async fn delete_folder_removes_everything_below() {
        let store = seeded();
        store.insert_at("b", "keep/.keep", b"", Utc::now());
        let outcome = delete_folder(&store, "b", "f/").await.unwrap();
        assert_eq!(outcome, FolderDeletion::Deleted { keys: 5 });
        assert_eq!(store.keys("b"), vec!["keep/.keep"]);
    }

    #[tokio::test]
    async fn delete_of_empty_folder_is_a_no_op() {
        let store = seeded();
        let outcome = delete_folder(&store, "b", "nothing/").await.unwrap();
        assert_eq!(outcome, FolderDeletion::AlreadyEmpty);
        assert!(store.remove_calls().is_empty());
        assert!(matches!(
            delete_folder(&store, "b", "").await,
            Err(Error::RootDeletion)
        ));
    }

    #[tokio::test]
    async fn create_then_delete_restores_the_tree() {
        let store = seeded();
        let before = tree_paths(&store).await;
        let folder = create_folder(&store, "b", "", "2024-01").await.unwrap();
        assert!(tree_paths(&store).await.contains(&folder));
        delete_folder(&store, "b", &folder).await.unwrap();
        assert_eq!(tree_paths(&store).await, before);
    }

    #[tokio::test]
    async fn failed_batch_delete_surfaces_error() {
        let store = seeded();
        store.fail_removes(true);
        let result = delete_images(&store, "b", "f/thumb/", &["x.jpg".to_string()]).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }
}
