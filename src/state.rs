//! The browser's application state.
//!
//! One [`BrowserState`] owns everything a session shows: the folder tree and
//! its expansion, the content view of the active folder, the selection, and
//! the sort order. Operations take `&mut self`, do their I/O, and replace the
//! affected parts wholesale. Content results carry a [`ViewTicket`] so a load
//! that finishes after the user moved on is dropped instead of applied.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::ConnectionConfig;
use crate::content::{load_content, preview, ContentView, DisplayMode, PreviewInfo, SortOrder};
use crate::error::{Error, Result};
use crate::keys::{ancestor_paths, display_prefix, normalize_prefix, pair_paths, parent_path};
use crate::mutation::{self, FolderDeletion};
use crate::navigator::TreeNavigator;
use crate::refresh::{MutationKind, RefreshBus, StorageMutated};
use crate::selection::Selection;
use crate::store::{collect_listing, ObjectStore, StoreError};
use crate::tree::{build_tree, FolderNode};
use crate::upload::{upload_batch, PickedFile, UploadProgress, UploadReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Identifies one content load. Only the newest ticket for the folder that is
/// still active may be applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewTicket {
    generation: u64,
    folder: String,
}

impl ViewTicket {
    pub fn folder(&self) -> &str {
        &self.folder
    }
}

pub struct BrowserState {
    store: Arc<dyn ObjectStore>,
    config: ConnectionConfig,
    bucket: String,
    navigator: TreeNavigator,
    view: ContentView,
    selection: Selection,
    order: SortOrder,
    generation: u64,
    bus: RefreshBus,
    refresh_rx: broadcast::Receiver<StorageMutated>,
    notices: Vec<Notice>,
}

impl BrowserState {
    pub fn new(store: Arc<dyn ObjectStore>, config: ConnectionConfig, bucket: &str) -> Self {
        let bus = RefreshBus::new();
        let refresh_rx = bus.subscribe();
        Self {
            store,
            config,
            bucket: bucket.to_string(),
            navigator: TreeNavigator::new(),
            view: ContentView::no_folder(),
            selection: Selection::new(),
            order: SortOrder::default(),
            generation: 0,
            bus,
            refresh_rx,
            notices: Vec::new(),
        }
    }

    /// Joins an existing refresh bus, so mutations made elsewhere reach
    /// [`BrowserState::pump_refresh`].
    pub fn with_bus(mut self, bus: RefreshBus) -> Self {
        self.refresh_rx = bus.subscribe();
        self.bus = bus;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn navigator(&self) -> &TreeNavigator {
        &self.navigator
    }

    pub fn view(&self) -> &ContentView {
        &self.view
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }

    fn report(&mut self, err: Error) -> Error {
        self.notify(NoticeLevel::Error, err.to_string());
        err
    }

    /// First load after choosing a bucket: the tree, no active folder.
    pub async fn open(&mut self) {
        self.navigate(Vec::new(), "", false).await;
    }

    async fn list_tree(&self) -> std::result::Result<FolderNode, StoreError> {
        let entries = collect_listing(self.store.list_objects(&self.bucket, "", true)).await?;
        tracing::debug!(bucket = %self.bucket, keys = entries.len(), "listed bucket");
        Ok(build_tree(&entries))
    }

    /// Rebuilds the tree with the given expansion and active path, then
    /// reloads the content pane for whatever ends up active. With
    /// `root_fallback`, an empty active path becomes the first root folder.
    async fn navigate(&mut self, expanded: Vec<String>, active: &str, root_fallback: bool) {
        self.drain_refresh();
        match self.list_tree().await {
            Ok(tree) => {
                let active = if active.is_empty() && root_fallback {
                    tree.first_child_path().unwrap_or_default()
                } else {
                    active.to_string()
                };
                self.navigator.replace_tree(tree, expanded, &active);
            }
            Err(err) => {
                tracing::error!(bucket = %self.bucket, %err, "tree listing failed");
                self.navigator.fail(err.to_string());
                self.notify(NoticeLevel::Error, format!("could not load folders: {err}"));
            }
        }
        self.reload_view().await;
    }

    pub async fn refresh(&mut self) {
        let expanded = self.navigator.expanded_paths();
        let active = self.navigator.active_path().to_string();
        self.navigate(expanded, &active, false).await;
    }

    pub async fn activate_folder(&mut self, path: &str) -> &ContentView {
        self.navigator.activate(&normalize_prefix(path));
        self.reload_view().await;
        &self.view
    }

    pub fn toggle_expanded(&mut self, path: &str) -> bool {
        self.navigator.toggle(&normalize_prefix(path))
    }

    pub fn expand_to(&mut self, path: &str) {
        self.navigator.expand_to(&normalize_prefix(path));
    }

    /// Starts a content load for the active folder. Any earlier ticket is
    /// invalidated.
    pub fn begin_view(&mut self) -> ViewTicket {
        self.generation += 1;
        ViewTicket {
            generation: self.generation,
            folder: self.navigator.active_path().to_string(),
        }
    }

    /// The load for `ticket`, detached from `self` so it can run on its own
    /// task.
    pub fn load_view(
        &self,
        ticket: &ViewTicket,
    ) -> impl Future<Output = std::result::Result<ContentView, StoreError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let bucket = self.bucket.clone();
        let folder = ticket.folder.clone();
        let order = self.order;
        async move { load_content(store.as_ref(), &config, &bucket, &folder, order).await }
    }

    /// Installs a finished load. Returns false when the result is stale and
    /// was dropped.
    pub fn apply_view(
        &mut self,
        ticket: ViewTicket,
        result: std::result::Result<ContentView, StoreError>,
    ) -> bool {
        if ticket.generation != self.generation || ticket.folder != self.navigator.active_path() {
            tracing::debug!(folder = %ticket.folder, "discarding stale content result");
            return false;
        }
        let view = match result {
            Ok(view) => view,
            Err(err) => {
                tracing::error!(bucket = %self.bucket, folder = %ticket.folder, %err, "content listing failed");
                self.notify(NoticeLevel::Error, format!("could not load images: {err}"));
                ContentView::failed(&ticket.folder, err.to_string())
            }
        };
        if view.folder != self.view.folder {
            self.selection.clear();
        } else {
            self.selection.retain_visible(view.names());
        }
        self.view = view;
        true
    }

    async fn reload_view(&mut self) -> bool {
        let ticket = self.begin_view();
        let result = self.load_view(&ticket).await;
        self.apply_view(ticket, result)
    }

    pub fn toggle_sort(&mut self) -> SortOrder {
        self.order = self.order.toggled();
        self.view.sort(self.order);
        self.order
    }

    pub fn toggle_item(&mut self, name: &str) -> Result<bool> {
        if self.view.item(name).is_none() {
            return Err(Error::UnknownItem(name.to_string()));
        }
        Ok(self.selection.toggle(name))
    }

    pub fn set_all_selected(&mut self, checked: bool) {
        self.selection.set_all(self.view.names(), checked);
    }

    pub fn all_selected(&self) -> bool {
        self.selection.covers_all(self.view.names())
    }

    pub async fn preview(&self, name: &str) -> Result<PreviewInfo> {
        if self.view.item(name).is_none() {
            return Err(Error::UnknownItem(name.to_string()));
        }
        Ok(preview(
            self.store.as_ref(),
            &self.config,
            &self.bucket,
            &self.view.display_prefix,
            name,
        )
        .await)
    }

    pub async fn delete_selected(&mut self) -> Result<usize> {
        if matches!(self.view.mode, DisplayMode::NoFolder) {
            return Err(self.report(Error::NoActiveFolder));
        }
        let names: Vec<String> = self.selection.names().map(str::to_string).collect();
        let prefix = self.view.display_prefix.clone();

        mutation::delete_images(self.store.as_ref(), &self.bucket, &prefix, &names)
            .await
            .map_err(|err| self.report(err))?;

        self.selection.clear();
        self.bus
            .publish(&self.bucket, &pair_paths(&prefix).base, MutationKind::DeleteImages);
        self.refresh().await;
        self.notify(NoticeLevel::Info, format!("deleted {} image(s)", names.len()));
        Ok(names.len())
    }

    /// Creates `name` under the active folder, expands down to it and opens
    /// it.
    pub async fn create_folder(&mut self, name: &str) -> Result<String> {
        let parent = self.navigator.active_path().to_string();
        let folder = mutation::create_folder(self.store.as_ref(), &self.bucket, &parent, name)
            .await
            .map_err(|err| self.report(err))?;

        self.bus
            .publish(&self.bucket, &folder, MutationKind::CreateFolder);
        let mut expanded = self.navigator.expanded_paths();
        expanded.extend(ancestor_paths(&folder));
        self.navigate(expanded, &folder, false).await;
        self.notify(NoticeLevel::Info, format!("created {folder}"));
        Ok(folder)
    }

    /// Deletes a folder with everything below it and moves to its parent.
    pub async fn delete_folder(&mut self, path: &str) -> Result<FolderDeletion> {
        let folder = normalize_prefix(path);
        let outcome = mutation::delete_folder(self.store.as_ref(), &self.bucket, &folder)
            .await
            .map_err(|err| self.report(err))?;

        match outcome {
            FolderDeletion::AlreadyEmpty => {
                self.notify(NoticeLevel::Info, format!("{folder} is empty, nothing to delete"));
            }
            FolderDeletion::Deleted { keys } => {
                self.bus
                    .publish(&self.bucket, &folder, MutationKind::DeleteFolder);
                let expanded = self.navigator.expanded_paths();
                self.navigate(expanded, &parent_path(&folder), true).await;
                self.notify(NoticeLevel::Info, format!("deleted {folder} ({keys} objects)"));
            }
        }
        Ok(outcome)
    }

    /// Uploads into the active folder's pair. Per-file failures become
    /// notices; the batch always runs to the end and then signals a refresh.
    pub async fn upload(
        &mut self,
        files: &[PickedFile],
        on_progress: impl FnMut(&UploadProgress),
    ) -> Result<UploadReport> {
        let active = self.navigator.active_path().to_string();
        if active.is_empty() {
            return Err(self.report(Error::NoActiveFolder));
        }
        let prefix = display_prefix(&active);
        let report = upload_batch(self.store.as_ref(), &self.bucket, &prefix, files, on_progress).await;

        for (name, reason) in &report.failures {
            self.notify(NoticeLevel::Error, format!("upload failed: {name}: {reason}"));
        }
        self.notify(NoticeLevel::Info, report.summary());

        self.bus
            .publish(&self.bucket, &pair_paths(&prefix).base, MutationKind::Upload);
        self.pump_refresh().await;
        Ok(report)
    }

    /// Drains pending refresh signals. Returns whether the tree and the
    /// content pane are affected.
    fn drain_refresh(&mut self) -> (bool, bool) {
        let mut tree = false;
        let mut content = false;
        loop {
            match self.refresh_rx.try_recv() {
                Ok(event) => {
                    if event.bucket != self.bucket {
                        continue;
                    }
                    tree = true;
                    content |= !self.view.folder.is_empty() && event.touches(&self.bucket, &self.view.folder);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "refresh signals dropped, reloading everything");
                    tree = true;
                    content = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        (tree, content)
    }

    pub async fn pump_refresh(&mut self) -> bool {
        let (tree, content) = self.drain_refresh();
        if !tree {
            return false;
        }
        let expanded = self.navigator.expanded_paths();
        let active = self.navigator.active_path().to_string();
        match self.list_tree().await {
            Ok(rebuilt) => self.navigator.replace_tree(rebuilt, expanded, &active),
            Err(err) => {
                tracing::error!(bucket = %self.bucket, %err, "tree listing failed");
                self.navigator.fail(err.to_string());
            }
        }
        if content || self.navigator.active_path() != self.view.folder {
            self.reload_view().await;
        }
        true
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}  [{}]", self.config.identity(), self.bucket);
        out.push_str(&self.navigator.render());
        out.push('\n');
        out.push_str(&self.view.render(true));
        if !self.selection.is_empty() {
            let _ = writeln!(out, "{} selected", self.selection.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::upload::collect_upload_files;
    use chrono::{DateTime, TimeZone, Utc};
    use image::{ImageFormat, RgbImage};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            end_point: "localhost".to_string(),
            port: 9000,
            use_ssl: false,
            access_key: "admin".to_string(),
            secret_key: "secret".to_string(),
            default_bucket: None,
        }
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = MemoryStore::new().with_bucket("b");
        store.insert_at("b", "a/.keep", b"", at(5));
        store.insert_at("b", "a/b/.keep", b"", at(10));
        store.insert_at("b", "a/b/thumb/x.jpg", b"t", at(11));
        store.insert_at("b", "a/b/original/x.jpg", b"o", at(11));
        store.insert_at("b", "a/b/thumb/y.jpg", b"t", at(12));
        store.insert_at("b", "a/b/original/y.jpg", b"o", at(12));
        store.insert_at("b", "z/.keep", b"", at(20));
        Arc::new(store)
    }

    fn browser(store: &Arc<MemoryStore>) -> BrowserState {
        BrowserState::new(store.clone(), config(), "b")
    }

    #[tokio::test]
    async fn reloading_twice_renders_the_same() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/").await;
        state.activate_folder("a/b/").await;

        state.refresh().await;
        let first = state.render();
        state.refresh().await;
        assert_eq!(state.render(), first);
        assert!(first.contains("x.jpg"));
        assert_eq!(state.navigator().active_path(), "a/b/");
    }

    #[tokio::test]
    async fn stale_results_are_discarded() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;

        state.activate_folder("a/b/").await;
        let slow = state.begin_view();
        let slow_load = tokio::spawn(state.load_view(&slow));

        state.activate_folder("z/").await;
        let late = slow_load.await.unwrap();
        assert!(!state.apply_view(slow, late));
        assert_eq!(state.view().folder, "z/");
        assert_eq!(state.view().mode, DisplayMode::Empty);
    }

    #[tokio::test]
    async fn navigation_clears_selection() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/b/").await;
        assert!(state.toggle_item("x.jpg").unwrap());
        assert!(state.toggle_item("missing.jpg").is_err());
        state.set_all_selected(true);
        assert!(state.all_selected());

        state.activate_folder("z/").await;
        assert!(state.selection().is_empty());
    }

    #[tokio::test]
    async fn sort_toggle_reorders_without_listing() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/b/").await;
        let names = |s: &BrowserState| s.view().names().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(names(&state), vec!["x.jpg", "y.jpg"]);
        assert_eq!(state.toggle_sort(), SortOrder::Descending);
        assert_eq!(names(&state), vec!["y.jpg", "x.jpg"]);
    }

    #[tokio::test]
    async fn deleting_selection_reloads_content() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/b/").await;
        state.toggle_item("x.jpg").unwrap();

        assert_eq!(state.delete_selected().await.unwrap(), 1);
        assert!(state.selection().is_empty());
        assert_eq!(state.view().names().collect::<Vec<_>>(), vec!["y.jpg"]);
        assert!(store.object("b", "a/b/original/x.jpg").is_none());
    }

    #[tokio::test]
    async fn created_folder_becomes_active_and_expanded() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/").await;
        state.activate_folder("a/b/").await;

        let folder = state.create_folder("2024-01").await.unwrap();
        assert_eq!(folder, "a/b/2024-01/");
        assert_eq!(state.navigator().active_path(), "a/b/2024-01/");
        assert!(state.navigator().is_expanded("a/"));
        assert!(state.navigator().is_expanded("a/b/"));
        assert_eq!(state.view().folder, "a/b/2024-01/");
        assert_eq!(state.view().mode, DisplayMode::Empty);

        state.delete_folder(&folder).await.unwrap();
        assert_eq!(state.navigator().active_path(), "a/b/");
        assert!(state.navigator().tree().find(&folder).is_none());
    }

    #[tokio::test]
    async fn existing_folder_is_refused_with_a_notice() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/").await;

        let clash = state.create_folder("b").await;
        assert!(matches!(clash, Err(Error::FolderExists(ref p)) if p == "a/b/"));
        let notices = state.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(state.navigator().active_path(), "a/");
    }

    #[tokio::test]
    async fn deleting_a_top_level_folder_falls_back_to_first_root() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("z/").await;

        let outcome = state.delete_folder("z/").await.unwrap();
        assert_eq!(outcome, FolderDeletion::Deleted { keys: 1 });
        assert_eq!(state.navigator().active_path(), "a/");
        assert!(state.navigator().tree().find("z/").is_none());

        let empty = state.delete_folder("nothing/").await.unwrap();
        assert_eq!(empty, FolderDeletion::AlreadyEmpty);
        assert!(matches!(
            state.delete_folder("").await,
            Err(Error::RootDeletion)
        ));
    }

    #[tokio::test]
    async fn upload_refreshes_the_open_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        image::DynamicImage::ImageRgb8(RgbImage::new(64, 32))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("z/").await;
        assert_eq!(state.view().mode, DisplayMode::Empty);

        let files = collect_upload_files(&[path]);
        let report = state.upload(&files, |_| {}).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(state.view().names().collect::<Vec<_>>(), vec!["p.png"]);
        assert!(store.object("b", "z/original/p.png").is_some());
    }

    #[tokio::test]
    async fn failed_batch_delete_leaves_view_and_selection() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("a/b/").await;
        state.toggle_item("x.jpg").unwrap();
        state.take_notices();
        let view = state.view().clone();
        let selection = state.selection().clone();

        store.fail_removes(true);
        assert!(matches!(state.delete_selected().await, Err(Error::Store(_))));

        let notices = state.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(state.view(), &view);
        assert_eq!(state.selection(), &selection);
    }

    #[tokio::test]
    async fn upload_reports_each_failure_and_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::DynamicImage::ImageRgb8(RgbImage::new(16, 16))
            .save_with_format(&good, ImageFormat::Png)
            .unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"not an image").unwrap();

        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        state.activate_folder("z/").await;
        state.take_notices();

        let files = collect_upload_files(&[good, bad]);
        let report = state.upload(&files, |_| {}).await.unwrap();
        assert_eq!(report.succeeded, 1);

        let notices = state.take_notices();
        let errors: Vec<&Notice> = notices
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("bad.jpg"));
        assert!(notices.iter().any(|n| n.level == NoticeLevel::Info
            && n.message == "uploaded 1 / 2 image(s), 1 failed"));
    }

    #[tokio::test]
    async fn mutations_from_elsewhere_arrive_over_the_bus() {
        let store = seeded();
        let bus = RefreshBus::new();
        let mut state = browser(&store).with_bus(bus.clone());
        state.open().await;
        state.activate_folder("z/").await;
        assert!(!state.pump_refresh().await);

        store.insert_at("b", "z/thumb/new.jpg", b"", at(30));
        store.insert_at("b", "q/.keep", b"", at(40));
        bus.publish("b", "z/", MutationKind::Upload);
        assert!(state.pump_refresh().await);
        assert_eq!(state.view().names().collect::<Vec<_>>(), vec!["new.jpg"]);
        assert!(state.navigator().tree().find("q/").is_some());

        bus.publish("other", "z/", MutationKind::Upload);
        assert!(!state.pump_refresh().await);
    }

    #[tokio::test]
    async fn listing_failure_shows_placeholder() {
        let store = seeded();
        let mut state = browser(&store);
        state.open().await;
        store.fail_listings(true);
        state.activate_folder("a/b/").await;
        assert!(matches!(state.view().mode, DisplayMode::Failed(_)));
        assert_eq!(state.take_notices()[0].level, NoticeLevel::Error);

        state.refresh().await;
        assert!(state.navigator().failure().is_some());
    }
}
