use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Upload,
    DeleteImages,
    CreateFolder,
    DeleteFolder,
}

/// "Storage changed under `bucket`/`prefix`." Subscribers decide on their own
/// whether that affects what they show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageMutated {
    pub bucket: String,
    pub prefix: String,
    pub kind: MutationKind,
}

impl StorageMutated {
    /// True when the change touched `path` or something below or above it.
    pub fn touches(&self, bucket: &str, path: &str) -> bool {
        self.bucket == bucket && (path.starts_with(&self.prefix) || self.prefix.starts_with(path))
    }
}

#[derive(Clone, Debug)]
pub struct RefreshBus {
    sender: broadcast::Sender<StorageMutated>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageMutated> {
        self.sender.subscribe()
    }

    pub fn publish(&self, bucket: &str, prefix: &str, kind: MutationKind) {
        let event = StorageMutated {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            kind,
        };
        // no subscribers is fine
        if self.sender.send(event).is_err() {
            tracing::trace!(bucket, prefix, "refresh published with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_mutations() {
        let bus = RefreshBus::new();
        let mut tree = bus.subscribe();
        let mut content = bus.subscribe();
        bus.publish("b", "f/original/", MutationKind::Upload);

        let seen = tree.recv().await.unwrap();
        assert_eq!(seen, content.recv().await.unwrap());
        assert!(seen.touches("b", "f/"));
        assert!(seen.touches("b", "f/original/"));
        assert!(!seen.touches("b", "g/"));
        assert!(!seen.touches("other", "f/"));
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        RefreshBus::new().publish("b", "", MutationKind::DeleteFolder);
    }
}
