use crate::model::{ResourceIdentity, ResourceObject};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// One change to the remote collection, as delivered by the watch stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub object: ResourceObject,
}

impl WatchEvent {
    pub fn new(kind: EventKind, object: ResourceObject) -> Self {
        Self { kind, object }
    }
}

/// Client-side authoritative copy of one scope's resource collection.
///
/// Entries keep insertion order; sorting is the projection's job. Selector
/// matching is delegated to the backend, so everything the stream delivers is
/// admitted. Every `apply` is total and synchronous; there is no intermediate
/// state observable between it and the next read.
#[derive(Debug, Default)]
pub struct MirrorStore {
    entries: Vec<ResourceObject>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all entries with the snapshot, atomically.
    pub fn reset(&mut self, snapshot: Vec<ResourceObject>) {
        self.entries = snapshot;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Applies one diff event.
    ///
    /// `Added` for a present identity is a no-op, so at-least-once delivery
    /// and replay after a reconnect without reset are tolerated. `Modified`
    /// for an absent identity inserts, healing a missed `Added`. `Deleted`
    /// for an absent identity is a no-op.
    pub fn apply(&mut self, event: WatchEvent) {
        let position = self.position(&event.object.identity);
        match event.kind {
            EventKind::Added => {
                if position.is_none() {
                    self.entries.push(event.object);
                }
            }
            EventKind::Modified => match position {
                Some(index) => self.entries[index] = event.object,
                None => self.entries.push(event.object),
            },
            EventKind::Deleted => {
                if let Some(index) = position {
                    self.entries.remove(index);
                }
            }
        }
    }

    pub fn snapshot(&self) -> &[ResourceObject] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, identity: &ResourceIdentity) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.identity == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::{EventKind, MirrorStore, WatchEvent};
    use crate::model::ResourceObject;
    use serde_json::json;

    fn pod(name: &str, phase: &str) -> ResourceObject {
        ResourceObject::from_payload(
            "pods",
            json!({
                "metadata": {"name": name, "namespace": "default"},
                "status": {"phase": phase}
            }),
        )
        .expect("test pod should parse")
    }

    #[test]
    fn duplicate_added_is_idempotent() {
        let mut mirror = MirrorStore::new();
        mirror.apply(WatchEvent::new(EventKind::Added, pod("p1", "Running")));
        mirror.apply(WatchEvent::new(EventKind::Added, pod("p1", "Pending")));

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.snapshot()[0].status_phase(), Some("Running"));
    }

    #[test]
    fn modified_for_unknown_identity_inserts() {
        let mut added = MirrorStore::new();
        added.apply(WatchEvent::new(EventKind::Added, pod("p1", "Running")));

        let mut modified = MirrorStore::new();
        modified.apply(WatchEvent::new(EventKind::Modified, pod("p1", "Running")));

        assert_eq!(added.snapshot(), modified.snapshot());
    }

    #[test]
    fn modified_replaces_wholesale() {
        let mut mirror = MirrorStore::new();
        mirror.apply(WatchEvent::new(EventKind::Added, pod("p1", "Running")));
        mirror.apply(WatchEvent::new(
            EventKind::Modified,
            pod("p1", "CrashLoopBackOff"),
        ));

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.snapshot()[0].status_phase(), Some("CrashLoopBackOff"));
    }

    #[test]
    fn delete_then_anything_behaves_as_fresh() {
        let mut mirror = MirrorStore::new();
        mirror.apply(WatchEvent::new(EventKind::Added, pod("p1", "Running")));
        mirror.apply(WatchEvent::new(EventKind::Deleted, pod("p1", "Running")));
        assert!(mirror.is_empty());

        mirror.apply(WatchEvent::new(EventKind::Deleted, pod("p1", "Running")));
        assert!(mirror.is_empty());

        mirror.apply(WatchEvent::new(EventKind::Added, pod("p1", "Pending")));
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.snapshot()[0].status_phase(), Some("Pending"));
    }

    #[test]
    fn reset_replaces_all_entries() {
        let mut mirror = MirrorStore::new();
        mirror.apply(WatchEvent::new(EventKind::Added, pod("old", "Running")));
        mirror.reset(vec![pod("a", "Running"), pod("b", "Pending")]);

        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.snapshot()[0].name(), "a");
        assert_eq!(mirror.snapshot()[1].name(), "b");
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut mirror = MirrorStore::new();
        mirror.apply(WatchEvent::new(EventKind::Added, pod("z", "Running")));
        mirror.apply(WatchEvent::new(EventKind::Added, pod("a", "Running")));
        mirror.apply(WatchEvent::new(EventKind::Modified, pod("z", "Pending")));

        let names: Vec<&str> = mirror.snapshot().iter().map(|entry| entry.name()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
