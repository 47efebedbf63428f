//! Shared, observable owner of the current tree
//!
//! Writers go through [`VfsStore::update`], which builds the next snapshot
//! and publishes it only when the mutation succeeds. Readers either take a
//! cheap snapshot or subscribe to change notifications.

use super::tree::Vfs;
use crate::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// Single owner of the live [`Vfs`]
#[derive(Debug, Clone)]
pub struct VfsStore {
    tx: Arc<watch::Sender<Arc<Vfs>>>,
}

impl Default for VfsStore {
    fn default() -> Self {
        Self::new(Vfs::new())
    }
}

impl VfsStore {
    pub fn new(initial: Vfs) -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(Arc::new(initial))),
        }
    }

    /// Current immutable snapshot
    pub fn snapshot(&self) -> Arc<Vfs> {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every successful mutation
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vfs>> {
        self.tx.subscribe()
    }

    /// Apply `f` to a copy of the current tree and publish it if `f` succeeds.
    ///
    /// A failed mutation leaves the published tree untouched.
    pub fn update<T>(&self, f: impl FnOnce(&mut Vfs) -> Result<T>) -> Result<T> {
        let mut outcome = None;
        self.tx.send_if_modified(|current| {
            let mut next = Vfs::clone(current);
            match f(&mut next) {
                Ok(value) => {
                    *current = Arc::new(next);
                    outcome = Some(Ok(value));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            }
        });
        outcome.unwrap_or_else(|| Err(crate::Error::Internal("vfs update did not run".into())))
    }

    /// Replace the whole tree (workspace load, version-control checkout)
    pub fn replace(&self, vfs: Vfs) {
        self.tx.send_replace(Arc::new(vfs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::FsNode;

    #[test]
    fn test_failed_update_keeps_snapshot() {
        let store = VfsStore::default();
        store.update(|v| v.add("/", FsNode::file("a.py", "1"))).unwrap();
        let before = store.snapshot();

        let err = store.update(|v| {
            v.add("/", FsNode::file("b.py", ""))?;
            v.add("/", FsNode::file("a.py", ""))
        });
        assert!(err.is_err());
        assert!(store.snapshot().find("/b.py").is_none());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = VfsStore::default();
        let mut rx = store.subscribe();
        let held = store.snapshot();

        store.update(|v| v.add("/", FsNode::folder("src", vec![]))).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().find("/src").is_some());
        assert!(held.find("/src").is_none());
    }
}
