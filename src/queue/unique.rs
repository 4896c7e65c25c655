//! FIFO queue that holds at most one entry per id

use crate::models::DownloadRequest;
use crate::utils::error::RelayError;
use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Anything that can be deduplicated by a stable id
pub trait QueueItem {
    type Id: Eq + Hash + Clone + Debug;

    fn queue_id(&self) -> Self::Id;
}

impl QueueItem for DownloadRequest {
    type Id = i64;

    fn queue_id(&self) -> i64 {
        self.id
    }
}

struct Inner<T: QueueItem> {
    items: VecDeque<T>,
    ids: HashSet<T::Id>,
}

/// Ordered, id-unique container.
///
/// The items and the membership index sit behind one lock so they never
/// diverge, whatever the interleaving of callers.
pub struct DedupQueue<T: QueueItem> {
    inner: Mutex<Inner<T>>,
    available: Notify,
}

impl<T: QueueItem> Default for DedupQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: QueueItem> DedupQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                ids: HashSet::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Append to the tail. Returns false (and changes nothing) if the id is already queued.
    pub async fn enqueue(&self, item: T) -> bool {
        let id = item.queue_id();
        let mut inner = self.inner.lock().await;
        if !inner.ids.insert(id.clone()) {
            debug!("Item {:?} is already queued", id);
            return false;
        }
        inner.items.push_back(item);
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Insert at the head. Same duplicate rule as `enqueue`.
    pub async fn push_front(&self, item: T) -> bool {
        let id = item.queue_id();
        let mut inner = self.inner.lock().await;
        if !inner.ids.insert(id.clone()) {
            debug!("Item {:?} is already queued", id);
            return false;
        }
        inner.items.push_front(item);
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Remove the head, waiting until an item is available
    pub async fn dequeue(&self) -> T {
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.pop().await {
                return item;
            }
            notified.await;
        }
    }

    /// Remove the head, failing with `RelayError::QueueEmpty` instead of waiting
    pub async fn try_dequeue(&self) -> Result<T> {
        self.pop().await.ok_or_else(|| RelayError::QueueEmpty.into())
    }

    async fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().await;
        let item = inner.items.pop_front()?;
        inner.ids.remove(&item.queue_id());
        Some(item)
    }

    pub async fn contains(&self, id: &T::Id) -> bool {
        self.inner.lock().await.ids.contains(id)
    }

    /// Remove an arbitrary member, keeping the order of the rest
    pub async fn remove(&self, id: &T::Id) -> Option<T> {
        let mut inner = self.inner.lock().await;
        if !inner.ids.remove(id) {
            return None;
        }
        let pos = inner.items.iter().position(|item| &item.queue_id() == id)?;
        inner.items.remove(pos)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    /// Ids in queue order
    pub async fn ids(&self) -> Vec<T::Id> {
        let inner = self.inner.lock().await;
        inner.items.iter().map(|item| item.queue_id()).collect()
    }
}
