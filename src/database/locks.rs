// ABOUTME: Keyed async mutex registry serialising writes per conversation
// ABOUTME: Entries are created on demand and pruned once no task holds or awaits them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per conversation id
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    /// Enter the critical section of `conversation_id`
    pub async fn lock(&self, conversation_id: &str) -> ConversationGuard {
        let mutex = {
            let entry = self
                .inner
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        let guard = mutex.lock_owned().await;
        ConversationGuard {
            guard: Some(guard),
            locks: self.clone(),
            conversation_id: conversation_id.to_owned(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn prune(&self, conversation_id: &str) {
        // The map's own Arc is the only one left once nobody holds or waits
        self.inner
            .remove_if(conversation_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Held for the duration of a per-conversation critical section
pub struct ConversationGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: ConversationLocks,
    conversation_id: String,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_pruned_after_release() {
        let locks = ConversationLocks::default();
        {
            let _guard = locks.lock("c1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive_other_keys_are_not() {
        let locks = ConversationLocks::default();
        let held = locks.lock("c1").await;

        // A different conversation is not blocked
        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock("c2")).await;
        assert!(other.is_ok());
        drop(other);

        // The same conversation waits until release
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("c1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        drop(held);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }
}
