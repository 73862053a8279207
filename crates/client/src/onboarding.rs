//! Onboarding flag store.
//!
//! Remembers whether this device has been through the introductory flow. The
//! flag is keyed by device, not by account: signing in as someone else does
//! not show onboarding again.
//!
//! Storage failures never surface to the caller. A failed read means "not
//! completed" so onboarding is shown rather than skipped; a failed write is
//! logged and only the in-memory value changes.

use tokio::sync::watch;

use crate::storage::KeyValueStorage;

/// Storage key for the completion marker.
pub const ONBOARDING_KEY: &str = "nutrifit_onboarding_completed";

const COMPLETED: &str = "true";

/// Persisted "has completed onboarding" flag with change notifications.
pub struct OnboardingStore<S> {
    storage: S,
    state: watch::Sender<bool>,
}

impl<S: KeyValueStorage> OnboardingStore<S> {
    /// Read the persisted flag and build the store.
    pub async fn load(storage: S) -> Self {
        let completed = match storage.get(ONBOARDING_KEY).await {
            Ok(value) => value.as_deref().map(str::trim) == Some(COMPLETED),
            Err(e) => {
                tracing::warn!(error = %e, "Onboarding flag unreadable, treating as not completed");
                false
            }
        };
        tracing::debug!(completed, "Onboarding flag loaded");

        let (state, _) = watch::channel(completed);
        Self { storage, state }
    }

    /// Whether onboarding has been completed on this device.
    #[must_use]
    pub fn get(&self) -> bool {
        *self.state.borrow()
    }

    /// Mark onboarding as completed.
    pub async fn complete(&self) {
        if let Err(e) = self.storage.set(ONBOARDING_KEY, COMPLETED).await {
            tracing::warn!(error = %e, "Failed to persist onboarding completion");
        }
        self.state.send_replace(true);
    }

    /// Forget completion so onboarding is shown again.
    pub async fn reset(&self) {
        if let Err(e) = self.storage.remove(ONBOARDING_KEY).await {
            tracing::warn!(error = %e, "Failed to clear onboarding flag");
        }
        self.state.send_replace(false);
    }

    /// Receiver that observes every change to the flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;

    use super::*;
    use crate::storage::{MemoryStorage, StorageError};

    /// Storage whose every operation fails.
    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        fn get(
            &self,
            _key: &str,
        ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send {
            async { Err(std::io::Error::other("disk gone").into()) }
        }

        fn set(&self, _key: &str, _value: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
            async { Err(std::io::Error::other("disk gone").into()) }
        }

        fn remove(&self, _key: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
            async { Err(std::io::Error::other("disk gone").into()) }
        }
    }

    #[tokio::test]
    async fn test_absent_marker_means_not_completed() {
        let store = OnboardingStore::load(MemoryStorage::new()).await;
        assert!(!store.get());
    }

    #[tokio::test]
    async fn test_complete_persists_across_loads() {
        let storage = MemoryStorage::new();
        let store = OnboardingStore::load(storage.clone()).await;
        store.complete().await;
        assert!(store.get());

        let reloaded = OnboardingStore::load(storage.clone()).await;
        assert!(reloaded.get());
        assert_eq!(
            storage.get(ONBOARDING_KEY).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_reset_clears_marker() {
        let storage = MemoryStorage::new();
        storage.set(ONBOARDING_KEY, "true").await.unwrap();

        let store = OnboardingStore::load(storage.clone()).await;
        assert!(store.get());

        store.reset().await;
        assert!(!store.get());
        assert_eq!(storage.get(ONBOARDING_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unexpected_marker_value_is_not_completed() {
        let storage = MemoryStorage::new();
        storage.set(ONBOARDING_KEY, "yes").await.unwrap();
        assert!(!OnboardingStore::load(storage).await.get());
    }

    #[tokio::test]
    async fn test_broken_storage_degrades_silently() {
        let store = OnboardingStore::load(BrokenStorage).await;
        assert!(!store.get());

        // The write fails but the running process still sees completion
        store.complete().await;
        assert!(store.get());

        store.reset().await;
        assert!(!store.get());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = OnboardingStore::load(MemoryStorage::new()).await;
        let mut rx = store.subscribe();

        store.complete().await;
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
