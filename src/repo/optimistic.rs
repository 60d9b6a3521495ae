//! Optimistic local state with rollback on a failed write.

use std::future::Future;

use super::models::SiteSetting;
use super::Repository;
use crate::error::Result;

/// A locally held value that changes before its remote write completes and
/// snaps back if that write fails.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticToggle<T> {
    value: T,
}

impl<T: Clone> OptimisticToggle<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Show `next` immediately, then send it. The prior value is restored
    /// when `send` fails.
    pub async fn apply<F, Fut, E>(&mut self, next: T, send: F) -> std::result::Result<T, E>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let previous = std::mem::replace(&mut self.value, next.clone());
        match send(next.clone()).await {
            Ok(()) => Ok(next),
            Err(e) => {
                self.value = previous;
                Err(e)
            }
        }
    }
}

impl OptimisticToggle<bool> {
    pub fn next(current: bool) -> bool {
        !current
    }

    pub async fn toggle<F, Fut, E>(&mut self, send: F) -> std::result::Result<bool, E>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let next = Self::next(self.value);
        self.apply(next, send).await
    }
}

/// The site-wide "taking new projects" switch.
pub struct AvailabilityToggle {
    settings: Repository<SiteSetting>,
    state: OptimisticToggle<bool>,
}

impl AvailabilityToggle {
    pub async fn load(settings: Repository<SiteSetting>) -> Self {
        let current = settings.availability().await;
        Self {
            settings,
            state: OptimisticToggle::new(current),
        }
    }

    pub fn is_available(&self) -> bool {
        *self.state.value()
    }

    /// Flip and persist. On failure the switch keeps its prior value.
    pub async fn toggle(&mut self) -> Result<bool> {
        let settings = self.settings.clone();
        self.state
            .toggle(|next| async move { settings.set_availability(next).await.map(|_| ()) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn next_negates() {
        assert!(!OptimisticToggle::<bool>::next(true));
        assert!(OptimisticToggle::<bool>::next(false));
    }

    #[tokio::test]
    async fn successful_write_keeps_new_value() {
        let mut toggle = OptimisticToggle::new(false);
        let result: std::result::Result<bool, String> = toggle.toggle(|_| async { Ok(()) }).await;
        assert_eq!(result, Ok(true));
        assert!(*toggle.value());
    }

    #[tokio::test]
    async fn failed_write_restores_prior_value() {
        let mut toggle = OptimisticToggle::new("draft".to_string());
        let result = toggle
            .apply("published".to_string(), |_| async { Err("offline") })
            .await;
        assert_eq!(result, Err("offline"));
        assert_eq!(toggle.value(), "draft");
    }

    #[tokio::test]
    async fn availability_toggle_persists_and_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let settings = Repository::<SiteSetting>::new(store.clone(), Duration::from_secs(5));

        let mut switch = AvailabilityToggle::load(settings.clone()).await;
        assert!(switch.is_available());

        assert!(!switch.toggle().await.unwrap());
        assert!(!settings.availability().await);

        store.set_fail_writes(true);
        assert!(switch.toggle().await.is_err());
        assert!(!switch.is_available());
        store.set_fail_writes(false);
        assert!(!settings.availability().await);
    }
}
