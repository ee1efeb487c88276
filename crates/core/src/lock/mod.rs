//! Distributed lease lock.
//!
//! Cooperative, time-bounded mutual exclusion for a named critical section
//! shared across independently-scheduled instances. Each operation is one
//! atomic remote call that proves ownership by passing the owner id, so
//! there is never a check-then-act window between two instances observing
//! "unlocked" at the same time. The lease bound keeps the fleet live: a
//! crashed holder's lock self-expires.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use uuid::Uuid;

use crate::errors::Result;
use crate::settings::Settings;

/// Storage interface for the lock's three atomic remote operations.
///
/// Implementations must guarantee store-side atomicity (e.g. Postgres
/// functions doing a compare-and-swap on the lock row).
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Install or refresh the lock record iff no other live record exists.
    async fn acquire_lock(&self, name: &str, owner: &str, lease_seconds: i64) -> Result<bool>;

    /// Extend the lease iff `owner` currently holds the live record.
    async fn heartbeat_lock(&self, name: &str, owner: &str, lease_seconds: i64) -> Result<bool>;

    /// Clear the record iff `owner` currently holds it.
    async fn release_lock(&self, name: &str, owner: &str) -> Result<bool>;
}

/// Lease-based distributed lock over a [`LockStore`].
///
/// `acquire` never blocks or retries internally: `Ok(false)` means another
/// instance holds the lease and the caller should simply try again at its
/// next scheduled opportunity.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn LockStore>,
    lock_name: String,
    owner_id: String,
    lease_seconds: i64,
}

impl LeaseLock {
    pub fn new(
        store: Arc<dyn LockStore>,
        lock_name: impl Into<String>,
        owner_id: impl Into<String>,
        lease_seconds: i64,
    ) -> Self {
        Self {
            store,
            lock_name: lock_name.into(),
            owner_id: owner_id.into(),
            lease_seconds,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub async fn acquire(&self) -> Result<bool> {
        let acquired = self
            .store
            .acquire_lock(&self.lock_name, &self.owner_id, self.lease_seconds)
            .await?;
        debug!(
            "acquire {} by {} -> {}",
            self.lock_name, self.owner_id, acquired
        );
        Ok(acquired)
    }

    /// Returns `Ok(false)` when the lease was lost (expired and reclaimed,
    /// or never held).
    pub async fn heartbeat(&self) -> Result<bool> {
        self.store
            .heartbeat_lock(&self.lock_name, &self.owner_id, self.lease_seconds)
            .await
    }

    /// Returns `Ok(false)` when the record already expired or was
    /// reclaimed; that is not an error.
    pub async fn release(&self) -> Result<bool> {
        self.store
            .release_lock(&self.lock_name, &self.owner_id)
            .await
    }
}

/// Build the owner id for this process instance.
///
/// Uses the configured override when present, otherwise
/// `{host}-{pid}-{random}` so concurrent instances on one host stay
/// distinguishable.
pub fn build_owner_id(settings: &Settings) -> String {
    if let Some(instance_id) = &settings.instance_id {
        return instance_id.clone();
    }
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", host, std::process::id(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory lock store with real lease semantics and a controllable
    /// clock, mirroring the store-side functions' contract.
    struct InMemoryLockStore {
        records: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
        now: Mutex<DateTime<Utc>>,
    }

    impl InMemoryLockStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(HashMap::new()),
                now: Mutex::new(Utc::now()),
            })
        }

        fn advance(&self, seconds: i64) {
            *self.now.lock().unwrap() += Duration::seconds(seconds);
        }

        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn expiry_of(&self, name: &str) -> Option<DateTime<Utc>> {
            self.records
                .lock()
                .unwrap()
                .get(name)
                .map(|(_, expiry)| *expiry)
        }
    }

    #[async_trait]
    impl LockStore for InMemoryLockStore {
        async fn acquire_lock(&self, name: &str, owner: &str, lease_seconds: i64) -> Result<bool> {
            let now = self.now();
            let mut records = self.records.lock().unwrap();
            match records.get(name) {
                Some((holder, expiry)) if *expiry > now && holder != owner => Ok(false),
                _ => {
                    records.insert(
                        name.to_string(),
                        (owner.to_string(), now + Duration::seconds(lease_seconds)),
                    );
                    Ok(true)
                }
            }
        }

        async fn heartbeat_lock(
            &self,
            name: &str,
            owner: &str,
            lease_seconds: i64,
        ) -> Result<bool> {
            let now = self.now();
            let mut records = self.records.lock().unwrap();
            match records.get_mut(name) {
                Some((holder, expiry)) if *expiry > now && holder == owner => {
                    *expiry = now + Duration::seconds(lease_seconds);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn release_lock(&self, name: &str, owner: &str) -> Result<bool> {
            let now = self.now();
            let mut records = self.records.lock().unwrap();
            match records.get(name) {
                Some((holder, expiry)) if *expiry > now && holder == owner => {
                    records.remove(name);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    fn lock_for(store: &Arc<InMemoryLockStore>, owner: &str) -> LeaseLock {
        LeaseLock::new(store.clone(), "ingest", owner, 120)
    }

    #[tokio::test]
    async fn test_only_one_of_two_acquires_wins() {
        let store = InMemoryLockStore::new();
        let a = lock_for(&store, "a");
        let b = lock_for(&store, "b");

        assert!(a.acquire().await.unwrap());
        assert!(!b.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_same_owner_reacquire_refreshes_lease() {
        let store = InMemoryLockStore::new();
        let a = lock_for(&store, "a");

        assert!(a.acquire().await.unwrap());
        let first_expiry = store.expiry_of("ingest").unwrap();
        store.advance(30);
        assert!(a.acquire().await.unwrap());
        assert!(store.expiry_of("ingest").unwrap() > first_expiry);
    }

    #[tokio::test]
    async fn test_heartbeat_by_non_holder_fails_and_leaves_record_intact() {
        let store = InMemoryLockStore::new();
        let a = lock_for(&store, "a");
        let b = lock_for(&store, "b");

        assert!(a.acquire().await.unwrap());
        let expiry = store.expiry_of("ingest").unwrap();

        assert!(!b.heartbeat().await.unwrap());
        assert_eq!(store.expiry_of("ingest").unwrap(), expiry);
    }

    #[tokio::test]
    async fn test_release_by_non_holder_fails() {
        let store = InMemoryLockStore::new();
        let a = lock_for(&store, "a");
        let b = lock_for(&store, "b");

        assert!(a.acquire().await.unwrap());
        assert!(!b.release().await.unwrap());
        assert!(!b.acquire().await.unwrap());

        assert!(a.release().await.unwrap());
        assert!(b.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_reclaimed_by_anyone() {
        let store = InMemoryLockStore::new();
        let a = lock_for(&store, "a");
        let b = lock_for(&store, "b");

        assert!(a.acquire().await.unwrap());
        store.advance(121);

        assert!(b.acquire().await.unwrap());
        // The original holder has lost the lease.
        assert!(!a.heartbeat().await.unwrap());
        assert!(!a.release().await.unwrap());
    }

    #[test]
    fn test_owner_id_override_wins() {
        let mut settings = Settings::from_env();
        settings.instance_id = Some("fixed-owner".to_string());
        assert_eq!(build_owner_id(&settings), "fixed-owner");
    }

    #[test]
    fn test_owner_id_is_unique_per_call_without_override() {
        let mut settings = Settings::from_env();
        settings.instance_id = None;
        let first = build_owner_id(&settings);
        let second = build_owner_id(&settings);
        assert_ne!(first, second);
        assert!(first.contains(&std::process::id().to_string()));
    }
}
