//! Storage-version migration of persisted reservations
//!
//! Every stored reservation is rewritten once so the store persists it in
//! the current storage version. Progress is recorded in a `migrationStatus`
//! flag: unset means never run, `IN_PROGRESS` means a run started (and may
//! have died), `FINISHED` means nothing is left to do. Rewrites are
//! idempotent, so an interrupted run is simply repeated.

use crate::models::ApplicationKey;
use crate::observability::EventLogger;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub const MIGRATION_STATUS_ANNOTATION: &str = "migrationStatus";

/// Storage version every reservation is rewritten to
pub const CURRENT_STORAGE_VERSION: &str = "v1beta2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    InProgress,
    Finished,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::InProgress => "IN_PROGRESS",
            MigrationStatus::Finished => "FINISHED",
        }
    }
}

/// Store operations the migration needs
#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn migration_status(&self) -> StoreResult<Option<MigrationStatus>>;

    async fn set_migration_status(&self, status: MigrationStatus) -> StoreResult<()>;

    async fn list_keys(&self) -> StoreResult<Vec<ApplicationKey>>;

    /// Rewrite a reservation unchanged, persisting it in the current version
    async fn rewrite(&self, key: &ApplicationKey) -> StoreResult<()>;
}

pub struct ReservationMigrator {
    store: Arc<dyn MigrationStore>,
    retry: RetryPolicy,
    events: EventLogger,
}

impl ReservationMigrator {
    pub fn new(store: Arc<dyn MigrationStore>, retry: RetryPolicy, events: EventLogger) -> Self {
        Self {
            store,
            retry,
            events,
        }
    }

    /// Run the migration in the background
    ///
    /// Failures are logged and never stop the extender; the next start
    /// retries the migration.
    pub fn run_migration(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.maybe_run_migration().await {
                error!(error = %e, "Reservation storage migration failed");
                self.events
                    .log_migration(MigrationStatus::InProgress.as_str(), 0, false);
            }
        })
    }

    /// Migrate unless a previous run finished; returns the number of
    /// reservations rewritten
    pub async fn maybe_run_migration(&self) -> StoreResult<usize> {
        if self.store.migration_status().await? == Some(MigrationStatus::Finished) {
            debug!("Reservation storage migration already finished");
            return Ok(0);
        }

        let keys = self.store.list_keys().await?;
        self.mark_started().await?;

        for key in &keys {
            retry_with_backoff(self.retry, "rewrite reservation", || self.store.rewrite(key))
                .await?;
        }

        retry_with_backoff(self.retry, "finish migration", || {
            self.store.set_migration_status(MigrationStatus::Finished)
        })
        .await?;
        self.events
            .log_migration(MigrationStatus::Finished.as_str(), keys.len(), true);
        Ok(keys.len())
    }

    /// Set `IN_PROGRESS`, but only if no status was recorded yet
    async fn mark_started(&self) -> StoreResult<()> {
        retry_with_backoff(self.retry, "start migration", || async move {
            if self.store.migration_status().await?.is_none() {
                self.store
                    .set_migration_status(MigrationStatus::InProgress)
                    .await?;
                self.events
                    .log_migration(MigrationStatus::InProgress.as_str(), 0, true);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resources;
    use crate::store::{InMemoryStore, StoreError};
    use crate::testing::reservation;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn migrator(store: Arc<dyn MigrationStore>) -> ReservationMigrator {
        ReservationMigrator::new(store, RetryPolicy::immediate(3), EventLogger::new("test"))
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for app in ["app-a", "app-b"] {
            store.insert_with_storage_version(
                reservation(
                    "spark",
                    app,
                    ("n1", Resources::new(1000, 100)),
                    &[("n2", Resources::new(500, 50))],
                ),
                "v1beta1",
            );
        }
        store
    }

    #[tokio::test]
    async fn test_migration_rewrites_every_reservation() {
        let store = seeded_store();
        let migrated = migrator(store.clone()).maybe_run_migration().await.unwrap();

        assert_eq!(migrated, 2);
        for app in ["app-a", "app-b"] {
            let key = ApplicationKey::new("spark", app);
            assert_eq!(
                store.storage_version(&key).as_deref(),
                Some(CURRENT_STORAGE_VERSION)
            );
        }
        assert_eq!(
            store.migration_status().await.unwrap(),
            Some(MigrationStatus::Finished)
        );
    }

    #[tokio::test]
    async fn test_finished_migration_is_not_repeated() {
        let store = seeded_store();
        let migrator = migrator(store.clone());
        migrator.maybe_run_migration().await.unwrap();

        let key = ApplicationKey::new("spark", "app-a");
        let version = store.resource_version(&key);
        assert_eq!(migrator.maybe_run_migration().await.unwrap(), 0);
        assert_eq!(store.resource_version(&key), version);
    }

    #[tokio::test]
    async fn test_interrupted_migration_runs_again() {
        let store = seeded_store();
        store
            .set_migration_status(MigrationStatus::InProgress)
            .await
            .unwrap();

        assert_eq!(migrator(store.clone()).maybe_run_migration().await.unwrap(), 2);
        assert_eq!(
            store.migration_status().await.unwrap(),
            Some(MigrationStatus::Finished)
        );
    }

    /// Fails the first rewrite of every record with a transient error
    struct FlakyStore {
        inner: Arc<InMemoryStore>,
        failures: AtomicU32,
    }

    #[async_trait]
    impl MigrationStore for FlakyStore {
        async fn migration_status(&self) -> StoreResult<Option<MigrationStatus>> {
            self.inner.migration_status().await
        }

        async fn set_migration_status(&self, status: MigrationStatus) -> StoreResult<()> {
            self.inner.set_migration_status(status).await
        }

        async fn list_keys(&self) -> StoreResult<Vec<ApplicationKey>> {
            self.inner.list_keys().await
        }

        async fn rewrite(&self, key: &ApplicationKey) -> StoreResult<()> {
            if self.failures.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Err(StoreError::Unavailable("conflict".to_string()));
            }
            self.inner.rewrite(key).await
        }
    }

    #[tokio::test]
    async fn test_transient_rewrite_failures_are_retried() {
        let inner = seeded_store();
        let store = Arc::new(FlakyStore {
            inner: inner.clone(),
            failures: AtomicU32::new(0),
        });

        assert_eq!(migrator(store).maybe_run_migration().await.unwrap(), 2);
        assert_eq!(
            inner.migration_status().await.unwrap(),
            Some(MigrationStatus::Finished)
        );
    }

    #[tokio::test]
    async fn test_background_run_leaves_status_unfinished_on_failure() {
        struct Down;

        #[async_trait]
        impl MigrationStore for Down {
            async fn migration_status(&self) -> StoreResult<Option<MigrationStatus>> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn set_migration_status(&self, _: MigrationStatus) -> StoreResult<()> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn list_keys(&self) -> StoreResult<Vec<ApplicationKey>> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn rewrite(&self, _: &ApplicationKey) -> StoreResult<()> {
                Err(StoreError::Unavailable("down".to_string()))
            }
        }

        let migrator = Arc::new(migrator(Arc::new(Down)));
        migrator.run_migration().await.unwrap();
    }
}
