//! One-shot import of records that only ever lived on this device.
//!
//! Older builds kept stories in the local table alone. The runner offers each
//! cached story the remote has never confirmed to the remote store, keeping
//! its id and timestamps, and records every id it settled in the migration
//! ledger so later runs skip it. Safe to run any number of times.

use tracing::{debug, info, warn};

use novella_shared::models::Story;
use novella_store::{KvSubstrate, LocalCache};

use crate::connectivity::ConnectivityOracle;
use crate::error::Result;
use crate::remote::{RemoteError, RemoteStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub imported: usize,
    /// Already present remotely; left untouched.
    pub skipped: usize,
    /// Will be retried on the next run.
    pub failed: usize,
}

pub struct MigrationRunner<'a, S> {
    cache: &'a LocalCache<S>,
    remote: &'a dyn RemoteStore,
    connectivity: &'a dyn ConnectivityOracle,
}

impl<'a, S: KvSubstrate> MigrationRunner<'a, S> {
    pub fn new(
        cache: &'a LocalCache<S>,
        remote: &'a dyn RemoteStore,
        connectivity: &'a dyn ConnectivityOracle,
    ) -> Self {
        Self {
            cache,
            remote,
            connectivity,
        }
    }

    pub async fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        if !self.connectivity.is_reachable() {
            debug!("Remote unreachable, migration deferred");
            return Ok(report);
        }

        let ledger = self.cache.migration_ledger()?;
        // Pending records are pushed by the reconcile pass instead.
        let candidates = self
            .cache
            .filter(|s: &Story| !s.pending_sync && !ledger.contains(&s.id))?;
        if candidates.is_empty() {
            return Ok(report);
        }
        info!(count = candidates.len(), "Migrating local-only stories");

        for story in candidates {
            match self.remote.get_story(&story.id).await {
                Ok(_) => {
                    debug!(id = %story.id, "Already on remote, skipping");
                    self.cache.extend_migration_ledger([story.id.clone()])?;
                    report.skipped += 1;
                    continue;
                }
                Err(RemoteError::NotFound) => {}
                Err(e) => {
                    warn!(
                        id = %story.id,
                        title = %story.title,
                        error = %e,
                        "Migration check failed"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            // The codec already repaired the author on decode; timestamps
            // travel as stored.
            match self.remote.import_story(&story).await {
                Ok(mut imported) => {
                    imported.pending_sync = false;
                    self.cache.upsert(&imported)?;
                    self.cache.extend_migration_ledger([story.id.clone()])?;
                    info!(id = %story.id, title = %story.title, "Story migrated");
                    report.imported += 1;
                }
                Err(RemoteError::AlreadyExists) => {
                    self.cache.extend_migration_ledger([story.id.clone()])?;
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        id = %story.id,
                        title = %story.title,
                        error = %e,
                        "Story migration failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(?report, "Migration finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};

    use novella_shared::models::{character_count, Story};
    use novella_store::MemorySubstrate;

    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::remote::{FailureMode, MemoryRemote};

    fn legacy(id: &str, title: &str, author: &str) -> Story {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        Story {
            id: id.into(),
            title: title.into(),
            content: "abc".into(),
            author: author.into(),
            user_id: "anonymous".into(),
            tags: vec![],
            character_count: character_count("abc"),
            likes: BTreeSet::new(),
            comments: vec![],
            pending_sync: false,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_existing_remote_record_is_not_duplicated_or_altered() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);

        let mut on_remote = legacy("1700000000000", "Fog (server)", "Poe");
        on_remote.likes.insert("u9".into());
        remote.seed_story(on_remote.clone());
        cache
            .upsert(&legacy("1700000000000", "Fog (local)", "Poe"))
            .unwrap();

        let report = MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.imported, 0);

        assert_eq!(remote.stories().len(), 1);
        assert_eq!(remote.story("1700000000000").unwrap(), on_remote);
    }

    #[tokio::test]
    async fn test_import_preserves_id_and_timestamps() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);

        let record = legacy("1700000000001", "Subway Memory", "Christie");
        cache.upsert(&record).unwrap();

        let report = MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(report.imported, 1);

        let imported = remote.story("1700000000001").unwrap();
        assert_eq!(imported.created_at, record.created_at);
        assert_eq!(imported.title, "Subway Memory");
        assert!(cache.migration_ledger().unwrap().contains("1700000000001"));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);
        cache.upsert(&legacy("a", "A", "Poe")).unwrap();
        cache.upsert(&legacy("b", "B", "Poe")).unwrap();

        let runner = MigrationRunner::new(&cache, &remote, &online);
        assert_eq!(runner.run().await.unwrap().imported, 2);
        let calls = remote.calls();

        assert_eq!(runner.run().await.unwrap(), MigrationReport::default());
        assert_eq!(remote.calls(), calls);
        assert_eq!(remote.stories().len(), 2);
    }

    #[tokio::test]
    async fn test_per_record_failures_do_not_abort_the_run() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);
        cache.upsert(&legacy("a", "A", "Poe")).unwrap();

        remote.set_failure(FailureMode::PermissionDenied);
        let report = MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(cache.migration_ledger().unwrap().is_empty());

        remote.set_failure(FailureMode::None);
        let report = MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(report.imported, 1);
    }

    #[tokio::test]
    async fn test_placeholder_author_is_repaired_on_import() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);
        cache.upsert(&legacy("a", "A", "あなたの名前")).unwrap();

        MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(remote.story("a").unwrap().author, "匿名ユーザー");
    }

    #[tokio::test]
    async fn test_pending_records_are_left_to_reconcile() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let online = ManualConnectivity::new(true);
        let mut draft = legacy("local-1", "A", "Poe");
        draft.pending_sync = true;
        cache.upsert(&draft).unwrap();

        let report = MigrationRunner::new(&cache, &remote, &online).run().await.unwrap();
        assert_eq!(report, MigrationReport::default());
        assert!(remote.stories().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_remote_defers_the_run() {
        let cache = LocalCache::new(MemorySubstrate::new());
        let remote = MemoryRemote::new();
        let offline = ManualConnectivity::new(false);
        cache.upsert(&legacy("a", "A", "Poe")).unwrap();

        let report = MigrationRunner::new(&cache, &remote, &offline).run().await.unwrap();
        assert_eq!(report, MigrationReport::default());
        assert_eq!(remote.calls(), 0);
    }
}
