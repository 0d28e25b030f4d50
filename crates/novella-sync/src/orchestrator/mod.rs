//! The sync orchestrator: the one entry point the app calls for every read
//! and write.
//!
//! Each operation is evaluated against a store plan computed from the
//! connectivity oracle: `[Remote, Cache]` when the backend is reachable,
//! `[Cache]` otherwise. Reads go through [`SyncOrchestrator::read_with`] and
//! writes through [`SyncOrchestrator::write_with`], so the fallback policy
//! lives in exactly two places.
//!
//! Write protocol:
//! 1. build the optimistic entity locally (local id on create, derived
//!    fields recomputed);
//! 2. if reachable, push it; a confirmed entity replaces the optimistic one
//!    in the cache with `pendingSync = false`;
//! 3. otherwise, or if the push failed, cache the optimistic entity with
//!    `pendingSync = true` and return it.

mod drafts;
mod profiles;
mod reconcile;
mod stories;

pub use reconcile::SyncReport;

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use novella_shared::codec::{Entity, EntityKind};
use novella_shared::models::{Story, UserProfile};
use novella_shared::constants::DEFAULT_LIST_LIMIT;
use novella_store::{Database, KvSubstrate, LocalCache};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityOracle, HealthProbe, ManualConnectivity};
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::migration::{MigrationReport, MigrationRunner};
use crate::remote::{HttpRemote, RemoteError, RemoteResult, RemoteStore};

/// An entity kind that can be pending confirmation by the remote store.
pub trait Syncable: Entity {
    fn set_pending(&mut self, pending: bool);
}

impl Syncable for Story {
    fn set_pending(&mut self, pending: bool) {
        self.pending_sync = pending;
    }
}

impl Syncable for UserProfile {
    fn set_pending(&mut self, pending: bool) {
        self.pending_sync = pending;
    }
}

/// One store an operation may be served from, in plan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Remote,
    Cache,
}

const ONLINE_PLAN: &[Tier] = &[Tier::Remote, Tier::Cache];
const OFFLINE_PLAN: &[Tier] = &[Tier::Cache];

/// What the first reachable read of a session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub migration: Option<MigrationReport>,
    pub sync: SyncReport,
}

pub struct SyncOrchestrator<S = Database> {
    cache: LocalCache<S>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivityOracle>,
    identity: Arc<dyn IdentityProvider>,
    sync_on_start: bool,
    default_list_limit: usize,
    session_started: AtomicBool,
}

impl SyncOrchestrator<Database> {
    /// Wire an orchestrator from configuration: SQLite cache, REST remote
    /// and, when enabled, a background health probe driving reachability.
    ///
    /// The probe is spawned on the current tokio runtime; the returned
    /// handle stops it when aborted.
    pub fn open(
        config: &SyncConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<(Self, Option<JoinHandle<()>>)> {
        let db = match &config.cache_db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };

        let remote = HttpRemote::new(&config.remote_url, config.request_timeout)?
            .with_token(config.remote_token.clone());

        let reachability = Arc::new(ManualConnectivity::new(true));
        let probe = match config.health_probe_interval {
            Some(interval) => Some(
                HealthProbe::new(&config.remote_url, config.request_timeout, reachability.clone())?
                    .spawn(interval),
            ),
            None => None,
        };

        info!(remote = %config.remote_url, probe = probe.is_some(), "Sync orchestrator ready");

        let orchestrator = Self::new(
            LocalCache::new(db),
            Arc::new(remote),
            reachability,
            identity,
        )
        .with_sync_on_start(config.sync_on_start)
        .with_default_list_limit(config.default_list_limit);

        Ok((orchestrator, probe))
    }
}

impl<S: KvSubstrate> SyncOrchestrator<S> {
    pub fn new(
        cache: LocalCache<S>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityOracle>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            cache,
            remote,
            connectivity,
            identity,
            sync_on_start: true,
            default_list_limit: DEFAULT_LIST_LIMIT,
            session_started: AtomicBool::new(false),
        }
    }

    /// Whether the first reachable read migrates legacy records and pushes
    /// pending ones.
    pub fn with_sync_on_start(mut self, enabled: bool) -> Self {
        self.sync_on_start = enabled;
        self
    }

    pub fn with_default_list_limit(mut self, limit: usize) -> Self {
        self.default_list_limit = limit;
        self
    }

    pub fn cache(&self) -> &LocalCache<S> {
        &self.cache
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_reachable()
    }

    fn plan(&self) -> &'static [Tier] {
        if self.is_online() {
            ONLINE_PLAN
        } else {
            OFFLINE_PLAN
        }
    }

    // -----------------------------------------------------------------------
    // Session start
    // -----------------------------------------------------------------------

    /// Migrate legacy records (if enabled) and push everything pending.
    ///
    /// Runs at most once per orchestrator through the lazy read hook, but is
    /// safe to call again by hand.
    pub async fn start_session(&self) -> Result<SessionReport> {
        self.session_started.store(true, Ordering::SeqCst);

        let migration = if self.sync_on_start {
            let runner = MigrationRunner::new(
                &self.cache,
                self.remote.as_ref(),
                self.connectivity.as_ref(),
            );
            Some(runner.run().await?)
        } else {
            None
        };

        let sync = self.sync_pending().await?;
        let report = SessionReport { migration, sync };
        info!(?report, "Sync session started");
        Ok(report)
    }

    /// Run [`Self::start_session`] before the first read made while the
    /// remote is reachable. Failures are logged; the read proceeds.
    async fn ensure_session(&self) {
        if !self.sync_on_start || !self.is_online() {
            return;
        }
        if self.session_started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.start_session().await {
            warn!(error = %e, "Session start failed");
        }
    }

    // -----------------------------------------------------------------------
    // Store policy
    // -----------------------------------------------------------------------

    /// Serve a read from the first tier of the plan that answers.
    ///
    /// A remote answer goes through `refresh` (which writes it back into the
    /// cache); a remote failure is logged and the read degrades to `cached`.
    async fn read_with<T, Fut>(
        &self,
        op: &'static str,
        fetch: Fut,
        refresh: impl FnOnce(T) -> Result<T>,
        cached: impl FnOnce() -> Result<T>,
    ) -> Result<T>
    where
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut fetch = Some(fetch);
        for tier in self.plan() {
            match tier {
                Tier::Remote => {
                    let Some(fetch) = fetch.take() else { continue };
                    match fetch.await {
                        Ok(value) => return refresh(value),
                        Err(e) => warn!(op, error = %e, "Remote read failed, serving cache"),
                    }
                }
                Tier::Cache => break,
            }
        }
        debug!(op, "Serving from local cache");
        cached()
    }

    /// Apply a write through the plan. Returns the confirmed entity, or the
    /// optimistic one marked pending.
    async fn write_with<E, Fut>(&self, op: &'static str, mut optimistic: E, push: Fut) -> Result<E>
    where
        E: Syncable,
        Fut: Future<Output = RemoteResult<E>>,
    {
        let mut push = Some(push);
        for tier in self.plan() {
            match tier {
                Tier::Remote => {
                    let Some(push) = push.take() else { continue };
                    match push.await {
                        Ok(mut confirmed) => {
                            confirmed.set_pending(false);
                            self.cache.replace_id(optimistic.id(), &confirmed)?;
                            self.cache
                                .extend_reconciled(E::KIND, [confirmed.id().to_string()])?;
                            debug!(op, id = confirmed.id(), "Remote write confirmed");
                            return Ok(confirmed);
                        }
                        Err(e) => warn!(
                            op,
                            id = optimistic.id(),
                            error = %e,
                            "Remote write failed, keeping local copy"
                        ),
                    }
                }
                Tier::Cache => break,
            }
        }

        optimistic.set_pending(true);
        self.cache.upsert(&optimistic)?;
        debug!(op, id = optimistic.id(), "Write cached as pending");
        Ok(optimistic)
    }

    // -----------------------------------------------------------------------
    // Cache refresh
    // -----------------------------------------------------------------------

    fn deleted_ids<E: Entity>(&self) -> Result<BTreeSet<String>> {
        match E::KIND {
            EntityKind::Story => Ok(self.cache.pending_deletes()?),
            _ => Ok(BTreeSet::new()),
        }
    }

    /// Write a remote listing into the cache and return what the caller
    /// should see.
    ///
    /// Cached records awaiting sync win over their remote counterparts. When
    /// `complete` is set the listing is the whole remote table: reconciled
    /// records it no longer contains are dropped from the cache, and local
    /// records the remote has not seen yet are appended to the result.
    fn merge_listing<E: Syncable>(&self, fetched: Vec<E>, complete: bool) -> Result<Vec<E>> {
        let deleted = self.deleted_ids::<E>()?;
        let reconciled = self.cache.reconciled_ids(E::KIND)?;

        let (merged, seen) = self.cache.mutate(|cached: &mut Vec<E>| {
            let mut out = Vec::with_capacity(fetched.len());
            let mut seen = HashSet::new();

            for mut record in fetched {
                if deleted.contains(record.id()) {
                    continue;
                }
                record.set_pending(false);
                seen.insert(record.id().to_string());

                match cached.iter_mut().find(|c| c.id() == record.id()) {
                    Some(local) if local.is_pending() => out.push(local.clone()),
                    Some(local) => {
                        *local = record.clone();
                        out.push(record);
                    }
                    None => {
                        cached.push(record.clone());
                        out.push(record);
                    }
                }
            }

            if complete {
                cached.retain(|c| {
                    c.is_pending() || seen.contains(c.id()) || !reconciled.contains(c.id())
                });
                out.extend(cached.iter().filter(|c| !seen.contains(c.id())).cloned());
            }

            (out, seen)
        })?;

        self.cache.extend_reconciled(E::KIND, seen)?;
        Ok(merged)
    }

    /// Write a single remote answer for `id` into the cache and return what
    /// the caller should see. `None` means the remote has no such record.
    fn refresh_one<E: Syncable>(&self, id: &str, fetched: Option<E>) -> Result<Option<E>> {
        if self.deleted_ids::<E>()?.contains(id) {
            return Ok(None);
        }

        let cached: Option<E> = self.cache.get_by_id(id)?;
        match (fetched, cached) {
            (_, Some(local)) if local.is_pending() => Ok(Some(local)),
            (Some(mut record), _) => {
                record.set_pending(false);
                self.cache.upsert(&record)?;
                self.cache.extend_reconciled(E::KIND, [record.id().to_string()])?;
                Ok(Some(record))
            }
            (None, Some(local)) => {
                // Only forget records known to have reached the remote once;
                // anything else may be a legacy record awaiting migration.
                if self.cache.reconciled_ids(E::KIND)?.contains(id) {
                    self.cache.delete::<E>(id)?;
                    Ok(None)
                } else {
                    Ok(Some(local))
                }
            }
            (None, None) => Ok(None),
        }
    }
}

/// Treat a remote "not found" as an empty answer.
fn found<T>(result: RemoteResult<T>) -> RemoteResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RemoteError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use novella_shared::models::{character_count, Story};
    use novella_store::MemorySubstrate;

    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::identity::{Identity, StaticIdentity};
    use crate::remote::MemoryRemote;

    pub struct Harness {
        pub orchestrator: SyncOrchestrator<MemorySubstrate>,
        pub remote: Arc<MemoryRemote>,
        pub network: Arc<ManualConnectivity>,
        pub identity: Arc<StaticIdentity>,
    }

    impl Harness {
        pub fn online() -> Self {
            Self::build(true)
        }

        pub fn offline() -> Self {
            Self::build(false)
        }

        fn build(reachable: bool) -> Self {
            Self::over(MemorySubstrate::new(), reachable)
        }

        /// A harness whose cache starts from `substrate` as given.
        pub fn over(substrate: MemorySubstrate, reachable: bool) -> Self {
            let remote = Arc::new(MemoryRemote::new());
            let network = Arc::new(ManualConnectivity::new(reachable));
            let identity = Arc::new(StaticIdentity::signed_in(Identity {
                user_id: "u1".into(),
                display_name: "Ellery".into(),
                email: "u1@example.com".into(),
            }));
            let orchestrator = SyncOrchestrator::new(
                LocalCache::new(substrate),
                remote.clone(),
                network.clone(),
                identity.clone(),
            );
            Self {
                orchestrator,
                remote,
                network,
                identity,
            }
        }

        pub fn go_online(&self) {
            self.network.set_reachable(true);
        }

        pub fn go_offline(&self) {
            self.network.set_reachable(false);
        }
    }

    pub fn story(id: &str, title: &str, content: &str, age_days: i64) -> Story {
        let created = Utc::now() - Duration::days(age_days);
        Story {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            author: "Poe".into(),
            user_id: "u1".into(),
            tags: vec!["mystery".into()],
            character_count: character_count(content),
            likes: BTreeSet::new(),
            comments: vec![],
            pending_sync: false,
            created_at: created,
            updated_at: created,
        }
    }
}
