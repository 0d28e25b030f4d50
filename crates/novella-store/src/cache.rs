//! Typed local cache over a [`KvSubstrate`].
//!
//! One table per entity kind, keyed by entity id, at most one record per id.
//! Every mutating call reads the current table, edits a copy and writes the
//! whole table back before returning. Nothing is written until the edit and
//! serialization succeeded, and the substrate replaces a table in a single
//! step, so a failing call leaves the stored table exactly as it was.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use novella_shared::codec::{Entity, EntityKind};
use novella_shared::constants::PENDING_DELETES_TABLE;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::substrate::KvSubstrate;

/// The on-device cache. Constructed once per session and handed to the
/// sync orchestrator; there is no global instance.
pub struct LocalCache<S = Database> {
    substrate: Mutex<S>,
}

impl<S: KvSubstrate> LocalCache<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate: Mutex::new(substrate),
        }
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        // Writes are all-or-nothing, so a panic elsewhere cannot have left a
        // half-written table behind.
        self.substrate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_table<E: Entity>(substrate: &S) -> Result<Vec<E>> {
        let table = E::KIND.table_key();
        let Some(payload) = substrate.load(table)? else {
            return Ok(Vec::new());
        };

        let corrupt = |reason: String| StoreError::Corrupt { table, reason };

        let records: Vec<Value> =
            serde_json::from_str(&payload).map_err(|e| corrupt(e.to_string()))?;
        records
            .into_iter()
            .map(|record| E::decode(record).map_err(|e| corrupt(e.to_string())))
            .collect()
    }

    fn write_table<E: Entity>(substrate: &mut S, records: &[E]) -> Result<()> {
        let encoded: Vec<Value> = records.iter().map(Entity::encode).collect();
        let payload = serde_json::to_string(&encoded)?;
        substrate.store(E::KIND.table_key(), &payload)
    }

    /// Every record of the kind, in stored order.
    pub fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        Self::read_table(&*self.lock())
    }

    pub fn get_by_id<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let records: Vec<E> = self.get_all()?;
        Ok(records.into_iter().find(|r| r.id() == id))
    }

    /// Replace the record with the same id, or append it.
    pub fn upsert<E: Entity>(&self, record: &E) -> Result<()> {
        self.mutate(|records: &mut Vec<E>| {
            match records.iter_mut().find(|r| r.id() == record.id()) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        })?;

        tracing::debug!(kind = %E::KIND, id = record.id(), "cached record");
        Ok(())
    }

    /// Remove the record. Returns whether it existed; absent ids are a no-op.
    pub fn delete<E: Entity>(&self, id: &str) -> Result<bool> {
        self.mutate(|records: &mut Vec<E>| {
            let before = records.len();
            records.retain(|r| r.id() != id);
            records.len() != before
        })
    }

    /// Swap the record stored under `old_id` for `record` (used when the
    /// remote assigns an id to a record created on-device).
    pub fn replace_id<E: Entity>(&self, old_id: &str, record: &E) -> Result<()> {
        self.mutate(|records: &mut Vec<E>| {
            records.retain(|r| r.id() != old_id && r.id() != record.id());
            records.push(record.clone());
        })
    }

    pub fn filter<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Result<Vec<E>> {
        let records: Vec<E> = self.get_all()?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    pub fn sorted_by<E: Entity, K: Ord>(&self, key: impl FnMut(&E) -> K) -> Result<Vec<E>> {
        let mut records: Vec<E> = self.get_all()?;
        records.sort_by_key(key);
        Ok(records)
    }

    pub fn count<E: Entity>(&self) -> Result<usize> {
        Ok(self.get_all::<E>()?.len())
    }

    /// Overwrite the whole table.
    pub fn replace_all<E: Entity>(&self, records: &[E]) -> Result<()> {
        Self::write_table(&mut *self.lock(), records)
    }

    /// Edit the table through `edit` and persist the result as one write.
    ///
    /// If reading, editing or writing fails, the stored table is untouched.
    pub fn mutate<E: Entity, T>(&self, edit: impl FnOnce(&mut Vec<E>) -> T) -> Result<T> {
        let mut substrate = self.lock();
        let mut records = Self::read_table::<E>(&substrate)?;
        let out = edit(&mut records);
        Self::write_table(&mut substrate, &records)?;
        Ok(out)
    }

    /// Drop a table entirely, e.g. after it was reported corrupt.
    pub fn clear(&self, kind: EntityKind) -> Result<()> {
        tracing::warn!(%kind, "clearing local table");
        self.lock().remove(kind.table_key())
    }

    fn read_id_set(substrate: &S, key: &'static str) -> Result<BTreeSet<String>> {
        let Some(payload) = substrate.load(key)? else {
            return Ok(BTreeSet::new());
        };
        serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt {
            table: key,
            reason: e.to_string(),
        })
    }

    fn edit_id_set(
        &self,
        key: &'static str,
        edit: impl FnOnce(&mut BTreeSet<String>),
    ) -> Result<()> {
        let mut substrate = self.lock();
        let mut ids = Self::read_id_set(&substrate, key)?;
        let before = ids.len();
        edit(&mut ids);
        if ids.len() == before {
            return Ok(());
        }
        let payload = serde_json::to_string(&ids)?;
        substrate.store(key, &payload)
    }

    /// Ids of `kind` known to be reconciled with the remote. Each kind keeps
    /// its own set.
    pub fn reconciled_ids(&self, kind: EntityKind) -> Result<BTreeSet<String>> {
        match kind.ledger_key() {
            Some(key) => Self::read_id_set(&self.lock(), key),
            None => Ok(BTreeSet::new()),
        }
    }

    pub fn extend_reconciled<I>(&self, kind: EntityKind, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        match kind.ledger_key() {
            Some(key) => self.edit_id_set(key, |ledger| ledger.extend(ids)),
            None => Ok(()),
        }
    }

    /// Story ids reconciled with the remote, including every id the
    /// migration runner settled.
    pub fn migration_ledger(&self) -> Result<BTreeSet<String>> {
        self.reconciled_ids(EntityKind::Story)
    }

    pub fn extend_migration_ledger<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        self.extend_reconciled(EntityKind::Story, ids)
    }

    /// Story ids deleted on-device whose remote delete is still owed.
    pub fn pending_deletes(&self) -> Result<BTreeSet<String>> {
        Self::read_id_set(&self.lock(), PENDING_DELETES_TABLE)
    }

    pub fn mark_pending_delete(&self, id: &str) -> Result<()> {
        self.edit_id_set(PENDING_DELETES_TABLE, |ids| {
            ids.insert(id.to_string());
        })
    }

    pub fn clear_pending_delete(&self, id: &str) -> Result<()> {
        self.edit_id_set(PENDING_DELETES_TABLE, |ids| {
            ids.remove(id);
        })
    }
}
