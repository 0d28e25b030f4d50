//! Key-value substrate behind the local cache.
//!
//! A substrate only stores whole serialized tables: `load` returns the last
//! payload written under a key and `store` replaces it in one step.

use std::collections::HashMap;

use crate::error::Result;

pub trait KvSubstrate: Send {
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Replace the payload under `key`. Must either fully succeed or leave
    /// the previous payload in place.
    fn store(&mut self, key: &str, payload: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Process-local substrate, for tests and hosts without a writable disk.
#[derive(Debug, Default, Clone)]
pub struct MemorySubstrate {
    tables: HashMap<String, String>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvSubstrate for MemorySubstrate {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables.get(key).cloned())
    }

    fn store(&mut self, key: &str, payload: &str) -> Result<()> {
        self.tables.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.tables.remove(key);
        Ok(())
    }
}
