//! Runtime-tunable configuration parameters (spec §6.4).
//!
//! Grounded on the teacher pack's pattern of centralizing tunables behind a typed struct with
//! validating setters (the reference pack's various `*Config` structs consumed by host
//! registration code rather than parsed ad hoc at each call site); this module owns parameter
//! *semantics* only — the host-side registration plumbing that exposes these as externally
//! settable options lives behind `host::ConfigRegistry`.

use crate::error::{Error, Result};
use crate::keytable::Factors as KeyTableFactors;

/// Separate load-factor policy for hybrid object promotion/rehash (spec §4.3), distinct from
/// `keytable::Factors` even though the shape is identical, since the two are independently
/// configurable per spec §6.4 (`hash-table-*` vs `key-table-*`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashTableFactors {
    pub min_load: f32,
    pub max_load: f32,
    pub grow: f32,
    pub shrink: f32,
    pub min_size: usize,
}

impl Default for HashTableFactors {
    fn default() -> Self {
        HashTableFactors { min_load: 0.1, max_load: 0.7, grow: 2.0, shrink: 0.5, min_size: 8 }
    }
}

impl HashTableFactors {
    fn validate(&self) -> Result<()> {
        if !(0.0..self.max_load).contains(&self.min_load)
            || self.max_load > 1.0
            || self.grow <= 1.0
            || !(0.0..1.0).contains(&self.shrink)
            || self.min_size == 0
        {
            return Err(Error::InvalidConfigValue("hash-table-factors"));
        }
        Ok(())
    }
}

/// Engine-wide configuration, covering every parameter of spec §6.4.
#[derive(Debug, Clone)]
pub struct Config {
    max_document_size: u64,
    defrag_threshold: u64,
    max_path_limit: usize,
    max_parser_recursion_depth: usize,
    max_recursive_descent_tokens: usize,
    max_query_string_size: usize,
    key_table_num_shards: usize,
    key_table_factors: KeyTableFactors,
    hash_table_factors: HashTableFactors,
    enable_memory_traps: bool,
    enforce_rdb_version_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_document_size: 0,
            defrag_threshold: 64 * 1024 * 1024,
            max_path_limit: 128,
            max_parser_recursion_depth: 200,
            max_recursive_descent_tokens: 20,
            max_query_string_size: 128 * 1024,
            key_table_num_shards: 16,
            key_table_factors: KeyTableFactors::default(),
            hash_table_factors: HashTableFactors::default(),
            enable_memory_traps: false,
            enforce_rdb_version_check: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_document_size(&self) -> u64 {
        self.max_document_size
    }

    pub fn set_max_document_size(&mut self, bytes: u64) -> Result<()> {
        self.max_document_size = bytes;
        Ok(())
    }

    pub fn defrag_threshold(&self) -> u64 {
        self.defrag_threshold
    }

    pub fn set_defrag_threshold(&mut self, bytes: u64) -> Result<()> {
        self.defrag_threshold = bytes;
        Ok(())
    }

    pub fn max_path_limit(&self) -> usize {
        self.max_path_limit
    }

    pub fn set_max_path_limit(&mut self, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(Error::InvalidConfigValue("max-path-limit"));
        }
        self.max_path_limit = depth;
        Ok(())
    }

    pub fn max_parser_recursion_depth(&self) -> usize {
        self.max_parser_recursion_depth
    }

    pub fn set_max_parser_recursion_depth(&mut self, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(Error::InvalidConfigValue("max-parser-recursion-depth"));
        }
        self.max_parser_recursion_depth = depth;
        Ok(())
    }

    pub fn max_recursive_descent_tokens(&self) -> usize {
        self.max_recursive_descent_tokens
    }

    pub fn set_max_recursive_descent_tokens(&mut self, n: usize) -> Result<()> {
        self.max_recursive_descent_tokens = n;
        Ok(())
    }

    pub fn max_query_string_size(&self) -> usize {
        self.max_query_string_size
    }

    pub fn set_max_query_string_size(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Err(Error::InvalidConfigValue("max-query-string-size"));
        }
        self.max_query_string_size = bytes;
        Ok(())
    }

    pub fn key_table_num_shards(&self) -> usize {
        self.key_table_num_shards
    }

    /// Rejected unless `key_table_is_empty` reports true, per spec §6.4's note that
    /// `num-shards` may only change while the table is empty.
    pub fn set_key_table_num_shards(&mut self, n: usize, key_table_is_empty: bool) -> Result<()> {
        if !(1..=(1 << 19)).contains(&n) {
            return Err(Error::InvalidConfigValue("key-table-num-shards"));
        }
        if !key_table_is_empty {
            return Err(Error::InvalidConfigValue("key-table-num-shards"));
        }
        self.key_table_num_shards = n;
        Ok(())
    }

    pub fn key_table_factors(&self) -> KeyTableFactors {
        self.key_table_factors
    }

    pub fn set_key_table_factors(&mut self, factors: KeyTableFactors) -> Result<()> {
        self.key_table_factors = factors;
        Ok(())
    }

    pub fn hash_table_factors(&self) -> HashTableFactors {
        self.hash_table_factors
    }

    pub fn set_hash_table_factors(&mut self, factors: HashTableFactors) -> Result<()> {
        factors.validate()?;
        self.hash_table_factors = factors;
        Ok(())
    }

    pub fn enable_memory_traps(&self) -> bool {
        self.enable_memory_traps
    }

    /// Rejected unless `no_outstanding_allocations` reports true, matching
    /// `alloc::Accounting::set_trap_mode`'s own guard.
    pub fn set_enable_memory_traps(&mut self, enabled: bool, no_outstanding_allocations: bool) -> Result<()> {
        if enabled != self.enable_memory_traps && !no_outstanding_allocations {
            return Err(Error::InvalidConfigValue("enable-memory-traps"));
        }
        self.enable_memory_traps = enabled;
        Ok(())
    }

    pub fn enforce_rdb_version_check(&self) -> bool {
        self.enforce_rdb_version_check
    }

    pub fn set_enforce_rdb_version_check(&mut self, enabled: bool) -> Result<()> {
        self.enforce_rdb_version_check = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = Config::default();
        assert_eq!(c.max_document_size(), 0);
        assert_eq!(c.defrag_threshold(), 64 * 1024 * 1024);
        assert_eq!(c.max_path_limit(), 128);
        assert_eq!(c.max_parser_recursion_depth(), 200);
        assert_eq!(c.max_recursive_descent_tokens(), 20);
        assert_eq!(c.max_query_string_size(), 128 * 1024);
        assert!(!c.enable_memory_traps());
        assert!(!c.enforce_rdb_version_check());
    }

    #[test]
    fn num_shards_rejected_when_table_non_empty() {
        let mut c = Config::default();
        assert!(c.set_key_table_num_shards(32, false).is_err());
        assert!(c.set_key_table_num_shards(32, true).is_ok());
        assert_eq!(c.key_table_num_shards(), 32);
    }

    #[test]
    fn memory_traps_rejected_with_outstanding_allocations() {
        let mut c = Config::default();
        assert!(c.set_enable_memory_traps(true, false).is_err());
        assert!(c.set_enable_memory_traps(true, true).is_ok());
    }
}
