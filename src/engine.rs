//! The process-wide engine handle (spec §9 design note: "Global singletons (allocator,
//! keyTable, statistics): represent as a process-wide engine handle created at module load,
//! torn down at module unload; pass it explicitly or via scoped context.").
//!
//! `Engine` bundles the three shared, cross-document resources — the accounting allocator,
//! the key-interning table, and statistics — plus the runtime configuration. A `Document` is
//! per-key state owned by the host's key space; every other module takes `&Engine` (or its
//! fields) explicitly rather than reaching for ambient global state.

use crate::alloc::Accounting;
use crate::config::Config;
use crate::document::Document;
use crate::error::Result;
use crate::keytable::Table as KeyTable;
use crate::parser;
use crate::stats::Stats;

pub struct Engine {
    pub keys: KeyTable,
    pub config: Config,
    pub alloc: Accounting,
    pub stats: Stats,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(Config::default())
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let keys = KeyTable::new(config.key_table_num_shards(), config.key_table_factors())
            .unwrap_or_default();
        Engine { keys, config, alloc: Accounting::new(), stats: Stats::default() }
    }

    /// Parse `text` into a new document, charging the accounting allocator and recording
    /// document-count/depth/size statistics (spec §3.2, §4.8).
    #[tracing::instrument(skip(self, text), fields(key = key_name))]
    pub fn parse_document(&self, text: &str, key_name: &str) -> Result<Document> {
        let snapshot = self.alloc.begin_track();
        let (root, _max_seen_depth) = parser::parse(text, &self.keys, self.config.max_parser_recursion_depth())?;
        let _ = self.alloc.alloc(root.mem_size());
        let _delta = self.alloc.end_track(snapshot);

        let doc = Document::new(root);
        self.stats.document_created();
        self.stats.record_size_transition(key_name, 0, doc.size());
        self.stats.record_depth(key_name, doc.depth() as u64);
        Ok(doc)
    }

    /// Release a document's handles and record its destruction (called by the host just
    /// before it drops the key's value).
    pub fn destroy_document(&self, doc: &mut Document, key_name: &str) {
        let size = doc.size();
        doc.release(&self.keys);
        self.stats.document_destroyed();
        self.stats.record_size_transition(key_name, size, 0);
        tracing::debug!(key = key_name, size, "document destroyed");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_document_tracks_stats_and_size() {
        let engine = Engine::default();
        let doc = engine.parse_document(r#"{"a":1}"#, "mykey").unwrap();
        assert!(doc.size() > 0);
        assert_eq!(engine.stats.document_count(), 1);
    }
}
