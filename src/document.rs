//! Document lifecycle (spec §3.2): a root value plus packed size/bucket metadata.
//!
//! Grounded on the spec's explicit bitfield layout (56-bit size, 8-bit histogram bucket id
//! packed into one machine word) and the teacher's general practice of keeping per-node
//! metadata out of the value tree itself (`doc::heap::HeapNode` carries no document-level
//! bookkeeping; that lives one level up, here in `Document`).

use crate::keytable::Table as KeyTable;
use crate::stats::bucket_of;
use crate::value::Value;

const SIZE_MASK: u64 = (1 << 56) - 1;

/// Packed `(size: 56 bits, bucket: 8 bits)` document metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocMeta(u64);

impl DocMeta {
    pub fn new(size: u64, bucket: u8) -> Self {
        debug_assert!(size <= SIZE_MASK, "document size exceeds 56-bit field");
        DocMeta((size & SIZE_MASK) | ((bucket as u64) << 56))
    }

    pub fn size(&self) -> u64 {
        self.0 & SIZE_MASK
    }

    pub fn bucket(&self) -> u8 {
        (self.0 >> 56) as u8
    }

    fn with_size(&self, size: u64) -> DocMeta {
        DocMeta::new(size, bucket_of(size) as u8)
    }
}

/// A document: a root value plus tracked size/bucket metadata. Created by parse or load,
/// mutated by `ops`, destroyed when the host deletes the key.
#[derive(Debug)]
pub struct Document {
    root: Value,
    meta: DocMeta,
}

impl Document {
    /// Wrap a freshly built value as a new document, computing its initial size.
    pub fn new(root: Value) -> Self {
        let size = root.mem_size() as u64;
        Document { root, meta: DocMeta::new(size, bucket_of(size) as u8) }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn meta(&self) -> DocMeta {
        self.meta
    }

    pub fn size(&self) -> u64 {
        self.meta.size()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Recompute and store this document's size/bucket metadata from its current content.
    /// Called by mutation operators after a successful write rather than on every read, since
    /// spec §3.2 assigns size maintenance to the operators, not the DOM.
    pub fn refresh_size(&mut self) {
        let size = self.root.mem_size() as u64;
        self.meta = self.meta.with_size(size);
    }

    /// Release every interned handle reachable from this document. Must run before the
    /// document is dropped by the host's key deletion path.
    pub fn release(&mut self, keys: &KeyTable) {
        self.root.release(keys);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn meta_packs_and_unpacks_size_and_bucket() {
        let meta = DocMeta::new(5000, 3);
        assert_eq!(meta.size(), 5000);
        assert_eq!(meta.bucket(), 3);
    }

    #[test]
    fn refresh_size_tracks_growth() {
        let mut doc = Document::new(Value::Null);
        let initial = doc.size();
        doc.root = Value::Array((0..100i64).map(Value::from).collect());
        doc.refresh_size();
        assert!(doc.size() > initial);
    }
}
