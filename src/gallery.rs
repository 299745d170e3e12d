//! In-memory embedding gallery
//!
//! Holds one row per enrolled identity: display name, employee id, member
//! code and a 512-dim embedding, index-aligned across all sequences.
//! Readers get immutable snapshots; writers publish a fresh snapshot under
//! a single write lock, so a reader can never observe a half-applied
//! mutation.

use std::sync::Arc;

use ndarray::{Array2, ArrayView1};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("invalid embedding: expected {expected} dimensions, got {got}")]
    InvalidEmbedding { expected: usize, got: usize },
}

/// One enrolled identity
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub employee_id: String,
    pub name: String,
    pub member_code: String,
    pub embedding: Vec<f32>,
}

/// A consistent, read-only view of the gallery
///
/// Index `i` refers to the same identity in every sequence.
#[derive(Debug)]
pub struct GallerySnapshot {
    names: Vec<String>,
    ids: Vec<String>,
    member_codes: Vec<String>,
    embeddings: Array2<f32>,
}

impl GallerySnapshot {
    fn empty(dim: usize) -> Self {
        Self {
            names: Vec::new(),
            ids: Vec::new(),
            member_codes: Vec::new(),
            embeddings: Array2::zeros((0, dim)),
        }
    }

    fn from_parts(dim: usize, names: Vec<String>, ids: Vec<String>, member_codes: Vec<String>, rows: Vec<Vec<f32>>) -> Self {
        debug_assert!(names.len() == ids.len() && ids.len() == member_codes.len() && member_codes.len() == rows.len());
        let mut embeddings = Array2::zeros((rows.len(), dim));
        for (i, row) in rows.iter().enumerate() {
            embeddings.row_mut(i).assign(&ArrayView1::from(row.as_slice()));
        }
        Self {
            names,
            ids,
            member_codes,
            embeddings,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn employee_id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn member_code(&self, index: usize) -> &str {
        &self.member_codes[index]
    }

    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    fn rows(&self) -> Vec<Vec<f32>> {
        self.embeddings.outer_iter().map(|r| r.to_vec()).collect()
    }
}

/// The enrolled identity gallery shared by all recognition requests
///
/// Mutations (`replace_all`, `upsert`, `remove`) serialize on the write
/// lock and swap in a complete new snapshot; `snapshot()` is an `Arc`
/// clone and never blocks on an in-flight mutation.
pub struct Gallery {
    dim: usize,
    current: RwLock<Arc<GallerySnapshot>>,
}

impl Gallery {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            current: RwLock::new(Arc::new(GallerySnapshot::empty(dim))),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Get the current snapshot
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.read().clone()
    }

    /// Atomically replace the whole gallery, e.g. with the startup load.
    ///
    /// Records with the wrong dimensionality are skipped with a warning,
    /// as the persisted store may hold rows written for another model.
    /// Returns the number of identities loaded.
    pub fn replace_all(&self, records: Vec<IdentityRecord>) -> usize {
        let mut names = Vec::with_capacity(records.len());
        let mut ids = Vec::with_capacity(records.len());
        let mut member_codes = Vec::with_capacity(records.len());
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            if record.embedding.len() != self.dim {
                warn!(
                    "Skipping '{}': embedding has {} dimensions, expected {}",
                    record.employee_id,
                    record.embedding.len(),
                    self.dim
                );
                continue;
            }
            names.push(record.name);
            ids.push(record.employee_id);
            member_codes.push(record.member_code);
            rows.push(record.embedding);
        }

        let count = ids.len();
        let snapshot = GallerySnapshot::from_parts(self.dim, names, ids, member_codes, rows);
        *self.current.write() = Arc::new(snapshot);
        debug!("Gallery replaced with {} identities", count);
        count
    }

    /// Insert a new identity or replace an existing one in place.
    ///
    /// An existing `employee_id` keeps its index; a new one is appended.
    pub fn upsert(&self, record: IdentityRecord) -> Result<(), GalleryError> {
        if record.embedding.len() != self.dim {
            return Err(GalleryError::InvalidEmbedding {
                expected: self.dim,
                got: record.embedding.len(),
            });
        }

        let mut guard = self.current.write();
        let mut names = guard.names.clone();
        let mut ids = guard.ids.clone();
        let mut member_codes = guard.member_codes.clone();
        let mut rows = guard.rows();

        match ids.iter().position(|id| *id == record.employee_id) {
            Some(i) => {
                names[i] = record.name;
                member_codes[i] = record.member_code;
                rows[i] = record.embedding;
                debug!("Gallery entry '{}' replaced at index {}", record.employee_id, i);
            }
            None => {
                names.push(record.name);
                ids.push(record.employee_id);
                member_codes.push(record.member_code);
                rows.push(record.embedding);
            }
        }

        *guard = Arc::new(GallerySnapshot::from_parts(self.dim, names, ids, member_codes, rows));
        Ok(())
    }

    /// Remove an identity; returns whether anything was removed.
    pub fn remove(&self, employee_id: &str) -> bool {
        let mut guard = self.current.write();
        let Some(i) = guard.ids.iter().position(|id| id == employee_id) else {
            return false;
        };

        let mut names = guard.names.clone();
        let mut ids = guard.ids.clone();
        let mut member_codes = guard.member_codes.clone();
        let mut rows = guard.rows();
        names.remove(i);
        ids.remove(i);
        member_codes.remove(i);
        rows.remove(i);

        *guard = Arc::new(GallerySnapshot::from_parts(self.dim, names, ids, member_codes, rows));
        debug!("Gallery entry '{}' removed", employee_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, fill: f32) -> IdentityRecord {
        IdentityRecord {
            employee_id: id.to_string(),
            name: name.to_string(),
            member_code: format!("M-{}", id),
            embedding: vec![fill; 4],
        }
    }

    fn assert_aligned(snapshot: &GallerySnapshot) {
        assert_eq!(snapshot.names.len(), snapshot.ids.len());
        assert_eq!(snapshot.ids.len(), snapshot.member_codes.len());
        assert_eq!(snapshot.member_codes.len(), snapshot.embeddings.nrows());
    }

    #[test]
    fn test_empty_gallery() {
        let gallery = Gallery::new(4);
        assert!(gallery.is_empty());
        assert_eq!(gallery.len(), 0);
        assert_eq!(gallery.snapshot().embedding_dim(), 4);
    }

    #[test]
    fn test_upsert_insert_and_replace() {
        let gallery = Gallery::new(4);
        gallery.upsert(record("e1", "Alice", 1.0)).unwrap();
        gallery.upsert(record("e2", "Bob", 2.0)).unwrap();
        assert_eq!(gallery.len(), 2);
        assert_aligned(&gallery.snapshot());

        // Replacing an existing id keeps the count and the index
        gallery.upsert(record("e1", "Alice Smith", 3.0)).unwrap();
        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.employee_id(0), "e1");
        assert_eq!(snapshot.name(0), "Alice Smith");
        assert_eq!(snapshot.embeddings().row(0).to_vec(), vec![3.0; 4]);
        assert_aligned(&snapshot);
    }

    #[test]
    fn test_upsert_rejects_wrong_dimensionality() {
        let gallery = Gallery::new(4);
        gallery.upsert(record("e1", "Alice", 1.0)).unwrap();

        let mut bad = record("e2", "Bob", 2.0);
        bad.embedding = vec![1.0; 3];
        let err = gallery.upsert(bad).unwrap_err();
        assert!(matches!(
            err,
            GalleryError::InvalidEmbedding { expected: 4, got: 3 }
        ));

        // Gallery unchanged
        assert_eq!(gallery.len(), 1);
        assert_aligned(&gallery.snapshot());
    }

    #[test]
    fn test_remove() {
        let gallery = Gallery::new(4);
        gallery.upsert(record("e1", "Alice", 1.0)).unwrap();
        gallery.upsert(record("e2", "Bob", 2.0)).unwrap();
        gallery.upsert(record("e3", "Carol", 3.0)).unwrap();

        assert!(gallery.remove("e2"));
        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.len(), 2);
        // Subsequent entries shift but stay aligned
        assert_eq!(snapshot.employee_id(1), "e3");
        assert_eq!(snapshot.name(1), "Carol");
        assert_eq!(snapshot.embeddings().row(1).to_vec(), vec![3.0; 4]);
        assert_aligned(&snapshot);

        assert!(!gallery.remove("e2"));
        assert_eq!(gallery.len(), 2);
    }

    #[test]
    fn test_replace_all_skips_malformed_rows() {
        let gallery = Gallery::new(4);
        gallery.upsert(record("old", "Old", 0.5)).unwrap();

        let mut bad = record("bad", "Bad", 9.0);
        bad.embedding = vec![9.0; 7];
        let loaded = gallery.replace_all(vec![record("e1", "Alice", 1.0), bad, record("e2", "Bob", 2.0)]);
        assert_eq!(loaded, 2);

        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.employee_id(0), "e1");
        assert_eq!(snapshot.employee_id(1), "e2");
        assert_aligned(&snapshot);
    }

    #[test]
    fn test_interleaved_snapshots_stay_aligned() {
        let gallery = Arc::new(Gallery::new(4));
        let writer = {
            let gallery = gallery.clone();
            std::thread::spawn(move || {
                for i in 0..200usize {
                    let id = format!("e{}", i % 10);
                    gallery.upsert(record(&id, "Name", i as f32)).unwrap();
                    if i % 3 == 0 {
                        gallery.remove(&format!("e{}", (i + 5) % 10));
                    }
                }
            })
        };

        for _ in 0..500 {
            assert_aligned(&gallery.snapshot());
        }
        writer.join().unwrap();
        assert_aligned(&gallery.snapshot());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutations() {
        let gallery = Gallery::new(4);
        gallery.upsert(record("e1", "Alice", 1.0)).unwrap();

        let before = gallery.snapshot();
        gallery.upsert(record("e2", "Bob", 2.0)).unwrap();
        gallery.remove("e1");

        assert_eq!(before.len(), 1);
        assert_eq!(before.employee_id(0), "e1");
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.snapshot().employee_id(0), "e2");
    }
}
