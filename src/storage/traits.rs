//! Storage abstraction traits
//!
//! Defines the persistence interface the service depends on. The gallery
//! is a cache over this store: employee mutations hit the store first and
//! the gallery only after the store accepts.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A persisted employee enrollment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecord {
    /// Stable primary key used for gallery indexing, logging and deletion
    pub employee_id: String,
    pub name: String,
    pub member_code: String,
    /// Embedding as little-endian f32 bytes
    pub embedding: Vec<u8>,
    /// Representative enrollment image, if one was stored
    pub image_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmployeeRecord {
    /// Decode the embedding blob; `None` when it does not hold exactly
    /// `dim` floats.
    pub fn decode_embedding(&self, dim: usize) -> Option<Vec<f32>> {
        if self.embedding.len() != dim * 4 {
            return None;
        }
        Some(
            self.embedding
                .chunks_exact(4)
                .map(|chunk| {
                    let arr: [u8; 4] = chunk.try_into().unwrap();
                    f32::from_le_bytes(arr)
                })
                .collect(),
        )
    }

    pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

/// One attendance log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub id: String,
    pub employee_id: String,
    pub name: String,
    pub member_code: String,
    pub timestamp: i64,
}

/// Employee and attendance persistence
/// Implementations must be thread-safe and async-compatible
#[async_trait]
pub trait AttendanceStorage: Send + Sync + 'static {
    /// Load every enrolled employee (startup gallery preload)
    async fn load_employees(&self) -> Result<Vec<EmployeeRecord>>;

    /// Get one employee by id
    async fn get_employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>>;

    /// Insert a new employee; fails if the id already exists
    async fn save_employee(&self, record: &EmployeeRecord) -> Result<()>;

    /// Replace an existing employee's fields; returns whether a row changed
    async fn update_employee(&self, record: &EmployeeRecord) -> Result<bool>;

    /// Delete an employee; returns whether anything was removed
    async fn delete_employee(&self, employee_id: &str) -> Result<bool>;

    /// List employees, newest first
    async fn list_employees(&self, offset: i64, limit: i64) -> Result<Vec<EmployeeRecord>>;

    /// Total enrolled count
    async fn count_employees(&self) -> Result<i64>;

    /// Append one attendance log row
    async fn append_attendance(&self, entry: &AttendanceEntry) -> Result<()>;

    /// Recent attendance rows, newest first
    async fn list_attendance(&self, limit: i64) -> Result<Vec<AttendanceEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_round_trip() {
        let original = vec![1.0f32, -2.5, 0.0, 3.25];
        let record = EmployeeRecord {
            employee_id: "e1".to_string(),
            name: "Alice".to_string(),
            member_code: "M-1".to_string(),
            embedding: EmployeeRecord::encode_embedding(&original),
            image_path: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(record.decode_embedding(4), Some(original));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let record = EmployeeRecord {
            employee_id: "e1".to_string(),
            name: "Alice".to_string(),
            member_code: String::new(),
            embedding: vec![0u8; 10],
            image_path: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(record.decode_embedding(4), None);
    }
}
