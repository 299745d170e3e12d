//! Storage module for employee and attendance persistence

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{AttendanceEntry, AttendanceStorage, EmployeeRecord};
