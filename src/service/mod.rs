//! Service layer module

pub mod attendance;
pub mod types;

pub use attendance::AttendanceService;
pub use types::*;
