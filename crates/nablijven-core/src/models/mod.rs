//! Data models for Nablijven

mod detention;
mod pending;
mod student;

pub use detention::{
    filter_by_date, filter_by_date_range, group_sessions, Detention, DetentionSession, TimePeriod,
};
pub use pending::{EntityKind, NewPendingOperation, OperationType, PendingId, PendingOperation};
pub use student::{filter_students, DayOfWeek, Student};
