pub mod common;
pub mod completions;
pub mod detention;
pub mod pending;
pub mod student;
pub mod sync;
