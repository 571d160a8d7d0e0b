pub mod changes;
pub mod common;
pub mod config;
pub mod records;
pub mod session;
pub mod sync;
