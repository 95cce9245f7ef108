//! Command implementations

pub mod profile;
pub mod session;
pub mod vm;
