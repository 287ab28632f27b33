//! Command implementations

pub mod delete;
pub mod init;
pub mod pull;
pub mod push;
