pub mod config;
pub mod error;
pub mod keyset;
pub mod migration;
pub mod retry;
pub mod session;
