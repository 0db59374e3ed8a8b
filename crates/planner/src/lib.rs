pub mod keyset;
pub mod migration;
pub mod query;
