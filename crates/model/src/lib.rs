pub mod core;
pub mod migration;
pub mod pagination;
pub mod records;
