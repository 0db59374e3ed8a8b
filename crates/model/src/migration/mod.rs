pub mod script;
pub mod version;
