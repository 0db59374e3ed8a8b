pub mod coordinator;
pub mod events;
pub mod postgres;
pub mod runner;
pub mod signal;
pub mod store;
pub mod tester;
