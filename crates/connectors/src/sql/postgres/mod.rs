pub mod database;
pub mod listener;
pub mod params;
pub mod row;
pub mod utils;
