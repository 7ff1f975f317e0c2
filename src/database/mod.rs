// Database module
// SQLite holds products, resources and their chunk vectors

pub mod sqlite;

pub use sqlite::*;
