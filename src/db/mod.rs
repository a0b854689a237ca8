pub mod sqlite;
pub mod sqlite_catalog;
pub mod sqlite_plans;
pub mod sqlite_taxonomy;
pub mod sqlite_users;
pub mod time;

pub use sqlite::Database;
