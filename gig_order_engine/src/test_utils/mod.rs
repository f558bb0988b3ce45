//! Helpers for tests that need a real database.
pub mod prepare_env;

pub use prepare_env::{create_database, drop_database, prepare_test_env, random_db_path, run_migrations};
