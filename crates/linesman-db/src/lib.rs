pub mod backend;
pub mod baseline_repository;
pub mod config;
pub mod database;

pub use backend::BaselineBackend;
pub use baseline_repository::PgBaselineRepository;
pub use config::DatabaseConfig;
pub use database::Database;
