pub mod config;
pub mod database;
pub mod listing_repository;
pub mod search_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use listing_repository::ListingRepository;
pub use search_repository::SearchRepository;

use carwatch_core::AppError;

pub(crate) fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}
