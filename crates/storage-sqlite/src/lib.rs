//! SQLite-backed entity stores for the pocketledger sync core.

pub mod categories;
pub mod db;
pub mod errors;
pub mod schema;
mod sync;
pub mod transactions;

use std::sync::Arc;

use log::info;

use pocketledger_core::Result;

pub use categories::CategoryRepository;
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use transactions::TransactionRepository;

/// Both record stores over one database file.
pub struct SqliteStores {
    pub categories: Arc<CategoryRepository>,
    pub transactions: Arc<TransactionRepository>,
}

/// Opens (creating and migrating as needed) the database under `app_data_dir`.
pub fn open(app_data_dir: &str) -> Result<SqliteStores> {
    let db_path = init(app_data_dir)?;
    let pool = create_pool(&db_path)?;
    run_migrations(&pool)?;
    let writer = spawn_writer(Arc::clone(&pool));
    info!("[Store] Opened {}", db_path);
    Ok(SqliteStores {
        categories: Arc::new(CategoryRepository::new(Arc::clone(&pool), writer.clone())),
        transactions: Arc::new(TransactionRepository::new(pool, writer)),
    })
}
