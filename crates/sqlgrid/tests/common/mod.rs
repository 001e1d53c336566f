#![allow(dead_code)]

use std::sync::Arc;

use sqlgrid::config::Settings;
use sqlgrid::database::DatabaseInfo;
use sqlgrid::providers::ProviderRegistry;
use sqlgrid::repository::MemoryRepository;
use sqlgrid::Service;
use sqlgrid_core::provider::DatabaseProvider;
use sqlgrid_core::synth::SynthesizedStatement;
use sqlgrid_sqlite::SqliteProvider;

/// Id under which [`service`] registers the test database.
pub const DATABASE_ID: i32 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE customer (id INTEGER PRIMARY KEY, name VARCHAR(40) NOT NULL, city TEXT, rank INTEGER)",
    "CREATE TABLE orders (order_no INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customer(id), total NUMERIC)",
    "CREATE TABLE audit (note TEXT)",
    "INSERT INTO customer (id, name, city) VALUES (1, 'Ada', 'Bern'), (2, 'Bob', 'Basel'), (3, 'Cy', 'Bern')",
    "INSERT INTO orders (order_no, customer_id, total) VALUES (10, 1, 5), (11, 1, 7), (12, 2, 3)",
];

/// In-memory SQLite database with `customer`, `orders` and `audit`.
pub async fn sqlite_database(id: i32) -> Arc<DatabaseInfo> {
    let provider = Arc::new(SqliteProvider::new());
    let pool = provider
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let mut session = pool.begin().await.unwrap();
    for sql in SCHEMA {
        session.execute(&SynthesizedStatement::new(*sql)).await.unwrap();
    }
    session.commit().await.unwrap();
    Arc::new(DatabaseInfo::with_pool(id, provider, "test", pool))
}

/// Service over a memory repository with the test database registered.
pub async fn service() -> Service {
    let service = Service::new(
        Settings::default(),
        ProviderRegistry::with_defaults(),
        Arc::new(MemoryRepository::new()),
    );
    service
        .registry()
        .insert_info(sqlite_database(DATABASE_ID).await);
    service
}
