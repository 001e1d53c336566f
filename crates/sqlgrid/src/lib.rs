//! # sqlgrid
//!
//! Service layer for editable SQL result grids.
//!
//! - [`registry::DatabaseRegistry`] keeps the configured databases, each
//!   with a lazily opened pool and schema snapshot
//! - [`executor::QueryExecutor`] runs queries, non-queries and batch saves
//!   under the command timeout
//! - [`transactions::TransactionPool`] keeps transactions open between
//!   requests and rolls back idle ones
//! - [`change_data::ChangeDataPipeline`] derives field values with `sql`,
//!   `running`, `text` and `code` rules
//! - [`service::Service`] ties them together behind serde request and
//!   response types
//!
//! ```rust,no_run
//! use sqlgrid::config::Settings;
//! use sqlgrid::service::{Service, TableData};
//!
//! # async fn run() -> sqlgrid::error::Result<()> {
//! let service = Service::start(Settings::default()).await?;
//! let response = service
//!     .execute(TableData {
//!         database_id: 1,
//!         script: String::from("SELECT id, name FROM customer"),
//!         ..TableData::default()
//!     })
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod change_data;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod providers;
pub mod registry;
pub mod repository;
pub mod service;
pub mod transactions;

pub use error::{Result, ServiceError};
pub use service::Service;
