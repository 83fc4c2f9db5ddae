//! Feature store and series loader for derived anomaly features.
//!
//! The engine talks to storage only through the traits in [`store`]:
//! [`FeatureStore`] hands out one [`FeatureUnit`] (a transaction) per
//! batch, [`FeatureSeriesLoader`] reads base feature series, and
//! [`ActivityDirectory`] resolves employee days to activity ids.
//! [`PgFeatureStore`] backs them with PostgreSQL; [`MemoryFeatureStore`]
//! keeps everything in process and supports injected commit failures.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryFeatureStore;
pub use postgres::{init_pg_pool, PgFeatureStore};
pub use store::{ActivityDirectory, FeatureSeriesLoader, FeatureStore, FeatureUnit, WriteKind};
