//! PostgreSQL 存储实现
//!
//! 依赖 `meter_readings` 表（见 `migrations/0001_meter_readings.sql`），
//! 可通过 [`PgReadingStore::migrate`] 在启动时创建。

mod reading;

pub use reading::PgReadingStore;
