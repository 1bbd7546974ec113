//! # 读数存储
//!
//! 持久化消费者只依赖 [`ReadingStore::insert_reading`]，每次写入一条记录。
//!
//! - [`in_memory`]：`RwLock<Vec>` 实现，用于测试和未配置数据库的单机运行
//! - [`postgres`]：sqlx 实现，写入 `meter_readings` 表
//!
//! 采样时间在进入存储层前已转换为 `DateTime<Utc>`；
//! 电压、电流、功率、电能以 [`domain::Centi`] 表示，写入时不经过浮点数。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;

pub use connection::connect_pool;
pub use error::StorageError;
pub use in_memory::InMemoryReadingStore;
pub use models::StoredReading;
pub use postgres::PgReadingStore;
pub use traits::ReadingStore;
