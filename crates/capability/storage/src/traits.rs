//! 存储接口 Trait 定义

use crate::error::StorageError;
use crate::models::StoredReading;
use async_trait::async_trait;

/// 读数存储接口：每次插入一条记录。
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert_reading(&self, reading: &StoredReading) -> Result<(), StorageError>;
}
