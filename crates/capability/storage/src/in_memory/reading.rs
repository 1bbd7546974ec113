use crate::error::StorageError;
use crate::models::StoredReading;
use crate::traits::ReadingStore;
use std::sync::RwLock;

/// 读数内存存储
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<StoredReading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的读数数量（用于测试）
    pub fn len(&self) -> usize {
        self.readings.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按写入顺序返回全部读数
    pub fn all(&self) -> Vec<StoredReading> {
        self.readings.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn for_meter(&self, meter_id: u32) -> Vec<StoredReading> {
        self.readings
            .read()
            .map(|v| {
                v.iter()
                    .filter(|reading| reading.meter_id == meter_id)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn insert_reading(&self, reading: &StoredReading) -> Result<(), StorageError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        readings.push(*reading);
        Ok(())
    }
}
