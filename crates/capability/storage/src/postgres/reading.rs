use crate::error::StorageError;
use crate::models::StoredReading;
use crate::traits::ReadingStore;
use sqlx::PgPool;

const SCHEMA: &str = include_str!("../../migrations/0001_meter_readings.sql");

pub struct PgReadingStore {
    pub pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    /// 建表（幂等）。
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert_reading(&self, reading: &StoredReading) -> Result<(), StorageError> {
        // 定点数以文本绑定后转换为 numeric，保留两位小数
        sqlx::query(
            "insert into meter_readings (recorded_at, meter_id, voltage, current, power, energy) \
             values ($1, $2, $3::numeric, $4::numeric, $5::numeric, $6::numeric)",
        )
        .bind(reading.recorded_at)
        .bind(i64::from(reading.meter_id))
        .bind(reading.voltage.to_string())
        .bind(reading.current.to_string())
        .bind(reading.power.to_string())
        .bind(reading.energy.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
