//! 数据模型

use chrono::{DateTime, Utc};
use domain::{Centi, Reading};

/// 待持久化的读数：采样时间已转换为 UTC 日历时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredReading {
    pub recorded_at: DateTime<Utc>,
    pub meter_id: u32,
    pub voltage: Centi,
    pub current: Centi,
    pub power: Centi,
    pub energy: Centi,
}

impl From<&Reading> for StoredReading {
    fn from(reading: &Reading) -> Self {
        Self {
            recorded_at: reading.recorded_at(),
            meter_id: reading.meter_id,
            voltage: reading.voltage,
            current: reading.current,
            power: reading.power,
            energy: reading.energy,
        }
    }
}
