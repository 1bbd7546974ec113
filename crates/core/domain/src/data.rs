use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 定点数解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCentiError {
    #[error("invalid fixed-point value: {0}")]
    Invalid(String),
    #[error("fixed-point value out of range: {0}")]
    OutOfRange(String),
}

/// 两位小数的定点数（隐含除数 100）。
///
/// 内部保存原始整数，文本形式固定两位小数，不经过浮点数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Centi(u32);

impl Centi {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// 原始整数值（已乘以 100）。
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u16> for Centi {
    fn from(raw: u16) -> Self {
        Self(u32::from(raw))
    }
}

impl fmt::Display for Centi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Centi {
    type Err = ParseCentiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || ParseCentiError::Invalid(text.to_string());
        let (int_part, frac_part) = match text.split_once('.') {
            Some((_, "")) => return Err(invalid()),
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (text, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac_part.len() > 2 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let out_of_range = || ParseCentiError::OutOfRange(text.to_string());
        let int_value = int_part.parse::<u64>().map_err(|_| out_of_range())?;
        let frac_value = match frac_part.len() {
            0 => 0,
            1 => u64::from(frac_part.as_bytes()[0] - b'0') * 10,
            _ => frac_part.parse::<u64>().map_err(|_| invalid())?,
        };
        int_value
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac_value))
            .and_then(|v| u32::try_from(v).ok())
            .map(Self)
            .ok_or_else(out_of_range)
    }
}

impl Serialize for Centi {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Centi {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CentiVisitor)
    }
}

struct CentiVisitor;

impl Visitor<'_> for CentiVisitor {
    type Value = Centi;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal with at most two fraction digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Centi, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Centi, E> {
        v.checked_mul(100)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(Centi)
            .ok_or_else(|| E::custom(ParseCentiError::OutOfRange(v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Centi, E> {
        let v = u64::try_from(v).map_err(|_| E::custom(ParseCentiError::Invalid(v.to_string())))?;
        self.visit_u64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Centi, E> {
        self.visit_str(&v.to_string())
    }
}

/// 日志载荷编解码错误。
#[derive(Debug, thiserror::Error)]
#[error("reading payload error: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

/// 一次电表采样（由报文解码器生成，生成后不可变）。
///
/// 类型为 `Copy`，跨组件传递时按值复制。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// 采样时间（epoch 秒）
    pub timestamp: u32,
    pub meter_id: u32,
    pub voltage: Centi,
    pub current: Centi,
    pub power: Centi,
    pub energy: Centi,
}

impl Reading {
    /// 采样时间转换为 UTC 日历时间。
    pub fn recorded_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0).unwrap_or_default()
    }

    /// 序列化为日志载荷（自描述 JSON）。
    pub fn to_payload(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 从日志载荷反序列化。
    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// 有序日志投递的记录。
///
/// partition/offset 由日志实现分配，核心逻辑不解释其含义。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub published_at_ms: i64,
}
