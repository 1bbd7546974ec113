//! 电表报文编解码
//!
//! 定长 20 字节，字段紧密排列、无填充，全部小端：
//!
//! ```text
//! [0:4)   timestamp u32
//! [4:8)   meter_id  u32
//! [8:10)  voltage   u16 (÷100)
//! [10:12) current   u16 (÷100)
//! [12:16) power     u32 (÷100)
//! [16:20) energy    u32 (÷100)
//! ```

use crate::error::DecodeError;
use domain::{Centi, Reading};

/// 报文定长
pub const PACKET_LEN: usize = 20;

/// 解码一个报文。
///
/// 只校验长度，不做业务校验（例如 meter_id 为 0 也照常解码）。
/// 超出 20 字节的部分被忽略。
pub fn decode(buf: &[u8]) -> Result<Reading, DecodeError> {
    if buf.len() < PACKET_LEN {
        return Err(DecodeError::TruncatedPacket {
            expected: PACKET_LEN,
            actual: buf.len(),
        });
    }
    Ok(Reading {
        timestamp: read_u32(buf, 0),
        meter_id: read_u32(buf, 4),
        voltage: Centi::from(read_u16(buf, 8)),
        current: Centi::from(read_u16(buf, 10)),
        power: Centi::from_raw(read_u32(buf, 12)),
        energy: Centi::from_raw(read_u32(buf, 16)),
    })
}

/// 按线上布局编码（电压 / 电流超出 u16 时截断为 u16::MAX）。
pub fn encode(reading: &Reading) -> [u8; PACKET_LEN] {
    let mut buf = [0u8; PACKET_LEN];
    buf[0..4].copy_from_slice(&reading.timestamp.to_le_bytes());
    buf[4..8].copy_from_slice(&reading.meter_id.to_le_bytes());
    buf[8..10].copy_from_slice(&saturate_u16(reading.voltage).to_le_bytes());
    buf[10..12].copy_from_slice(&saturate_u16(reading.current).to_le_bytes());
    buf[12..16].copy_from_slice(&reading.power.raw().to_le_bytes());
    buf[16..20].copy_from_slice(&reading.energy.raw().to_le_bytes());
    buf
}

// 调用方已保证 buf.len() >= PACKET_LEN
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn saturate_u16(value: Centi) -> u16 {
    u16::try_from(value.raw()).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_LEN);
        buf.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&23050u16.to_le_bytes());
        buf.extend_from_slice(&1050u16.to_le_bytes());
        buf.extend_from_slice(&500_000u32.to_le_bytes());
        buf.extend_from_slice(&1_000_000u32.to_le_bytes());
        buf
    }

    #[test]
    fn decode_recovers_all_fields() {
        let reading = decode(&sample_bytes()).expect("decode");
        assert_eq!(reading.timestamp, 1_700_000_000);
        assert_eq!(reading.meter_id, 42);
        assert_eq!(reading.voltage.to_string(), "230.50");
        assert_eq!(reading.current.to_string(), "10.50");
        assert_eq!(reading.power.to_string(), "5000.00");
        assert_eq!(reading.energy.to_string(), "10000.00");
    }

    #[test]
    fn decode_rejects_every_short_length() {
        let bytes = sample_bytes();
        for len in 0..PACKET_LEN {
            let err = decode(&bytes[..len]).expect_err("truncated");
            assert_eq!(
                err,
                DecodeError::TruncatedPacket {
                    expected: PACKET_LEN,
                    actual: len,
                }
            );
        }
    }

    #[test]
    fn decode_rejects_sixteen_bytes() {
        // 只检查 16 字节会越界读取 energy 字段
        let bytes = sample_bytes();
        assert!(matches!(
            decode(&bytes[..16]),
            Err(DecodeError::TruncatedPacket { actual: 16, .. })
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(&[0xff; 7]);
        let reading = decode(&bytes).expect("decode");
        assert_eq!(reading.meter_id, 42);
        assert_eq!(reading.energy, Centi::from_raw(1_000_000));
    }

    #[test]
    fn decode_passes_through_zero_meter_and_extremes() {
        let mut bytes = vec![0u8; PACKET_LEN];
        bytes[8..10].copy_from_slice(&u16::MAX.to_le_bytes());
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        let reading = decode(&bytes).expect("decode");
        assert_eq!(reading.meter_id, 0);
        assert_eq!(reading.voltage.to_string(), "655.35");
        assert_eq!(reading.power.to_string(), "42949672.95");
    }

    #[test]
    fn encode_matches_wire_layout() {
        let reading = decode(&sample_bytes()).expect("decode");
        assert_eq!(encode(&reading).as_slice(), sample_bytes().as_slice());
    }
}
