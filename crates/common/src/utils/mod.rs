/// 工具函数集合

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::{Error, Result};

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 根据时间戳生成快照名称，精确到纳秒
pub fn snapshot_name(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%S%.9fZ").to_string()
}

/// 解析时长字符串
///
/// 语法与 Go 的 `time.ParseDuration` 一致：由若干 `数字[.小数]单位` 组成，
/// 单位支持 ns、us（µs）、ms、s、m、h，例如 "300ms"、"2s"、"1h30m"、"1.5h"。
/// 负数时长视为无效。
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || Error::InvalidArgument(format!("invalid duration {:?}", text));

    let mut rest = text.strip_prefix('+').unwrap_or(text);
    if rest.starts_with('-') {
        return Err(Error::InvalidArgument(format!(
            "negative duration {:?}",
            text
        )));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_digits = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_digits = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_digits = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = unit_nanos(&rest[..unit_len]).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown unit {:?} in duration {:?}",
                &rest[..unit_len],
                text
            ))
        })?;
        rest = &rest[unit_len..];

        let int_value: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid())?
        };
        total = int_value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;

        // 小数部分最多保留 18 位
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        if !frac_digits.is_empty() {
            let frac_value: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            total = total
                .checked_add(frac_value * unit / scale)
                .ok_or_else(invalid)?;
        }
    }

    if total > u64::MAX as u128 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(total as u64))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}
