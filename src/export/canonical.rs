// 数值规范化 - 整数值输出一位小数（0 -> 0.0），非整数值原样输出

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serializer};

/// 将数值格式化为规范文本
///
/// # 示例
/// - `2.0` -> `"2.0"`
/// - `1.5` -> `"1.5"`
/// - `1.27` -> `"1.27"`
pub fn canonical_number(value: f64) -> String {
    let value = normalize(value);
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// 解析规范文本（也接受 `2` 这类整数写法）
pub fn parse_canonical(text: &str) -> Result<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|e| anyhow!("无效的数值 {:?}: {}", text, e))?;
    if !value.is_finite() {
        return Err(anyhow!("数值必须是有限值: {:?}", text));
    }
    Ok(normalize(value))
}

/// -0.0 统一为 0.0
fn normalize(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

/// 秒数转换为 秒.帧 记法（SS.FF）
///
/// 整数部分是秒，小数部分是帧号（30fps 时为 00-29），
/// 所以 1 秒整记为 `1.00` 而不是 `0.30`
pub fn seconds_to_frame_notation(total_seconds: f64, fps: u32) -> f64 {
    let fps = fps.max(1) as i64;
    let total_frames = (total_seconds * fps as f64).round() as i64;
    let seconds = total_frames / fps;
    let frames = total_frames % fps;
    let notation = seconds as f64 + frames as f64 / 100.0;
    (notation * 100.0).round() / 100.0
}

/// serde 辅助：序列化时保证整数值带一位小数，反序列化时接受整数或小数
pub mod serde_f64 {
    use super::*;

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // serde_json 对整数值的 f64 输出 "2.0"
        serializer.serialize_f64(normalize(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(normalize(value))
    }
}
