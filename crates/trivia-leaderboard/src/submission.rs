//! Raw client payloads and their sanitized form.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Game mode recorded when the client sends none.
pub const DEFAULT_GAME_MODE: &str = "classic";

/// Longest game mode tag kept.
pub const MAX_GAME_MODE_LEN: usize = 32;

/// Untrusted fields exactly as the client sent them.
///
/// Every field is optional and untyped; coercion happens in
/// [`RawSubmission::sanitize`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSubmission {
    pub score: JsonValue,
    pub time: JsonValue,
    pub question_count: JsonValue,
    pub correct_answers: JsonValue,
    pub longest_streak: JsonValue,
    pub power_ups_used: JsonValue,
    pub game_mode: JsonValue,
    pub started_at_ms: JsonValue,
    pub ended_at_ms: JsonValue,
}

/// A payload after numeric coercion and clamping, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub score: i64,
    pub time: i64,
    pub question_count: i64,
    pub correct_answers: i64,
    pub longest_streak: i64,
    pub power_ups_used: i64,
    pub game_mode: String,
    /// `None` when the client sent no usable number.
    pub started_at_ms: Option<i64>,
    pub ended_at_ms: Option<i64>,
}

impl RawSubmission {
    /// Read a payload. Anything that isn't a JSON object counts as empty.
    pub fn from_value(payload: &JsonValue) -> Self {
        match payload {
            JsonValue::Object(_) => serde_json::from_value(payload.clone()).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Truncate every number, zero out junk, clamp counters at zero.
    ///
    /// `questionCount` and the timestamps are not clamped; the validator
    /// rejects bad values there instead. Timestamps stay unset when the
    /// field is missing or not numeric.
    pub fn sanitize(&self) -> ScoreSubmission {
        ScoreSubmission {
            score: coerce_int(&self.score).max(0),
            time: coerce_int(&self.time).max(0),
            question_count: coerce_int(&self.question_count),
            correct_answers: coerce_int(&self.correct_answers).max(0),
            longest_streak: coerce_int(&self.longest_streak).max(0),
            power_ups_used: coerce_int(&self.power_ups_used).max(0),
            game_mode: coerce_game_mode(&self.game_mode),
            started_at_ms: coerce_timestamp(&self.started_at_ms),
            ended_at_ms: coerce_timestamp(&self.ended_at_ms),
        }
    }
}

/// `Math.trunc(Number(value))`, with non-finite results mapped to 0.
pub fn coerce_int(value: &JsonValue) -> i64 {
    match to_number(value) {
        Some(n) if n.is_finite() => n.trunc() as i64,
        _ => 0,
    }
}

/// Like [`coerce_int`], but null, blank values and non-finite results are
/// absent rather than 0.
fn coerce_timestamp(value: &JsonValue) -> Option<i64> {
    if is_blank(value) {
        return None;
    }
    to_number(value)
        .filter(|n| n.is_finite())
        .map(|n| n.trunc() as i64)
}

/// Null, or anything that stringifies to whitespace.
fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => match items.as_slice() {
            [] => true,
            [single] => is_blank(single),
            _ => false,
        },
        _ => false,
    }
}

/// JavaScript `Number(value)`. `None` stands in for NaN.
fn to_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
        JsonValue::String(s) => parse_numeric(s.trim()),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsonValue::Null => Some(0.0),
        // arrays go through their string form: [] is "", [x] is String(x)
        JsonValue::Array(items) => match items.as_slice() {
            [] | [JsonValue::Null] => Some(0.0),
            [single @ (JsonValue::Number(_) | JsonValue::String(_) | JsonValue::Array(_))] => {
                to_number(single)
            }
            _ => None,
        },
        JsonValue::Object(_) => None,
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    if s.is_empty() {
        return Some(0.0);
    }

    let radix = match s.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => 16,
        Some("0o") => 8,
        Some("0b") => 2,
        _ => return parse_decimal(s),
    };
    let digits = &s[2..];
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
    })
}

/// Decimal literal, plus the one spelled-out infinity JavaScript accepts.
fn parse_decimal(s: &str) -> Option<f64> {
    let unsigned = s.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return s.parse().ok();
    }
    if !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse().ok()
}

fn coerce_game_mode(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => {
            s.trim().chars().take(MAX_GAME_MODE_LEN).collect()
        }
        _ => DEFAULT_GAME_MODE.to_string(),
    }
}
