use serde_json::Value;

/// Parses a loosely typed amount into a finite number.
///
/// Accepts JSON numbers and numeric strings such as `"1,250.00"` or `"$300"`.
/// Returns `None` for anything else, including NaN and infinities.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_amount_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let cleaned: String = unsigned.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Lenient amount coercion: unparsable values become 0.0 and negatives are clamped to 0.0.
pub fn coerce_amount(value: &Value) -> f64 {
    parse_amount(value).map(sanitize_amount).unwrap_or(0.0)
}

/// Clamps an already typed amount: non-finite and negative values become 0.0.
pub fn sanitize_amount(value: f64) -> f64 {
    safe_number(value).max(0.0)
}

/// Replaces non-finite values with 0.0.
pub fn safe_number(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
