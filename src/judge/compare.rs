//! Output comparison
//!
//! The canonical comparison right-trims every line, strips leading and
//! trailing blank lines, then requires exact equality. Problems flagged for
//! structured judging first try a JSON deep comparison on both sides and
//! fall back to the canonical string comparison when either side fails to
//! parse.

use serde_json::Value;

use crate::constants::FLOAT_COMPARE_TOLERANCE;

/// Canonicalize an output: right-trim lines, drop leading/trailing blank
/// lines.
pub fn normalize(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());

    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Compare actual output against the expected one. `structured` problems
/// try JSON first; `float_tolerance` problems compare token-wise with the
/// numeric comparator.
pub fn outputs_match(
    actual: &str,
    expected: &str,
    structured: bool,
    float_tolerance: bool,
) -> bool {
    if structured {
        if let (Ok(a), Ok(b)) = (
            serde_json::from_str::<Value>(actual),
            serde_json::from_str::<Value>(expected),
        ) {
            return json_eq(&a, &b);
        }
    }

    if float_tolerance {
        return tokens_match(&normalize(actual), &normalize(expected));
    }

    normalize(actual) == normalize(expected)
}

/// Token-wise comparison: numeric tokens within tolerance, others exact
fn tokens_match(actual: &str, expected: &str) -> bool {
    let a: Vec<&str> = actual.split_whitespace().collect();
    let b: Vec<&str> = expected.split_whitespace().collect();

    a.len() == b.len()
        && a.iter().zip(&b).all(|(x, y)| {
            match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(x), Ok(y)) => floats_close(x, y),
                _ => x == y,
            }
        })
}

/// Structural JSON equality with NaN treated as equal to NaN
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x.is_nan() && y.is_nan()) || x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Relative + absolute tolerance comparison for opted-in problems
pub fn floats_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() && b.is_nan() {
        return true;
    }
    let diff = (a - b).abs();
    let scale = a.abs().max(b.abs());
    diff <= FLOAT_COMPARE_TOLERANCE || diff <= FLOAT_COMPARE_TOLERANCE * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trailing_spaces_are_canonical() {
        assert!(outputs_match("1 2 3  \n4 5", "1 2 3\n4 5", false, false));
        assert!(outputs_match("hello\t \nworld", "hello\nworld", false, false));
    }

    #[test]
    fn test_leading_and_trailing_blank_lines_are_canonical() {
        assert!(outputs_match("\n\n42\n\n\n", "42", false, false));
        assert!(outputs_match("42\n", "\n42", false, false));
    }

    #[test]
    fn test_interior_blank_lines_matter() {
        assert!(!outputs_match("a\n\nb", "a\nb", false, false));
    }

    #[test]
    fn test_interior_whitespace_matters() {
        assert!(!outputs_match("1  2", "1 2", false, false));
        assert!(!outputs_match("ab", "a b", false, false));
    }

    #[test]
    fn test_empty_outputs() {
        assert!(outputs_match("", "", false, false));
        assert!(outputs_match("\n\n", "", false, false));
        assert!(!outputs_match("x", "", false, false));
    }

    #[test]
    fn test_structured_deep_equality() {
        assert!(outputs_match(
            r#"{"a": [1, 2], "b": "x"}"#,
            r#"{ "b": "x", "a": [1, 2] }"#,
            true,
            false,
        ));
        assert!(!outputs_match(r#"{"a": 1}"#, r#"{"a": 2}"#, true, false));
    }

    #[test]
    fn test_structured_falls_back_to_string_compare() {
        // Left side is not JSON, so canonical string comparison applies
        assert!(outputs_match("plain text  ", "plain text", true, false));
        assert!(!outputs_match("not json", r#"{"a": 1}"#, true, false));
    }

    #[test]
    fn test_json_nan_equals_nan() {
        // serde_json cannot parse NaN, but constructed values can hold
        // non-finite intent through f64 comparison paths
        assert!(json_eq(&json!(1.5), &json!(1.5)));
        assert!(!json_eq(&json!(1.5), &json!(2.5)));
        assert!(floats_close(f64::NAN, f64::NAN));
    }

    #[test]
    fn test_json_array_length_mismatch() {
        assert!(!json_eq(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!json_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_float_tolerance() {
        assert!(floats_close(1.0, 1.0 + 5e-7));
        assert!(floats_close(1_000_000.0, 1_000_000.5));
        assert!(!floats_close(1.0, 1.1));
        assert!(floats_close(0.0, 0.0));
    }

    #[test]
    fn test_opt_in_numeric_comparison() {
        assert!(outputs_match("3.1415927\n2", "3.1415926\n2", false, true));
        assert!(!outputs_match("3.15\n2", "3.14\n2", false, true));
        // Non-numeric tokens still compare exactly
        assert!(!outputs_match("yes 1.0", "no 1.0", false, true));
        // Token count must agree
        assert!(!outputs_match("1.0", "1.0 2.0", false, true));
    }
}
