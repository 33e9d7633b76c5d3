//! Server-side normalization of submitted objects.
//!
//! The API server does not store objects byte-for-byte: resource quantities are
//! rewritten to their canonical form (`1024Mi` becomes `1Gi`, `0.5` becomes `500m`)
//! and empty env values are dropped. Comparing a desired object against the live one
//! only works once the desired object has been put through the same rewrite.

use serde_json::Value;

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [(i32, &str); 10] = [
    (-9, "n"),
    (-6, "u"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
    (15, "P"),
    (18, "E"),
];

/// Keys whose object values map resource names to quantities
const QUANTITY_MAPS: [&str; 4] = ["limits", "requests", "capacity", "allocatable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Binary,
    Decimal,
    Exponent,
}

/// A parsed quantity: `mantissa * 10^exponent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Parsed {
    mantissa: i128,
    exponent: i32,
    format: Format,
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn parse(input: &str) -> Option<Parsed> {
    let input = input.trim();
    let (negative, rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_len);
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut mantissa: i128 = 0;
    for digit in whole.chars().chain(fraction.chars()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i128::from(digit.to_digit(10)?))?;
    }
    let mut exponent = -i32::try_from(fraction.len()).ok()?;

    let format = if let Some(power) = BINARY_SUFFIXES.iter().skip(1).position(|s| *s == suffix) {
        let factor = 1024i128.checked_pow(u32::try_from(power + 1).ok()?)?;
        mantissa = mantissa.checked_mul(factor)?;
        Format::Binary
    } else if let Some((exp, _)) = DECIMAL_SUFFIXES.iter().find(|(_, s)| *s == suffix) {
        exponent += exp;
        Format::Decimal
    } else if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
        exponent += exp.parse::<i32>().ok()?;
        Format::Exponent
    } else {
        return None;
    };

    if negative {
        mantissa = -mantissa;
    }
    Some(Parsed {
        mantissa,
        exponent,
        format,
    })
}

/// Strip trailing zeros into the exponent
fn reduce(mut mantissa: i128, mut exponent: i32) -> (i128, i32) {
    while mantissa != 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        exponent += 1;
    }
    (mantissa, exponent)
}

fn integer_value(mantissa: i128, exponent: i32) -> Option<i128> {
    if exponent >= 0 {
        mantissa.checked_mul(pow10(u32::try_from(exponent).ok()?)?)
    } else {
        let divisor = pow10(exponent.unsigned_abs())?;
        (mantissa % divisor == 0).then(|| mantissa / divisor)
    }
}

fn format_binary(value: i128) -> String {
    let mut power = 0;
    let mut scaled = value;
    while power + 1 < BINARY_SUFFIXES.len() && scaled % 1024 == 0 {
        scaled /= 1024;
        power += 1;
    }
    format!("{scaled}{}", BINARY_SUFFIXES[power])
}

/// Largest exponent that is a multiple of three, within the SI suffix range, with an
/// integral mantissa. Values finer than nano are rounded up.
fn scale_decimal(mantissa: i128, exponent: i32) -> Option<(i128, i32)> {
    if exponent < -9 {
        let divisor = pow10((-9 - exponent).unsigned_abs())?;
        let rounded = mantissa / divisor + i128::from(mantissa % divisor > 0);
        return Some((rounded, -9));
    }
    let scaled = (exponent.div_euclid(3) * 3).min(18);
    let mantissa = mantissa.checked_mul(pow10((exponent - scaled).unsigned_abs())?)?;
    Some((mantissa, scaled))
}

/// Canonical form of a resource quantity, or `None` when it cannot be parsed
pub fn canonical_quantity(input: &str) -> Option<String> {
    let parsed = parse(input)?;
    let (mantissa, exponent) = reduce(parsed.mantissa, parsed.exponent);
    if mantissa == 0 {
        return Some("0".to_string());
    }

    if parsed.format == Format::Binary {
        // Small or fractional binary values are shown in decimal form to avoid rounding
        if let Some(value) = integer_value(mantissa, exponent).filter(|v| v.abs() >= 1024) {
            return Some(format_binary(value));
        }
    }

    let (mantissa, exponent) = scale_decimal(mantissa, exponent)?;
    if parsed.format == Format::Exponent {
        return Some(if exponent == 0 {
            mantissa.to_string()
        } else {
            format!("{mantissa}e{exponent}")
        });
    }
    let suffix = DECIMAL_SUFFIXES
        .iter()
        .find(|(exp, _)| *exp == exponent)
        .map(|(_, s)| *s)?;
    Some(format!("{mantissa}{suffix}"))
}

fn normalize_env(entries: &mut [Value]) {
    for entry in entries {
        if let Some(entry) = entry.as_object_mut() {
            if entry.get("value").and_then(Value::as_str) == Some("") {
                entry.remove("value");
            }
        }
    }
}

fn normalize_quantities(map: &mut serde_json::Map<String, Value>) {
    for value in map.values_mut() {
        if let Some(canonical) = value.as_str().and_then(canonical_quantity) {
            *value = Value::String(canonical);
        }
    }
}

/// Rewrite an object document the way the API server stores it
pub fn normalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match (key.as_str(), &mut *child) {
                    ("env", Value::Array(entries)) => normalize_env(entries),
                    (key, Value::Object(quantities)) if QUANTITY_MAPS.contains(&key) => {
                        normalize_quantities(quantities);
                    }
                    _ => {}
                }
                normalize(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binary_quantities_take_the_largest_suffix() {
        assert_eq!(canonical_quantity("1024Mi").as_deref(), Some("1Gi"));
        assert_eq!(canonical_quantity("1536Mi").as_deref(), Some("1536Mi"));
        assert_eq!(canonical_quantity("0.5Gi").as_deref(), Some("512Mi"));
        assert_eq!(canonical_quantity("2048Ki").as_deref(), Some("2Mi"));
    }

    #[test]
    fn test_small_binary_quantities_become_decimal() {
        assert_eq!(canonical_quantity("0.5Ki").as_deref(), Some("512"));
        assert_eq!(canonical_quantity("1Ki").as_deref(), Some("1Ki"));
    }

    #[test]
    fn test_decimal_quantities() {
        assert_eq!(canonical_quantity("1000").as_deref(), Some("1k"));
        assert_eq!(canonical_quantity("1500").as_deref(), Some("1500"));
        assert_eq!(canonical_quantity("0.5").as_deref(), Some("500m"));
        assert_eq!(canonical_quantity("1.5G").as_deref(), Some("1500M"));
        assert_eq!(canonical_quantity("100m").as_deref(), Some("100m"));
        assert_eq!(canonical_quantity("0").as_deref(), Some("0"));
    }

    #[test]
    fn test_exponent_quantities() {
        assert_eq!(canonical_quantity("1e3").as_deref(), Some("1e3"));
        assert_eq!(canonical_quantity("10e2").as_deref(), Some("1e3"));
    }

    #[test]
    fn test_unparseable_quantity() {
        assert_eq!(canonical_quantity("lots"), None);
        assert_eq!(canonical_quantity("1Qi"), None);
    }

    #[test]
    fn test_normalize_rewrites_containers() {
        let mut pod = json!({
            "spec": {"containers": [{
                "name": "tools",
                "env": [{"name": "EMPTY", "value": ""}, {"name": "SET", "value": "x"}],
                "resources": {"limits": {"memory": "1024Mi"}, "requests": {"cpu": "0.5"}}
            }]}
        });
        normalize(&mut pod);
        assert_eq!(
            pod,
            json!({
                "spec": {"containers": [{
                    "name": "tools",
                    "env": [{"name": "EMPTY"}, {"name": "SET", "value": "x"}],
                    "resources": {"limits": {"memory": "1Gi"}, "requests": {"cpu": "500m"}}
                }]}
            })
        );
    }
}
