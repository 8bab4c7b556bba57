//! Kubernetes resource quantity parsing
//!
//! Converts quantity strings such as `500m`, `2`, `1.5Gi` or `1e3` into
//! integral CPU millicores and memory bytes. Fractional results are rounded
//! up, matching how the orchestrator rounds requests.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Errors produced while parsing a quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity number in {0:?}")]
    InvalidNumber(String),

    #[error("unknown quantity suffix {suffix:?} in {value:?}")]
    UnknownSuffix { value: String, suffix: String },

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millis(quantity: &Quantity) -> Result<i64, QuantityError> {
    parse_scaled(&quantity.0, 1000.0)
}

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(quantity: &Quantity) -> Result<i64, QuantityError> {
    parse_scaled(&quantity.0, 1.0)
}

/// Parse a raw quantity string and multiply by `scale` before rounding up
pub fn parse_scaled(raw: &str, scale: f64) -> Result<i64, QuantityError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidNumber(value.to_string()))?;
    let multiplier = suffix_multiplier(value, suffix)?;

    let product = number * multiplier * scale;
    // absorb float noise from decimal suffixes before rounding up
    let nearest = product.round();
    let scaled = if (product - nearest).abs() <= 1e-9 * nearest.abs().max(1.0) {
        nearest
    } else {
        product.ceil()
    };
    if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
        return Err(QuantityError::OutOfRange(value.to_string()));
    }
    Ok(scaled as i64)
}

fn suffix_multiplier(value: &str, suffix: &str) -> Result<f64, QuantityError> {
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Pi" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Ei" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => {
            // decimal exponent form, e.g. 1e3 or 5E-2
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))
                .and_then(|e| e.parse::<i32>().ok());
            match exponent {
                Some(exp) => 10f64.powi(exp),
                None => {
                    return Err(QuantityError::UnknownSuffix {
                        value: value.to_string(),
                        suffix: suffix.to_string(),
                    })
                }
            }
        }
    };
    Ok(multiplier)
}
