//! Scalar building blocks shared across function payloads.

use serde::{Deserialize, Serialize};

/// A number with a decimal scale: the represented value is
/// `number * 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledNumber {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<i16>,
}

impl ScaledNumber {
    pub fn new(number: i64) -> Self {
        Self {
            number: Some(number),
            scale: None,
        }
    }

    pub fn with_scale(number: i64, scale: i16) -> Self {
        Self {
            number: Some(number),
            scale: Some(scale),
        }
    }

    pub fn value(&self) -> f64 {
        let number = self.number.unwrap_or(0) as f64;
        let scale = self.scale.unwrap_or(0);
        number * 10f64.powi(scale as i32)
    }
}

/// Interval between two timestamps, used by evaluation periods.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampInterval {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Outcome of an acknowledged operation. `error_number` 0 means success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResultData {
    pub fn success() -> Self {
        Self {
            error_number: Some(0),
            description: None,
        }
    }

    pub fn error(error_number: u32, description: impl Into<String>) -> Self {
        Self {
            error_number: Some(error_number),
            description: Some(description.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_number.unwrap_or(0) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_number_value() {
        assert_eq!(ScaledNumber::with_scale(2300, -3).value(), 2.3);
        assert_eq!(ScaledNumber::new(5).value(), 5.0);
    }
}
