//! Error types and validation functions for series preparation.
//!
//! Structural misuse of the API (empty series, broken time index, log of a
//! non-positive price, applying a transform that was never searched for) is
//! reported through [`SeriesPrepError`]. Statistical routines degrade instead
//! of failing: an undefined statistic votes "not an outlier", a series too
//! short to split stays a single regime, and a hypothesis test that cannot be
//! computed is recorded as a [`crate::stationarity_tests::TestOutcome`].

use thiserror::Error;

/// Error types for series preparation operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SeriesPrepError {
    /// Input violates a structural precondition.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: String,
    },

    /// Insufficient data for the requested operation.
    #[error("Not enough observations: {actual} given, {required} required")]
    InsufficientData {
        /// Observations the operation needs
        required: usize,
        /// Observations available
        actual: usize,
    },

    /// Invalid parameter value in a stage configuration.
    #[error("Parameter {parameter} = {value} is outside {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Offending value
        value: f64,
        /// Accepted range
        constraint: String,
    },

    /// Numerical computation failed.
    #[error("Numerical failure: {reason}")]
    NumericalError {
        /// What went wrong
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },

    /// A stage was invoked before the state it depends on was resolved.
    #[error("Invalid call order: {reason}")]
    StateError {
        /// Which precondition was missing
        reason: String,
    },

    /// Named series was not found.
    #[error("No series loaded for ticker {name}")]
    SeriesNotFound {
        /// Name of the series that was not found
        name: String,
    },
}

impl SeriesPrepError {
    /// Shorthand for [`SeriesPrepError::InvalidInput`].
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`SeriesPrepError::NumericalError`] tagged with an operation.
    pub fn numerical(reason: impl Into<String>, operation: &str) -> Self {
        Self::NumericalError {
            reason: reason.into(),
            operation: Some(operation.to_string()),
        }
    }
}

/// Result type for series preparation operations.
pub type PrepResult<T> = Result<T, SeriesPrepError>;

/// Require at least `min_required` observations.
///
/// # Example
/// ```rust
/// use series_prep::errors::validate_data_length;
///
/// let closes = [101.2, 100.8, 102.5];
/// assert!(validate_data_length(&closes, 3).is_ok());
/// assert!(validate_data_length(&closes, 4).is_err());
/// ```
pub fn validate_data_length(data: &[f64], min_required: usize) -> PrepResult<()> {
    if data.len() < min_required {
        Err(SeriesPrepError::InsufficientData {
            required: min_required,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is within inclusive bounds.
///
/// # Example
/// ```rust
/// use series_prep::errors::validate_parameter;
///
/// assert!(validate_parameter(0.5, 0.0, 1.0, "threshold").is_ok());
/// assert!(validate_parameter(f64::NAN, 0.0, 1.0, "threshold").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> PrepResult<()> {
    if value.is_nan() {
        return Err(SeriesPrepError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "the non-NaN reals".to_string(),
        });
    }

    if min > max {
        return Err(SeriesPrepError::NumericalError {
            reason: format!(
                "bounds for {} are inverted: {} > {}",
                name, min, max
            ),
            operation: None,
        });
    }

    if value < min || value > max {
        Err(SeriesPrepError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Reject NaN and infinite observations.
///
/// Returns on the first offending value, naming its index.
pub fn validate_all_finite(data: &[f64], name: &str) -> PrepResult<()> {
    if let Some((i, value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        let value_desc = match (value.is_nan(), value.is_sign_positive()) {
            (true, _) => "NaN",
            (false, true) => "Infinity",
            (false, false) => "-Infinity",
        };

        return Err(SeriesPrepError::InvalidInput {
            reason: format!(
                "{} has {} at index {}",
                name, value_desc, i
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_reports_counts() {
        match validate_data_length(&[4.0, 2.0], 5) {
            Err(SeriesPrepError::InsufficientData { required, actual }) => {
                assert_eq!(required, 5);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected InsufficientData error, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_minimum_length_passes() {
        assert!(validate_data_length(&[0.5; 3], 3).is_ok());
    }

    #[test]
    fn test_validate_parameter_out_of_range() {
        let result = validate_parameter(1.5, 0.0, 1.0, "multiplier");
        match result {
            Err(SeriesPrepError::InvalidParameter { parameter, .. }) => {
                assert_eq!(parameter, "multiplier");
            }
            other => panic!("Expected InvalidParameter error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_parameter_inverted_bounds() {
        assert!(matches!(
            validate_parameter(0.5, 1.0, 0.0, "x"),
            Err(SeriesPrepError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_validate_all_finite_reports_index() {
        let data = vec![1.0, 2.0, f64::NEG_INFINITY];
        match validate_all_finite(&data, "prices") {
            Err(SeriesPrepError::InvalidInput { reason }) => {
                assert!(reason.contains("index 2"));
                assert!(reason.contains("-Infinity"));
            }
            other => panic!("Expected InvalidInput error, got {:?}", other),
        }
        assert!(validate_all_finite(&[], "empty").is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = SeriesPrepError::StateError {
            reason: "search has not run".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid call order: search has not run");
    }
}
