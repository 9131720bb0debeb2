//! Error types for the generation engine.

use thiserror::Error;

/// Errors a generation call can return.
///
/// Placement shortfalls are not errors: a complex with fewer
/// regions than requested is a successful result and is reported through
/// the observer instead.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A request parameter failed validation at the call boundary.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Not a single region could be placed, so there is no entrance.
    #[error("no {what} could be placed on a {width}x{height} grid")]
    EmptyLayout { what: &'static str, width: usize, height: usize },

    /// Stored data could not be decoded.
    #[error("failed to decode cached value: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GenerationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        GenerationError::InvalidParameter { name, reason: reason.into() }
    }
}

/// Errors while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] GenerationError),
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;

/// Reject non-positive sizes.
pub(crate) fn ensure_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(GenerationError::invalid(name, "must be greater than zero"));
    }
    Ok(())
}

/// Reject probabilities outside [0, 1] (and NaN).
pub(crate) fn ensure_unit(name: &'static str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(GenerationError::invalid(name, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

/// Reject empty or inverted ranges.
pub(crate) fn ensure_range<T: PartialOrd + std::fmt::Display>(name: &'static str, min: T, max: T) -> Result<()> {
    if min > max {
        return Err(GenerationError::invalid(name, format!("empty range {min}..={max}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_helpers() {
        assert!(ensure_positive("size", 0).is_err());
        assert!(ensure_positive("size", 1).is_ok());
        assert!(ensure_unit("p", 1.5).is_err());
        assert!(ensure_unit("p", f32::NAN).is_err());
        assert!(ensure_unit("p", 0.0).is_ok());
        assert!(ensure_range("rooms", 5, 4).is_err());
        assert!(ensure_range("rooms", 4, 4).is_ok());
    }

    #[test]
    fn test_error_messages_name_the_parameter() {
        let err = GenerationError::invalid("chunk_size", "must be greater than zero");
        assert_eq!(err.to_string(), "invalid parameter `chunk_size`: must be greater than zero");
    }
}
