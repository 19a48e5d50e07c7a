//! Error types for flimkit-core.

use thiserror::Error;

/// Result type alias for flimkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for phasor pipeline operations.
///
/// Per-pixel numerical degeneracies (zero photon counts, out-of-domain
/// radicands) are never reported here; they surface as NaN in the output
/// arrays instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Wrong array dimensionality or mismatched array shapes.
    #[error("input shape error: {0}")]
    InputShape(String),

    /// Invalid parameter value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Degenerate reference data or invalid calibration parameters.
    #[error("calibration error: {0}")]
    Calibration(String),
}

impl Error {
    /// Builds an [`Error::InputShape`] for two arrays that must share a shape.
    #[must_use]
    pub fn shape_mismatch(what: &str, left: &[usize], right: &[usize]) -> Self {
        Self::InputShape(format!("{what}: shapes {left:?} and {right:?} differ"))
    }

    /// Builds an [`Error::InputShape`] for an array with the wrong number of axes.
    #[must_use]
    pub fn wrong_ndim(what: &str, expected: usize, found: usize) -> Self {
        Self::InputShape(format!(
            "{what}: expected {expected}-D array, found {found}-D"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::wrong_ndim("raw signal", 3, 2);
        assert_eq!(
            err.to_string(),
            "input shape error: raw signal: expected 3-D array, found 2-D"
        );

        let err = Error::shape_mismatch("phasor", &[2, 3], &[3, 2]);
        assert!(err.to_string().contains("[2, 3]"));
        assert!(matches!(err, Error::InputShape(_)));
    }
}
