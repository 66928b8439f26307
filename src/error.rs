use core::fmt;

/// Result alias for `basc`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by resampling, clustering and stability primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Paired inputs disagree on shape (string description).
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of units available.
        n_items: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A unit time course has zero variance and the caller asked for rejection.
    DegenerateInput {
        /// Index of the offending unit.
        unit: usize,
    },

    /// Generic error with message.
    Other(String),
}

impl Error {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::InvalidShape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::InvalidShape { expected, actual } => {
                write!(f, "invalid shape: expected {expected}, actual {actual}")
            }
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} units")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::DegenerateInput { unit } => {
                write!(f, "unit {unit} has a zero-variance time course")
            }
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = Error::InvalidClusterCount {
            requested: 5,
            n_items: 3,
        };
        assert_eq!(e.to_string(), "cannot create 5 clusters from 3 units");

        let e = Error::shape("10 time points", "8 time points");
        assert_eq!(
            e.to_string(),
            "invalid shape: expected 10 time points, actual 8 time points"
        );

        let e = Error::DegenerateInput { unit: 4 };
        assert!(e.to_string().contains("unit 4"));
    }
}
