//! Enumerated task field values.

use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// The task still needs action (default).
    #[default]
    NeedsAction,
    /// The task is being worked on.
    InProcess,
    /// The task has been completed.
    Completed,
    /// The task was cancelled.
    Cancelled,
}

impl Status {
    /// Decode a stored status code.
    ///
    /// # Errors
    ///
    /// Returns the offending value if it is not a valid status code.
    pub const fn from_i64(value: i64) -> Result<Self, InvalidStatus> {
        match value {
            0 => Ok(Self::NeedsAction),
            1 => Ok(Self::InProcess),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Cancelled),
            other => Err(InvalidStatus(other)),
        }
    }

    /// The stored status code.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::NeedsAction => 0,
            Self::InProcess => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
        }
    }

    /// Whether this is a terminal state (completed or cancelled).
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Error when an invalid status code is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStatus(pub i64);

impl std::fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid status: {} (must be 0-3)", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

/// Task classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Publicly visible.
    Public,
    /// Private.
    Private,
    /// Confidential.
    Confidential,
}

impl Classification {
    /// Decode a stored classification code.
    ///
    /// # Errors
    ///
    /// Returns the offending value if it is not a valid code.
    pub const fn from_i64(value: i64) -> Result<Self, InvalidClassification> {
        match value {
            0 => Ok(Self::Public),
            1 => Ok(Self::Private),
            2 => Ok(Self::Confidential),
            other => Err(InvalidClassification(other)),
        }
    }

    /// The stored classification code.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Public => 0,
            Self::Private => 1,
            Self::Confidential => 2,
        }
    }
}

/// Error when an invalid classification code is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidClassification(pub i64);

impl std::fmt::Display for InvalidClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid classification: {} (must be 0-2)", self.0)
    }
}

impl std::error::Error for InvalidClassification {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_roundtrip() {
        for code in 0..4 {
            assert_eq!(Status::from_i64(code).unwrap().as_i64(), code);
        }
        assert!(Status::from_i64(4).is_err());
        assert!(Status::from_i64(-1).is_err());
    }

    #[test]
    fn test_status_closed() {
        assert!(!Status::NeedsAction.is_closed());
        assert!(!Status::InProcess.is_closed());
        assert!(Status::Completed.is_closed());
        assert!(Status::Cancelled.is_closed());
    }

    #[test]
    fn test_classification_codes_roundtrip() {
        for code in 0..3 {
            assert_eq!(Classification::from_i64(code).unwrap().as_i64(), code);
        }
        assert!(Classification::from_i64(3).is_err());
    }
}
