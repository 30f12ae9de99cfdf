use thiserror::Error;

/// Errors raised while loading or validating engine configuration.
///
/// Detection itself never fails on data; only configuration can be rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A key carried a value that could not be interpreted.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Environment key or field name.
        key: String,
        /// The offending raw value.
        value: String,
    },

    /// Unknown price level / rating / mode name.
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// Timezone name not present in the IANA database.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Structurally invalid configuration (zero durations, unordered thresholds).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}
