use std::path::PathBuf;

use twitchbridge_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A field failed validation.
    #[error("{field} expects {expected}. observed={observed}")]
    Invalid {
        field: String,
        expected: String,
        observed: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is syntactically invalid or a field has the wrong type.
    #[error("failed to parse config: {message}")]
    Parse { message: String },

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid(
        field: impl Into<String>,
        expected: impl Into<String>,
        observed: impl std::fmt::Display,
    ) -> Self {
        Self::Invalid {
            field: field.into(),
            expected: expected.into(),
            observed: observed.to_string(),
        }
    }

    #[must_use]
    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::Parse {
            message: message.to_string(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

twitchbridge_common::impl_context!();
