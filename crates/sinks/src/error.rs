use twitchbridge_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    HomeAssistant(#[from] twitchbridge_homeassistant::Error),

    #[error("{field} {value} is not a usable port")]
    InvalidPort { field: &'static str, value: u32 },

    #[error("datagram send failed for all {hosts} host(s); last error: {last}")]
    AllHostsFailed { hosts: usize, last: std::io::Error },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
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
