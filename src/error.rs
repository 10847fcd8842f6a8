use rust_decimal::Decimal;
use thiserror::Error;

/// Failure of a call against the venue command client.
///
/// `Timeout` and `Transport` say nothing about whether the remote action took
/// effect; callers must leave local state unresolved until the venue feed
/// reports the outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VenueError {
    #[error("rejected by venue: {0}")]
    Rejected(String),

    #[error("venue call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("order not found on venue")]
    NotFound,

    #[error("order already in a terminal state")]
    AlreadyTerminal,

    #[error("failed to decode venue response: {0}")]
    Decode(String),
}

impl VenueError {
    /// True when the remote outcome of the call is unknown.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, VenueError::Timeout | VenueError::Transport(_))
    }

    /// True when a cancel error means the order is no longer resting.
    pub fn means_gone(&self) -> bool {
        matches!(self, VenueError::NotFound | VenueError::AlreadyTerminal)
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VenueError::Timeout
        } else if e.is_decode() {
            VenueError::Decode(e.to_string())
        } else {
            VenueError::Transport(e.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for VenueError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        VenueError::Timeout
    }
}

/// Why no quote could be produced this cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("no price yet for reference {0}")]
    MissingReference(String),

    #[error("reference {0} has a zero price")]
    ZeroReference(String),

    #[error("quote price {0} is not positive")]
    NonPositiveQuote(Decimal),
}

/// Why a streaming session (price feed or venue order feed) ended.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid handshake header: {0}")]
    Header(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("downstream channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type VenueResult<T> = Result<T, VenueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_outcome_classification() {
        assert!(VenueError::Timeout.is_unknown_outcome());
        assert!(VenueError::Transport("reset".into()).is_unknown_outcome());
        assert!(!VenueError::Rejected("px".into()).is_unknown_outcome());
        assert!(!VenueError::NotFound.is_unknown_outcome());
    }

    #[test]
    fn gone_classification() {
        assert!(VenueError::NotFound.means_gone());
        assert!(VenueError::AlreadyTerminal.means_gone());
        assert!(!VenueError::Timeout.means_gone());
    }
}
