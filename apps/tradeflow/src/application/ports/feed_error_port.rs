//! Feed Error Port
//!
//! Connectors hit non-fatal problems while streaming: a price that does not
//! parse, a frame with an unexpected shape, a socket the server closed.
//! None of these stop the pipeline. They are reported through an
//! [`ErrorReporter`], whose receiving side the pipeline drains, logs and
//! counts.

use tokio::sync::mpsc;

/// Receiving side of the feed error channel.
pub type FeedErrorReceiver = mpsc::UnboundedReceiver<FeedError>;

/// What went wrong on a feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedErrorKind {
    /// A numeric or time field did not decode; the record carries a zero value.
    #[error("failed to decode {field} from {value:?}: {reason}")]
    Decode {
        /// Trade field that failed (e.g. `price`).
        field: &'static str,
        /// Raw value received.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// A frame could not be interpreted at all and was skipped.
    #[error("malformed message: {reason}")]
    Malformed {
        /// Error details.
        reason: String,
    },

    /// The socket failed or was closed by the exchange.
    #[error("stream interrupted: {reason}")]
    Stream {
        /// Error details.
        reason: String,
    },
}

impl FeedErrorKind {
    /// Metric label for this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Malformed { .. } => "malformed",
            Self::Stream { .. } => "stream",
        }
    }
}

/// A non-fatal error raised by a connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{exchange}: {kind}")]
pub struct FeedError {
    /// Exchange identifier.
    pub exchange: String,
    /// Error details.
    pub kind: FeedErrorKind,
}

/// Handle connectors use to report [`FeedError`]s.
///
/// Reporting never blocks. Without a receiver attached the error is logged
/// in place.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    tx: Option<mpsc::UnboundedSender<FeedError>>,
}

impl ErrorReporter {
    /// Create a reporter and the receiver that collects its errors.
    #[must_use]
    pub fn channel() -> (Self, FeedErrorReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter with no receiver; errors go straight to the log.
    #[must_use]
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Report an error for `exchange`.
    pub fn report(&self, exchange: &str, kind: FeedErrorKind) {
        let error = FeedError {
            exchange: exchange.to_owned(),
            kind,
        };

        let unsent = match &self.tx {
            Some(tx) => tx.send(error).err().map(|e| e.0),
            None => Some(error),
        };

        if let Some(error) = unsent {
            tracing::warn!(exchange = %error.exchange, kind = error.kind.label(), "{}", error.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reaches_receiver() {
        let (reporter, mut rx) = ErrorReporter::channel();
        reporter.report(
            "binance",
            FeedErrorKind::Malformed {
                reason: "missing field `p`".to_string(),
            },
        );

        let error = rx.try_recv().unwrap();
        assert_eq!(error.exchange, "binance");
        assert_eq!(error.kind.label(), "malformed");
        assert_eq!(error.to_string(), "binance: malformed message: missing field `p`");
    }

    #[test]
    fn report_without_receiver_does_not_panic() {
        let (reporter, rx) = ErrorReporter::channel();
        drop(rx);
        reporter.report(
            "coinbase",
            FeedErrorKind::Stream {
                reason: "closed".to_string(),
            },
        );
        ErrorReporter::log_only().report(
            "coinbase",
            FeedErrorKind::Stream {
                reason: "closed".to_string(),
            },
        );
    }

    #[test]
    fn decode_message_names_field_and_value() {
        let kind = FeedErrorKind::Decode {
            field: "price",
            value: "abc".to_string(),
            reason: "invalid float literal".to_string(),
        };
        assert_eq!(kind.label(), "decode");
        assert_eq!(
            kind.to_string(),
            "failed to decode price from \"abc\": invalid float literal"
        );
    }
}
