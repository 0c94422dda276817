//! Error taxonomy for the enrichment pipeline.
//!
//! Per-record errors (`ParseError`, `NotFoundError`, `VolumeOverflowError`,
//! `DeliveryError`) are
//! governed by the configured policies; `PriceFetchError` always fails the
//! batch. `PipelineError` is what the orchestrator returns for a failed run.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Which part of a raw row could not be turned into a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    TooFewFields,
    MalformedRow,
    InvalidTimestamp,
    InvalidSymbolField,
    InvalidAmountField,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::TooFewFields => "too_few_fields",
            ParseErrorKind::MalformedRow => "malformed_row",
            ParseErrorKind::InvalidTimestamp => "invalid_timestamp",
            ParseErrorKind::InvalidSymbolField => "invalid_symbol_field",
            ParseErrorKind::InvalidAmountField => "invalid_amount_field",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The quote service could not deliver a usable price batch.
#[derive(Debug, Error)]
pub enum PriceFetchError {
    #[error("quote request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("quote service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode quote response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("price not found for symbol {symbol}")]
pub struct NotFoundError {
    pub symbol: String,
}

/// `amount × unit_price` does not fit in a `Decimal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("volume overflow for symbol {symbol}: {amount} x {unit_price}")]
pub struct VolumeOverflowError {
    pub symbol: String,
    pub amount: Decimal,
    pub unit_price: Decimal,
}

/// A single record could not be handed to a sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("broker transport error: {0}")]
    Transport(String),

    #[error("sink rejected record: {0}")]
    Rejected(String),

    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    /// Transport and io failures may clear up on a later attempt; rejections won't.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transport(_) | DeliveryError::Io(_))
    }
}

impl From<redis::RedisError> for DeliveryError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            DeliveryError::Transport(err.to_string())
        } else {
            DeliveryError::Rejected(err.to_string())
        }
    }
}

/// The symbol/provider-id table is unusable.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("symbol {0} is mapped more than once")]
    DuplicateSymbol(String),

    #[error("provider id {provider_id} is claimed by both {first} and {second}")]
    DuplicateProviderId {
        provider_id: String,
        first: String,
        second: String,
    },

    #[error("empty symbol or provider id in mapping")]
    EmptyEntry,

    #[error("could not read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse mapping file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal outcome of an enrichment run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read input stream: {0}")]
    Read(#[source] csv::Error),

    #[error("row at line {line} rejected: {source}")]
    Parse {
        line: u64,
        #[source]
        source: ParseError,
    },

    #[error("price loading failed: {0}")]
    PriceFetch(#[from] PriceFetchError),

    #[error(transparent)]
    PriceNotFound(#[from] NotFoundError),

    #[error(transparent)]
    VolumeOverflow(#[from] VolumeOverflowError),

    #[error("input reader task failed: {0}")]
    ReaderTask(#[from] tokio::task::JoinError),

    #[error("failed to serialize transaction: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_names_kind() {
        let err = ParseError::new(ParseErrorKind::InvalidTimestamp, "bad input");
        assert_eq!(err.to_string(), "invalid_timestamp: bad input");
    }

    #[test]
    fn test_delivery_error_transience() {
        assert!(DeliveryError::Transport("reset".into()).is_transient());
        assert!(DeliveryError::Io(std::io::Error::other("disk")).is_transient());
        assert!(!DeliveryError::Rejected("WRONGTYPE".into()).is_transient());
    }

    #[test]
    fn test_volume_overflow_message() {
        let err = VolumeOverflowError {
            symbol: "BTC".to_string(),
            amount: Decimal::MAX,
            unit_price: Decimal::TWO,
        };
        assert!(err.to_string().starts_with("volume overflow for symbol BTC"));
    }

    #[test]
    fn test_not_found_message() {
        let err = NotFoundError {
            symbol: "DOGE".to_string(),
        };
        assert_eq!(err.to_string(), "price not found for symbol DOGE");
    }
}
