// Shared models for txflow services
use crate::error::VolumeOverflowError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Layout of the timestamp column on input and of `timestamp` on output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ============================================================================
// Transaction
// ============================================================================

/// One financial event read from the input batch.
///
/// `amount` is denominated in the asset named by `symbol`. `volume_quote` is
/// the same quantity expressed in the quote currency and stays `None` until
/// [`Transaction::enrich`] has been applied with that symbol's unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "fixed_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub volume_quote: Option<Decimal>,
}

impl Transaction {
    pub fn new(
        timestamp: DateTime<Utc>,
        project_id: impl Into<String>,
        symbol: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            timestamp,
            project_id: project_id.into(),
            symbol: symbol.into(),
            amount,
            volume_quote: None,
        }
    }

    /// Price the transaction. Consumes the unenriched value so a record can
    /// only be enriched once.
    pub fn enrich(self, unit_price: Decimal) -> Result<Self, VolumeOverflowError> {
        let volume_quote = self
            .amount
            .checked_mul(unit_price)
            .ok_or_else(|| VolumeOverflowError {
                symbol: self.symbol.clone(),
                amount: self.amount,
                unit_price,
            })?;
        Ok(Self {
            volume_quote: Some(volume_quote),
            ..self
        })
    }

    pub fn is_enriched(&self) -> bool {
        self.volume_quote.is_some()
    }
}

// ============================================================================
// Outgoing record
// ============================================================================

/// Wire shape handed to the sink for an enriched transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(with = "fixed_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub volume_quote: Decimal,
    pub quote_currency: String,
}

impl EnrichedRecord {
    /// Build the outgoing record. Returns `None` for a transaction that was
    /// never enriched.
    pub fn from_transaction(tx: &Transaction, quote_currency: &str) -> Option<Self> {
        let volume_quote = tx.volume_quote?;
        Some(Self {
            timestamp: tx.timestamp,
            project_id: tx.project_id.clone(),
            symbol: tx.symbol.clone(),
            amount: tx.amount,
            volume_quote,
            quote_currency: quote_currency.to_string(),
        })
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Serde adapter keeping timestamps in the fixed `YYYY-MM-DD HH:MM:SS.mmm` layout.
pub mod fixed_timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> chrono::ParseResult<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Transaction {
        let ts = fixed_timestamp::parse("2023-01-01 10:00:00.000").unwrap();
        Transaction::new(ts, "p1", "BTC", dec!(2.5))
    }

    #[test]
    fn test_new_transaction_is_unenriched() {
        let tx = sample();
        assert!(!tx.is_enriched());
        assert!(EnrichedRecord::from_transaction(&tx, "usd").is_none());
    }

    #[test]
    fn test_enrich_multiplies_exactly() {
        let tx = sample().enrich(dec!(20000)).unwrap();
        assert_eq!(tx.volume_quote, Some(dec!(50000)));
        assert_eq!(tx.amount, dec!(2.5));

        let tx = Transaction::new(tx.timestamp, "p1", "ETH", dec!(0.000000123456789))
            .enrich(dec!(1834.07))
            .unwrap();
        assert_eq!(tx.volume_quote, Some(dec!(0.00022642839300123)));
    }

    #[test]
    fn test_enrich_overflow_is_an_error() {
        let ts = fixed_timestamp::parse("2023-01-01 10:00:00.000").unwrap();
        let tx = Transaction::new(ts, "p1", "BTC", dec!(10000000000000000000000000));

        let err = tx.enrich(dec!(20000)).unwrap_err();
        assert_eq!(err.symbol, "BTC");
        assert_eq!(err.unit_price, dec!(20000));
    }

    #[test]
    fn test_record_serializes_fixed_layout() {
        let tx = sample().enrich(dec!(20000)).unwrap();
        let record = EnrichedRecord::from_transaction(&tx, "usd").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();

        assert_eq!(json["timestamp"], "2023-01-01 10:00:00.000");
        assert_eq!(json["project_id"], "p1");
        assert_eq!(json["symbol"], "BTC");
        assert_eq!(json["amount"], "2.5");
        assert_eq!(json["quote_currency"], "usd");
        let volume: Decimal = json["volume_quote"].as_str().unwrap().parse().unwrap();
        assert_eq!(volume, dec!(50000));
    }

    #[test]
    fn test_timestamp_layout() {
        assert!(fixed_timestamp::parse("2023-01-01 10:00:00.123").is_ok());
        assert!(fixed_timestamp::parse("not a timestamp").is_err());
        assert!(fixed_timestamp::parse("2023-01-01T10:00:00.000").is_err());
    }
}
