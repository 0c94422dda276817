//! txflow core - transaction price enrichment.
//!
//! This crate provides:
//! - Row parsing for exported transaction CSVs (exact decimal amounts)
//! - Symbol collection and provider id mapping
//! - Batched quote lookup against CoinGecko behind a `QuoteSource` trait
//! - Enrichment of each transaction with its quote-currency volume
//! - Delivery to Redis (or stdout) with retry and dead-lettering
//! - The `EnrichmentPipeline` state machine tying the stages together

pub mod clients;
pub mod error;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod pricing;
pub mod redis;
pub mod retry;
pub mod sink;
pub mod symbols;

pub use clients::{CoinGeckoClient, QuoteSource};
pub use error::{
    DeliveryError, MappingError, NotFoundError, ParseError, ParseErrorKind, PipelineError,
    PriceFetchError,
};
pub use models::{EnrichedRecord, Transaction};
pub use pipeline::{
    EnrichmentPipeline, EnrichmentReport, ErrorPolicy, PipelineOptions, PipelineState,
};
pub use pricing::{PriceOracle, ProviderIdMapping, SymbolPriceMap};
pub use retry::RetryPolicy;
pub use sink::{JsonLinesFileSink, MemorySink, Sink, StdoutSink};
pub use symbols::SymbolCollector;
