//! Enrichment pipeline
//!
//! Runs one batch through `Reading → Parsing → Collecting → PriceLoading →
//! Enriching → Emitting → Done`, or into `Failed` from any stage. Each stage
//! is a plain function over explicit data so it can be driven on its own:
//!
//! - [`read_rows`] pulls raw rows off the byte stream
//! - [`parse_rows`] applies the row policy
//! - [`SymbolCollector::collect`] dedups symbols
//! - [`PriceOracle::load_prices`] prices the whole batch with one request
//! - [`enrich_transactions`] applies the price-miss policy
//! - [`emit_transactions`] serializes and delivers with retry / dead-letter
//!
//! Nothing is emitted unless every stage before `Emitting` succeeded.

use crate::error::{DeliveryError, NotFoundError, ParseError, PipelineError, VolumeOverflowError};
use crate::models::{EnrichedRecord, Transaction};
use crate::parser::{RawRow, RowReader};
use crate::pricing::{PriceOracle, SymbolPriceMap};
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::sink::Sink;
use crate::symbols::SymbolCollector;
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Policies & state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Reading,
    Parsing,
    Collecting,
    PriceLoading,
    Enriching,
    Emitting,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// What to do with a record that fails a per-record check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The first failure fails the whole run
    #[default]
    FailFast,
    /// Log, count and drop the record
    Skip,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" | "abort" => Ok(ErrorPolicy::FailFast),
            "skip" => Ok(ErrorPolicy::Skip),
            other => Err(format!(
                "unknown error policy '{}', expected fail-fast or skip",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub row_policy: ErrorPolicy,
    pub price_miss_policy: ErrorPolicy,
    pub delivery_retry: RetryPolicy,
    /// 1 keeps read order; more emits through an unordered bounded pool
    pub emit_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            row_policy: ErrorPolicy::FailFast,
            price_miss_policy: ErrorPolicy::FailFast,
            delivery_retry: RetryPolicy::default(),
            emit_concurrency: 1,
        }
    }
}

// ============================================================================
// Stage outputs
// ============================================================================

/// A row dropped under the skip policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub line: u64,
    pub error: ParseError,
}

#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub rows_read: u64,
    pub transactions: Vec<Transaction>,
    pub failures: Vec<RowFailure>,
}

#[derive(Debug, Default)]
pub struct EnrichedBatch {
    pub transactions: Vec<Transaction>,
    pub misses: Vec<NotFoundError>,
    pub overflows: Vec<VolumeOverflowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    DeadLettered { attempts: u32 },
    Failed { attempts: u32 },
}

impl DeliveryOutcome {
    fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts }
            | DeliveryOutcome::DeadLettered { attempts }
            | DeliveryOutcome::Failed { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitSummary {
    pub emitted: u64,
    /// Extra attempts spent on records that did not go through first time
    pub retried: u64,
    pub dead_lettered: u64,
    pub failed: u64,
    pub ordered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub state: PipelineState,
    pub rows_read: u64,
    pub parsed: u64,
    pub parse_skipped: u64,
    pub symbols: u64,
    pub priced_symbols: u64,
    pub enriched: u64,
    pub price_skipped: u64,
    pub overflow_skipped: u64,
    pub emitted: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub delivery_failed: u64,
    pub ordered: bool,
}

impl fmt::Display for EnrichmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows_read={} parsed={} parse_skipped={} symbols={} priced_symbols={} enriched={} \
             price_skipped={} overflow_skipped={} emitted={} retried={} dead_lettered={} \
             delivery_failed={}",
            self.rows_read,
            self.parsed,
            self.parse_skipped,
            self.symbols,
            self.priced_symbols,
            self.enriched,
            self.price_skipped,
            self.overflow_skipped,
            self.emitted,
            self.retried,
            self.dead_lettered,
            self.delivery_failed
        )
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Reading: pull every data row off the stream. Only stream I/O fails here.
///
/// Blocks on `input`; `EnrichmentPipeline::run` calls it on the blocking pool.
pub fn read_rows<R: Read>(input: R) -> Result<Vec<RawRow>, PipelineError> {
    RowReader::new(input)
        .collect::<Result<Vec<_>, _>>()
        .map_err(PipelineError::Read)
}

/// Parsing: turn raw rows into transactions under the row policy.
pub fn parse_rows(rows: Vec<RawRow>, policy: ErrorPolicy) -> Result<ParsedBatch, PipelineError> {
    let mut batch = ParsedBatch {
        rows_read: rows.len() as u64,
        transactions: Vec::with_capacity(rows.len()),
        failures: Vec::new(),
    };

    for row in rows {
        match row.parse() {
            Ok(tx) => batch.transactions.push(tx),
            Err(err) => match policy {
                ErrorPolicy::FailFast => {
                    return Err(PipelineError::Parse {
                        line: row.line,
                        source: err,
                    })
                }
                ErrorPolicy::Skip => {
                    warn!("Skipping row at line {}: {}", row.line, err);
                    batch.failures.push(RowFailure {
                        line: row.line,
                        error: err,
                    });
                }
            },
        }
    }

    Ok(batch)
}

/// Enriching: price every transaction from the batch's price map.
///
/// A missing price and a volume that overflows both follow `policy`.
pub fn enrich_transactions(
    transactions: Vec<Transaction>,
    prices: &SymbolPriceMap,
    policy: ErrorPolicy,
) -> Result<EnrichedBatch, PipelineError> {
    let mut batch = EnrichedBatch {
        transactions: Vec::with_capacity(transactions.len()),
        misses: Vec::new(),
        overflows: Vec::new(),
    };

    for tx in transactions {
        let project_id = tx.project_id.clone();
        match prices.get_price(&tx.symbol) {
            Ok(price) => match tx.enrich(price) {
                Ok(enriched) => batch.transactions.push(enriched),
                Err(overflow) => match policy {
                    ErrorPolicy::FailFast => return Err(PipelineError::VolumeOverflow(overflow)),
                    ErrorPolicy::Skip => {
                        warn!("Skipping transaction for project {}: {}", project_id, overflow);
                        batch.overflows.push(overflow);
                    }
                },
            },
            Err(miss) => match policy {
                ErrorPolicy::FailFast => return Err(PipelineError::PriceNotFound(miss)),
                ErrorPolicy::Skip => {
                    warn!("Skipping transaction for project {}: {}", project_id, miss);
                    batch.misses.push(miss);
                }
            },
        }
    }

    Ok(batch)
}

/// Serialize every enriched transaction. All records are serialized before
/// the first one is emitted.
pub fn serialize_transactions(
    transactions: &[Transaction],
    quote_currency: &str,
) -> Result<Vec<Vec<u8>>, PipelineError> {
    transactions
        .iter()
        .filter_map(|tx| EnrichedRecord::from_transaction(tx, quote_currency))
        .map(|record| record.to_bytes().map_err(PipelineError::from))
        .collect()
}

/// Deliver one payload with retries, falling back to the dead-letter sink.
pub async fn deliver(
    payload: &[u8],
    sink: &dyn Sink,
    dead_letter: Option<&dyn Sink>,
    retry: &RetryPolicy,
) -> DeliveryOutcome {
    let outcome = execute_with_retry(|| sink.emit(payload), retry, DeliveryError::is_transient).await;
    let attempts = outcome.attempts;

    let err = match outcome.result {
        Ok(()) => return DeliveryOutcome::Delivered { attempts },
        Err(err) => err,
    };

    warn!(
        "Delivery to {} failed after {} attempt(s): {}",
        sink.name(),
        attempts,
        err
    );

    match dead_letter {
        Some(dlq) => match dlq.emit(payload).await {
            Ok(()) => {
                debug!("Record dead-lettered to {}", dlq.name());
                DeliveryOutcome::DeadLettered { attempts }
            }
            Err(dlq_err) => {
                error!("Dead-letter write to {} failed: {}", dlq.name(), dlq_err);
                DeliveryOutcome::Failed { attempts }
            }
        },
        None => DeliveryOutcome::Failed { attempts },
    }
}

/// Emitting: deliver every payload. Delivery failures are counted, never fatal.
pub async fn emit_payloads(
    payloads: &[Vec<u8>],
    sink: &dyn Sink,
    dead_letter: Option<&dyn Sink>,
    retry: &RetryPolicy,
    concurrency: usize,
) -> EmitSummary {
    let ordered = concurrency <= 1;

    let outcomes: Vec<DeliveryOutcome> = if ordered {
        let mut outcomes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            outcomes.push(deliver(payload, sink, dead_letter, retry).await);
        }
        outcomes
    } else {
        stream::iter(payloads.iter())
            .map(|payload| deliver(payload, sink, dead_letter, retry))
            .buffer_unordered(concurrency)
            .collect()
            .await
    };

    let mut summary = EmitSummary {
        ordered,
        ..EmitSummary::default()
    };
    for outcome in outcomes {
        summary.retried += u64::from(outcome.attempts().saturating_sub(1));
        match outcome {
            DeliveryOutcome::Delivered { .. } => summary.emitted += 1,
            DeliveryOutcome::DeadLettered { .. } => summary.dead_lettered += 1,
            DeliveryOutcome::Failed { .. } => summary.failed += 1,
        }
    }
    summary
}

/// Serialize then emit enriched transactions.
pub async fn emit_transactions(
    transactions: &[Transaction],
    quote_currency: &str,
    sink: &dyn Sink,
    dead_letter: Option<&dyn Sink>,
    retry: &RetryPolicy,
    concurrency: usize,
) -> Result<EmitSummary, PipelineError> {
    let payloads = serialize_transactions(transactions, quote_currency)?;
    Ok(emit_payloads(&payloads, sink, dead_letter, retry, concurrency).await)
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct EnrichmentPipeline {
    oracle: PriceOracle,
    sink: Arc<dyn Sink>,
    dead_letter: Option<Arc<dyn Sink>>,
    options: PipelineOptions,
    state: PipelineState,
}

impl EnrichmentPipeline {
    pub fn new(oracle: PriceOracle, sink: Arc<dyn Sink>, options: PipelineOptions) -> Self {
        Self {
            oracle,
            sink,
            dead_letter: None,
            options,
            state: PipelineState::Reading,
        }
    }

    pub fn with_dead_letter(mut self, dead_letter: Arc<dyn Sink>) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run one batch from `input` to the sink.
    pub async fn run<R>(&mut self, input: R) -> Result<EnrichmentReport, PipelineError>
    where
        R: Read + Send + 'static,
    {
        self.transition(PipelineState::Reading);
        match self.run_stages(input).await {
            Ok(report) => {
                self.transition(PipelineState::Done);
                info!("Processed batch: {}", report);
                Ok(report)
            }
            Err(err) => {
                error!("Pipeline failed during {:?}: {}", self.state, err);
                self.transition(PipelineState::Failed);
                Err(err)
            }
        }
    }

    async fn run_stages<R>(&mut self, input: R) -> Result<EnrichmentReport, PipelineError>
    where
        R: Read + Send + 'static,
    {
        let rows = tokio::task::spawn_blocking(move || read_rows(input)).await??;
        info!("Read {} rows", rows.len());

        self.transition(PipelineState::Parsing);
        let parsed = parse_rows(rows, self.options.row_policy)?;
        if !parsed.failures.is_empty() {
            warn!("Skipped {} unparseable rows", parsed.failures.len());
        }

        self.transition(PipelineState::Collecting);
        let symbols = SymbolCollector::collect(&parsed.transactions);
        info!(
            "Collected {} distinct symbols from {} transactions",
            symbols.len(),
            parsed.transactions.len()
        );

        self.transition(PipelineState::PriceLoading);
        let prices = self.oracle.load_prices(&symbols).await?;

        self.transition(PipelineState::Enriching);
        let parsed_count = parsed.transactions.len() as u64;
        let enriched =
            enrich_transactions(parsed.transactions, &prices, self.options.price_miss_policy)?;

        self.transition(PipelineState::Emitting);
        let dead_letter = self.dead_letter.as_deref();
        let summary = emit_transactions(
            &enriched.transactions,
            self.oracle.quote_currency(),
            self.sink.as_ref(),
            dead_letter,
            &self.options.delivery_retry,
            self.options.emit_concurrency,
        )
        .await?;

        if summary.failed > 0 {
            warn!("{} records could not be delivered", summary.failed);
        }

        Ok(EnrichmentReport {
            state: PipelineState::Done,
            rows_read: parsed.rows_read,
            parsed: parsed_count,
            parse_skipped: parsed.failures.len() as u64,
            symbols: symbols.len() as u64,
            priced_symbols: prices.len() as u64,
            enriched: enriched.transactions.len() as u64,
            price_skipped: enriched.misses.len() as u64,
            overflow_skipped: enriched.overflows.len() as u64,
            emitted: summary.emitted,
            retried: summary.retried,
            dead_lettered: summary.dead_lettered,
            delivery_failed: summary.failed,
            ordered: summary.ordered,
        })
    }
}
