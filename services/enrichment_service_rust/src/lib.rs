//! enrichment_service_rust - batch job that prices exported transactions and
//! publishes them to the broker

pub mod config;
pub mod wiring;

pub use config::{EnrichmentConfig, SinkKind};
pub use wiring::{
    build_dead_letter, build_oracle, build_pipeline, build_sink, load_mapping, open_input,
    oracle_with_source,
};
