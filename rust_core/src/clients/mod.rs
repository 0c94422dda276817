pub mod coingecko;
pub mod quote_source;

// Re-export commonly used types
pub use coingecko::CoinGeckoClient;
pub use quote_source::{ProviderQuotes, QuoteSource};
