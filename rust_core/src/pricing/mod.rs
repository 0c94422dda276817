pub mod mapping;
pub mod oracle;

pub use mapping::{ProviderIdMapping, BUILTIN_PROVIDER_IDS};
pub use oracle::{PriceOracle, SymbolPriceMap};
