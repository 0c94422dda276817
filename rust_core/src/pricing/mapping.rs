//! Symbol ↔ provider-id mapping
//!
//! Fixed at startup, either from the built-in table or a JSON file of the
//! form `{"BTC": "bitcoin", ...}`. Forward and reverse lookups are kept as
//! exact inverses; a table that breaks that is rejected on load.

use crate::error::MappingError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Built-in CoinGecko ids for the assets seen in transaction exports
pub const BUILTIN_PROVIDER_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("ADA", "cardano"),
    ("SFL", "sunflower-land"),
    ("USDC", "usd-coin"),
    ("USDC.E", "usd-coin-ethereum-bridged"),
    ("MATIC", "matic-network"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderIdMapping {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl ProviderIdMapping {
    /// Build from (symbol, provider id) pairs, rejecting anything that would
    /// make the reverse map ambiguous.
    pub fn from_pairs<I, S, P>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<String>,
    {
        let mut mapping = Self::default();

        for (symbol, provider_id) in pairs {
            let symbol = symbol.into();
            let provider_id = provider_id.into();

            if symbol.trim().is_empty() || provider_id.trim().is_empty() {
                return Err(MappingError::EmptyEntry);
            }
            if mapping.forward.contains_key(&symbol) {
                return Err(MappingError::DuplicateSymbol(symbol));
            }
            if let Some(first) = mapping.reverse.get(&provider_id) {
                return Err(MappingError::DuplicateProviderId {
                    provider_id,
                    first: first.clone(),
                    second: symbol,
                });
            }

            mapping.forward.insert(symbol.clone(), provider_id.clone());
            mapping.reverse.insert(provider_id, symbol);
        }

        Ok(mapping)
    }

    pub fn builtin() -> Self {
        let forward = BUILTIN_PROVIDER_IDS
            .iter()
            .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
            .collect();
        let reverse = BUILTIN_PROVIDER_IDS
            .iter()
            .map(|(symbol, id)| (id.to_string(), symbol.to_string()))
            .collect();
        Self { forward, reverse }
    }

    pub fn from_json_str(json: &str) -> Result<Self, MappingError> {
        let table: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_pairs(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn provider_id(&self, symbol: &str) -> Option<&str> {
        self.forward.get(symbol).map(String::as_str)
    }

    pub fn symbol(&self, provider_id: &str) -> Option<&str> {
        self.reverse.get(provider_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
