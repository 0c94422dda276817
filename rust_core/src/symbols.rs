//! Symbol collection across a parsed batch.

use crate::models::Transaction;
use std::collections::BTreeSet;

/// Accumulates the distinct symbols seen in a batch.
#[derive(Debug, Default, Clone)]
pub struct SymbolCollector {
    symbols: BTreeSet<String>,
}

impl SymbolCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, tx: &Transaction) {
        self.symbols.insert(tx.symbol.clone());
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn into_symbols(self) -> BTreeSet<String> {
        self.symbols
    }

    /// Collect the distinct symbols of any sequence of transactions.
    pub fn collect<'a, I>(transactions: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut collector = Self::new();
        for tx in transactions {
            collector.observe(tx);
        }
        collector.into_symbols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixed_timestamp;
    use rust_decimal::Decimal;

    fn tx(symbol: &str) -> Transaction {
        let ts = fixed_timestamp::parse("2023-01-01 10:00:00.000").unwrap();
        Transaction::new(ts, "p", symbol, Decimal::ONE)
    }

    #[test]
    fn test_duplicates_collapse() {
        let batch: Vec<Transaction> = ["BTC", "ETH", "BTC", "ADA", "ETH", "BTC"]
            .iter()
            .map(|s| tx(s))
            .collect();

        let symbols = SymbolCollector::collect(&batch);
        assert_eq!(symbols.len(), 3);
        assert!(symbols.contains("ADA"));
        assert!(symbols.contains("BTC"));
        assert!(symbols.contains("ETH"));
    }

    #[test]
    fn test_order_does_not_matter() {
        let forward: Vec<Transaction> = ["BTC", "ETH", "SFL"].iter().map(|s| tx(s)).collect();
        let reversed: Vec<Transaction> = forward.iter().rev().cloned().collect();

        assert_eq!(
            SymbolCollector::collect(&forward),
            SymbolCollector::collect(&reversed)
        );
    }

    #[test]
    fn test_empty_batch() {
        let mut collector = SymbolCollector::new();
        assert!(collector.is_empty());
        collector.observe(&tx("BTC"));
        collector.observe(&tx("BTC"));
        assert_eq!(collector.len(), 1);
    }
}
