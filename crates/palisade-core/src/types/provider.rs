//! Provider source classification.
//!
//! Sources split into native broker APIs (authoritative for their own
//! accounts) and aggregator mirrors. The canonicalizer dispatches on this
//! split when the same symbol is reported by more than one source.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A position/transaction data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Schwab's own API.
    NativeSchwab,
    /// Interactive Brokers' own API.
    NativeIbkr,
    /// Plaid aggregator.
    AggregatorPlaid,
    /// SnapTrade aggregator.
    AggregatorSnaptrade,
    /// Manually entered positions.
    Manual,
}

impl ProviderKind {
    /// True for a broker's own authoritative API.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, ProviderKind::NativeSchwab | ProviderKind::NativeIbkr)
    }

    /// True for aggregator mirrors of broker accounts.
    #[must_use]
    pub fn is_aggregator(&self) -> bool {
        matches!(
            self,
            ProviderKind::AggregatorPlaid | ProviderKind::AggregatorSnaptrade
        )
    }

    /// Short label used in scopes and payloads.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::NativeSchwab => "schwab",
            ProviderKind::NativeIbkr => "ibkr",
            ProviderKind::AggregatorPlaid => "plaid",
            ProviderKind::AggregatorSnaptrade => "snaptrade",
            ProviderKind::Manual => "manual",
        }
    }

    /// Parses a possibly comma-merged source label (e.g., `"plaid,schwab"`)
    /// into the set of sources it names.
    ///
    /// # Errors
    ///
    /// Returns an error when any component label is unknown.
    pub fn parse_merged(label: &str) -> Result<Vec<ProviderKind>, CoreError> {
        label
            .split(',')
            .map(|part| part.trim().parse::<ProviderKind>())
            .collect()
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "schwab" | "native_schwab" => Ok(ProviderKind::NativeSchwab),
            "ibkr" | "native_ibkr" => Ok(ProviderKind::NativeIbkr),
            "plaid" | "aggregator_plaid" => Ok(ProviderKind::AggregatorPlaid),
            "snaptrade" | "aggregator_snaptrade" => Ok(ProviderKind::AggregatorSnaptrade),
            "manual" => Ok(ProviderKind::Manual),
            other => Err(CoreError::unknown_enum("provider source", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::error::Error for ProviderKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_aggregator_split() {
        assert!(ProviderKind::NativeSchwab.is_native());
        assert!(ProviderKind::NativeIbkr.is_native());
        assert!(ProviderKind::AggregatorPlaid.is_aggregator());
        assert!(ProviderKind::AggregatorSnaptrade.is_aggregator());
        assert!(!ProviderKind::Manual.is_native());
        assert!(!ProviderKind::Manual.is_aggregator());
    }

    #[test]
    fn test_parse_merged_sources() {
        let sources = ProviderKind::parse_merged("plaid,schwab").unwrap();
        assert_eq!(
            sources,
            vec![ProviderKind::AggregatorPlaid, ProviderKind::NativeSchwab]
        );
    }

    #[test]
    fn test_parse_unknown_source() {
        assert!("etrade".parse::<ProviderKind>().is_err());
        assert!(ProviderKind::parse_merged("plaid,etrade").is_err());
    }
}
