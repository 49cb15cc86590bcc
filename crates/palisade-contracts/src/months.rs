//! Contract month listing via a broker gateway.

use crate::error::{ContractError, ContractResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A listed contract month for a futures root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMonth {
    /// Contract month as YYYYMM.
    pub contract_month: u32,
    /// Last trade date for the contract.
    pub last_trade_date: NaiveDate,
    /// Broker contract identifier.
    pub con_id: i64,
}

/// Broker gateway used to enumerate listed contract months.
///
/// The concrete IBKR/Schwab client lives outside this workspace; tests use
/// an in-memory double.
#[async_trait]
pub trait FuturesGateway: Send + Sync {
    /// Lists all contract months the broker reports for `symbol`,
    /// including expired ones.
    async fn contract_months(&self, symbol: &str) -> ContractResult<Vec<ContractMonth>>;
}

/// Lists tradable months for a symbol: expired contracts are filtered out
/// and the remainder sorted ascending by last trade date.
pub async fn list_months(
    gateway: &dyn FuturesGateway,
    symbol: &str,
    as_of: NaiveDate,
) -> ContractResult<Vec<ContractMonth>> {
    let mut months = gateway.contract_months(symbol).await?;
    months.retain(|m| m.last_trade_date >= as_of);
    months.sort_by_key(|m| m.last_trade_date);
    Ok(months)
}

/// Parses a YYYYMM string into a contract month.
///
/// # Errors
///
/// Returns an error for non-numeric input or an out-of-range month.
pub fn parse_contract_month(value: &str) -> ContractResult<u32> {
    let parsed: u32 = value.parse().map_err(|_| ContractError::InvalidMonth {
        value: value.to_string(),
        reason: "not numeric".to_string(),
    })?;
    let month = parsed % 100;
    let year = parsed / 100;
    if !(1..=12).contains(&month) || !(1990..=2100).contains(&year) {
        return Err(ContractError::InvalidMonth {
            value: value.to_string(),
            reason: "expected YYYYMM".to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeGateway;

    #[async_trait]
    impl FuturesGateway for FakeGateway {
        async fn contract_months(&self, _symbol: &str) -> ContractResult<Vec<ContractMonth>> {
            Ok(vec![
                ContractMonth {
                    contract_month: 202606,
                    last_trade_date: NaiveDate::from_ymd_opt(2026, 6, 19).unwrap(),
                    con_id: 22,
                },
                ContractMonth {
                    contract_month: 202512,
                    last_trade_date: NaiveDate::from_ymd_opt(2025, 12, 19).unwrap(),
                    con_id: 20,
                },
                ContractMonth {
                    contract_month: 202603,
                    last_trade_date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
                    con_id: 21,
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_expired_filtered_and_sorted() {
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let months = list_months(&FakeGateway, "ES", as_of).await.unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].contract_month, 202603);
        assert_eq!(months[1].contract_month, 202606);
    }

    #[test]
    fn test_parse_contract_month() {
        assert_eq!(parse_contract_month("202603").unwrap(), 202603);
        assert!(parse_contract_month("202613").is_err());
        assert!(parse_contract_month("march").is_err());
    }
}
