//! Calendar-spread (roll) construction.
//!
//! A roll closes the front month and opens the back month as a single BAG
//! order. By spread convention the BAG action is always BUY; direction is
//! expressed in the legs.

use crate::error::{ContractError, ContractResult};
use serde::{Deserialize, Serialize};

/// Direction of a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollDirection {
    /// Long position rolling forward: SELL front, BUY back.
    LongRoll,
    /// Short position rolling forward: BUY front, SELL back.
    ShortRoll,
}

/// Order side for a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegAction {
    /// Buy the leg.
    Buy,
    /// Sell the leg.
    Sell,
}

/// One leg of a calendar spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadLeg {
    /// Contract month (YYYYMM).
    pub contract_month: u32,
    /// Buy or sell.
    pub action: LegAction,
    /// Leg ratio (always 1 for calendar spreads).
    pub ratio: u32,
}

/// A two-legged calendar spread (BAG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSpread {
    /// Root symbol.
    pub symbol: String,
    /// Front and back legs, in that order.
    pub legs: [SpreadLeg; 2],
    /// Action on the BAG itself; BUY by spread convention.
    pub bag_action: LegAction,
    /// Direction the spread was built for.
    pub direction: RollDirection,
}

/// Builds the calendar spread for rolling `symbol` from `front_month` to
/// `back_month`.
///
/// # Errors
///
/// Returns an error when the back month does not follow the front month.
pub fn build_roll(
    symbol: &str,
    front_month: u32,
    back_month: u32,
    direction: RollDirection,
) -> ContractResult<CalendarSpread> {
    if back_month <= front_month {
        return Err(ContractError::InvalidRoll {
            front: front_month,
            back: back_month,
            reason: "back month must be later than front month".to_string(),
        });
    }

    let (front_action, back_action) = match direction {
        RollDirection::LongRoll => (LegAction::Sell, LegAction::Buy),
        RollDirection::ShortRoll => (LegAction::Buy, LegAction::Sell),
    };

    Ok(CalendarSpread {
        symbol: symbol.trim().to_ascii_uppercase(),
        legs: [
            SpreadLeg {
                contract_month: front_month,
                action: front_action,
                ratio: 1,
            },
            SpreadLeg {
                contract_month: back_month,
                action: back_action,
                ratio: 1,
            },
        ],
        bag_action: LegAction::Buy,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_roll_legs() {
        let spread = build_roll("ES", 202603, 202606, RollDirection::LongRoll).unwrap();
        assert_eq!(spread.symbol, "ES");
        assert_eq!(spread.legs[0].contract_month, 202603);
        assert_eq!(spread.legs[0].action, LegAction::Sell);
        assert_eq!(spread.legs[1].contract_month, 202606);
        assert_eq!(spread.legs[1].action, LegAction::Buy);
        assert_eq!(spread.bag_action, LegAction::Buy);
    }

    #[test]
    fn test_short_roll_legs() {
        let spread = build_roll("ES", 202603, 202606, RollDirection::ShortRoll).unwrap();
        assert_eq!(spread.legs[0].action, LegAction::Buy);
        assert_eq!(spread.legs[1].action, LegAction::Sell);
        assert_eq!(spread.bag_action, LegAction::Buy);
    }

    #[test]
    fn test_inverted_months_rejected() {
        assert!(build_roll("ES", 202606, 202603, RollDirection::LongRoll).is_err());
        assert!(build_roll("ES", 202603, 202603, RollDirection::LongRoll).is_err());
    }
}
