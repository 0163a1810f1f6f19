//! Folds of portfolio and Kalshi account payloads into panel figures.

use serde::Serialize;

use crate::money::Cents;
use crate::types::{KalshiBalance, KalshiOrder, KalshiPosition, PortfolioState, Side, Tone};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioTotals {
    pub total_value: Cents,
    pub cash_balance: Cents,
    pub positions_value: Cents,
    pub open_count: usize,
    pub closed_count: usize,
    pub realized_pnl: Cents,
}

impl PortfolioTotals {
    pub fn pnl_tone(&self) -> Tone {
        if self.realized_pnl.is_negative() {
            Tone::Negative
        } else {
            Tone::Positive
        }
    }
}

/// Absent state folds to all zeros.
pub fn portfolio_totals(state: Option<&PortfolioState>) -> PortfolioTotals {
    let Some(state) = state else {
        return PortfolioTotals::default();
    };
    PortfolioTotals {
        total_value: Cents::from_usd(state.portfolio.total_value),
        cash_balance: Cents::from_usd(state.portfolio.cash_balance),
        positions_value: Cents::from_usd(state.portfolio.positions_value),
        open_count: state.open_positions.len(),
        closed_count: state.closed_positions.len(),
        realized_pnl: state
            .closed_positions
            .iter()
            .map(|p| Cents::from_usd(p.pnl))
            .sum(),
    }
}

/// Row of the Kalshi positions table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub market_ticker: String,
    /// "yes", "no" or "flat".
    pub side: &'static str,
    pub side_tone: Tone,
    pub contracts: i64,
    pub realized_pnl: Cents,
    pub pnl_label: String,
    pub pnl_tone: Tone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRow {
    pub order_id: String,
    pub ticker: String,
    pub description: String,
    pub status: String,
    pub status_tone: Tone,
    pub price: Cents,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    pub balance: Option<Cents>,
    pub payout: Option<Cents>,
    /// False when `balance_usd` and `balance_cents` disagree.
    pub balance_consistent: bool,
    pub positions: Vec<PositionRow>,
    pub orders: Vec<OrderRow>,
}

pub fn account_view(
    balance: Option<&KalshiBalance>,
    positions: Option<&[KalshiPosition]>,
    orders: Option<&[KalshiOrder]>,
) -> AccountView {
    AccountView {
        balance: balance.map(KalshiBalance::balance),
        payout: balance.map(KalshiBalance::payout),
        balance_consistent: balance.map_or(true, KalshiBalance::is_consistent),
        positions: positions.unwrap_or_default().iter().map(position_row).collect(),
        orders: orders.unwrap_or_default().iter().map(order_row).collect(),
    }
}

fn position_row(pos: &KalshiPosition) -> PositionRow {
    let (side, side_tone) = match pos.side {
        Some(Side::Yes) => ("yes", Tone::Positive),
        Some(Side::No) => ("no", Tone::Negative),
        None => ("flat", Tone::Muted),
    };
    let pnl = Cents(pos.realized_pnl);
    let (pnl_label, pnl_tone) = match pnl.0.signum() {
        1 => (pnl.signed(), Tone::Positive),
        -1 => (pnl.signed(), Tone::Negative),
        _ => (pnl.to_string(), Tone::Muted),
    };
    PositionRow {
        market_ticker: pos.market_ticker.clone(),
        side,
        side_tone,
        contracts: pos.contracts,
        realized_pnl: pnl,
        pnl_label,
        pnl_tone,
    }
}

fn order_row(order: &KalshiOrder) -> OrderRow {
    let status_tone = match order.status.as_str() {
        "executed" => Tone::Positive,
        "resting" => Tone::Caution,
        _ => Tone::Muted,
    };
    let price = if order.yes_price != 0 {
        order.yes_price
    } else {
        order.no_price
    };
    OrderRow {
        order_id: order.order_id.clone(),
        ticker: order.ticker.clone(),
        description: format!("{} {}", order.action, order.side).trim().to_string(),
        status: order.status.clone(),
        status_tone,
        price: Cents(price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_absent_state_is_zero() {
        let totals = portfolio_totals(None);
        assert_eq!(totals, PortfolioTotals::default());
        assert_eq!(totals.realized_pnl, Cents::ZERO);
        assert_eq!(totals.open_count, 0);
    }

    #[test]
    fn test_totals_example() {
        let json = r#"{
            "portfolio": {"total_value": 150.5, "cash_balance": 100, "positions_value": 50.5},
            "open_positions": [
                {"id": "p1", "market_ticker": "A", "side": "YES", "contracts": 10, "average_entry": 0.4},
                {"id": "p2", "market_ticker": "B", "side": "NO", "contracts": 5, "average_entry": 0.3}
            ],
            "closed_positions": [{"pnl": 10}, {"pnl": -4}]
        }"#;
        let state: PortfolioState = serde_json::from_str(json).unwrap();
        let totals = portfolio_totals(Some(&state));

        assert_eq!(totals.total_value, Cents(15050));
        assert_eq!(totals.cash_balance, Cents(10000));
        assert_eq!(totals.positions_value, Cents(5050));
        assert_eq!(totals.realized_pnl, Cents(600));
        assert_eq!(totals.open_count, 2);
        assert_eq!(totals.closed_count, 2);
        assert_eq!(totals.realized_pnl.signed(), "+$6.00");
        assert_eq!(totals.pnl_tone(), Tone::Positive);
    }

    #[test]
    fn test_totals_saturate_on_huge_values() {
        let json = r#"{
            "portfolio": {"total_value": 1e27, "cash_balance": -1e27},
            "closed_positions": [{"pnl": 1e27}, {"pnl": 1}]
        }"#;
        let state: PortfolioState = serde_json::from_str(json).unwrap();
        let totals = portfolio_totals(Some(&state));

        assert_eq!(totals.total_value, Cents(i64::MAX));
        assert_eq!(totals.cash_balance, Cents(i64::MIN));
        assert_eq!(totals.positions_value, Cents::ZERO);
        assert_eq!(totals.realized_pnl, Cents(i64::MAX));
    }

    #[test]
    fn test_account_rows() {
        let balance = KalshiBalance {
            balance_usd: dec!(25.5),
            payout_usd: dec!(1.25),
            balance_cents: 2550,
        };
        let positions = vec![
            KalshiPosition {
                market_ticker: "KX-A".into(),
                event_ticker: "KX".into(),
                side: Some(Side::Yes),
                contracts: 3,
                realized_pnl: 125,
                resting_orders_count: 0,
            },
            KalshiPosition {
                market_ticker: "KX-B".into(),
                event_ticker: "KX".into(),
                side: None,
                contracts: 0,
                realized_pnl: -5,
                resting_orders_count: 0,
            },
        ];
        let orders = vec![KalshiOrder {
            order_id: "o1".into(),
            ticker: "KX-A".into(),
            side: "yes".into(),
            action: "buy".into(),
            status: "resting".into(),
            yes_price: 0,
            no_price: 47,
            remaining_count: 2,
        }];

        let view = account_view(Some(&balance), Some(&positions), Some(&orders));
        assert_eq!(view.balance, Some(Cents(2550)));
        assert_eq!(view.payout, Some(Cents(125)));
        assert!(view.balance_consistent);

        assert_eq!(view.positions[0].side, "yes");
        assert_eq!(view.positions[0].pnl_label, "+$1.25");
        assert_eq!(view.positions[1].side, "flat");
        assert_eq!(view.positions[1].pnl_label, "-$0.05");
        assert_eq!(view.positions[1].pnl_tone, Tone::Negative);

        assert_eq!(view.orders[0].price, Cents(47));
        assert_eq!(view.orders[0].status_tone, Tone::Caution);
        assert_eq!(view.orders[0].description, "buy yes");
    }

    #[test]
    fn test_empty_account() {
        let view = account_view(None, None, None);
        assert_eq!(view.balance, None);
        assert!(view.balance_consistent);
        assert!(view.positions.is_empty());
        assert!(view.orders.is_empty());
    }
}
