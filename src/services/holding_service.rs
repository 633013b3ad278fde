use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, holding_queries, realized_gain_queries, tax_lot_queries};
use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::ledger::{classify, days_held, normalize_symbol};
use crate::models::{
    Holding, LotView, PortfolioSummary, RealizedGain, RealizedGainQuery, RealizedGainSummary,
    TaxLot, UnrealizedPosition,
};
use crate::services::access_service::authorize_portfolio;
use crate::services::price_service::CachedPriceProvider;

fn percent_of(part: &Decimal, whole: &Decimal) -> Decimal {
    (part * &Decimal::from_i64(100)).div_or_zero(whole)
}

pub fn lot_view(lot: TaxLot, as_of: NaiveDate) -> LotView {
    LotView {
        cost_per_share: lot.cost_per_share(),
        days_held: days_held(lot.purchase_date, as_of),
        holding_period: classify(lot.purchase_date, as_of),
        lot,
    }
}

/// Values a holding at `price`, or at cost when no price is known.
pub fn value_position(holding: &Holding, price: Option<Decimal>) -> UnrealizedPosition {
    let market_value = match &price {
        Some(price) => price * &holding.quantity,
        None => holding.cost_basis.clone(),
    };
    let unrealized_gain = &market_value - &holding.cost_basis;
    UnrealizedPosition {
        symbol: holding.symbol.clone(),
        quantity: holding.quantity.clone(),
        cost_basis: holding.cost_basis.clone(),
        avg_cost_price: holding.avg_cost_price.clone(),
        market_price: price,
        unrealized_gain_pct: percent_of(&unrealized_gain, &holding.cost_basis),
        market_value,
        unrealized_gain,
    }
}

pub fn summarize(
    portfolio_id: Uuid,
    positions: &[UnrealizedPosition],
    realized_gain: Decimal,
) -> PortfolioSummary {
    let market_value: Decimal = positions.iter().map(|p| &p.market_value).sum();
    let cost_basis: Decimal = positions.iter().map(|p| &p.cost_basis).sum();
    PortfolioSummary {
        portfolio_id,
        holdings_count: positions.len(),
        unrealized_gain: &market_value - &cost_basis,
        market_value,
        cost_basis,
        realized_gain,
        priced_at: Utc::now(),
    }
}

pub async fn list_holdings(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    include_closed: bool,
) -> Result<Vec<Holding>, AppError> {
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    let holdings = db::with_retry("list holdings", || {
        holding_queries::list(pool, portfolio_id, include_closed)
    })
    .await?;
    Ok(holdings)
}

/// Open lots for one symbol with days held and term as of `as_of`.
pub async fn list_lots(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    symbol: &str,
    as_of: NaiveDate,
) -> Result<Vec<LotView>, AppError> {
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    let symbol = normalize_symbol(symbol).map_err(AppError::Validation)?;
    let lots =
        db::with_retry("list open lots", || tax_lot_queries::open_lots(pool, portfolio_id, &symbol))
            .await?;
    Ok(lots.into_iter().map(|lot| lot_view(lot, as_of)).collect())
}

pub async fn list_realized_gains(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    query: &RealizedGainQuery,
) -> Result<Vec<RealizedGain>, AppError> {
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    let gains = db::with_retry("list realized gains", || {
        realized_gain_queries::list(pool, portfolio_id, query)
    })
    .await?;
    Ok(gains)
}

pub async fn realized_gain_summary(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    year: Option<i32>,
) -> Result<RealizedGainSummary, AppError> {
    let query = RealizedGainQuery { year, symbol: None };
    let gains = list_realized_gains(pool, user_id, portfolio_id, &query).await?;
    Ok(RealizedGainSummary::from_gains(year, &gains))
}

pub async fn unrealized(
    pool: &PgPool,
    prices: &CachedPriceProvider,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<Vec<UnrealizedPosition>, AppError> {
    let holdings = list_holdings(pool, user_id, portfolio_id, false).await?;
    let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
    let mut latest = prices.latest_prices(&symbols).await;
    Ok(holdings
        .iter()
        .map(|holding| value_position(holding, latest.remove(&holding.symbol)))
        .collect())
}

pub async fn summary(
    pool: &PgPool,
    prices: &CachedPriceProvider,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<PortfolioSummary, AppError> {
    let positions = unrealized(pool, prices, user_id, portfolio_id).await?;
    let realized = db::with_retry("total realized gain", || {
        realized_gain_queries::total_for_portfolio(pool, portfolio_id)
    })
    .await?;
    Ok(summarize(portfolio_id, &positions, realized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;
    use crate::models::HoldingPeriod;

    fn holding(symbol: &str, quantity: &str, cost: &str) -> Holding {
        let quantity = dec(quantity);
        let cost_basis = dec(cost);
        Holding {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: symbol.into(),
            avg_cost_price: cost_basis.div_or_zero(&quantity),
            quantity,
            cost_basis,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_priced_position() {
        let position = value_position(&holding("AAPL", "3", "360"), Some(dec("150")));
        assert_eq!(position.market_value, dec("450"));
        assert_eq!(position.unrealized_gain, dec("90"));
        assert_eq!(position.unrealized_gain_pct, dec("25"));
    }

    #[test]
    fn test_unpriced_position_is_valued_at_cost() {
        let position = value_position(&holding("XYZ", "10", "500"), None);
        assert_eq!(position.market_value, dec("500"));
        assert!(position.unrealized_gain.is_zero());
        assert!(position.market_price.is_none());
    }

    #[test]
    fn test_summary_totals() {
        let positions = vec![
            value_position(&holding("AAPL", "3", "360"), Some(dec("150"))),
            value_position(&holding("MSFT", "2", "500"), Some(dec("200"))),
        ];
        let summary = summarize(Uuid::new_v4(), &positions, dec("560"));
        assert_eq!(summary.holdings_count, 2);
        assert_eq!(summary.market_value, dec("850"));
        assert_eq!(summary.cost_basis, dec("860"));
        assert_eq!(summary.unrealized_gain, dec("-10"));
        assert_eq!(summary.realized_gain, dec("560"));
    }

    #[test]
    fn test_lot_view_term() {
        let purchase = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let lot = TaxLot::new(Uuid::new_v4(), "AAPL".into(), purchase, dec("10"), dec("1000"), Uuid::new_v4());

        let view = lot_view(lot.clone(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(view.days_held, 365);
        assert_eq!(view.holding_period, HoldingPeriod::Long);
        assert_eq!(view.cost_per_share, dec("100"));

        let view = lot_view(lot, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(view.holding_period, HoldingPeriod::Short);
    }
}
