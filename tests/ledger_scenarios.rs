//! End-to-end ledger scenarios run against the pure accounting engine.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use lotfolio::decimal::Decimal;
use lotfolio::errors::AppError;
use lotfolio::ledger::{
    apply_corporate_action, validate_transaction, ActionInput, LotSelection, PositionBook, Sale,
};
use lotfolio::models::{
    CorporateAction, CorporateActionType, CostBasisMethod, CreateTransaction, HoldingPeriod,
    Portfolio, RealizedGain, TransactionType,
};

fn dec(s: &str) -> Decimal {
    s.parse::<Decimal>().unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn portfolio(method: CostBasisMethod) -> Portfolio {
    Portfolio {
        id: Uuid::now_v7(),
        user_id: Uuid::now_v7(),
        name: "Scenarios".into(),
        description: None,
        base_currency: "USD".into(),
        cost_basis_method: method,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn input(kind: TransactionType, symbol: &str, day: &str, quantity: &str, price: &str) -> CreateTransaction {
    CreateTransaction {
        transaction_type: kind,
        symbol: symbol.into(),
        date: date(day),
        quantity: dec(quantity),
        price: Some(dec(price)),
        commission: None,
        currency: None,
        notes: None,
        lot_ids: None,
    }
}

fn buy(book: &mut PositionBook, portfolio: &Portfolio, day: &str, quantity: &str, price: &str) -> Uuid {
    let validated = validate_transaction(
        input(TransactionType::Buy, book.symbol(), day, quantity, price),
        portfolio,
    )
    .unwrap();
    book.acquire(
        Uuid::now_v7(),
        validated.date,
        validated.quantity.clone(),
        validated.acquisition_cost(),
    )
    .id
}

fn sell(
    book: &mut PositionBook,
    portfolio: &Portfolio,
    day: &str,
    quantity: &str,
    price: &str,
) -> Result<Vec<RealizedGain>, AppError> {
    let validated = validate_transaction(
        input(TransactionType::Sell, book.symbol(), day, quantity, price),
        portfolio,
    )?;
    let selection = LotSelection::for_method(portfolio.cost_basis_method, None)?;
    let sale = Sale {
        transaction_id: Uuid::now_v7(),
        date: validated.date,
        quantity: validated.quantity,
        price: validated.price.unwrap_or_default(),
        commission: validated.commission,
    };
    book.dispose(&sale, &selection)
}

fn action(
    action_type: CorporateActionType,
    symbol: &str,
    ratio: Option<&str>,
    amount: Option<&str>,
    new_symbol: Option<&str>,
) -> CorporateAction {
    CorporateAction {
        id: Uuid::now_v7(),
        symbol: symbol.into(),
        action_type,
        action_date: date("2024-06-01"),
        ratio: ratio.map(dec),
        amount: amount.map(dec),
        new_symbol: new_symbol.map(str::to_string),
        description: None,
        applied: false,
        created_at: Utc::now(),
    }
}

fn apply(
    action: &CorporateAction,
    source: &mut PositionBook,
    target: Option<&mut PositionBook>,
) -> lotfolio::ledger::SynthesizedTransaction {
    let input = ActionInput {
        action,
        transaction_id: Uuid::now_v7(),
        cost_allocation: Decimal::zero(),
    };
    apply_corporate_action(&input, source, target).unwrap()
}

#[test]
fn fifo_sell_spans_long_and_short_lots() {
    let portfolio = portfolio(CostBasisMethod::Fifo);
    let mut book = PositionBook::new(portfolio.id, "AAPL");
    let lot1 = buy(&mut book, &portfolio, "2023-01-01", "10", "100");
    let lot2 = buy(&mut book, &portfolio, "2023-06-01", "5", "120");

    let gains = sell(&mut book, &portfolio, "2024-02-01", "12", "150").unwrap();

    assert_eq!(gains.len(), 2);
    assert_eq!(gains[0].lot_id, lot1);
    assert_eq!(gains[0].gain, dec("500"));
    assert_eq!(gains[0].holding_period, HoldingPeriod::Long);
    assert_eq!(gains[1].lot_id, lot2);
    assert_eq!(gains[1].gain, dec("60"));
    assert_eq!(gains[1].holding_period, HoldingPeriod::Short);

    let totals = book.totals();
    assert_eq!(totals.quantity, dec("3"));
    assert_eq!(totals.avg_cost_price, dec("120"));
    assert_eq!(totals.cost_basis, dec("360"));
}

#[test]
fn lifo_sell_consumes_newest_lot_first() {
    let portfolio = portfolio(CostBasisMethod::Lifo);
    let mut book = PositionBook::new(portfolio.id, "AAPL");
    let lot1 = buy(&mut book, &portfolio, "2023-01-01", "10", "100");
    let lot2 = buy(&mut book, &portfolio, "2023-06-01", "5", "120");

    let gains = sell(&mut book, &portfolio, "2024-02-01", "8", "150").unwrap();

    assert_eq!(gains.len(), 2);
    assert_eq!(gains[0].lot_id, lot2);
    assert_eq!(gains[0].gain, dec("150"));
    assert_eq!(gains[0].holding_period, HoldingPeriod::Short);
    assert_eq!(gains[1].lot_id, lot1);
    assert_eq!(gains[1].quantity, dec("3"));
    assert_eq!(gains[1].gain, dec("150"));
    assert_eq!(gains[1].holding_period, HoldingPeriod::Long);

    let totals = book.totals();
    assert_eq!(totals.quantity, dec("7"));
    assert_eq!(totals.cost_basis, dec("700"));
}

#[test]
fn two_for_one_split_doubles_shares_and_keeps_cost() {
    let portfolio = portfolio(CostBasisMethod::Fifo);
    let mut book = PositionBook::new(portfolio.id, "AAPL");
    buy(&mut book, &portfolio, "2023-01-01", "6", "140");
    buy(&mut book, &portfolio, "2023-03-01", "4", "165");
    assert_eq!(book.totals().cost_basis, dec("1500"));
    assert_eq!(book.totals().avg_cost_price, dec("150"));

    let split = action(CorporateActionType::Split, "AAPL", Some("2"), None, None);
    let synthesized = apply(&split, &mut book, None);

    assert_eq!(synthesized.transaction_type, TransactionType::Split);
    let totals = book.totals();
    assert_eq!(totals.quantity, dec("20"));
    assert_eq!(totals.cost_basis, dec("1500"));
    assert_eq!(totals.avg_cost_price, dec("75"));
    assert_eq!(book.lots()[0].quantity, dec("12"));
    assert_eq!(book.lots()[0].cost_per_share(), dec("70"));
    assert_eq!(book.lots()[1].quantity, dec("8"));
    assert_eq!(book.lots()[1].cost_per_share(), dec("82.5"));
}

#[test]
fn cash_dividend_synthesizes_income_and_leaves_lots() {
    let portfolio = portfolio(CostBasisMethod::Fifo);
    let mut book = PositionBook::new(portfolio.id, "AAPL");
    buy(&mut book, &portfolio, "2023-01-01", "100", "150");
    let before: Vec<_> = book.lots().to_vec();

    let dividend = action(CorporateActionType::Dividend, "AAPL", None, Some("0.50"), None);
    let synthesized = apply(&dividend, &mut book, None);

    assert_eq!(synthesized.transaction_type, TransactionType::Dividend);
    assert_eq!(synthesized.amount, Some(dec("50")));
    assert_eq!(book.lots(), before.as_slice());
}

#[test]
fn ticker_change_moves_every_lot() {
    let portfolio = portfolio(CostBasisMethod::Fifo);
    let mut fb = PositionBook::new(portfolio.id, "FB");
    buy(&mut fb, &portfolio, "2022-01-01", "25", "300");
    buy(&mut fb, &portfolio, "2022-05-01", "15", "200");
    let before = fb.totals();
    let mut meta = PositionBook::new(portfolio.id, "META");

    let rename = action(CorporateActionType::TickerChange, "FB", None, None, Some("META"));
    let synthesized = apply(&rename, &mut fb, Some(&mut meta));

    assert_eq!(synthesized.symbol, "META");
    assert!(fb.is_empty());
    assert_eq!(meta.lots().len(), 2);
    assert!(meta.lots().iter().all(|lot| lot.symbol == "META"));
    let after = meta.totals();
    assert_eq!(after.quantity, dec("40"));
    assert_eq!(after.quantity, before.quantity);
    assert_eq!(after.cost_basis, before.cost_basis);
}

#[test]
fn oversell_is_rejected_without_side_effects() {
    let portfolio = portfolio(CostBasisMethod::Fifo);
    let mut book = PositionBook::new(portfolio.id, "AAPL");
    buy(&mut book, &portfolio, "2023-01-01", "4", "100");
    buy(&mut book, &portfolio, "2023-02-01", "5", "110");
    book.clear_changes();
    let before = book.clone();

    let err = sell(&mut book, &portfolio, "2024-01-01", "10", "150").unwrap_err();

    assert!(matches!(err, AppError::InsufficientShares { .. }));
    assert_eq!(book, before);
    assert!(book.changes().is_empty());
}
