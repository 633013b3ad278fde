use chrono::NaiveDate;
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::ledger::position::PositionBook;
use crate::models::{CorporateAction, CorporateActionType, TaxLot, TransactionType};

/// Everything needed to apply one corporate action to one portfolio.
#[derive(Debug, Clone)]
pub struct ActionInput<'a> {
    pub action: &'a CorporateAction,
    /// Id reserved for the audit transaction; spinoff child lots point at it.
    pub transaction_id: Uuid,
    /// SPINOFF only: share of each parent lot's cost moved to the child lot.
    pub cost_allocation: Decimal,
}

/// Transaction-log entry written alongside an applied action.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedTransaction {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub notes: String,
}

/// Applies `input.action` to the open lots in `source`.
///
/// MERGER, SPINOFF and TICKER_CHANGE also need the book for the new symbol
/// (`target`), which may already hold lots; moved or created lots are merged
/// into it. All checks run before the first lot is touched, so an error
/// leaves both books unchanged.
pub fn apply_corporate_action(
    input: &ActionInput<'_>,
    source: &mut PositionBook,
    target: Option<&mut PositionBook>,
) -> Result<SynthesizedTransaction, AppError> {
    let action = input.action;
    if source.is_empty() {
        return Err(AppError::NotFound(format!(
            "no open {} lots remain in this portfolio",
            source.symbol()
        )));
    }

    match action.action_type {
        CorporateActionType::Split => {
            let ratio = positive(action.ratio.as_ref(), "ratio")?;
            ensure_scaled_lots_stay_open(source.lots(), &ratio)?;
            source.update_lots(|lot| scale_lot(lot, &ratio, action.id));
            Ok(synthesized(
                input,
                TransactionType::Split,
                source.symbol().to_string(),
                source.totals().quantity,
                None,
                None,
                format!("Split {} applied to {}", ratio, action.symbol),
            ))
        }
        CorporateActionType::Dividend => {
            let per_share = positive(action.amount.as_ref(), "amount")?;
            let quantity = source.totals().quantity;
            let total = &per_share * &quantity;
            Ok(synthesized(
                input,
                TransactionType::Dividend,
                source.symbol().to_string(),
                quantity,
                Some(per_share.clone()),
                Some(total),
                format!("Dividend of {} per share", per_share),
            ))
        }
        CorporateActionType::Merger | CorporateActionType::TickerChange => {
            let ratio = if action.action_type == CorporateActionType::Merger {
                positive(action.ratio.as_ref(), "ratio")?
            } else {
                Decimal::from_i64(1)
            };
            let target = require_target(action, target)?;
            ensure_scaled_lots_stay_open(source.lots(), &ratio)?;

            let moved = source.transfer_out();
            let mut quantity = Decimal::zero();
            for mut lot in moved {
                scale_lot(&mut lot, &ratio, action.id);
                quantity += &lot.quantity;
                target.adopt(lot);
            }

            let (transaction_type, notes) = if action.action_type == CorporateActionType::Merger {
                (
                    TransactionType::Merger,
                    format!("{} merged into {} at ratio {}", action.symbol, target.symbol(), ratio),
                )
            } else {
                (
                    TransactionType::TickerChange,
                    format!("Ticker changed from {} to {}", action.symbol, target.symbol()),
                )
            };
            Ok(synthesized(
                input,
                transaction_type,
                target.symbol().to_string(),
                quantity,
                None,
                None,
                notes,
            ))
        }
        CorporateActionType::Spinoff => {
            let ratio = positive(action.ratio.as_ref(), "ratio")?;
            let allocation = &input.cost_allocation;
            if allocation.is_negative() || allocation > &Decimal::from_i64(1) {
                return Err(AppError::action_field(
                    "cost_allocation",
                    "must be between 0 and 1",
                ));
            }
            let target = require_target(action, target)?;
            ensure_scaled_lots_stay_open(source.lots(), &ratio)?;

            let children: Vec<TaxLot> = source
                .lots()
                .iter()
                .map(|parent| {
                    let mut child = TaxLot::new(
                        parent.portfolio_id,
                        target.symbol().to_string(),
                        parent.purchase_date,
                        &parent.quantity * &ratio,
                        (&parent.cost_basis * allocation).min(parent.cost_basis.clone()),
                        input.transaction_id,
                    );
                    child.adjusted_by_action_id = Some(action.id);
                    child
                })
                .collect();

            // Marked even at zero allocation; the children depend on them.
            let moved: Vec<Decimal> = children.iter().map(|c| c.cost_basis.clone()).collect();
            let mut costs = moved.into_iter();
            source.update_lots(|parent| {
                if let Some(cost) = costs.next() {
                    parent.cost_basis -= cost;
                }
                parent.adjusted_by_action_id = Some(action.id);
            });

            let mut quantity = Decimal::zero();
            for child in children {
                quantity += &child.quantity;
                target.insert_lot(child);
            }
            Ok(synthesized(
                input,
                TransactionType::Spinoff,
                target.symbol().to_string(),
                quantity,
                None,
                None,
                format!(
                    "Spun off from {} at ratio {}, {} of cost allocated",
                    action.symbol, ratio, allocation
                ),
            ))
        }
    }
}

fn synthesized(
    input: &ActionInput<'_>,
    transaction_type: TransactionType,
    symbol: String,
    quantity: Decimal,
    price: Option<Decimal>,
    amount: Option<Decimal>,
    notes: String,
) -> SynthesizedTransaction {
    SynthesizedTransaction {
        id: input.transaction_id,
        transaction_type,
        symbol,
        date: input.action.action_date,
        quantity,
        price,
        amount,
        notes,
    }
}

fn positive(value: Option<&Decimal>, field: &'static str) -> Result<Decimal, AppError> {
    match value {
        Some(v) if v.is_positive() => Ok(v.clone()),
        _ => Err(AppError::action_field(field, "must be a positive number")),
    }
}

fn require_target<'a>(
    action: &CorporateAction,
    target: Option<&'a mut PositionBook>,
) -> Result<&'a mut PositionBook, AppError> {
    match (target, action.new_symbol.as_deref()) {
        (Some(book), Some(symbol)) if book.symbol() == symbol && symbol != action.symbol => {
            Ok(book)
        }
        _ => Err(AppError::action_field(
            "new_symbol",
            "a distinct new symbol is required",
        )),
    }
}

fn ensure_scaled_lots_stay_open(lots: &[TaxLot], ratio: &Decimal) -> Result<(), AppError> {
    if lots.iter().all(|lot| (&lot.quantity * ratio).is_positive()) {
        Ok(())
    } else {
        Err(AppError::action_field(
            "ratio",
            "ratio would reduce a lot to zero shares",
        ))
    }
}

/// Quantity scales, total cost does not.
fn scale_lot(lot: &mut TaxLot, ratio: &Decimal, action_id: Uuid) {
    lot.quantity = &lot.quantity * ratio;
    lot.original_quantity = &lot.original_quantity * ratio;
    lot.adjusted_by_action_id = Some(action_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn action(
        action_type: CorporateActionType,
        ratio: Option<&str>,
        amount: Option<&str>,
        new_symbol: Option<&str>,
    ) -> CorporateAction {
        CorporateAction {
            id: Uuid::now_v7(),
            symbol: "AAPL".into(),
            action_type,
            action_date: date("2024-06-10"),
            ratio: ratio.map(dec),
            amount: amount.map(dec),
            new_symbol: new_symbol.map(String::from),
            description: None,
            applied: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn input(action: &CorporateAction) -> ActionInput<'_> {
        ActionInput {
            action,
            transaction_id: Uuid::now_v7(),
            cost_allocation: Decimal::zero(),
        }
    }

    fn book(symbol: &str, lots: &[(&str, &str, &str)]) -> PositionBook {
        let mut book = PositionBook::new(Uuid::nil(), symbol);
        for (on, qty, cost) in lots {
            book.acquire(Uuid::now_v7(), date(on), dec(qty), dec(cost));
        }
        book.clear_changes();
        book
    }

    #[test]
    fn test_split_doubles_quantity_and_keeps_cost() {
        let split = action(CorporateActionType::Split, Some("2"), None, None);
        let mut source = book("AAPL", &[("2023-01-01", "6", "900"), ("2023-02-01", "4", "600")]);

        let tx = apply_corporate_action(&input(&split), &mut source, None).unwrap();
        let totals = source.totals();
        assert_eq!(totals.quantity, dec("20"));
        assert_eq!(totals.cost_basis, dec("1500"));
        assert_eq!(totals.avg_cost_price, dec("75"));
        assert_eq!(source.lots()[0].quantity, dec("12"));
        assert_eq!(source.lots()[0].original_quantity, dec("12"));
        assert_eq!(source.lots()[0].cost_per_share(), dec("75"));
        assert!(source.lots().iter().all(|lot| lot.adjusted_by_action_id == Some(split.id)));
        assert_eq!(source.changes().updated.len(), 2);
        assert_eq!(tx.transaction_type, TransactionType::Split);
        assert_eq!(tx.quantity, dec("20"));
    }

    #[test]
    fn test_dividend_leaves_lots_alone() {
        let dividend = action(CorporateActionType::Dividend, None, Some("0.50"), None);
        let mut source = book("AAPL", &[("2023-01-01", "100", "15000")]);
        let before = source.clone();

        let tx = apply_corporate_action(&input(&dividend), &mut source, None).unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Dividend);
        assert_eq!(tx.amount, Some(dec("50")));
        assert_eq!(tx.price, Some(dec("0.5")));
        assert_eq!(tx.quantity, dec("100"));
        assert_eq!(source, before);
    }

    #[test]
    fn test_ticker_change_moves_lots() {
        let change = action(CorporateActionType::TickerChange, None, None, Some("META"));
        let mut source = book("AAPL", &[("2022-01-01", "25", "5000"), ("2022-05-01", "15", "2700")]);
        let mut target = PositionBook::new(Uuid::nil(), "META");

        let tx = apply_corporate_action(&input(&change), &mut source, Some(&mut target)).unwrap();
        assert!(source.is_empty());
        assert!(source.changes().deleted.is_empty());
        assert_eq!(target.totals().quantity, dec("40"));
        assert_eq!(target.totals().cost_basis, dec("7700"));
        assert!(target.lots().iter().all(|lot| lot.symbol == "META"));
        assert_eq!(target.changes().updated.len(), 2);
        assert_eq!(tx.symbol, "META");
    }

    #[test]
    fn test_merger_into_existing_holding() {
        let merger = action(CorporateActionType::Merger, Some("0.5"), None, Some("NEWCO"));
        let mut source = book("AAPL", &[("2022-01-01", "10", "1000")]);
        let mut target = book("NEWCO", &[("2023-01-01", "3", "450")]);

        apply_corporate_action(&input(&merger), &mut source, Some(&mut target)).unwrap();
        let totals = target.totals();
        assert_eq!(totals.quantity, dec("8"));
        assert_eq!(totals.cost_basis, dec("1450"));
        assert_eq!(target.lots().len(), 2);
    }

    #[test]
    fn test_spinoff_with_default_zero_basis() {
        let spinoff = action(CorporateActionType::Spinoff, Some("0.25"), None, Some("SPIN"));
        let mut source = book("AAPL", &[("2021-03-01", "40", "4000")]);
        let mut target = PositionBook::new(Uuid::nil(), "SPIN");

        let input = input(&spinoff);
        apply_corporate_action(&input, &mut source, Some(&mut target)).unwrap();
        assert_eq!(source.totals().cost_basis, dec("4000"));
        let child = &target.lots()[0];
        assert_eq!(child.quantity, dec("10"));
        assert!(child.cost_basis.is_zero());
        assert_eq!(child.purchase_date, date("2021-03-01"));
        assert_eq!(child.transaction_id, input.transaction_id);
        assert_eq!(child.adjusted_by_action_id, Some(spinoff.id));
        assert_eq!(target.changes().inserted.len(), 1);
        assert_eq!(source.lots()[0].adjusted_by_action_id, Some(spinoff.id));
        assert_eq!(source.changes().updated.len(), 1);
    }

    #[test]
    fn test_spinoff_with_cost_allocation() {
        let spinoff = action(CorporateActionType::Spinoff, Some("1"), None, Some("SPIN"));
        let mut source = book("AAPL", &[("2021-03-01", "40", "4000")]);
        let mut target = PositionBook::new(Uuid::nil(), "SPIN");
        let mut input = input(&spinoff);
        input.cost_allocation = dec("0.2");

        apply_corporate_action(&input, &mut source, Some(&mut target)).unwrap();
        assert_eq!(source.totals().cost_basis, dec("3200"));
        assert_eq!(target.totals().cost_basis, dec("800"));

        input.cost_allocation = dec("1.5");
        let mut other_target = PositionBook::new(Uuid::nil(), "SPIN");
        let before = source.clone();
        assert!(apply_corporate_action(&input, &mut source, Some(&mut other_target)).is_err());
        assert_eq!(source, before);
    }

    #[test]
    fn test_no_open_lots_fails() {
        let split = action(CorporateActionType::Split, Some("2"), None, None);
        let mut source = PositionBook::new(Uuid::nil(), "AAPL");
        assert!(matches!(
            apply_corporate_action(&input(&split), &mut source, None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_target_book_is_rejected() {
        let merger = action(CorporateActionType::Merger, Some("1"), None, Some("NEWCO"));
        let mut source = book("AAPL", &[("2022-01-01", "10", "1000")]);
        let before = source.clone();
        let err = apply_corporate_action(&input(&merger), &mut source, None).unwrap_err();
        assert_eq!(err.code(), "CORPORATE_ACTION_VALIDATION");
        assert_eq!(source, before);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn split_preserves_cost_basis(
                lots in prop::collection::vec((1i64..1_000, 1i64..10_000_000), 1..6),
                ratio_tenths in 1i64..100,
            ) {
                let mut source = PositionBook::new(Uuid::nil(), "AAPL");
                for (i, (qty, cost_cents)) in lots.iter().enumerate() {
                    source.acquire(
                        Uuid::now_v7(),
                        date("2020-01-01") + chrono::Duration::days(i as i64),
                        Decimal::from_i64(*qty),
                        Decimal::new(*cost_cents, 2),
                    );
                }
                let before = source.totals();
                let ratio = Decimal::new(ratio_tenths, 1);
                let split = CorporateAction {
                    ratio: Some(ratio.clone()),
                    ..action(CorporateActionType::Split, None, None, None)
                };
                apply_corporate_action(&input(&split), &mut source, None).unwrap();

                let after = source.totals();
                prop_assert_eq!(&after.cost_basis, &before.cost_basis);
                prop_assert_eq!(&after.quantity, &(&before.quantity * &ratio));
                // avg cost is rounded to 8 places, so allow one ulp per share
                let drift = (&after.quantity * &after.avg_cost_price - &after.cost_basis).abs();
                let tolerance = &after.quantity * &Decimal::new(1, 8) + Decimal::new(1, 8);
                prop_assert!(drift <= tolerance);
            }
        }
    }
}
