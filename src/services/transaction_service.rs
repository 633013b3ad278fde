use std::collections::BTreeMap;

use sqlx::{PgConnection, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancellation::commit;
use crate::db::{self, realized_gain_queries, tax_lot_queries, transaction_queries};
use crate::errors::AppError;
use crate::ledger::{validate_transaction, Sale, ValidatedTransaction};
use crate::models::{
    CreateTransaction, DeletedImport, ImportResult, Portfolio, RecordedTransaction, TaxLot,
    Transaction, TransactionQuery, TransactionType,
};
use crate::services::access_service::{authorize_portfolio, authorize_portfolio_in};
use crate::services::position_service::{lock_positions, save_positions, LockedPosition};

const MAX_IMPORT_ROWS: usize = 1000;

fn transaction_row(
    portfolio_id: Uuid,
    validated: &ValidatedTransaction,
    import_batch_id: Option<Uuid>,
) -> Transaction {
    Transaction {
        id: Uuid::now_v7(),
        portfolio_id,
        transaction_type: validated.transaction_type,
        symbol: validated.symbol.clone(),
        transaction_date: validated.date,
        quantity: validated.quantity.clone(),
        price: validated.price.clone(),
        commission: validated.commission.clone(),
        amount: validated.amount(),
        currency: validated.currency.clone(),
        import_batch_id,
        corporate_action_id: None,
        notes: validated.notes.clone(),
        created_at: chrono::Utc::now(),
    }
}

/// Applies one validated transaction to its locked position, then writes
/// the transaction row, lot changes and realized gains. Ledger checks run
/// before the first write.
async fn post(
    conn: &mut PgConnection,
    positions: &mut BTreeMap<String, LockedPosition>,
    row: Transaction,
    validated: &ValidatedTransaction,
) -> Result<RecordedTransaction, AppError> {
    let mut realized_gains = Vec::new();

    if validated.transaction_type.affects_ledger() {
        let position = positions.get_mut(&validated.symbol).ok_or_else(|| {
            AppError::Internal(format!("holding {} was not locked", validated.symbol))
        })?;

        if validated.transaction_type.is_acquisition() {
            position.book.acquire(
                row.id,
                validated.date,
                validated.quantity.clone(),
                validated.acquisition_cost(),
            );
        } else {
            let selection = validated
                .selection
                .as_ref()
                .ok_or_else(|| AppError::Internal("SELL without lot selection".into()))?;
            let sale = Sale {
                transaction_id: row.id,
                date: validated.date,
                quantity: validated.quantity.clone(),
                price: validated.price.clone().unwrap_or_default(),
                commission: validated.commission.clone(),
            };
            realized_gains = position.book.dispose(&sale, selection)?;
        }

        let transaction = transaction_queries::insert(&mut *conn, &row).await?;
        position.flush(&mut *conn).await?;
        for gain in &realized_gains {
            realized_gain_queries::insert(&mut *conn, gain).await?;
        }
        return Ok(RecordedTransaction {
            transaction,
            realized_gains,
        });
    }

    let transaction = transaction_queries::insert(&mut *conn, &row).await?;
    Ok(RecordedTransaction {
        transaction,
        realized_gains,
    })
}

fn ledger_symbols(transactions: &[ValidatedTransaction]) -> Vec<String> {
    transactions
        .iter()
        .filter(|t| t.transaction_type.affects_ledger())
        .map(|t| t.symbol.clone())
        .collect()
}

/// Records a single transaction in its own database transaction.
pub async fn record(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    input: CreateTransaction,
) -> Result<RecordedTransaction, AppError> {
    let portfolio = authorize_portfolio(pool, user_id, portfolio_id).await?;
    let validated = validate_transaction(input, &portfolio)?;

    let mut tx = pool.begin().await?;
    let mut positions =
        lock_positions(&mut tx, portfolio.id, ledger_symbols(std::slice::from_ref(&validated)))
            .await?;
    let row = transaction_row(portfolio.id, &validated, None);
    let recorded = post(&mut tx, &mut positions, row, &validated).await?;
    save_positions(&mut tx, &mut positions).await?;
    commit(tx).await?;

    info!(
        "✅ Recorded {:?} {} {} in portfolio {} ({} realized gains)",
        validated.transaction_type,
        validated.quantity,
        validated.symbol,
        portfolio.id,
        recorded.realized_gains.len()
    );
    Ok(recorded)
}

/// Validates every row up front, then sorts by date (stable for equal
/// dates), so the ledger sees the batch in trade order.
pub fn prepare_import(
    inputs: Vec<CreateTransaction>,
    portfolio: &Portfolio,
) -> Result<Vec<ValidatedTransaction>, AppError> {
    if inputs.is_empty() {
        return Err(AppError::Validation("Import contains no transactions".into()));
    }
    if inputs.len() > MAX_IMPORT_ROWS {
        return Err(AppError::Validation(format!(
            "Import is limited to {} transactions",
            MAX_IMPORT_ROWS
        )));
    }
    let mut validated = inputs
        .into_iter()
        .map(|input| validate_transaction(input, portfolio))
        .collect::<Result<Vec<_>, _>>()?;
    validated.sort_by_key(|t| t.date);
    Ok(validated)
}

/// Commits every row of the batch or none of them.
pub async fn import(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    inputs: Vec<CreateTransaction>,
) -> Result<ImportResult, AppError> {
    let portfolio = authorize_portfolio(pool, user_id, portfolio_id).await?;
    let validated = prepare_import(inputs, &portfolio)?;
    let import_batch_id = Uuid::now_v7();

    let mut tx = pool.begin().await?;
    let mut positions = lock_positions(&mut tx, portfolio.id, ledger_symbols(&validated)).await?;
    let mut transactions = Vec::with_capacity(validated.len());
    for (index, item) in validated.iter().enumerate() {
        let row = transaction_row(portfolio.id, item, Some(import_batch_id));
        let recorded = post(&mut tx, &mut positions, row, item).await.map_err(|e| {
            warn!("Import into portfolio {} failed at row {}: {}", portfolio.id, index, e);
            e
        })?;
        transactions.push(recorded);
    }
    save_positions(&mut tx, &mut positions).await?;
    commit(tx).await?;

    info!(
        "✅ Imported {} transactions into portfolio {} (batch {})",
        transactions.len(),
        portfolio.id,
        import_batch_id
    );
    Ok(ImportResult {
        import_batch_id,
        transactions,
    })
}

/// Decides whether a committed transaction can be deleted without a replay.
/// Returns the lot to remove for acquisitions.
pub fn check_deletable(
    transaction: &Transaction,
    lots: &[TaxLot],
) -> Result<Option<Uuid>, AppError> {
    if transaction.corporate_action_id.is_some() || transaction.transaction_type.is_corporate_action()
    {
        return Err(AppError::Irreversible(
            "transactions written by corporate actions cannot be deleted".into(),
        ));
    }
    match transaction.transaction_type {
        TransactionType::Sell => Err(AppError::Irreversible(
            "SELL transactions cannot be deleted once realized gains are recorded".into(),
        )),
        TransactionType::Buy | TransactionType::DividendReinvest => {
            let lot = lots.first().ok_or(AppError::LotConsumed {
                transaction_id: transaction.id,
                lot_id: None,
            })?;
            if lot.is_consumed() || !lot.is_open() {
                return Err(AppError::LotConsumed {
                    transaction_id: transaction.id,
                    lot_id: Some(lot.id),
                });
            }
            if lot.is_adjusted()
                || lot.symbol != transaction.symbol
                || lot.original_quantity != transaction.quantity
            {
                return Err(AppError::Irreversible(format!(
                    "lot {} has been adjusted by a corporate action",
                    lot.id
                )));
            }
            Ok(Some(lot.id))
        }
        _ => Ok(None),
    }
}

/// Removes the transaction row and, for acquisitions, its untouched lot.
/// Holdings must already be locked.
async fn remove_transaction(
    conn: &mut PgConnection,
    positions: &mut BTreeMap<String, LockedPosition>,
    transaction: &Transaction,
) -> Result<u64, AppError> {
    let lots = tax_lot_queries::find_by_transaction(&mut *conn, transaction.id).await?;
    let mut lots_deleted = 0;
    if let Some(lot_id) = check_deletable(transaction, &lots)? {
        let position = positions.get_mut(&transaction.symbol).ok_or_else(|| {
            AppError::Internal(format!("holding {} was not locked", transaction.symbol))
        })?;
        if position.book.remove_lot(lot_id).is_none() {
            return Err(AppError::LotConsumed {
                transaction_id: transaction.id,
                lot_id: Some(lot_id),
            });
        }
        position.flush(&mut *conn).await?;
        lots_deleted = 1;
    }
    transaction_queries::delete(&mut *conn, transaction.id).await?;
    Ok(lots_deleted)
}

fn acquisition_symbols(transactions: &[Transaction]) -> Vec<String> {
    transactions
        .iter()
        .filter(|t| t.transaction_type.is_acquisition())
        .map(|t| t.symbol.clone())
        .collect()
}

pub async fn delete(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    transaction_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let transaction = transaction_queries::find(&mut *tx, portfolio_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", transaction_id)))?;

    let mut positions = lock_positions(
        &mut tx,
        portfolio_id,
        acquisition_symbols(std::slice::from_ref(&transaction)),
    )
    .await?;
    remove_transaction(&mut tx, &mut positions, &transaction).await?;
    save_positions(&mut tx, &mut positions).await?;
    commit(tx).await?;

    info!("🗑️ Deleted transaction {} from portfolio {}", transaction_id, portfolio_id);
    Ok(())
}

/// Deletes a whole import batch, or nothing if any row is not deletable.
pub async fn delete_import(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    import_batch_id: Uuid,
) -> Result<DeletedImport, AppError> {
    let mut tx = pool.begin().await?;
    authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let transactions =
        transaction_queries::list_by_batch(&mut *tx, portfolio_id, import_batch_id).await?;
    if transactions.is_empty() {
        return Err(AppError::NotFound(format!("import batch {}", import_batch_id)));
    }
    if let Some(sell) = transactions
        .iter()
        .find(|t| t.transaction_type == TransactionType::Sell)
    {
        return Err(AppError::Irreversible(format!(
            "import batch contains SELL {}",
            sell.id
        )));
    }

    let mut positions =
        lock_positions(&mut tx, portfolio_id, acquisition_symbols(&transactions)).await?;
    let mut lots_deleted = 0;
    for transaction in &transactions {
        lots_deleted += remove_transaction(&mut tx, &mut positions, transaction).await?;
    }
    save_positions(&mut tx, &mut positions).await?;
    commit(tx).await?;

    info!(
        "🗑️ Deleted import batch {} ({} transactions, {} lots)",
        import_batch_id,
        transactions.len(),
        lots_deleted
    );
    Ok(DeletedImport {
        import_batch_id,
        transactions_deleted: transactions.len() as u64,
        lots_deleted,
    })
}

pub async fn list(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    query: &TransactionQuery,
) -> Result<Vec<Transaction>, AppError> {
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    db::with_retry("list transactions", || {
        transaction_queries::list(pool, portfolio_id, query)
    })
    .await
    .map_err(|e| {
        error!("Failed to list transactions for portfolio {}: {}", portfolio_id, e);
        AppError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;
    use crate::ledger::{apply_corporate_action, ActionInput, PositionBook};
    use crate::models::{CorporateAction, CorporateActionType, CostBasisMethod};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn portfolio() -> Portfolio {
        Portfolio::new(Uuid::new_v4(), "Core".into(), None, "USD".into(), CostBasisMethod::Fifo)
    }

    fn input(kind: TransactionType, symbol: &str, on: NaiveDate) -> CreateTransaction {
        CreateTransaction {
            transaction_type: kind,
            symbol: symbol.into(),
            date: on,
            quantity: dec("10"),
            price: Some(dec("100")),
            commission: None,
            currency: None,
            notes: None,
            lot_ids: None,
        }
    }

    fn buy_row(portfolio: &Portfolio) -> Transaction {
        let validated =
            validate_transaction(input(TransactionType::Buy, "AAPL", date(2023, 1, 1)), portfolio)
                .unwrap();
        transaction_row(portfolio.id, &validated, None)
    }

    #[test]
    fn test_import_is_sorted_by_date_and_stable() {
        let portfolio = portfolio();
        let mut first = input(TransactionType::Buy, "AAPL", date(2023, 6, 1));
        first.notes = Some("first".into());
        let mut second = input(TransactionType::Buy, "AAPL", date(2023, 6, 1));
        second.notes = Some("second".into());
        let earliest = input(TransactionType::Buy, "MSFT", date(2023, 1, 1));

        let prepared = prepare_import(vec![first, second, earliest], &portfolio).unwrap();
        assert_eq!(prepared[0].symbol, "MSFT");
        assert_eq!(prepared[1].notes.as_deref(), Some("first"));
        assert_eq!(prepared[2].notes.as_deref(), Some("second"));
    }

    #[test]
    fn test_import_rejects_whole_batch_on_one_bad_row() {
        let portfolio = portfolio();
        let mut bad = input(TransactionType::Buy, "AAPL", date(2023, 1, 1));
        bad.quantity = dec("-1");
        let result = prepare_import(
            vec![input(TransactionType::Buy, "AAPL", date(2023, 1, 1)), bad],
            &portfolio,
        );
        assert!(matches!(
            result,
            Err(AppError::TransactionValidation { field: "quantity", .. })
        ));
        assert!(prepare_import(Vec::new(), &portfolio).is_err());
    }

    #[test]
    fn test_row_carries_amount_and_batch() {
        let portfolio = portfolio();
        let batch = Uuid::new_v4();
        let validated =
            validate_transaction(input(TransactionType::Buy, "aapl", date(2023, 1, 1)), &portfolio)
                .unwrap();
        let row = transaction_row(portfolio.id, &validated, Some(batch));
        assert_eq!(row.symbol, "AAPL");
        assert_eq!(row.amount, Some(dec("1000")));
        assert_eq!(row.import_batch_id, Some(batch));
        assert_eq!(row.currency, "USD");
    }

    #[test]
    fn test_untouched_buy_lot_is_deletable() {
        let portfolio = portfolio();
        let row = buy_row(&portfolio);
        let lot = TaxLot::new(portfolio.id, "AAPL".into(), row.transaction_date, dec("10"), dec("1000"), row.id);
        assert_eq!(check_deletable(&row, std::slice::from_ref(&lot)).unwrap(), Some(lot.id));
    }

    #[test]
    fn test_partially_sold_lot_blocks_delete() {
        let portfolio = portfolio();
        let row = buy_row(&portfolio);
        let mut lot = TaxLot::new(portfolio.id, "AAPL".into(), row.transaction_date, dec("10"), dec("1000"), row.id);
        lot.quantity = dec("4");
        let err = check_deletable(&row, std::slice::from_ref(&lot)).unwrap_err();
        assert!(matches!(err, AppError::LotConsumed { lot_id: Some(id), .. } if id == lot.id));

        let err = check_deletable(&row, &[]).unwrap_err();
        assert!(matches!(err, AppError::LotConsumed { lot_id: None, .. }));
    }

    #[test]
    fn test_split_adjusted_lot_blocks_delete() {
        let portfolio = portfolio();
        let row = buy_row(&portfolio);
        let mut lot = TaxLot::new(portfolio.id, "AAPL".into(), row.transaction_date, dec("20"), dec("1000"), row.id);
        lot.original_quantity = dec("20");
        assert!(matches!(
            check_deletable(&row, std::slice::from_ref(&lot)),
            Err(AppError::Irreversible(_))
        ));

        let mut marked = TaxLot::new(portfolio.id, "AAPL".into(), row.transaction_date, dec("10"), dec("1000"), row.id);
        marked.adjusted_by_action_id = Some(Uuid::now_v7());
        assert!(matches!(
            check_deletable(&row, std::slice::from_ref(&marked)),
            Err(AppError::Irreversible(_))
        ));
    }

    #[test]
    fn test_spinoff_parent_lot_blocks_delete() {
        let portfolio = portfolio();
        let row = buy_row(&portfolio);
        let lot = TaxLot::new(portfolio.id, "AAPL".into(), row.transaction_date, dec("10"), dec("1000"), row.id);
        let spinoff = CorporateAction {
            id: Uuid::now_v7(),
            symbol: "AAPL".into(),
            action_type: CorporateActionType::Spinoff,
            action_date: date(2024, 6, 1),
            ratio: Some(dec("0.5")),
            amount: None,
            new_symbol: Some("SPIN".into()),
            description: None,
            applied: false,
            created_at: chrono::Utc::now(),
        };

        for allocation in ["0.2", "0"] {
            let mut parent = PositionBook::from_lots(portfolio.id, "AAPL", vec![lot.clone()]);
            let mut child = PositionBook::new(portfolio.id, "SPIN");
            let input = ActionInput {
                action: &spinoff,
                transaction_id: Uuid::now_v7(),
                cost_allocation: dec(allocation),
            };
            apply_corporate_action(&input, &mut parent, Some(&mut child)).unwrap();
            assert_eq!(child.lots().len(), 1);

            let adjusted = &parent.lots()[0];
            assert_eq!(adjusted.quantity, row.quantity);
            assert_eq!(adjusted.symbol, row.symbol);
            assert!(matches!(
                check_deletable(&row, std::slice::from_ref(adjusted)),
                Err(AppError::Irreversible(_))
            ));
        }
    }

    #[test]
    fn test_sells_and_synthesized_rows_are_irreversible() {
        let portfolio = portfolio();
        let mut row = buy_row(&portfolio);
        row.transaction_type = TransactionType::Sell;
        assert!(matches!(check_deletable(&row, &[]), Err(AppError::Irreversible(_))));

        row.transaction_type = TransactionType::Dividend;
        assert_eq!(check_deletable(&row, &[]).unwrap(), None);

        row.corporate_action_id = Some(Uuid::new_v4());
        assert!(matches!(check_deletable(&row, &[]), Err(AppError::Irreversible(_))));
    }
}
