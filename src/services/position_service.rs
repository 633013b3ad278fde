use std::collections::{BTreeMap, BTreeSet};

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::{holding_queries, tax_lot_queries};
use crate::errors::AppError;
use crate::ledger::PositionBook;
use crate::models::Holding;

/// A position book whose holding row is locked by the current transaction.
pub struct LockedPosition {
    pub holding_id: Uuid,
    pub book: PositionBook,
}

impl LockedPosition {
    /// Writes pending lot inserts, updates and deletes.
    pub async fn flush(&mut self, conn: &mut PgConnection) -> Result<(), AppError> {
        let changes = self.book.changes();
        if !changes.is_empty() {
            tax_lot_queries::apply_changes(&mut *conn, &changes).await?;
        }
        self.book.clear_changes();
        Ok(())
    }

    /// Flushes lots and rewrites the holding totals from them. A fully sold
    /// holding keeps its row with zeroed values.
    pub async fn save(&mut self, conn: &mut PgConnection) -> Result<Holding, AppError> {
        self.flush(&mut *conn).await?;
        let holding =
            holding_queries::update_totals(&mut *conn, self.holding_id, &self.book.totals())
                .await?;
        Ok(holding)
    }
}

/// Locks (creating where missing) the holding row of every symbol, in
/// symbol order, and loads each one's open lots.
///
/// Every ledger mutation goes through here, so two writers on the same
/// (portfolio, symbol) serialize on the row lock, and the fixed order
/// keeps multi-symbol writers from deadlocking each other.
pub async fn lock_positions(
    conn: &mut PgConnection,
    portfolio_id: Uuid,
    symbols: impl IntoIterator<Item = String>,
) -> Result<BTreeMap<String, LockedPosition>, AppError> {
    let symbols: BTreeSet<String> = symbols.into_iter().collect();
    let mut positions = BTreeMap::new();
    for symbol in symbols {
        holding_queries::ensure_exists(&mut *conn, portfolio_id, &symbol).await?;
        let holding = holding_queries::lock(&mut *conn, portfolio_id, &symbol).await?;
        let lots = tax_lot_queries::open_lots(&mut *conn, portfolio_id, &symbol).await?;
        positions.insert(
            symbol.clone(),
            LockedPosition {
                holding_id: holding.id,
                book: PositionBook::from_lots(portfolio_id, symbol, lots),
            },
        );
    }
    Ok(positions)
}

pub async fn lock_position(
    conn: &mut PgConnection,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<LockedPosition, AppError> {
    lock_positions(conn, portfolio_id, [symbol.to_string()])
        .await?
        .remove(symbol)
        .ok_or_else(|| AppError::Internal(format!("holding lock for {} was not taken", symbol)))
}

/// Saves every locked position, in symbol order.
pub async fn save_positions(
    conn: &mut PgConnection,
    positions: &mut BTreeMap<String, LockedPosition>,
) -> Result<Vec<Holding>, AppError> {
    let mut holdings = Vec::with_capacity(positions.len());
    for position in positions.values_mut() {
        holdings.push(position.save(&mut *conn).await?);
    }
    Ok(holdings)
}
