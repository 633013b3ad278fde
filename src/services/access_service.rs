use sqlx::{PgConnection, PgPool};
use tracing::warn;
use uuid::Uuid;

use crate::db::{self, portfolio_queries};
use crate::errors::AppError;
use crate::models::Portfolio;

/// Missing and foreign portfolios are rejected the same way so callers
/// cannot discover other users' ids.
pub fn ensure_owner(portfolio: Option<Portfolio>, user_id: Uuid) -> Result<Portfolio, AppError> {
    match portfolio {
        Some(portfolio) if portfolio.is_owned_by(user_id) => Ok(portfolio),
        _ => Err(AppError::Unauthorized),
    }
}

/// Gate for every portfolio-scoped operation outside a transaction.
pub async fn authorize_portfolio(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<Portfolio, AppError> {
    let portfolio =
        db::with_retry("fetch portfolio", || portfolio_queries::fetch_one(pool, portfolio_id))
            .await?;
    ensure_owner(portfolio, user_id).map_err(|e| {
        warn!("User {} denied access to portfolio {}", user_id, portfolio_id);
        e
    })
}

/// Same gate, evaluated inside the caller's transaction.
pub async fn authorize_portfolio_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<Portfolio, AppError> {
    let portfolio = portfolio_queries::fetch_one(&mut *conn, portfolio_id).await?;
    ensure_owner(portfolio, user_id).map_err(|e| {
        warn!("User {} denied access to portfolio {}", user_id, portfolio_id);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CostBasisMethod;

    fn portfolio(owner: Uuid) -> Portfolio {
        Portfolio::new(owner, "Core".into(), None, "USD".into(), CostBasisMethod::Fifo)
    }

    #[test]
    fn test_owner_passes() {
        let owner = Uuid::new_v4();
        assert!(ensure_owner(Some(portfolio(owner)), owner).is_ok());
    }

    #[test]
    fn test_foreign_and_missing_look_identical() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let foreign = ensure_owner(Some(portfolio(owner)), stranger).unwrap_err();
        let missing = ensure_owner(None, stranger).unwrap_err();
        assert_eq!(foreign.code(), "UNAUTHORIZED");
        assert_eq!(missing.code(), foreign.code());
    }
}
