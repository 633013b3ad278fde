use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::{self, portfolio_queries};
use crate::errors::{is_unique_violation, AppError};
use crate::ledger::normalize_currency;
use crate::models::{CreatePortfolio, Portfolio, UpdatePortfolio};
use crate::services::access_service::authorize_portfolio;

const MAX_NAME_LEN: usize = 100;
const DEFAULT_CURRENCY: &str = "USD";

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Portfolio name cannot be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Portfolio name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn unique_name(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::DuplicatePortfolioName
    } else {
        error!("Failed to write portfolio: {}", e);
        e.into()
    }
}

pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    input: CreatePortfolio,
) -> Result<Portfolio, AppError> {
    let name = validate_name(&input.name)?;
    let base_currency = match input.base_currency.as_deref() {
        Some(raw) => normalize_currency(raw)
            .ok_or_else(|| AppError::Validation(format!("Invalid currency code: {}", raw)))?,
        None => DEFAULT_CURRENCY.to_string(),
    };
    let new_portfolio = Portfolio::new(
        user_id,
        name,
        input.description.filter(|d| !d.trim().is_empty()),
        base_currency,
        input.cost_basis_method.unwrap_or_default(),
    );
    let portfolio = portfolio_queries::insert(pool, &new_portfolio)
        .await
        .map_err(unique_name)?;
    info!("✅ Created portfolio {} for user {}", portfolio.id, user_id);
    Ok(portfolio)
}

pub async fn list(pool: &PgPool, user_id: Uuid) -> Result<Vec<Portfolio>, AppError> {
    let portfolios =
        db::with_retry("list portfolios", || portfolio_queries::fetch_for_user(pool, user_id))
            .await?;
    Ok(portfolios)
}

pub async fn get(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<Portfolio, AppError> {
    authorize_portfolio(pool, user_id, id).await
}

/// Changing the cost-basis method only affects sells recorded afterwards.
pub async fn update(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    input: UpdatePortfolio,
) -> Result<Portfolio, AppError> {
    let current = authorize_portfolio(pool, user_id, id).await?;
    let name = match input.name.as_deref() {
        Some(name) => validate_name(name)?,
        None => current.name,
    };
    let description = match input.description {
        Some(d) if d.trim().is_empty() => None,
        Some(d) => Some(d),
        None => current.description,
    };
    let method = input.cost_basis_method.unwrap_or(current.cost_basis_method);

    portfolio_queries::update(pool, id, &name, description.as_deref(), method)
        .await
        .map_err(unique_name)?
        .ok_or(AppError::PortfolioNotFound)
}

/// Deletes the portfolio and, through cascades, every derived row.
pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    authorize_portfolio(pool, user_id, id).await?;
    match portfolio_queries::delete(pool, id).await? {
        0 => Err(AppError::PortfolioNotFound),
        _ => {
            info!("🗑️ Deleted portfolio {}", id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(validate_name("  Retirement ").unwrap(), "Retirement");
    }

    #[test]
    fn test_blank_and_overlong_names_rejected() {
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }
}
