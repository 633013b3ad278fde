use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{PortfolioActionProposal, ProposalOutcome, ProposalStatus};

const PROPOSAL_COLUMNS: &str = "id, portfolio_id, corporate_action_id, status, affected_symbol, \
     shares_at_detection, detected_at, reviewed_at, reviewed_by, applied_at, notes, application_failed";

/// Callers hold the portfolio row lock and check [`may_propose`] against
/// [`list_for_action`] first.
///
/// [`may_propose`]: crate::models::may_propose
pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    proposal: &PortfolioActionProposal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO portfolio_action_proposals
            (id, portfolio_id, corporate_action_id, status, affected_symbol,
             shares_at_detection, detected_at, application_failed)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(proposal.id)
    .bind(proposal.portfolio_id)
    .bind(proposal.corporate_action_id)
    .bind(proposal.status)
    .bind(&proposal.affected_symbol)
    .bind(&proposal.shares_at_detection)
    .bind(proposal.detected_at)
    .bind(proposal.application_failed)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_for_action<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    corporate_action_id: Uuid,
) -> Result<Vec<PortfolioActionProposal>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioActionProposal>(&format!(
        "SELECT {} FROM portfolio_action_proposals
         WHERE portfolio_id = $1 AND corporate_action_id = $2
         ORDER BY detected_at DESC, id DESC",
        PROPOSAL_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(corporate_action_id)
    .fetch_all(executor)
    .await
}

/// Most recent proposal per portfolio for the action, with whether that
/// portfolio still holds the affected symbol.
pub async fn latest_for_action<'e, E: PgExecutor<'e>>(
    executor: E,
    corporate_action_id: Uuid,
) -> Result<Vec<ProposalOutcome>, sqlx::Error> {
    sqlx::query_as::<_, ProposalOutcome>(&format!(
        "SELECT latest.*,
                EXISTS (
                    SELECT 1 FROM holdings h
                    WHERE h.portfolio_id = latest.portfolio_id
                      AND h.symbol = latest.affected_symbol
                      AND h.quantity > 0
                ) AS still_holds_symbol
         FROM (
             SELECT DISTINCT ON (portfolio_id) {}
             FROM portfolio_action_proposals
             WHERE corporate_action_id = $1
             ORDER BY portfolio_id, detected_at DESC, id DESC
         ) latest",
        PROPOSAL_COLUMNS
    ))
    .bind(corporate_action_id)
    .fetch_all(executor)
    .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    status: Option<ProposalStatus>,
) -> Result<Vec<PortfolioActionProposal>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {} FROM portfolio_action_proposals WHERE portfolio_id = ",
        PROPOSAL_COLUMNS
    ));
    builder.push_bind(portfolio_id);
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status);
    }
    builder.push(" ORDER BY detected_at DESC, id DESC");

    let rows = builder
        .build_query_as::<PortfolioActionProposal>()
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn lock<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    id: Uuid,
) -> Result<Option<PortfolioActionProposal>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioActionProposal>(&format!(
        "SELECT {} FROM portfolio_action_proposals
         WHERE portfolio_id = $1 AND id = $2
         FOR UPDATE",
        PROPOSAL_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Review outcome written in one statement.
#[derive(Debug, Clone)]
pub struct ProposalUpdate<'a> {
    pub status: ProposalStatus,
    pub reviewed_by: Uuid,
    pub notes: Option<&'a str>,
    pub applied_at: Option<DateTime<Utc>>,
    pub application_failed: bool,
}

pub async fn update_status<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    update: &ProposalUpdate<'_>,
) -> Result<PortfolioActionProposal, sqlx::Error> {
    sqlx::query_as::<_, PortfolioActionProposal>(&format!(
        "UPDATE portfolio_action_proposals
         SET status = $2,
             reviewed_by = $3,
             reviewed_at = COALESCE(reviewed_at, NOW()),
             notes = COALESCE($4, notes),
             applied_at = $5,
             application_failed = $6
         WHERE id = $1
         RETURNING {}",
        PROPOSAL_COLUMNS
    ))
    .bind(id)
    .bind(update.status)
    .bind(update.reviewed_by)
    .bind(update.notes)
    .bind(update.applied_at)
    .bind(update.application_failed)
    .fetch_one(executor)
    .await
}

pub async fn delete_pending<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM portfolio_action_proposals
         WHERE portfolio_id = $1 AND id = $2 AND status = $3",
    )
    .bind(portfolio_id)
    .bind(id)
    .bind(ProposalStatus::Pending)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
