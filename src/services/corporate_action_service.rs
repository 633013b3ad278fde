use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Connection, PgConnection, PgPool};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancellation::commit;
use crate::db::proposal_queries::ProposalUpdate;
use crate::db::{
    self, corporate_action_queries, holding_queries, portfolio_queries, proposal_queries,
    transaction_queries,
};
use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::ledger::{apply_corporate_action, validate_corporate_action, ActionInput, SynthesizedTransaction};
use crate::models::{
    action_settled, may_propose, CorporateAction, CorporateActionQuery, CorporateActionType,
    CreateCorporateAction, DetectionReport, Portfolio, PortfolioActionProposal, ProposalDetails,
    ProposalStatus, ReviewProposal, Transaction,
};
use crate::services::access_service::{authorize_portfolio, authorize_portfolio_in};
use crate::services::position_service::lock_positions;

pub async fn create(
    pool: &PgPool,
    input: CreateCorporateAction,
) -> Result<CorporateAction, AppError> {
    let input = validate_corporate_action(input)?;
    let action = CorporateAction {
        id: Uuid::now_v7(),
        symbol: input.symbol,
        action_type: input.action_type,
        action_date: input.action_date,
        ratio: input.ratio,
        amount: input.amount,
        new_symbol: input.new_symbol,
        description: input.description,
        applied: false,
        created_at: Utc::now(),
    };
    let action = corporate_action_queries::insert(pool, &action).await?;
    info!(
        "📅 Recorded {:?} for {} on {}",
        action.action_type, action.symbol, action.action_date
    );
    Ok(action)
}

pub async fn list(
    pool: &PgPool,
    query: &CorporateActionQuery,
) -> Result<Vec<CorporateAction>, AppError> {
    let actions =
        db::with_retry("list corporate actions", || corporate_action_queries::list(pool, query))
            .await?;
    Ok(actions)
}

/// Proposes one action to one portfolio, under the portfolio row lock.
/// Returns `None` when the portfolio no longer holds the symbol and
/// `Some(false)` when a proposal already blocks a new one.
async fn propose_locked(
    conn: &mut PgConnection,
    action: &CorporateAction,
    portfolio_id: Uuid,
) -> Result<Option<bool>, AppError> {
    if !portfolio_queries::lock_for_detection(&mut *conn, portfolio_id).await? {
        return Ok(None);
    }
    let Some(holding) = holding_queries::find(&mut *conn, portfolio_id, &action.symbol)
        .await?
        .filter(|h| h.is_open())
    else {
        return Ok(None);
    };
    let existing = proposal_queries::list_for_action(&mut *conn, portfolio_id, action.id).await?;
    if !may_propose(&existing) {
        return Ok(Some(false));
    }
    let proposal =
        PortfolioActionProposal::new(portfolio_id, action.id, action.symbol.clone(), holding.quantity);
    proposal_queries::insert(&mut *conn, &proposal).await?;
    Ok(Some(true))
}

/// Scans unapplied actions and creates a PENDING proposal for every
/// portfolio holding the symbol that does not already have one.
pub async fn detect(pool: &PgPool, cancel: &CancellationToken) -> Result<DetectionReport, AppError> {
    let actions =
        db::with_retry("list unapplied actions", || corporate_action_queries::list_unapplied(pool))
            .await?;
    let mut report = DetectionReport {
        actions_scanned: 0,
        proposals_created: 0,
        proposals_skipped: 0,
    };

    for action in &actions {
        if cancel.is_cancelled() {
            warn!("🛑 Detection cancelled after {} actions", report.actions_scanned);
            return Err(AppError::OperationCancelled);
        }
        report.actions_scanned += 1;

        let holdings = db::with_retry("list holders", || {
            holding_queries::list_open_by_symbol(pool, &action.symbol)
        })
        .await?;
        for holding in holdings {
            let mut tx = pool.begin().await?;
            let outcome = propose_locked(&mut tx, action, holding.portfolio_id).await?;
            commit(tx).await?;
            match outcome {
                Some(true) => {
                    report.proposals_created += 1;
                    info!(
                        "📬 Proposed {:?} {} to portfolio {}",
                        action.action_type, action.symbol, holding.portfolio_id
                    );
                }
                Some(false) => report.proposals_skipped += 1,
                None => {}
            }
        }

        settle(pool, action.id).await?;
    }
    Ok(report)
}

/// On-demand proposal of one action to one of the caller's portfolios.
pub async fn request_proposal(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    corporate_action_id: Uuid,
) -> Result<ProposalDetails, AppError> {
    let mut tx = pool.begin().await?;
    authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let action = corporate_action_queries::find(&mut *tx, corporate_action_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("corporate action {}", corporate_action_id)))?;
    if action.applied {
        return Err(AppError::Validation(format!(
            "corporate action {} is already applied",
            action.id
        )));
    }
    match propose_locked(&mut tx, &action, portfolio_id).await? {
        None => Err(AppError::NotFound(format!(
            "no open {} position in this portfolio",
            action.symbol
        ))),
        Some(false) => Err(AppError::ProposalAlreadyExists),
        Some(true) => {
            commit(tx).await?;
            let mut proposals =
                proposal_queries::list(pool, portfolio_id, Some(ProposalStatus::Pending)).await?;
            proposals.retain(|p| p.corporate_action_id == action.id);
            let proposal = proposals
                .into_iter()
                .next()
                .ok_or_else(|| AppError::Internal("created proposal not found".into()))?;
            Ok(ProposalDetails {
                proposal,
                corporate_action: action,
            })
        }
    }
}

pub async fn list_proposals(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    status: Option<ProposalStatus>,
) -> Result<Vec<ProposalDetails>, AppError> {
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    let proposals = db::with_retry("list proposals", || {
        proposal_queries::list(pool, portfolio_id, status)
    })
    .await?;

    let mut actions: HashMap<Uuid, CorporateAction> = HashMap::new();
    let mut details = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        let action = match actions.get(&proposal.corporate_action_id) {
            Some(action) => action.clone(),
            None => {
                let action = db::with_retry("find corporate action", || {
                    corporate_action_queries::find(pool, proposal.corporate_action_id)
                })
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "proposal {} references missing action",
                        proposal.id
                    ))
                })?;
                actions.insert(action.id, action.clone());
                action
            }
        };
        details.push(ProposalDetails {
            proposal,
            corporate_action: action,
        });
    }
    Ok(details)
}

fn require_transition(
    proposal: &PortfolioActionProposal,
    next: ProposalStatus,
) -> Result<(), AppError> {
    if proposal.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "proposal {} is {} and cannot become {}",
            proposal.id,
            proposal.status.as_str(),
            next.as_str()
        )))
    }
}

/// SPINOFF accepts an optional fraction in [0, 1] of parent cost moved to
/// the child lots; other types refuse one.
pub fn resolve_cost_allocation(
    action_type: CorporateActionType,
    requested: Option<Decimal>,
) -> Result<Decimal, AppError> {
    match (action_type, requested) {
        (_, None) => Ok(Decimal::zero()),
        (CorporateActionType::Spinoff, Some(fraction)) => {
            if fraction.is_negative() || fraction > Decimal::from_i64(1) {
                Err(AppError::action_field("cost_allocation", "must be between 0 and 1"))
            } else {
                Ok(fraction)
            }
        }
        (_, Some(_)) => Err(AppError::action_field(
            "cost_allocation",
            "only applies to SPINOFF",
        )),
    }
}

fn synthesized_row(
    portfolio: &Portfolio,
    action: &CorporateAction,
    synthesized: SynthesizedTransaction,
) -> Transaction {
    Transaction {
        id: synthesized.id,
        portfolio_id: portfolio.id,
        transaction_type: synthesized.transaction_type,
        symbol: synthesized.symbol,
        transaction_date: synthesized.date,
        quantity: synthesized.quantity,
        price: synthesized.price,
        commission: Decimal::zero(),
        amount: synthesized.amount,
        currency: portfolio.base_currency.clone(),
        import_batch_id: None,
        corporate_action_id: Some(action.id),
        notes: Some(synthesized.notes),
        created_at: Utc::now(),
    }
}

/// Applies `action` to the portfolio's lots and holdings and writes the
/// audit transaction. Runs inside a savepoint: on error nothing it wrote
/// survives, while the caller's transaction stays usable.
async fn apply_to_portfolio(
    conn: &mut PgConnection,
    portfolio: &Portfolio,
    action: &CorporateAction,
    cost_allocation: Decimal,
) -> Result<Transaction, AppError> {
    let mut savepoint = conn.begin().await?;

    let target_symbol = match action.action_type {
        CorporateActionType::Merger
        | CorporateActionType::Spinoff
        | CorporateActionType::TickerChange => action.new_symbol.clone(),
        CorporateActionType::Split | CorporateActionType::Dividend => None,
    };
    let symbols = std::iter::once(action.symbol.clone()).chain(target_symbol.clone());
    let mut positions = lock_positions(&mut savepoint, portfolio.id, symbols).await?;

    let mut source = positions
        .remove(&action.symbol)
        .ok_or_else(|| AppError::Internal(format!("holding {} was not locked", action.symbol)))?;
    let mut target = target_symbol.as_ref().and_then(|symbol| positions.remove(symbol));

    let input = ActionInput {
        action,
        transaction_id: Uuid::now_v7(),
        cost_allocation,
    };
    let synthesized =
        apply_corporate_action(&input, &mut source.book, target.as_mut().map(|t| &mut t.book))?;

    let transaction =
        transaction_queries::insert(&mut *savepoint, &synthesized_row(portfolio, action, synthesized))
            .await?;
    if let Some(target) = target.as_mut() {
        target.save(&mut savepoint).await?;
    }
    source.save(&mut savepoint).await?;
    savepoint.commit().await?;
    Ok(transaction)
}

/// Errors that mean "this proposal cannot be applied", as opposed to the
/// request itself failing.
fn is_application_failure(err: &AppError) -> bool {
    !matches!(err, AppError::Internal(_) | AppError::OperationCancelled)
}

/// Flags the action applied once every portfolio it reached has settled.
/// Returns whether the flag flipped.
async fn settle(pool: &PgPool, action_id: Uuid) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;
    let Some(action) = corporate_action_queries::lock(&mut *tx, action_id).await? else {
        return Ok(false);
    };
    if action.applied {
        return Ok(false);
    }
    let latest = proposal_queries::latest_for_action(&mut *tx, action_id).await?;
    if !action_settled(&latest) {
        return Ok(false);
    }
    corporate_action_queries::mark_applied(&mut *tx, action_id).await?;
    commit(tx).await?;
    Ok(true)
}

async fn settle_action(pool: &PgPool, action_id: Uuid) {
    match settle(pool, action_id).await {
        Ok(true) => info!("✅ Corporate action {} fully applied", action_id),
        Ok(false) => {}
        Err(e) => warn!("Failed to settle corporate action {}: {}", action_id, e),
    }
}

/// PENDING → APPROVED → APPLIED in one transaction. If the action cannot
/// be applied (e.g. the lots were sold in the meantime) the proposal is
/// committed as REJECTED with a note and the cause is returned.
pub async fn approve(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    proposal_id: Uuid,
    review: ReviewProposal,
) -> Result<ProposalDetails, AppError> {
    let mut tx = pool.begin().await?;
    let portfolio = authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let proposal = proposal_queries::lock(&mut *tx, portfolio_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("proposal {}", proposal_id)))?;
    require_transition(&proposal, ProposalStatus::Approved)?;

    let action = corporate_action_queries::find(&mut *tx, proposal.corporate_action_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("corporate action {}", proposal.corporate_action_id)))?;
    let cost_allocation = resolve_cost_allocation(action.action_type, review.cost_allocation)?;

    let approved = proposal_queries::update_status(
        &mut *tx,
        proposal.id,
        &ProposalUpdate {
            status: ProposalStatus::Approved,
            reviewed_by: user_id,
            notes: review.notes.as_deref(),
            applied_at: None,
            application_failed: false,
        },
    )
    .await?;

    let outcome = apply_to_portfolio(&mut tx, &portfolio, &action, cost_allocation).await;
    let (proposal, failure) = match outcome {
        Ok(transaction) => {
            let applied = proposal_queries::update_status(
                &mut *tx,
                approved.id,
                &ProposalUpdate {
                    status: ProposalStatus::Applied,
                    reviewed_by: user_id,
                    notes: None,
                    applied_at: Some(Utc::now()),
                    application_failed: false,
                },
            )
            .await?;
            info!(
                "✅ Applied {:?} {} to portfolio {} (transaction {})",
                action.action_type, action.symbol, portfolio_id, transaction.id
            );
            (applied, None)
        }
        Err(e) if is_application_failure(&e) => {
            let note = format!("Application failed: {}", e);
            let rejected = proposal_queries::update_status(
                &mut *tx,
                approved.id,
                &ProposalUpdate {
                    status: ProposalStatus::Rejected,
                    reviewed_by: user_id,
                    notes: Some(&note),
                    applied_at: None,
                    application_failed: true,
                },
            )
            .await?;
            warn!("❌ Proposal {} rejected: {}", proposal_id, note);
            (rejected, Some(e))
        }
        Err(e) => {
            error!("Failed to apply proposal {}: {}", proposal_id, e);
            return Err(e);
        }
    };
    commit(tx).await?;

    settle_action(pool, action.id).await;
    match failure {
        Some(e) => Err(e),
        None => Ok(ProposalDetails {
            proposal,
            corporate_action: action,
        }),
    }
}

pub async fn reject(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    proposal_id: Uuid,
    review: ReviewProposal,
) -> Result<ProposalDetails, AppError> {
    let mut tx = pool.begin().await?;
    authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let proposal = proposal_queries::lock(&mut *tx, portfolio_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("proposal {}", proposal_id)))?;
    if proposal.status != ProposalStatus::Pending {
        return Err(AppError::Validation(format!(
            "proposal {} is {}; only PENDING proposals can be rejected",
            proposal.id,
            proposal.status.as_str()
        )));
    }
    let action = corporate_action_queries::find(&mut *tx, proposal.corporate_action_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("corporate action {}", proposal.corporate_action_id)))?;

    let rejected = proposal_queries::update_status(
        &mut *tx,
        proposal.id,
        &ProposalUpdate {
            status: ProposalStatus::Rejected,
            reviewed_by: user_id,
            notes: review.notes.as_deref(),
            applied_at: None,
            application_failed: false,
        },
    )
    .await?;
    commit(tx).await?;

    info!("Proposal {} rejected by user {}", proposal_id, user_id);
    settle_action(pool, action.id).await;
    Ok(ProposalDetails {
        proposal: rejected,
        corporate_action: action,
    })
}

/// Dismisses a PENDING proposal. The next detection run may propose the
/// action again while the portfolio still holds the symbol.
pub async fn delete_pending(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    proposal_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    authorize_portfolio_in(&mut tx, user_id, portfolio_id).await?;
    let proposal = proposal_queries::lock(&mut *tx, portfolio_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("proposal {}", proposal_id)))?;
    if proposal.status != ProposalStatus::Pending {
        return Err(AppError::Validation(format!(
            "proposal {} is {}; only PENDING proposals can be deleted",
            proposal.id,
            proposal.status.as_str()
        )));
    }
    proposal_queries::delete_pending(&mut *tx, portfolio_id, proposal_id).await?;
    commit(tx).await?;
    info!("🗑️ Deleted pending proposal {}", proposal_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    #[test]
    fn test_cost_allocation_defaults_to_zero() {
        assert!(resolve_cost_allocation(CorporateActionType::Spinoff, None)
            .unwrap()
            .is_zero());
        assert!(resolve_cost_allocation(CorporateActionType::Split, None)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_cost_allocation_bounds() {
        assert_eq!(
            resolve_cost_allocation(CorporateActionType::Spinoff, Some(dec("0.25"))).unwrap(),
            dec("0.25")
        );
        assert!(resolve_cost_allocation(CorporateActionType::Spinoff, Some(dec("1"))).is_ok());
        assert!(resolve_cost_allocation(CorporateActionType::Spinoff, Some(dec("1.01"))).is_err());
        assert!(resolve_cost_allocation(CorporateActionType::Spinoff, Some(dec("-0.1"))).is_err());
    }

    #[test]
    fn test_cost_allocation_only_for_spinoffs() {
        let err = resolve_cost_allocation(CorporateActionType::Merger, Some(dec("0.5"))).unwrap_err();
        assert!(matches!(
            err,
            AppError::CorporateActionValidation { field: "cost_allocation", .. }
        ));
    }

    #[test]
    fn test_transition_guard() {
        let mut proposal =
            PortfolioActionProposal::new(Uuid::new_v4(), Uuid::new_v4(), "AAPL".into(), dec("10"));
        assert!(require_transition(&proposal, ProposalStatus::Approved).is_ok());
        proposal.status = ProposalStatus::Applied;
        assert!(require_transition(&proposal, ProposalStatus::Approved).is_err());
    }

    #[test]
    fn test_failure_classification() {
        assert!(is_application_failure(&AppError::NotFound("no lots".into())));
        assert!(is_application_failure(&AppError::action_field("ratio", "bad")));
        assert!(!is_application_failure(&AppError::Internal("db".into())));
        assert!(!is_application_failure(&AppError::OperationCancelled));
    }
}
