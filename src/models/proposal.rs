use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;
use crate::models::CorporateAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "proposal_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

impl ProposalStatus {
    /// PENDING -> APPROVED -> APPLIED, PENDING -> REJECTED. An approved
    /// proposal whose application fails is also moved to REJECTED.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Applied) | (Approved, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Rejected | ProposalStatus::Applied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Approved => "APPROVED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Applied => "APPLIED",
        }
    }
}

// Per-portfolio materialisation of a corporate action awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioActionProposal {
    pub id: uuid::Uuid,
    pub portfolio_id: uuid::Uuid,
    pub corporate_action_id: uuid::Uuid,
    pub status: ProposalStatus,
    pub affected_symbol: String,
    pub shares_at_detection: Decimal,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub reviewed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub reviewed_by: Option<uuid::Uuid>,
    pub applied_at: Option<chrono::DateTime<chrono::Utc>>,
    pub notes: Option<String>,
    /// Set when approval was attempted but the action could not be applied.
    pub application_failed: bool,
}

impl PortfolioActionProposal {
    pub(crate) fn new(
        portfolio_id: uuid::Uuid,
        corporate_action_id: uuid::Uuid,
        affected_symbol: String,
        shares_at_detection: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            portfolio_id,
            corporate_action_id,
            status: ProposalStatus::Pending,
            affected_symbol,
            shares_at_detection,
            detected_at: chrono::Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            applied_at: None,
            notes: None,
            application_failed: false,
        }
    }

    /// Any proposal for the same portfolio and action blocks a new one,
    /// except a rejection caused by a failed application.
    pub fn blocks_new_proposal(&self) -> bool {
        !(self.status == ProposalStatus::Rejected && self.application_failed)
    }

    /// A failed application stays open while the portfolio still holds the
    /// symbol, since the action can be proposed again.
    pub fn is_settled(&self, still_holds_symbol: bool) -> bool {
        match self.status {
            ProposalStatus::Pending | ProposalStatus::Approved => false,
            _ if self.application_failed => !still_holds_symbol,
            _ => true,
        }
    }
}

/// `existing` is every proposal of one portfolio for one action.
pub fn may_propose(existing: &[PortfolioActionProposal]) -> bool {
    !existing.iter().any(PortfolioActionProposal::blocks_new_proposal)
}

// Latest proposal of one portfolio for an action, with its current holding.
#[derive(Debug, Clone, FromRow)]
pub struct ProposalOutcome {
    #[sqlx(flatten)]
    pub proposal: PortfolioActionProposal,
    pub still_holds_symbol: bool,
}

/// An action is fully applied once it reached at least one portfolio and
/// every portfolio's latest proposal is settled.
pub fn action_settled(latest: &[ProposalOutcome]) -> bool {
    !latest.is_empty()
        && latest
            .iter()
            .all(|outcome| outcome.proposal.is_settled(outcome.still_holds_symbol))
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalDetails {
    #[serde(flatten)]
    pub proposal: PortfolioActionProposal,
    pub corporate_action: CorporateAction,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<ProposalStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewProposal {
    pub notes: Option<String>,
    /// SPINOFF only: fraction of each parent lot's cost moved to the child.
    pub cost_allocation: Option<Decimal>,
}
