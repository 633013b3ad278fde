mod user;
mod credential;
mod portfolio;
mod transaction;
mod holding;
mod tax_lot;
mod realized_gain;
mod corporate_action;
mod proposal;
mod performance_snapshot;

pub use user::{
    AccessToken, AuthSession, CompletePasswordResetRequest, LoginRequest, LogoutRequest,
    PasswordResetRequest, RefreshRequest, RegisterRequest, User,
};
pub use credential::{PasswordResetTicket, RefreshCredential};
pub use portfolio::{CostBasisMethod, CreatePortfolio, Portfolio, UpdatePortfolio};
pub use transaction::{
    transaction_amount, CreateTransaction, DeletedImport, ImportResult, ImportTransactions,
    RecordedTransaction, Transaction, TransactionQuery, TransactionType,
};
pub use holding::{Holding, HoldingQuery, PortfolioSummary, UnrealizedPosition};
pub use tax_lot::{LotView, TaxLot};
pub use realized_gain::{HoldingPeriod, RealizedGain, RealizedGainQuery, RealizedGainSummary};
pub use corporate_action::{
    CorporateAction, CorporateActionQuery, CorporateActionType, CreateCorporateAction,
    DetectionReport,
};
pub use proposal::{
    action_settled, may_propose, PortfolioActionProposal, ProposalDetails, ProposalOutcome,
    ProposalQuery, ProposalStatus, ReviewProposal,
};
pub use performance_snapshot::{PerformanceSnapshot, SnapshotQuery};
