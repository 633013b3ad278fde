//! Pure portfolio accounting engine.
//!
//! Nothing in here touches the database: services load the open lots for a
//! (portfolio, symbol), run them through a [`PositionBook`], then persist
//! the recorded [`LotChanges`] inside the same database transaction that
//! holds the row lock on the holding.

pub mod corporate_actions;
pub mod cost_basis;
pub mod holding_period;
pub mod position;
pub mod validation;

pub use corporate_actions::{apply_corporate_action, ActionInput, SynthesizedTransaction};
pub use cost_basis::{plan_disposal, LotSelection, LotTake};
pub use holding_period::{classify, days_held, is_long_term};
pub use position::{HoldingTotals, LotChanges, PositionBook, Sale};
pub use validation::{
    normalize_currency, normalize_symbol, validate_corporate_action, validate_transaction,
    ValidatedTransaction,
};
