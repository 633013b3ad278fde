pub(crate) mod auth;
pub(crate) mod corporate_actions;
pub(crate) mod health;
pub(crate) mod holdings;
pub(crate) mod portfolios;
pub(crate) mod proposals;
pub(crate) mod snapshots;
pub(crate) mod transactions;
