pub mod access_service;
pub mod auth_service;
pub mod corporate_action_service;
pub mod failure_cache;
pub mod holding_service;
pub mod job_scheduler_service;
pub mod notification_service;
pub mod portfolio_service;
pub mod position_service;
pub mod price_service;
pub mod rate_limiter;
pub mod snapshot_service;
pub mod transaction_service;
