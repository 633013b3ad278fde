pub mod app;
pub mod auth;
pub mod cancellation;
pub mod config;
pub mod db;
pub mod decimal;
pub mod errors;
pub mod external;
pub mod jobs;
pub mod ledger;
pub mod logging;
pub mod models;
mod routes;
pub mod services;
pub mod state;
