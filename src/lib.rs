pub mod application;
pub mod cache;
pub mod config;
pub mod identity;
pub mod infra;
pub mod ledger;
pub mod pipeline;
pub mod routing;
