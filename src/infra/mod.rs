//! Infrastructure: telemetry, database plumbing, and local adapters.

pub mod db;
mod error;
pub mod local;
pub mod telemetry;

pub use error::InfraError;
