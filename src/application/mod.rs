pub mod collaborators;
pub mod error;
