//! Core data types for the lending market

pub mod account;
pub mod loan;
pub mod token_account;
