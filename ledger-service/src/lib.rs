//! Ledger service: account balances, movement history and the credit
//! transaction workflow

pub mod ledger;
pub mod service;
pub mod workflow;

pub use ledger::LedgerEntry;
pub use service::{LedgerService, RegisterAccount};
pub use workflow::{CreditTransactionWorkflow, Review, ReviewCreditTransaction, SubmitCreditTransaction};
