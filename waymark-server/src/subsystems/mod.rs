pub mod broadcast;
pub mod ledger;
pub mod query;
pub mod session;
