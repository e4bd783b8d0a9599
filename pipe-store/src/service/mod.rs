pub mod catalog;
pub mod ledger;

pub use catalog::ResourceCatalog;
pub use ledger::ExecutionLedger;
