// Service modules
pub mod ledger_service;
pub mod reporter_service;
pub mod usage_service;

pub use ledger_service::LedgerService;
pub use reporter_service::UsageReporter;
pub use usage_service::UsageService;
