pub use super::credit_grants::Entity as CreditGrants;
pub use super::usage_records::Entity as UsageRecords;
