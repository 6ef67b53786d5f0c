pub mod credit_grants;
pub mod prelude;
pub mod sea_orm_active_enums;
pub mod usage_records;
