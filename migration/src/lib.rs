pub use sea_orm_migration::prelude::*;

mod m20250815_000001_create_credit_grants;
mod m20250815_000002_create_usage_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250815_000001_create_credit_grants::Migration),
            Box::new(m20250815_000002_create_usage_records::Migration),
        ]
    }
}
