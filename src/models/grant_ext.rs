/// Extension methods for the credit_grants entity
///
/// Business-logic helpers that complement the generated entity in
/// entity/src/credit_grants.rs
use entity::credit_grants;
use time::OffsetDateTime;

pub trait CreditGrantExt {
    /// A grant is active while it has no expiry or its expiry is in the future
    fn is_active(&self, now: OffsetDateTime) -> bool;

    /// Negative balance, i.e. debt recorded against this grant
    fn in_debt(&self) -> bool;
}

impl CreditGrantExt for credit_grants::Model {
    fn is_active(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }

    fn in_debt(&self) -> bool {
        self.balance < 0
    }
}
