use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attribution category of a credit grant. Affects reporting only,
/// never the consumption order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "grant_type")]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    #[sea_orm(string_value = "free")]
    Free,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "referral")]
    Referral,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "organization")]
    Organization,
    #[sea_orm(string_value = "ad")]
    Ad,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Purchase => "purchase",
            Self::Referral => "referral",
            Self::Admin => "admin",
            Self::Organization => "organization",
            Self::Ad => "ad",
        }
    }
}
