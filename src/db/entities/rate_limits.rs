//! Per-client rate limit windows
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rate_limits")]
/// One client's current window
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    /// forwarded address or the shared unknown bucket
    pub client_key: String,
    /// requests counted in the current window
    pub count: i64,
    /// unix milliseconds at which the window expires
    pub window_reset_at: i64,
}

/// no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
