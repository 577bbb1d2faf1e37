//! sea-orm entities
pub mod rate_limits;
