//! Infrastructure layer - Store, codec and transport implementations

pub mod api_key;
pub mod auth;
pub mod logging;
pub mod observability;
pub mod storage;
pub mod usage;
