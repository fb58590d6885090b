//! Request and response types shared by the HTTP surface

pub mod error;
pub mod json;
pub mod response;

pub use error::{ApiError, ApiErrorResponse, RateLimitInfo, rate_limit_headers};
pub use json::Json;
pub use response::ApiResponse;
