//! API Key infrastructure implementations
//!
//! Key generation and hashing, the hourly rate limiter, key stores and the
//! administrative lifecycle service.

mod generator;
mod postgres_repository;
mod rate_limiter;
mod repository;
mod service;

pub use generator::{ApiKeyGenerator, GeneratedApiKey, DEFAULT_KEY_PREFIX};
pub use postgres_repository::PostgresApiKeyRepository;
pub use rate_limiter::{decide, window_start, RateLimiter};
pub use repository::InMemoryApiKeyRepository;
pub use service::{ApiKeyService, CreateApiKeyResult, DeleteApiKeyResult, NewApiKey};
