pub mod circuit;
pub mod http_cache;
pub mod rate_limit;

pub use circuit::{CircuitBreaker, CircuitConfig, CircuitRegistry, CircuitSnapshot, CircuitState};
pub use http_cache::CachedHttpClient;
pub use rate_limit::RateLimiter;
