//! Resilience building blocks shared by the recovery engine
//!
//! - [`BackoffPolicy`]: capped exponential delays with optional jitter
//! - [`CircuitBreakerRegistry`]: per-key breakers evaluated lazily on check

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState,
};
