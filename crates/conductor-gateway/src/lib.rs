//! Conductor Gateway - HTTP front door for the safety layer
//!
//! # Architecture
//!
//! ```text
//! request ──▶ TraceLayer ──▶ CORS ──▶ admission gate ──▶ handler
//!                                          │               │
//!                                     429 + Retry-After    ├─ sanitizer ─▶ agent invocation preview
//!                                                          ├─ conflict resolver
//!                                                          └─ deletion confirmation
//!                                                                   │
//!                                            safety events ◀────────┘
//! ```
//!
//! # Features
//!
//! - **Admission control**: per-client burst and sustained windows, per-route overrides
//! - **Command previews**: sanitized argv and the names of forwarded env variables
//! - **Review arbitration**: security and architecture verdicts to one decision
//! - **Confirmed deletion**: single-use tokens in front of project removal

pub mod config;
pub mod env_loader;
pub mod error;
pub mod events;
pub mod gateway;
pub mod rate_limit;

pub use config::{GatewayConfig, PathLimits, RateLimitConfig};
pub use error::{GatewayError, Result};
pub use events::EventBus;
pub use gateway::{Gateway, GatewayState};
pub use rate_limit::{RateLimitDecision, RateLimiter};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
