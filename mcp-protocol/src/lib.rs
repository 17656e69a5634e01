//! Wire protocol for the orchestration engine's HTTP/WebSocket surface.
//!
//! Bridges the domain services in `task-core` to plain-JSON HTTP
//! (`manage_project`/`manage_branch`/`manage_task`/`manage_subtask`/
//! `manage_context`/`manage_agent`) and an in-process WebSocket change feed.
//! Provides:
//!
//! - [`auth`] — C1, bearer JWT verification (`IdentityGate`)
//! - [`coercion`] — C6 step 1, lenient bool/list/object parameter parsing
//! - [`dispatcher`] — C6, one method per umbrella command
//! - [`response`] — C7, the five response-shaping profiles
//! - [`fanout`] — C8, in-process WebSocket subscription/delivery
//! - [`error`] — maps `OrchestratorError` onto HTTP responses
//! - [`request_logger`] — structured per-call request logging middleware

pub mod auth;
pub mod coercion;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod request_logger;
pub mod response;
pub mod serialization;

pub use auth::{AuthContext, AuthError, AuthErrorKind, IdentityGate, JwtVerifier, StaticKeyJwtVerifier};
pub use dispatcher::{Agent, AgentDirectory, Dispatcher};
pub use error::ApiError;
pub use fanout::{FanoutRegistry, SubscriptionFilter, WsChangeMessage};
pub use response::{Hints, ResponseOptimizer, ResponseProfile};
