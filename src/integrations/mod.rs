//! Glue for external integrations.
//!
//! - [`jira`]: normalizes Jira webhook payloads and verifies their signatures
//! - [`runtime_wait`]: bounds how many requests may wait on a conversation runtime
//! - [`rate_limiter`]: paces outbound calls to third-party APIs

pub mod jira;
pub mod rate_limiter;
pub mod runtime_wait;

pub use jira::{JiraEventType, JiraParseOutcome, JiraPayloadParser, JiraWebhookPayload};
pub use rate_limiter::RateLimiter;
pub use runtime_wait::{RuntimeWaitLimiter, TooManyWaitingError};
