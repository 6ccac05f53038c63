pub mod rate_limit;
pub mod retry;

pub use rate_limit::{RateLimitDecision, RateLimitEntry, RateLimiter};
pub use retry::{warn_on_retry, with_retry, Backoff, RetryPolicy};
