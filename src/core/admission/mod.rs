//! Request admission.
//!
//! Every collaborator request passes the rate limiter before it can reach the
//! queue. Rejections are silent: the caller is never told.

mod limiter;

pub use limiter::{Admission, RateLimitConfig, RateLimiter};
