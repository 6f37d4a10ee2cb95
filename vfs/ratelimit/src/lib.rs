//! Concurrency limiters for providers that talk to rate-limited remote APIs.

mod limiter;

pub use limiter::{
    AcquireError, AcquireOptions, AcquireResult, ConcurrencyLimiter, LimiterPermit,
    RequestLimiter, run,
};
