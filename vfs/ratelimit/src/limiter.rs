use async_lock::{Semaphore, SemaphoreGuardArc};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type AcquireResult = Result<LimiterPermit, AcquireError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("no request capacity available")]
    WouldBlock,
    #[error("limiter has zero capacity")]
    Misconfigured,
}

#[derive(Clone, Debug, Default)]
pub struct AcquireOptions {
    /// If true: do not wait. Return WouldBlock if insufficient capacity.
    pub nonblocking: bool,
}

/// Capacity held by one in-flight request. Released on drop.
#[derive(Debug)]
pub struct LimiterPermit {
    _guard: SemaphoreGuardArc,
    in_flight: Arc<AtomicUsize>,
}

impl LimiterPermit {
    fn new(guard: SemaphoreGuardArc, in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            _guard: guard,
            in_flight,
        }
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

pub trait RequestLimiter: Send + Sync {
    /// Maximum number of permits that may be alive at once.
    fn capacity(&self) -> usize;

    /// Number of permits currently held.
    fn in_flight(&self) -> usize;

    /// Fast path: take capacity immediately or fail with `WouldBlock`.
    fn try_acquire(&self) -> AcquireResult;

    /// Slow path: wait until capacity is available.
    fn acquire_async(&self, opts: AcquireOptions) -> BoxFuture<'_, AcquireResult>;
}

/// Counting-semaphore limiter with a fixed number of request slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A limiter that lets exactly one request through at a time.
    pub fn single() -> Self {
        Self::new(1)
    }
}

impl RequestLimiter for ConcurrencyLimiter {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> AcquireResult {
        if self.capacity == 0 {
            return Err(AcquireError::Misconfigured);
        }
        self.semaphore
            .try_acquire_arc()
            .map(|guard| LimiterPermit::new(guard, self.in_flight.clone()))
            .ok_or(AcquireError::WouldBlock)
    }

    fn acquire_async(&self, opts: AcquireOptions) -> BoxFuture<'_, AcquireResult> {
        Box::pin(async move {
            if opts.nonblocking || self.capacity == 0 {
                return self.try_acquire();
            }
            let guard = self.semaphore.acquire_arc().await;
            Ok(LimiterPermit::new(guard, self.in_flight.clone()))
        })
    }
}

/// Run `fut` while holding one permit from `limiter`.
pub async fn run<L, F>(limiter: &L, fut: F) -> Result<F::Output, AcquireError>
where
    L: RequestLimiter + ?Sized,
    F: Future,
{
    let _permit = limiter.acquire_async(AcquireOptions::default()).await?;
    Ok(fut.await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_respects_capacity() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(limiter.try_acquire().unwrap_err(), AcquireError::WouldBlock);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn zero_capacity_is_misconfigured() {
        let limiter = ConcurrencyLimiter::new(0);
        let err = limiter.try_acquire().unwrap_err();
        assert_eq!(err, AcquireError::Misconfigured);
        assert_eq!(err.to_string(), "limiter has zero capacity");
    }

    #[tokio::test]
    async fn nonblocking_acquire_does_not_wait() {
        let limiter = ConcurrencyLimiter::single();
        let _held = limiter.try_acquire().unwrap();
        let result = limiter
            .acquire_async(AcquireOptions { nonblocking: true })
            .await;
        assert_eq!(result.unwrap_err(), AcquireError::WouldBlock);
    }

    #[tokio::test]
    async fn single_slot_serializes_requests() {
        let limiter = ConcurrencyLimiter::single();
        let peak = AtomicUsize::new(0);
        let (limiter, peak) = (&limiter, &peak);

        let job = move |delay: u64| {
            run(limiter, async move {
                peak.fetch_max(limiter.in_flight(), Ordering::AcqRel);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            })
        };

        let results = futures::future::join_all([job(5), job(1), job(3)]).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(peak.load(Ordering::Acquire), 1);
        assert_eq!(limiter.in_flight(), 0);
    }
}
