//! Fixed-interval retry loop.
//!
//! An attempt reports one of three outcomes:
//! - `Ok(ControlFlow::Break(value))`: done, return `value`
//! - `Ok(ControlFlow::Continue(last))`: not yet, try again after the interval
//! - `Err(e)`: give up immediately
//!
//! The loop sleeps between attempts only, never after the final one.

use std::future::Future;
use std::ops::ControlFlow;

use eni_core::RetryPolicy;

/// Why a retry loop stopped without a value.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E, R> {
    /// An attempt failed in a way that must not be retried.
    Aborted(E),
    /// Every attempt asked to continue; `last` is what the final one reported.
    Exhausted { attempts: u32, last: R },
}

/// Run `attempt` under `policy`. Attempts are numbered from 1.
pub async fn retry<T, R, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, RetryError<E, R>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ControlFlow<T, R>, E>>,
{
    let interval = policy.interval();
    let mut n = 1;
    loop {
        match attempt(n).await.map_err(RetryError::Aborted)? {
            ControlFlow::Break(value) => return Ok(value),
            ControlFlow::Continue(last) => {
                if n >= policy.max_attempts {
                    return Err(RetryError::Exhausted { attempts: n, last });
                }
            }
        }
        tokio::time::sleep(interval).await;
        n += 1;
    }
}
