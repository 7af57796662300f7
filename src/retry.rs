//! Bounded fixed-interval retry.
//!
//! Job status polling is a retry loop with a hard attempt ceiling, not an
//! open-ended "poll until done". The combinator here makes the budget and the
//! outcome explicit: each attempt classifies itself as done, failed, or
//! not-yet, and exhausting the budget is a distinct result rather than an
//! error invented by the caller.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Classification of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Terminal success; stop retrying.
    Done(T),
    /// Not finished yet; retry after the delay if budget remains.
    Retry,
}

/// Final result of a bounded retry run.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// An attempt returned [`Attempt::Done`].
    Success(T),
    /// An attempt returned a hard error; retrying stopped immediately.
    Failed(E),
    /// Every attempt in the budget returned [`Attempt::Retry`].
    TimedOut { attempts: u32 },
}

/// Runs `op` up to `max_attempts` times with a fixed `delay` between attempts.
///
/// The first attempt runs immediately; the delay is inserted only between
/// attempts, so a budget of N with delay D spans at most `(N - 1) * D` of
/// waiting. A `max_attempts` of zero times out without calling `op`.
pub async fn retry_with_budget<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Outcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(Attempt::Done(value)) => return Outcome::Success(value),
            Err(err) => return Outcome::Failed(err),
            Ok(Attempt::Retry) => {
                if attempt < max_attempts {
                    sleep(delay).await;
                }
            }
        }
    }
    Outcome::TimedOut {
        attempts: max_attempts,
    }
}
