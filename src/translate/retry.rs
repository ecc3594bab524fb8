//! Bounded retry.

use std::future::Future;

/// Every failure from a run of [`retry`], oldest first.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub errors: Vec<E>,
}

impl<E> Exhausted<E> {
    pub fn attempts(&self) -> usize {
        self.errors.len()
    }

    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }
}

/// Run `op` until it succeeds or `max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. Attempts run back to back with
/// no delay, and every error is retried the same way. `on_error` sees each
/// failure as it happens. A budget of zero is treated as one attempt.
pub async fn retry<T, E, F, Fut, L>(
    max_attempts: u32,
    mut op: F,
    mut on_error: L,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: FnMut(u32, u32, &E),
{
    let max_attempts = max_attempts.max(1);
    let mut errors = Vec::new();

    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                on_error(attempt, max_attempts, &e);
                errors.push(e);
            }
        }
    }

    Err(Exhausted { errors })
}
