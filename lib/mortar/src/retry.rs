use crate::config::RetryPolicy;
use backoff::ExponentialBackoffBuilder;
use log::warn;
use std::future::Future;

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy's retry budget is spent.
pub(crate) async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed_time))
        .build();
    let max_retries = policy.max_retries;
    let mut attempts = 0;
    backoff::future::retry(backoff, || {
        attempts += 1;
        let attempt = attempts;
        let fut = operation();
        async move {
            fut.await.map_err(|e| {
                if attempt <= max_retries && is_transient(&e) {
                    warn!("Attempt {} failed, retrying: {}", attempt, e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}
