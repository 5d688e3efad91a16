//! Retry policy, tagged attempt outcomes and the backoff driver

use std::time::Duration;
use log::{debug, error};

/// Retry policy for failed deliveries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy
{   pub max_attempts: usize
  , pub backoff_multiplier: f32
  , pub initial_backoff: Duration
  , /// Legacy-compatible mode: treat non-5xx API errors as
    /// retryable instead of terminal
    pub retry_client_errors: bool
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_attempts: usize
    , backoff_multiplier: f32
    , initial_backoff_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_attempts
          , backoff_multiplier
          , initial_backoff: Duration::from_millis(
              initial_backoff_ms
            )
          , retry_client_errors: false
        }
    }

    /// Legacy-compatible variant that retries client errors the
    /// same way as server errors
    pub fn retrying_client_errors(mut self) -> Self
    {   self.retry_client_errors = true;
        self
    }

    /// Calculate backoff duration for attempt number
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   debug!("Calculating backoff for attempt {}", attempt);
        let multiplier
          = self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(
          (self.initial_backoff.as_millis() as f32
            * multiplier) as u64
        )
    }
}

impl Default for RetryPolicy
{   /// 3 attempts doubling from 1s: waits of 1s, 2s, 4s
    fn default() -> Self
    {   RetryPolicy::new(3, 2.0, 1000)
    }
}

/// Outcome of one delivery attempt. Keeps the retryable/terminal
/// split an explicit branch instead of a catch-all handler.
pub enum Attempt<T>
{   Success(T)
  , Retryable(crate::error::Error)
  , Terminal(crate::error::Error)
}

/// Drive an operation through the retry policy. The operation is
/// invoked with the 0-based attempt number; between retryable
/// failures the driver sleeps the policy's backoff (suspending,
/// never busy-waiting). The last error is returned on exhaustion.
pub async fn run_with_backoff<T, F, Fut>(
  policy: &RetryPolicy
, mut operation: F
) -> Result<T, crate::error::Error>
where
  F: FnMut(usize) -> Fut
, Fut: std::future::Future<Output = Attempt<T>>
{   if policy.max_attempts == 0
    {   return Err(crate::error::Error::Other(
          "retry policy allows zero attempts".to_string()
        ));
    }

    for attempt in 0..policy.max_attempts
    {   match operation(attempt).await
        {   Attempt::Success(value) => {
              return Ok(value);
            }
          , Attempt::Terminal(err) => {
              error!(
                "Attempt {} failed terminally: {}",
                attempt + 1, err
              );
              return Err(err);
            }
          , Attempt::Retryable(err) => {
              error!(
                "Attempt {} failed: {}",
                attempt + 1, err
              );
              if attempt + 1 == policy.max_attempts
              {   return Err(err);
              }
              let wait = policy.backoff_for_attempt(attempt);
              debug!("Backing off {:?} before retry", wait);
              tokio::time::sleep(wait).await;
            }
        }
    }

    Err(crate::error::Error::Other(
      "retry loop exited without a result".to_string()
    ))
}
