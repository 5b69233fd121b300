//! Retry execution and operational hook contracts for provider calls.

use std::future::Future;
use std::time::Duration;

pub use axcommon::RetryPolicy;

use crate::{ProviderError, ProviderKind};

pub trait ProviderOperationHooks: Send + Sync {
    fn on_attempt_start(&self, _provider: ProviderKind, _operation: &str, _attempt: u32) {}

    fn on_retry_scheduled(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
    }

    fn on_success(&self, _provider: ProviderKind, _operation: &str, _attempts: u32) {}

    fn on_failure(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempts: u32,
        _error: &ProviderError,
    ) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOperationHooks;

impl ProviderOperationHooks for NoopOperationHooks {}

pub async fn execute_with_retry<T, Op, OpFuture, Sleep, SleepFuture>(
    provider: ProviderKind,
    operation: &str,
    policy: &RetryPolicy,
    hooks: &dyn ProviderOperationHooks,
    mut execute: Op,
    mut sleep: Sleep,
) -> Result<T, ProviderError>
where
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, ProviderError>>,
    Sleep: FnMut(Duration) -> SleepFuture,
    SleepFuture: Future<Output = ()>,
{
    let mut attempt = 1;

    loop {
        hooks.on_attempt_start(provider, operation, attempt);

        match execute(attempt).await {
            Ok(value) => {
                hooks.on_success(provider, operation, attempt);
                return Ok(value);
            }
            Err(error) => {
                if policy.should_retry(attempt, error.retryable) {
                    let delay = policy.backoff_for_attempt(attempt);
                    hooks.on_retry_scheduled(provider, operation, attempt, delay, &error);
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                hooks.on_failure(provider, operation, attempt, &error);
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;
    use crate::ProviderErrorKind;

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn push(&self, event: String) {
            self.events.lock().expect("events lock").push(event);
        }
    }

    impl ProviderOperationHooks for RecordingHooks {
        fn on_attempt_start(&self, provider: ProviderKind, operation: &str, attempt: u32) {
            self.push(format!("start:{provider}:{operation}:{attempt}"));
        }

        fn on_retry_scheduled(
            &self,
            provider: ProviderKind,
            operation: &str,
            attempt: u32,
            _delay: Duration,
            _error: &ProviderError,
        ) {
            self.push(format!("retry:{provider}:{operation}:{attempt}"));
        }

        fn on_success(&self, provider: ProviderKind, operation: &str, attempts: u32) {
            self.push(format!("success:{provider}:{operation}:{attempts}"));
        }

        fn on_failure(
            &self,
            provider: ProviderKind,
            operation: &str,
            attempts: u32,
            error: &ProviderError,
        ) {
            self.push(format!(
                "failure:{provider}:{operation}:{attempts}:{:?}",
                error.kind
            ));
        }
    }

    #[tokio::test]
    async fn execute_with_retry_retries_transient_errors() {
        let policy = RetryPolicy::new(3);
        let hooks = RecordingHooks::default();
        let sleeps = Arc::new(Mutex::new(Vec::new()));

        let result = execute_with_retry(
            ProviderKind::Gemini,
            "stream",
            &policy,
            &hooks,
            |attempt| async move {
                if attempt < 3 {
                    Err(ProviderError::unavailable("overloaded"))
                } else {
                    Ok("ok")
                }
            },
            {
                let sleeps = Arc::clone(&sleeps);
                move |delay| {
                    let sleeps = Arc::clone(&sleeps);
                    async move {
                        sleeps.lock().expect("sleep lock").push(delay);
                    }
                }
            },
        )
        .await;

        assert_eq!(result.expect("result should succeed"), "ok");
        assert_eq!(sleeps.lock().expect("sleep lock").len(), 2);
        let events = hooks.events.lock().expect("events lock").clone();
        assert_eq!(events.first().map(String::as_str), Some("start:gemini:stream:1"));
        assert!(events.contains(&"success:gemini:stream:3".to_string()));
    }

    #[tokio::test]
    async fn execute_with_retry_stops_on_non_retryable_error() {
        let policy = RetryPolicy::new(5);
        let hooks = RecordingHooks::default();

        let result = execute_with_retry::<(), _, _, _, _>(
            ProviderKind::OpenAi,
            "complete",
            &policy,
            &hooks,
            |_| async move { Err(ProviderError::authentication("bad key")) },
            |_| async move {},
        )
        .await;

        let error = result.expect_err("result should fail");
        assert_eq!(error.kind, ProviderErrorKind::Authentication);
        let events = hooks.events.lock().expect("events lock").clone();
        assert!(events.iter().any(|item| item.starts_with("failure:openai:complete:1")));
    }
}
