use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{Instrument, debug, info_span, warn};

use crate::FetchResult;
use crate::abort::{AbortReason, AbortSignal};
use crate::error::{Error, TransportError};
use crate::hooks::Hooks;
use crate::request::Request;
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

enum AttemptError {
    /// Bypasses retry evaluation.
    Terminal(Error),
    Retryable(Error),
}

enum AttemptOutcome {
    Settled(Result<Response, TransportError>),
    Aborted(AbortReason),
}

/// Drives one call: attempts `0..=limit`, each bounded by the request timeout and raced
/// against the caller's abort signal.
pub(crate) async fn execute(
    transport: &dyn Transport,
    hooks: &Hooks,
    request: Arc<Request>,
) -> FetchResult<Response> {
    let limit = request.retry().map_or(0, RetryPolicy::limit);
    let mut attempt = 0_usize;

    loop {
        let span = info_span!(
            "fetchx.request",
            method = %request.method(),
            url = %request.redacted_url(),
            attempt = attempt,
            limit = limit
        );

        let error = match run_attempt(transport, hooks, &request)
            .instrument(span.clone())
            .await
        {
            Ok(response) => return Ok(response),
            Err(AttemptError::Terminal(error)) => return Err(error),
            Err(AttemptError::Retryable(error)) => error,
        };

        let Some(policy) = request.retry() else {
            return Err(error);
        };
        if !policy.should_retry(attempt, &error) {
            return Err(error);
        }

        let delay = policy.delay_for(attempt, &error);
        span.in_scope(|| {
            warn!(
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );
        });
        wait_before_retry(delay, &request).await?;
        attempt += 1;
    }
}

async fn run_attempt(
    transport: &dyn Transport,
    hooks: &Hooks,
    request: &Arc<Request>,
) -> Result<Response, AttemptError> {
    if request.signal().is_some_and(AbortSignal::is_aborted) {
        return Err(AttemptError::Terminal(Error::Aborted {
            request: Arc::clone(request),
        }));
    }

    let signal = AbortSignal::derive(request.signal());
    let timeout = request.timeout().duration();
    let started = Instant::now();
    debug!("sending request");

    let fetch = transport.fetch(Arc::clone(request), signal.clone());
    let outcome = tokio::select! {
        biased;
        settled = fetch => AttemptOutcome::Settled(settled),
        () = signal.aborted() => {
            AttemptOutcome::Aborted(signal.reason().unwrap_or(AbortReason::Caller))
        }
        () = sleep_or_pending(timeout) => {
            signal.abort_with(AbortReason::Timeout);
            AttemptOutcome::Aborted(AbortReason::Timeout)
        }
    };

    let response = match outcome {
        AttemptOutcome::Settled(Ok(response)) => response,
        AttemptOutcome::Settled(Err(error)) => {
            return Err(classify_transport_error(request, &signal, timeout, error));
        }
        AttemptOutcome::Aborted(reason) => {
            return Err(abort_error(request, reason, timeout));
        }
    };

    debug!(
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    let response = hooks.run_after_response(request, response);
    if !request.is_response_error(&response) {
        return Ok(response.decorate(Arc::clone(request)));
    }

    let error = Error::Http {
        status: response.status(),
        status_text: response.status_text().to_owned(),
        response: Box::new(response.undecorated()),
        request: Arc::clone(request),
    };
    if request.body().is_consumed_stream() {
        return Err(AttemptError::Terminal(error));
    }
    Err(AttemptError::Retryable(error))
}

fn classify_transport_error(
    request: &Arc<Request>,
    signal: &AbortSignal,
    timeout: Option<Duration>,
    error: TransportError,
) -> AttemptError {
    if error.is_abort() || signal.is_aborted() {
        let reason = signal.reason().unwrap_or(AbortReason::Caller);
        return abort_error(request, reason, timeout);
    }

    let error = Error::Transport {
        kind: error.kind(),
        request: Arc::clone(request),
        source: error.into_source(),
    };
    if request.body().is_consumed_stream() {
        return AttemptError::Terminal(error);
    }
    AttemptError::Retryable(error)
}

fn abort_error(
    request: &Arc<Request>,
    reason: AbortReason,
    timeout: Option<Duration>,
) -> AttemptError {
    match (reason, timeout) {
        (AbortReason::Timeout, Some(timeout)) => {
            let error = Error::Timeout {
                timeout,
                request: Arc::clone(request),
            };
            if request.body().is_consumed_stream() {
                AttemptError::Terminal(error)
            } else {
                AttemptError::Retryable(error)
            }
        }
        _ => AttemptError::Terminal(Error::Aborted {
            request: Arc::clone(request),
        }),
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn wait_before_retry(delay: Duration, request: &Arc<Request>) -> FetchResult<()> {
    let Some(signal) = request.signal() else {
        if !delay.is_zero() {
            sleep(delay).await;
        }
        return Ok(());
    };

    tokio::select! {
        biased;
        () = signal.aborted() => Err(Error::Aborted {
            request: Arc::clone(request),
        }),
        () = sleep(delay) => Ok(()),
    }
}
