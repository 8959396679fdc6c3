use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::abort::AbortSignal;
use crate::error::TransportError;
use crate::request::Request;
use crate::response::Response;

pub type TransportFuture = BoxFuture<'static, Result<Response, TransportError>>;

/// Performs one network attempt for a resolved [`Request`].
///
/// Implementations should stop work and return [`TransportError::aborted`] once `signal`
/// fires. A stream body must be taken with [`BodyStream::take`](crate::BodyStream::take),
/// which marks it consumed for any later attempt.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: Arc<Request>, signal: AbortSignal) -> TransportFuture;
}

impl<F, Fut> Transport for F
where
    F: Fn(Arc<Request>, AbortSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn fetch(&self, request: Arc<Request>, signal: AbortSignal) -> TransportFuture {
        self(request, signal).boxed()
    }
}
