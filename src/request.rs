use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_core::Stream;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use tokio::io::AsyncRead;
use url::Url;

use crate::FetchResult;
use crate::abort::AbortSignal;
use crate::body::{Body, BodyStream, MultipartForm};
use crate::config::{ResponseErrorPredicate, Timeout};
use crate::defaults::Defaults;
use crate::error::Error;
use crate::merge::merge_headers;
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::search_params::SearchParams;
use crate::transport::Transport;
use crate::util::{parse_header_name, parse_header_value, redact_url_for_logs};

/// Target of a call: an already-absolute [`Url`] or text resolved against a base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestUrl {
    Absolute(Url),
    Text(String),
}

impl From<Url> for RequestUrl {
    fn from(url: Url) -> Self {
        Self::Absolute(url)
    }
}

impl From<&Url> for RequestUrl {
    fn from(url: &Url) -> Self {
        Self::Absolute(url.clone())
    }
}

impl From<&str> for RequestUrl {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for RequestUrl {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&String> for RequestUrl {
    fn from(text: &String) -> Self {
        Self::Text(text.clone())
    }
}

/// Fully resolved request, shared by every attempt of one call.
///
/// The URL's query string always mirrors [`Request::search_params`].
#[derive(Clone)]
pub struct Request {
    url: Url,
    method: Method,
    headers: HeaderMap,
    search_params: SearchParams,
    body: Body,
    timeout: Timeout,
    retry: Option<RetryPolicy>,
    is_response_error: ResponseErrorPredicate,
    signal: Option<AbortSignal>,
}

impl fmt::Debug for Request {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.redacted_url())
            .field("headers", &self.headers)
            .field("search_params", &self.search_params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("signal", &self.signal)
            .finish()
    }
}

impl Request {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search_params
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn signal(&self) -> Option<&AbortSignal> {
        self.signal.as_ref()
    }

    pub fn is_response_error(&self, response: &Response) -> bool {
        (self.is_response_error)(response)
    }

    pub fn redacted_url(&self) -> String {
        redact_url_for_logs(&self.url)
    }

    /// Replaces the URL; its query string becomes the request's search params.
    pub fn with_url(mut self, url: Url) -> Self {
        self.search_params = SearchParams::parse(url.query().unwrap_or_default());
        self.url = url;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn with_search_params(mut self, search_params: SearchParams) -> Self {
        self.search_params = search_params;
        sync_query(&mut self.url, &self.search_params);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }
}

fn sync_query(url: &mut Url, search_params: &SearchParams) {
    if search_params.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&search_params.to_query_string()));
    }
}

/// Per-call overrides layered on top of the client's defaults.
#[derive(Clone, Default)]
pub struct RequestOptions {
    url: Option<RequestUrl>,
    base_url: Option<Url>,
    method: Option<Method>,
    headers: HeaderMap,
    search_params: SearchParams,
    body: Option<Body>,
    json: Option<Bytes>,
    timeout: Option<Timeout>,
    retry: Option<Option<RetryPolicy>>,
    is_response_error: Option<ResponseErrorPredicate>,
    signal: Option<AbortSignal>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RequestOptions")
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("search_params", &self.search_params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("signal", &self.signal)
            .field("transport", &self.transport.as_ref().map(|_| ".."))
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<RequestUrl>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> FetchResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(&self.headers, &headers);
        self
    }

    pub fn search_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.search_params.append(name, value);
        self
    }

    pub fn search_params(mut self, search_params: SearchParams) -> Self {
        self.search_params.extend(
            search_params
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned())),
        );
        self
    }

    pub fn query<T>(self, params: &T) -> FetchResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.search_params(SearchParams::from_serialize(params)?))
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn body_stream<S, E>(self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.body(BodyStream::new(stream))
    }

    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        self.body(BodyStream::from_reader(reader))
    }

    pub fn multipart(self, form: MultipartForm) -> Self {
        self.body(form)
    }

    /// Serializes `payload` as the body; `content-type: application/json` is added
    /// unless the merged headers already carry a content type.
    pub fn json<T>(mut self, payload: &T) -> FetchResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        self.json = Some(Bytes::from(body));
        Ok(self)
    }

    pub fn form<T>(self, payload: &T) -> FetchResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded =
            serde_urlencoded::to_string(payload).map_err(|source| Error::SerializeForm { source })?;
        Ok(self.body(encoded).header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        ))
    }

    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = Some(Timeout::Disabled);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(Some(retry));
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = Some(None);
        self
    }

    pub fn response_error<F>(mut self, is_response_error: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.is_response_error = Some(Arc::new(is_response_error));
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub(crate) fn take_transport(&mut self) -> Option<Arc<dyn Transport>> {
        self.transport.take()
    }
}

pub(crate) fn build_request(defaults: &Defaults, options: RequestOptions) -> FetchResult<Request> {
    let base_url = options.base_url.as_ref().or(defaults.base_url());
    let url = (defaults.resolve_url())(options.url.as_ref(), base_url)?;

    let merge_search_params = defaults.merge_search_params();
    let embedded = SearchParams::parse(url.query().unwrap_or_default());
    let search_params = merge_search_params(defaults.search_params(), &embedded);
    let search_params = merge_search_params(&search_params, &options.search_params);

    let mut headers = (defaults.merge_headers())(defaults.headers(), &options.headers);

    let mut body = options.body.unwrap_or_default();
    if let Some(json) = options.json {
        body = Body::Bytes(json);
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    }
    if body.is_multipart() {
        headers.remove(CONTENT_TYPE);
    }

    let mut url = url;
    sync_query(&mut url, &search_params);
    Ok(Request {
        url,
        method: options.method.unwrap_or(Method::GET),
        headers,
        search_params,
        body,
        timeout: options.timeout.unwrap_or(defaults.timeout()),
        retry: options
            .retry
            .unwrap_or_else(|| defaults.retry().cloned()),
        is_response_error: options
            .is_response_error
            .unwrap_or_else(|| Arc::clone(defaults.response_error_predicate())),
        signal: options.signal,
    })
}
