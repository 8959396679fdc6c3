use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::FetchResult;
use crate::error::Error;
use crate::request::Request;
use crate::util::truncate_body;

#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
    request: OnceLock<Arc<Request>>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request: OnceLock::new(),
        }
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request that produced this response, present on values returned by a client call.
    pub fn request(&self) -> Option<&Arc<Request>> {
        self.request.get()
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> FetchResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }

    /// Drops a back-reference carried over from another call.
    pub(crate) fn undecorated(mut self) -> Self {
        self.request = OnceLock::new();
        self
    }

    /// Replaces any earlier back-reference, e.g. on a response a hook reused from another call.
    pub(crate) fn decorate(mut self, request: Arc<Request>) -> Self {
        self.request = OnceLock::from(request);
        self
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::Response;
    use crate::error::Error;

    #[test]
    fn new_fills_canonical_status_text() {
        let response = Response::new(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status_text(), "Service Unavailable");
        assert!(!response.ok());
        assert!(response.request().is_none());
    }

    #[test]
    fn json_decode_error_contains_body() {
        let response = Response::new(StatusCode::OK).with_body(Bytes::from_static(b"not-json"));
        let error = response
            .json::<serde_json::Value>()
            .expect_err("invalid json should fail");
        match error {
            Error::Deserialize { body, .. } => assert_eq!(body, "not-json"),
            other => panic!("unexpected error variant: {other}"),
        }
    }
}
