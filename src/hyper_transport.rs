use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};
use http::header::{CONTENT_TYPE, HeaderValue};
use http::Uri;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::FetchResult;
use crate::abort::AbortSignal;
use crate::body::{Body, BoxBodyError, MultipartForm};
use crate::error::{Error, TransportError, TransportErrorKind};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Transport, TransportFuture};

type RequestBody = UnsyncBoxBody<Bytes, BoxBodyError>;
type HyperClient = Client<HttpsConnector<HttpConnector>, RequestBody>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
    max_response_body_bytes: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

impl HyperTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn try_build(self) -> FetchResult<HyperTransport> {
        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|source| Error::TlsInit {
            message: source.to_string(),
        })?
        .with_root_certificates(rustls::RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        ))
        .with_no_client_auth();

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(self.connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(self.http2_only)
            .build(https);

        Ok(HyperTransport {
            client,
            max_response_body_bytes: self.max_response_body_bytes,
        })
    }
}

/// Default network transport: hyper's pooled client over rustls (ring) with webpki roots.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    max_response_body_bytes: usize,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    pub fn try_new() -> FetchResult<Self> {
        Self::builder().try_build()
    }
}

impl Transport for HyperTransport {
    fn fetch(&self, request: Arc<Request>, signal: AbortSignal) -> TransportFuture {
        send_request(self.client.clone(), request, signal, self.max_response_body_bytes).boxed()
    }
}

async fn send_request(
    client: HyperClient,
    request: Arc<Request>,
    signal: AbortSignal,
    max_response_body_bytes: usize,
) -> Result<Response, TransportError> {
    let http_request = build_http_request(&request)?;
    tokio::select! {
        biased;
        () = signal.aborted() => Err(TransportError::aborted()),
        result = receive_response(&client, http_request, max_response_body_bytes) => result,
    }
}

async fn receive_response(
    client: &HyperClient,
    http_request: http::Request<RequestBody>,
    max_response_body_bytes: usize,
) -> Result<Response, TransportError> {
    let response = client
        .request(http_request)
        .await
        .map_err(|source| TransportError::new(classify_transport_error(&source), source))?;
    let (parts, body) = response.into_parts();
    let body = read_all_body_limited(body, max_response_body_bytes).await?;
    debug!(status = parts.status.as_u16(), bytes = body.len(), "response body read");
    Ok(Response::new(parts.status)
        .with_headers(parts.headers)
        .with_body(body))
}

fn build_http_request(request: &Request) -> Result<http::Request<RequestBody>, TransportError> {
    let uri: Uri = request
        .url()
        .as_str()
        .parse()
        .map_err(|source| TransportError::new(TransportErrorKind::Other, source))?;

    let mut headers = request.headers().clone();
    let body = match request.body() {
        Body::Empty => full_body(Bytes::new()),
        Body::Bytes(bytes) => full_body(bytes.clone()),
        Body::Multipart(form) => {
            let boundary = format!("fetchx-{:016x}", rand::random::<u64>());
            let content_type = HeaderValue::from_str(&MultipartForm::content_type(&boundary))
                .map_err(|source| TransportError::new(TransportErrorKind::Other, source))?;
            headers.insert(CONTENT_TYPE, content_type);
            full_body(form.encode(&boundary))
        }
        Body::Stream(stream) => {
            let Some(stream) = stream.take() else {
                return Err(TransportError::new(
                    TransportErrorKind::Other,
                    "request body stream was already consumed",
                ));
            };
            StreamBody::new(stream.map(|chunk| chunk.map(Frame::data))).boxed_unsync()
        }
    };

    let mut builder = http::Request::builder()
        .method(request.method().clone())
        .uri(uri);
    if let Some(target) = builder.headers_mut() {
        target.extend(headers);
    }
    builder
        .body(body)
        .map_err(|source| TransportError::new(TransportErrorKind::Other, source))
}

fn full_body(bytes: Bytes) -> RequestBody {
    Full::new(bytes)
        .map_err(|never| match never {})
        .boxed_unsync()
}

async fn read_all_body_limited(
    mut body: Incoming,
    max_bytes: usize,
) -> Result<Bytes, TransportError> {
    let mut collected = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| TransportError::new(TransportErrorKind::Read, source))?;
        if let Some(data) = frame.data_ref() {
            if collected.len().saturating_add(data.len()) > max_bytes {
                return Err(TransportError::new(
                    TransportErrorKind::Read,
                    format!("response body exceeds {max_bytes} bytes"),
                ));
            }
            collected.extend_from_slice(data);
        }
    }
    Ok(Bytes::from(collected))
}

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    if error.is_connect() {
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    let text = error.to_string().to_ascii_lowercase();
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures_util::stream;
    use http::header::CONTENT_TYPE;

    use super::build_http_request;
    use crate::body::{BodyStream, MultipartForm};
    use crate::tests::request_for;

    #[test]
    fn multipart_body_gets_generated_boundary_header() {
        let request = request_for("https://example.test/upload")
            .with_body(MultipartForm::new().text("name", "value"));
        let http_request = build_http_request(&request).expect("request should build");
        let content_type = http_request.headers().get(CONTENT_TYPE).unwrap();
        assert!(
            content_type
                .to_str()
                .unwrap()
                .starts_with("multipart/form-data; boundary=fetchx-")
        );
    }

    #[test]
    fn consumed_stream_cannot_be_sent_again() {
        let stream = BodyStream::new(stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"chunk"),
        )]));
        let request = Arc::new(request_for("https://example.test/").with_body(stream));

        assert!(build_http_request(&request).is_ok());
        assert!(request.body().is_consumed_stream());
        assert!(build_http_request(&request).is_err());
    }
}
