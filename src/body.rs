use std::error::Error as StdError;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::util::lock_unpoisoned;

pub(crate) type BoxBodyError = Box<dyn StdError + Send + Sync>;
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxBodyError>> + Send>>;

#[derive(Clone, Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Multipart(MultipartForm),
    Stream(BodyStream),
}

impl Body {
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// True for a stream body that has already been handed to a transport.
    pub fn is_consumed_stream(&self) -> bool {
        matches!(self, Self::Stream(stream) if stream.is_consumed())
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<MultipartForm> for Body {
    fn from(form: MultipartForm) -> Self {
        Self::Multipart(form)
    }
}

impl From<BodyStream> for Body {
    fn from(stream: BodyStream) -> Self {
        Self::Stream(stream)
    }
}

/// A request body that can be read exactly once. Clones share the same underlying stream.
#[derive(Clone)]
pub struct BodyStream {
    stream: Arc<Mutex<Option<ByteStream>>>,
}

impl BodyStream {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let mapped = stream.map(|item| item.map_err(|error| Box::new(error) as BoxBodyError));
        Self {
            stream: Arc::new(Mutex::new(Some(Box::pin(mapped)))),
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(ReaderStream::new(reader))
    }

    /// Takes the stream out, leaving this body (and every clone of it) consumed.
    pub fn take(&self) -> Option<ByteStream> {
        lock_unpoisoned(&self.stream).take()
    }

    pub fn is_consumed(&self) -> bool {
        lock_unpoisoned(&self.stream).is_none()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BodyStream")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Part {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: Bytes::from(value.into()),
        }
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: Some("application/octet-stream".to_owned()),
            data: data.into(),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// `multipart/form-data` payload. The boundary is chosen by the transport at send time.
#[derive(Clone, Debug, Default)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.part(Part::text(name, value))
    }

    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn content_type(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }

    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut encoded = BytesMut::new();
        for part in &self.parts {
            encoded.put_slice(b"--");
            encoded.put_slice(boundary.as_bytes());
            encoded.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
            encoded.put_slice(escape_quoted(&part.name).as_bytes());
            encoded.put_slice(b"\"");
            if let Some(file_name) = &part.file_name {
                encoded.put_slice(b"; filename=\"");
                encoded.put_slice(escape_quoted(file_name).as_bytes());
                encoded.put_slice(b"\"");
            }
            encoded.put_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                encoded.put_slice(b"Content-Type: ");
                encoded.put_slice(content_type.as_bytes());
                encoded.put_slice(b"\r\n");
            }
            encoded.put_slice(b"\r\n");
            encoded.put_slice(&part.data);
            encoded.put_slice(b"\r\n");
        }
        encoded.put_slice(b"--");
        encoded.put_slice(boundary.as_bytes());
        encoded.put_slice(b"--\r\n");
        encoded.freeze()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;

    use super::{Body, BodyStream, MultipartForm, Part};

    #[test]
    fn body_stream_is_consumed_after_take_across_clones() {
        let stream = BodyStream::new(stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"chunk"),
        )]));
        let body = Body::Stream(stream.clone());
        assert!(!body.is_consumed_stream());

        assert!(stream.take().is_some());
        assert!(body.is_consumed_stream());
        assert!(stream.take().is_none());
    }

    #[test]
    fn multipart_encoding_frames_every_part() {
        let form = MultipartForm::new()
            .text("title", "report")
            .part(
                Part::bytes("file", Bytes::from_static(b"\x00\x01"))
                    .file_name("a.bin"),
            );
        let encoded = form.encode("XYZ");
        let text = String::from_utf8_lossy(&encoded);

        assert!(text.starts_with("--XYZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nreport\r\n"));
        assert!(text.contains("name=\"file\"; filename=\"a.bin\"\r\nContent-Type: application/octet-stream\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));
    }
}
