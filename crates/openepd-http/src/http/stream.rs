//! Lazily consumed response bodies
//!
//! [`StreamingResponseReader`] owns the connection behind a response until it is
//! closed, detached or dropped. Callers must release it on every exit path: call
//! [`close`](StreamingResponseReader::close), read it to the end, or let it go out
//! of scope. A reader kept alive without being drained holds a pooled connection.

use std::io::{self, Read, Write};

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::http::response::{BodyStream, Response};
use crate::{Error, Result};

/// Response facts available before the body is consumed
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// `Content-Length`, 0 when absent or unknown
    pub content_length: u64,
    /// `Content-Type`, empty when absent
    pub content_type: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Reader over the body of one response
pub struct StreamingResponseReader {
    metadata: ResponseMetadata,
    body: Option<BodyStream>,
    detached: bool,
}

impl StreamingResponseReader {
    pub fn new(response: Response) -> Self {
        let metadata = ResponseMetadata {
            content_length: response.content_length(),
            content_type: response.content_type().unwrap_or_default().to_string(),
            status: response.status(),
            headers: response.headers().clone(),
        };
        Self {
            metadata,
            body: Some(response.into_body()),
            detached: false,
        }
    }

    /// Read up to `max_bytes`; an empty vector means the body is exhausted
    pub fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let body = self.body_mut()?;
        let mut chunk = Vec::with_capacity(max_bytes.min(64 * 1024));
        body.take(max_bytes as u64).read_to_end(&mut chunk)?;
        Ok(chunk)
    }

    /// Read everything that is left
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let body = self.body_mut()?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Stream the remaining body into `sink`, returning the bytes copied
    pub fn copy_into<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let body = self.body_mut()?;
        Ok(io::copy(body, sink)?)
    }

    /// Response facts; still available after `close`, gone after `detach`
    pub fn metadata(&self) -> Result<&ResponseMetadata> {
        if self.detached {
            return Err(Error::StreamClosed);
        }
        Ok(&self.metadata)
    }

    /// Hand the raw stream to the caller; the reader is closed afterwards
    pub fn detach(&mut self) -> Result<BodyStream> {
        let body = self.body.take().ok_or(Error::StreamClosed)?;
        self.detached = true;
        Ok(body)
    }

    /// Release the connection; a second call fails with [`Error::StreamClosed`]
    pub fn close(&mut self) -> Result<()> {
        self.body.take().map(drop).ok_or(Error::StreamClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    fn body_mut(&mut self) -> Result<&mut BodyStream> {
        self.body.as_mut().ok_or(Error::StreamClosed)
    }
}

impl Read for StreamingResponseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "Stream is closed")),
        }
    }
}

impl std::fmt::Debug for StreamingResponseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponseReader")
            .field("metadata", &self.metadata)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
    use std::io::Cursor;

    fn reader(body: &'static [u8]) -> StreamingResponseReader {
        let response = Response::from_stream(StatusCode::OK, HeaderMap::new(), Cursor::new(body))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/pdf"))
            .with_header(CONTENT_LENGTH, HeaderValue::from(body.len()));
        StreamingResponseReader::new(response)
    }

    #[test]
    fn test_read_in_chunks() {
        let mut reader = reader(b"0123456789");

        assert_eq!(reader.read(4).unwrap(), b"0123");
        assert_eq!(reader.read(4).unwrap(), b"4567");
        assert_eq!(reader.read(4).unwrap(), b"89");
        assert!(reader.read(4).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_before_consumption() {
        let reader = reader(b"%PDF-1.7");
        let metadata = reader.metadata().unwrap();

        assert_eq!(metadata.content_length, 8);
        assert_eq!(metadata.content_type, "application/pdf");
        assert_eq!(metadata.status, StatusCode::OK);
    }

    #[test]
    fn test_metadata_defaults() {
        let response = Response::from_bytes(StatusCode::OK, HeaderMap::new(), "abc");
        let reader = StreamingResponseReader::new(response);
        let metadata = reader.metadata().unwrap();

        assert_eq!(metadata.content_length, 0);
        assert_eq!(metadata.content_type, "");
    }

    #[test]
    fn test_detach_hands_over_stream() {
        let mut reader = reader(b"payload");
        assert_eq!(reader.read(3).unwrap(), b"pay");

        let mut raw = reader.detach().unwrap();
        assert!(matches!(reader.read(1), Err(Error::StreamClosed)));
        assert!(matches!(reader.metadata(), Err(Error::StreamClosed)));
        assert!(matches!(reader.detach(), Err(Error::StreamClosed)));

        let mut rest = String::new();
        raw.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "load");
    }

    #[test]
    fn test_second_close_fails() {
        let mut reader = reader(b"abc");
        reader.close().unwrap();

        assert!(reader.is_closed());
        assert!(matches!(reader.close(), Err(Error::StreamClosed)));
        assert!(matches!(reader.copy_into(&mut Vec::new()), Err(Error::StreamClosed)));
    }

    #[test]
    fn test_metadata_survives_close() {
        let mut reader = reader(b"%PDF-1.7");
        reader.close().unwrap();

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.content_length, 8);
        assert_eq!(metadata.content_type, "application/pdf");
        assert!(matches!(reader.read(1), Err(Error::StreamClosed)));
        assert!(matches!(reader.detach(), Err(Error::StreamClosed)));
        assert!(reader.metadata().is_ok());
    }

    #[test]
    fn test_copy_into_sink() {
        let mut reader = reader(b"0123456789");
        reader.read(2).unwrap();

        let mut sink = Vec::new();
        assert_eq!(reader.copy_into(&mut sink).unwrap(), 8);
        assert_eq!(sink, b"23456789");
    }

    #[test]
    fn test_copy_into_propagates_sink_failure() {
        struct FullDisk;

        impl Write for FullDisk {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "no space left"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut reader = reader(b"abc");
        let err = reader.copy_into(&mut FullDisk).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_std_read_after_close() {
        let mut reader = reader(b"abc");
        let mut buf = [0u8; 2];
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 2);

        reader.close().unwrap();
        let err = Read::read(&mut reader, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
