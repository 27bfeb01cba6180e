//! Connection Reader
//!
//! Owns one accepted connection and turns its byte stream into
//! newline-delimited records. Each record and the final close reason are
//! reported to the observer; the stream is dropped, and so closed, exactly
//! once when the reader finishes.

use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::debug;

use crate::error::ReadError;
use crate::events::{CloseReason, ConnectionEvent, SharedObserver};

/// Largest record accepted by default, terminator excluded
pub const DEFAULT_MAX_RECORD_SIZE: usize = 64 * 1024;

/// Reads line records from a single connection until EOF or error
pub struct ConnectionReader<S> {
    stream: S,
    remote: SocketAddr,
    max_record_size: usize,
    observer: SharedObserver,
}

impl<S> ConnectionReader<S>
where
    S: AsyncRead + Unpin + Send,
{
    /// Create a reader for `stream`, reporting to `observer`
    pub fn new(stream: S, remote: SocketAddr, observer: SharedObserver) -> Self {
        Self {
            stream,
            remote,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            observer,
        }
    }

    /// Override the maximum record size
    pub fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    /// Consume the connection until it ends.
    ///
    /// Read errors are reported through the closed event and returned as
    /// the close reason; they never propagate further.
    pub async fn run(self) -> CloseReason {
        let ConnectionReader { stream, remote, max_record_size, observer } = self;
        let mut reader = BufReader::new(stream);

        let reason = match read_records(&mut reader, remote, max_record_size, &observer).await {
            Ok(count) => {
                debug!(remote = %remote, records = count, "Peer closed connection");
                CloseReason::Eof
            }
            Err(e) => CloseReason::ReadError(e.to_string()),
        };

        drop(reader);
        observer.on_event(ConnectionEvent::Closed { remote, reason: reason.clone() });
        reason
    }
}

async fn read_records<R>(
    reader: &mut R,
    remote: SocketAddr,
    max_record_size: usize,
    observer: &SharedObserver,
) -> Result<u64, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    let mut count = 0u64;

    while next_record(reader, &mut buf, max_record_size).await? {
        let record = String::from_utf8_lossy(&buf).into_owned();
        observer.on_event(ConnectionEvent::Record { remote, record });
        count += 1;
    }

    Ok(count)
}

/// Read the next record into `buf`, without its terminator.
///
/// Returns `false` at clean EOF. A non-empty unterminated tail before EOF is
/// returned as a final record. `\r\n` and `\n` are both accepted as
/// terminators.
async fn next_record<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_record_size: usize,
) -> Result<bool, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    // One byte of headroom for the '\n' itself.
    let limit = (max_record_size as u64).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max_record_size {
        return Err(ReadError::RecordTooLong { limit: max_record_size });
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelObserver;
    use std::io;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_test::io::Builder;

    fn remote() -> SocketAddr {
        "10.0.0.7:51000".parse().unwrap()
    }

    fn drain(rx: &mut UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn record(text: &str) -> ConnectionEvent {
        ConnectionEvent::Record { remote: remote(), record: text.to_string() }
    }

    fn closed(reason: CloseReason) -> ConnectionEvent {
        ConnectionEvent::Closed { remote: remote(), reason }
    }

    #[tokio::test]
    async fn test_records_then_clean_close() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"hello\nworld\n").build();

        let reason = ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(reason, CloseReason::Eof);
        assert_eq!(
            drain(&mut rx),
            vec![record("hello"), record("world"), closed(CloseReason::Eof)]
        );
    }

    #[tokio::test]
    async fn test_records_split_across_reads() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"hel").read(b"lo\nwo").read(b"rld\n").build();

        ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(
            drain(&mut rx),
            vec![record("hello"), record("world"), closed(CloseReason::Eof)]
        );
    }

    #[tokio::test]
    async fn test_trailing_partial_record_is_emitted() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"first\npartial").build();

        ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(
            drain(&mut rx),
            vec![record("first"), record("partial"), closed(CloseReason::Eof)]
        );
    }

    #[tokio::test]
    async fn test_crlf_and_empty_lines() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"a\r\n\nb\r\n").build();

        ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(
            drain(&mut rx),
            vec![record("a"), record(""), record("b"), closed(CloseReason::Eof)]
        );
    }

    #[tokio::test]
    async fn test_immediate_eof() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().build();

        let reason = ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(reason, CloseReason::Eof);
        assert_eq!(drain(&mut rx), vec![closed(CloseReason::Eof)]);
    }

    #[tokio::test]
    async fn test_read_error_ends_reader() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new()
            .read(b"hello\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
            .build();

        let reason = ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        let expected = CloseReason::ReadError("read failed: reset by peer".to_string());
        assert_eq!(reason, expected);
        assert_eq!(drain(&mut rx), vec![record("hello"), closed(expected)]);
    }

    #[tokio::test]
    async fn test_record_too_long() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"ok\n").read(b"0123456789abcdef\n").build();

        let reason = ConnectionReader::new(stream, remote(), Arc::new(observer))
            .with_max_record_size(8)
            .run()
            .await;

        let expected = CloseReason::ReadError("record exceeds maximum size of 8 bytes".to_string());
        assert_eq!(reason, expected);
        assert_eq!(drain(&mut rx), vec![record("ok"), closed(expected)]);
    }

    #[tokio::test]
    async fn test_record_at_exact_limit() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"12345678\n").build();

        ConnectionReader::new(stream, remote(), Arc::new(observer))
            .with_max_record_size(8)
            .run()
            .await;

        assert_eq!(drain(&mut rx), vec![record("12345678"), closed(CloseReason::Eof)]);
    }

    #[tokio::test]
    async fn test_unbounded_record_size() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"hello\nworld").build();

        let reason = ConnectionReader::new(stream, remote(), Arc::new(observer))
            .with_max_record_size(usize::MAX)
            .run()
            .await;

        assert_eq!(reason, CloseReason::Eof);
        assert_eq!(
            drain(&mut rx),
            vec![record("hello"), record("world"), closed(CloseReason::Eof)]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let (observer, mut rx) = ChannelObserver::new();
        let stream = Builder::new().read(b"ab\xffcd\n").build();

        ConnectionReader::new(stream, remote(), Arc::new(observer)).run().await;

        assert_eq!(
            drain(&mut rx),
            vec![record("ab\u{fffd}cd"), closed(CloseReason::Eof)]
        );
    }
}
