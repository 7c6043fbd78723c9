//! Bounded body capture with exact replay.
//!
//! Capturing a body for the audit record consumes the stream that the
//! functional code path still needs. [`BodyCapture`] reads at most
//! `limit + 1` bytes and hands back a replacement stream:
//!
//! - body within the limit: the source is dropped and the replacement
//!   replays the buffered bytes;
//! - body over the limit: the audit copy is cut to exactly `limit` bytes,
//!   while the replacement yields everything read so far followed by the
//!   unread remainder of the source, so downstream code sees the complete
//!   payload.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Default capture ceiling in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Reads bodies up to a byte ceiling and restores them for downstream use.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use trail_core::BodyCapture;
///
/// let capture = BodyCapture::new(4);
/// let captured = capture
///     .capture(Some(&b"hello world"[..]))
///     .expect("in-memory reads never fail")
///     .expect("source was present");
///
/// assert_eq!(captured.bytes(), b"hell");
/// assert!(captured.truncated());
///
/// let mut replayed = Vec::new();
/// captured.into_replay().read_to_end(&mut replayed).unwrap();
/// assert_eq!(replayed, b"hello world");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyCapture {
    limit: usize,
}

impl BodyCapture {
    /// Creates a capture with the given byte ceiling.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Returns the byte ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn read_ceiling(&self) -> u64 {
        u64::try_from(self.limit)
            .unwrap_or(u64::MAX)
            .saturating_add(1)
    }

    /// Captures a blocking stream.
    ///
    /// An absent source yields `Ok(None)`: nothing captured, nothing to replay.
    ///
    /// # Errors
    ///
    /// If the source fails mid-read, the returned [`CaptureFailure`] still
    /// carries a replay stream made of the bytes already read followed by the
    /// rest of the source.
    pub fn capture<R: Read>(
        &self,
        source: Option<R>,
    ) -> Result<Option<CapturedBody<Replay<R>>>, CaptureFailure<Replay<R>>> {
        let Some(mut source) = source else {
            return Ok(None);
        };

        let mut read = Vec::new();
        if let Err(error) = (&mut source)
            .take(self.read_ceiling())
            .read_to_end(&mut read)
        {
            return Err(CaptureFailure {
                error,
                replay: Replay::Spliced(Read::chain(Cursor::new(read), source)),
            });
        }

        if read.len() > self.limit {
            let bytes = read[..self.limit].to_vec();
            Ok(Some(CapturedBody {
                bytes,
                truncated: true,
                replay: Replay::Spliced(Read::chain(Cursor::new(read), source)),
            }))
        } else {
            drop(source);
            Ok(Some(CapturedBody {
                bytes: read.clone(),
                truncated: false,
                replay: Replay::Buffered(Cursor::new(read)),
            }))
        }
    }

    /// Captures an async stream with the same semantics as [`capture`](Self::capture).
    ///
    /// # Errors
    ///
    /// See [`capture`](Self::capture).
    pub async fn capture_async<R: AsyncRead + Unpin>(
        &self,
        source: Option<R>,
    ) -> Result<Option<CapturedBody<AsyncReplay<R>>>, CaptureFailure<AsyncReplay<R>>> {
        let Some(mut source) = source else {
            return Ok(None);
        };

        let mut read = Vec::new();
        if let Err(error) = (&mut source)
            .take(self.read_ceiling())
            .read_to_end(&mut read)
            .await
        {
            return Err(CaptureFailure {
                error,
                replay: AsyncReplay::Spliced {
                    prefix: Cursor::new(read),
                    rest: source,
                },
            });
        }

        if read.len() > self.limit {
            let bytes = read[..self.limit].to_vec();
            Ok(Some(CapturedBody {
                bytes,
                truncated: true,
                replay: AsyncReplay::Spliced {
                    prefix: Cursor::new(read),
                    rest: source,
                },
            }))
        } else {
            drop(source);
            Ok(Some(CapturedBody {
                bytes: read.clone(),
                truncated: false,
                replay: AsyncReplay::Buffered(Cursor::new(read)),
            }))
        }
    }
}

impl Default for BodyCapture {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT)
    }
}

/// Result of a successful capture: the audit bytes plus a replay stream.
#[derive(Debug)]
pub struct CapturedBody<S> {
    bytes: Vec<u8>,
    truncated: bool,
    replay: S,
}

impl<S> CapturedBody<S> {
    /// Bytes kept for the audit record (never longer than the limit).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the audit copy was cut at the limit.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Consumes the capture, returning the replay stream.
    pub fn into_replay(self) -> S {
        self.replay
    }

    /// Consumes the capture, returning the audit bytes and the replay stream.
    pub fn into_parts(self) -> (Vec<u8>, S) {
        (self.bytes, self.replay)
    }
}

/// Capture that failed mid-read.
#[derive(Error)]
#[error("body capture failed: {error}")]
pub struct CaptureFailure<S> {
    #[source]
    error: io::Error,
    replay: S,
}

impl<S> CaptureFailure<S> {
    /// The underlying read error.
    pub fn error(&self) -> &io::Error {
        &self.error
    }

    /// Stream replaying the partially read bytes followed by the rest of the source.
    pub fn into_replay(self) -> S {
        self.replay
    }
}

impl<S> fmt::Debug for CaptureFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Replacement for a captured blocking stream.
#[derive(Debug)]
pub enum Replay<R> {
    /// Whole body was captured; the source has been released.
    Buffered(Cursor<Vec<u8>>),
    /// Captured prefix followed by the unread remainder of the source.
    Spliced(io::Chain<Cursor<Vec<u8>>, R>),
}

impl<R: Read> Read for Replay<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Replay::Buffered(cursor) => Read::read(cursor, buf),
            Replay::Spliced(chain) => Read::read(chain, buf),
        }
    }
}

/// Replacement for a captured async stream.
#[derive(Debug)]
pub enum AsyncReplay<R> {
    /// Whole body was captured; the source has been released.
    Buffered(Cursor<Vec<u8>>),
    /// Captured prefix followed by the unread remainder of the source.
    Spliced {
        /// Bytes already consumed from the source.
        prefix: Cursor<Vec<u8>>,
        /// The source, positioned just after the prefix.
        rest: R,
    },
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncReplay<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AsyncReplay::Buffered(cursor) => Pin::new(cursor).poll_read(cx, buf),
            AsyncReplay::Spliced { prefix, rest } => {
                let remaining = (prefix.get_ref().len() as u64).saturating_sub(prefix.position());
                if remaining > 0 {
                    Pin::new(prefix).poll_read(cx, buf)
                } else {
                    Pin::new(rest).poll_read(cx, buf)
                }
            }
        }
    }
}
