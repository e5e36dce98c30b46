//! The byte source a decoder pulls from.
//!
//! A decoder never owns a file or a socket directly. It talks to a [`HostIo`]
//! implementation through three operations: `read`, `seek` and `tell`. Any of
//! them may be partially supported; for example a network stream can refuse to
//! seek and report an unknown total length.

use std::io::{self, Read, Seek, SeekFrom};

/// Where a relative seek starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Offset is measured from the first byte of the stream.
    Start,
    /// Offset is measured from the current read position.
    Current,
}

/// Error returned by [`HostIo::seek`].
#[derive(Debug, thiserror::Error)]
pub enum SeekError {
    /// The source cannot seek at all.
    #[error("The byte source does not support seeking")]
    Unsupported,
    /// The source supports seeking but this attempt failed.
    #[error("Seeking the byte source failed")]
    Failed(#[source] io::Error),
}

/// Current read position reported by [`HostIo::tell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPosition {
    /// Byte offset of the next read.
    pub position: u64,
    /// Total length of the source in bytes, when known.
    pub length: Option<u64>,
}

/// Pull-style byte source driven by a decoder.
pub trait HostIo {
    /// Reads up to `buf.len()` bytes. Returning `Ok(0)` means nothing was
    /// available right now, which is not an error by itself.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves the read position.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<(), SeekError>;

    /// Reports the read position and, if known, the total length.
    fn tell(&mut self) -> io::Result<StreamPosition>;
}

impl<H: HostIo + ?Sized> HostIo for &mut H {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    #[inline]
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<(), SeekError> {
        (**self).seek(offset, origin)
    }

    #[inline]
    fn tell(&mut self) -> io::Result<StreamPosition> {
        (**self).tell()
    }
}

impl<H: HostIo + ?Sized> HostIo for Box<H> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    #[inline]
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<(), SeekError> {
        (**self).seek(offset, origin)
    }

    #[inline]
    fn tell(&mut self) -> io::Result<StreamPosition> {
        (**self).tell()
    }
}

/// Adapts any `Read + Seek` value (a file, a `Cursor`) to [`HostIo`].
pub struct ReadSeekHost<T: Read + Seek> {
    inner: T,
    byte_len: Option<u64>,
}

impl<T: Read + Seek> ReadSeekHost<T> {
    /// Wraps `inner`, measuring its length by seeking to the end and back.
    pub fn new(mut inner: T) -> io::Result<Self> {
        let current = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(current))?;
        Ok(ReadSeekHost {
            inner,
            byte_len: Some(end),
        })
    }

    /// Wraps `inner` with a caller-provided length, or `None` when the length
    /// should be reported as unknown.
    #[inline]
    pub fn with_byte_len(inner: T, byte_len: Option<u64>) -> Self {
        ReadSeekHost { inner, byte_len }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> HostIo for ReadSeekHost<T> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<(), SeekError> {
        let target = match origin {
            SeekOrigin::Start => {
                let start = u64::try_from(offset).map_err(|_| {
                    SeekError::Failed(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "negative absolute seek offset",
                    ))
                })?;
                SeekFrom::Start(start)
            }
            SeekOrigin::Current => SeekFrom::Current(offset),
        };
        self.inner.seek(target).map(|_| ()).map_err(SeekError::Failed)
    }

    #[inline]
    fn tell(&mut self) -> io::Result<StreamPosition> {
        Ok(StreamPosition {
            position: self.inner.stream_position()?,
            length: self.byte_len,
        })
    }
}

/// Adapts a forward-only `Read` value (a pipe, a socket) to [`HostIo`].
///
/// Seeking is reported as unsupported. `tell` succeeds with the number of
/// bytes read so far and an unknown length.
pub struct ReadOnlyHost<T: Read> {
    inner: T,
    position: u64,
}

impl<T: Read> ReadOnlyHost<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        ReadOnlyHost { inner, position: 0 }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> HostIo for ReadOnlyHost<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.position += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    #[inline]
    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<(), SeekError> {
        Err(SeekError::Unsupported)
    }

    #[inline]
    fn tell(&mut self) -> io::Result<StreamPosition> {
        Ok(StreamPosition {
            position: self.position,
            length: None,
        })
    }
}
