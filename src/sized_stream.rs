//! Byte sources whose length is known before any byte is read.
//!
//! The layout pass needs the size of the manifest long before the emission pass copies it,
//! so the length is captured once at construction (from file metadata for paths) and the
//! contents are copied exactly once, verbatim.

use crate::err::{Result, RsrcError};

use log::trace;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

pub struct SizedStream {
    len: u64,
    reader: Option<Box<dyn Read>>,
}

impl SizedStream {
    /// Wraps `reader`, trusting `len` as the number of bytes it will yield.
    pub fn new(reader: impl Read + 'static, len: u64) -> Self {
        SizedStream {
            len,
            reader: Some(Box::new(reader)),
        }
    }

    /// Opens `path` and records its length from the file metadata, without reading it.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = File::open(path.as_ref())?;
        let len = f.metadata()?.len();

        Ok(SizedStream::new(f, len))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;

        SizedStream::new(Cursor::new(bytes), len)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_consumed(&self) -> bool {
        self.reader.is_none()
    }

    /// Copies exactly the declared number of bytes into `sink`.
    ///
    /// May only be called once; the source is released afterwards.
    pub fn copy_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let mut reader = self.reader.take().ok_or(RsrcError::StreamConsumed)?;

        let copied = io::copy(&mut reader.by_ref().take(self.len), sink)
            .map_err(|source| RsrcError::FailedToWrite { source })?;

        trace!("copied {} of {} declared stream bytes", copied, self.len);

        if copied != self.len {
            return Err(RsrcError::StreamSizeMismatch {
                declared: self.len,
                copied,
            });
        }

        Ok(copied)
    }
}

impl fmt::Debug for SizedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizedStream")
            .field("len", &self.len)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
