use thiserror::Error;

use std::io;
use std::path::PathBuf;

use crate::layout::PatchPoint;

pub type Result<T> = std::result::Result<T, RsrcError>;

#[derive(Debug, Error)]
pub enum RsrcError {
    #[error("Error opening manifest file `{}`: {source}", path.display())]
    FailedToOpenManifest { path: PathBuf, source: io::Error },

    #[error("Error opening icon file `{}`: {source}", path.display())]
    FailedToOpenIcon { path: PathBuf, source: io::Error },

    #[error("Icon file `{}` is invalid: {source}", path.display())]
    InvalidIcon { path: PathBuf, source: IconError },

    #[error("Error creating output file `{}`: {source}", path.display())]
    FailedToCreateOutput { path: PathBuf, source: io::Error },

    #[error("Error writing output file: {source}")]
    FailedToWrite { source: io::Error },

    #[error("Manifest is {len} bytes long, resources are limited to {} bytes", u32::MAX)]
    ManifestTooLarge { len: u64 },

    #[error("Resource directory has {count} entries of one kind, at most {} are allowed", u16::MAX)]
    TooManyDirectoryEntries { count: usize },

    #[error("Stream declared {declared} bytes, but {copied} bytes were copied")]
    StreamSizeMismatch { declared: u64, copied: u64 },

    #[error("Schema declares a {node} byte stream, but the supplied stream holds {stream} bytes")]
    StreamLengthDisagrees { node: u64, stream: u64 },

    #[error("Stream has already been consumed")]
    StreamConsumed,

    #[error("Schema references stream #{id}, which was not supplied")]
    UnknownStream { id: usize },

    #[error("Emitted {written} bytes, but layout computed {computed} bytes")]
    LengthMismatch { computed: u64, written: u64 },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Errors raised while computing offsets for the schema tree.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Offset of `{path}` does not fit in 32 bits")]
    OffsetOverflow { path: String },

    #[error("Patch point {patch:?} reached at `{path}` before the section base was recorded")]
    MissingSectionBase { patch: PatchPoint, path: String },

    #[error("Patch point {patch:?} was never reached during layout")]
    UnresolvedPatchPoint { patch: PatchPoint },
}

#[derive(Debug, Error)]
pub enum IconError {
    #[error("ICO header reserved field must be 0, found {value}")]
    InvalidReserved { value: u16 },

    #[error("Expected ICO image type 1, found {kind}")]
    NotAnIcon { kind: u16 },

    #[error("ICO file contains no images")]
    NoImages,

    #[error("ICO headers are truncated: {0}")]
    Truncated(#[from] io::Error),
}

/// Errors raised by [`crate::reader`] while decoding an emitted object.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Truncated {what} at offset {offset}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("Malformed COFF object: {message}")]
    MalformedObject { message: &'static str },

    #[error("Failed to decode COFF object: {0}")]
    Coff(#[from] goblin::error::Error),

    #[error("Resource directory is malformed: {message}")]
    MalformedResource { message: &'static str },
}
