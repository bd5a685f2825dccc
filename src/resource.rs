use log::{debug, info, warn};

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::emit::emit;
use crate::err::{Result, RsrcError};
use crate::ico::{self, IconDir};
use crate::layout::Layout;
use crate::schema::CoffObject;
use crate::settings::RsrcSettings;
use crate::sized_stream::SizedStream;

/// A manifest waiting to be written out as a `.rsrc` COFF object.
///
/// Writing runs three strictly sequential phases: the schema tree is built with zeroed
/// offsets, the layout pass resolves every offset, and the resolved tree is emitted.
#[derive(Debug)]
pub struct ManifestResource {
    manifest: SizedStream,
    settings: RsrcSettings,
}

impl ManifestResource {
    /// Opens the manifest at `path`. Only its length is queried here.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest =
            SizedStream::open(path).map_err(|source| RsrcError::FailedToOpenManifest {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            "opened manifest `{}` ({} bytes)",
            path.display(),
            manifest.len()
        );

        Ok(ManifestResource::from_stream(manifest))
    }

    pub fn from_buffer(bytes: impl Into<Vec<u8>>) -> Self {
        ManifestResource::from_stream(SizedStream::from_bytes(bytes))
    }

    pub fn from_stream(manifest: SizedStream) -> Self {
        ManifestResource {
            manifest,
            settings: RsrcSettings::default(),
        }
    }

    pub fn with_configuration(mut self, settings: RsrcSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn manifest_len(&self) -> u64 {
        self.manifest.len()
    }

    /// Builds the tree and resolves its layout. Nothing is written yet.
    fn prepare(self) -> Result<PreparedObject> {
        let ManifestResource { manifest, settings } = self;

        let coff = CoffObject::manifest(manifest.len(), &settings)?;
        debug!(
            "built resource tree for {} ({} byte manifest)",
            settings.get_arch(),
            manifest.len()
        );

        let layout = Layout::compute(&coff)?;
        let coff = coff.resolve(&layout)?;

        Ok(PreparedObject {
            coff,
            layout,
            manifest,
        })
    }

    /// Writes the object to `sink`, returning the number of bytes written.
    pub fn write_to<W: Write>(self, sink: W) -> Result<u64> {
        self.prepare()?.write_to(sink)
    }

    /// Writes the object to a new file at `path`.
    ///
    /// The output is only created once the layout is known to be valid. If emission fails
    /// afterwards, the partial file is removed.
    pub fn write_to_path(self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let prepared = self.prepare()?;

        let file = File::create(path).map_err(|source| RsrcError::FailedToCreateOutput {
            path: path.to_path_buf(),
            source,
        })?;

        match prepared.write_to(BufWriter::new(file)) {
            Ok(written) => {
                info!("wrote {} bytes to `{}`", written, path.display());
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!(
                        "failed to remove partially written `{}`: {}",
                        path.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }
}

/// A resolved tree together with the stream it embeds.
struct PreparedObject {
    coff: CoffObject,
    layout: Layout,
    manifest: SizedStream,
}

impl PreparedObject {
    fn write_to<W: Write>(self, sink: W) -> Result<u64> {
        let mut streams = [self.manifest];
        let written = emit(&self.coff, &mut streams, sink)?;

        if written != self.layout.total_len() {
            return Err(RsrcError::LengthMismatch {
                computed: self.layout.total_len(),
                written,
            });
        }

        Ok(written)
    }
}

/// Checks that `path` holds a well-formed icon directory. The icon is not embedded.
pub fn validate_icon_file(path: impl AsRef<Path>) -> Result<IconDir> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|source| RsrcError::FailedToOpenIcon {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = ico::decode_headers(&mut BufReader::new(f)).map_err(|source| {
        RsrcError::InvalidIcon {
            path: path.to_path_buf(),
            source,
        }
    })?;

    debug!(
        "icon `{}` has {} image(s), ignoring",
        path.display(),
        dir.entries.len()
    );
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::LayoutError;
    use pretty_assertions::assert_eq;
    use std::io::{self, Cursor};
    use tempfile::tempdir;

    #[test]
    fn test_write_to_reports_total_length() {
        let mut out = vec![];
        let written = ManifestResource::from_buffer(vec![b'a'; 33])
            .write_to(&mut out)
            .unwrap();

        assert_eq!(written, 180 + 33);
        assert_eq!(out.len() as u64, written);
    }

    #[test]
    fn test_failed_write_removes_partial_output() {
        let d = tempdir().unwrap();
        let out = d.path().join("broken.syso");

        // Declares more bytes than the reader can produce, so emission fails mid-way.
        let stream = SizedStream::new(Cursor::new(vec![0_u8; 2]), 10);
        let err = ManifestResource::from_stream(stream)
            .write_to_path(&out)
            .unwrap_err();

        assert!(matches!(err, RsrcError::StreamSizeMismatch { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_layout_overflow_leaves_existing_output_untouched() {
        let d = tempdir().unwrap();
        let out = d.path().join("rsrc.syso");
        fs::write(&out, b"previous build").unwrap();

        // Fits the 32-bit size field, but the tables after the data do not fit 32-bit offsets.
        let stream = SizedStream::new(io::empty(), u64::from(u32::MAX) - 10);
        let err = ManifestResource::from_stream(stream)
            .write_to_path(&out)
            .unwrap_err();

        assert!(matches!(
            err,
            RsrcError::Layout(LayoutError::OffsetOverflow { .. })
        ));
        assert_eq!(fs::read(&out).unwrap(), b"previous build".to_vec());
    }

    #[test]
    fn test_too_large_manifest_creates_nothing() {
        let d = tempdir().unwrap();
        let out = d.path().join("rsrc.syso");

        let stream = SizedStream::new(io::empty(), u64::from(u32::MAX) + 1);
        let err = ManifestResource::from_stream(stream)
            .write_to_path(&out)
            .unwrap_err();

        assert!(matches!(err, RsrcError::ManifestTooLarge { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_manifest_names_path() {
        let d = tempdir().unwrap();
        let missing = d.path().join("nope.manifest");

        let err = ManifestResource::from_path(&missing).unwrap_err();
        assert!(err.to_string().contains("nope.manifest"));
    }

    #[test]
    fn test_unwritable_output_is_reported() {
        let d = tempdir().unwrap();
        let out = d.path().join("missing-dir").join("rsrc.syso");

        let err = ManifestResource::from_buffer(b"<a/>".to_vec())
            .write_to_path(&out)
            .unwrap_err();
        assert!(matches!(err, RsrcError::FailedToCreateOutput { .. }));
    }

    #[test]
    fn test_validate_icon_rejects_garbage() {
        let d = tempdir().unwrap();
        let ico = d.path().join("bad.ico");
        fs::write(&ico, b"not an icon").unwrap();

        let err = validate_icon_file(&ico).unwrap_err();
        assert!(matches!(err, RsrcError::InvalidIcon { .. }));
        assert!(err.to_string().contains("bad.ico"));
    }

    #[test]
    fn test_validate_icon_missing_file() {
        let err = validate_icon_file("/definitely/not/here.ico").unwrap_err();
        match err {
            RsrcError::FailedToOpenIcon { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
