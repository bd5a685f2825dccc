//! Second pass: serialize a resolved schema tree.
//!
//! The emitter trusts the offsets already stored in the tree and never recomputes them. It
//! reports how many bytes it wrote so the caller can compare that against the layout.

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;

use std::io::{self, Write};

use crate::err::{Result, RsrcError};
use crate::schema::CoffObject;
use crate::sized_stream::SizedStream;
use crate::walk::{Node, NodePath, Scalar, SchemaVisitor, ToNode, Walk, walk};

/// Counts the bytes that pass through to `inner`.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct Emitter<'s, W> {
    sink: CountingWriter<W>,
    streams: &'s mut [SizedStream],
}

impl<W: Write> Emitter<'_, W> {
    fn write_scalar(&mut self, scalar: &Scalar) -> io::Result<()> {
        match *scalar {
            Scalar::U8(v) => self.sink.write_u8(v),
            Scalar::U16(v) => self.sink.write_u16::<LittleEndian>(v),
            Scalar::U32(v) => self.sink.write_u32::<LittleEndian>(v),
            Scalar::Name(ref name) => self.sink.write_all(name),
        }
    }
}

impl<W: Write> SchemaVisitor for Emitter<'_, W> {
    type Error = RsrcError;

    fn visit(&mut self, _path: &NodePath, node: &Node) -> Result<Walk> {
        match node {
            Node::Scalar(scalar) => {
                self.write_scalar(scalar)
                    .map_err(|source| RsrcError::FailedToWrite { source })?;
                Ok(Walk::Descend)
            }
            Node::Stream { id, len } => {
                let stream = self
                    .streams
                    .get_mut(*id)
                    .ok_or(RsrcError::UnknownStream { id: *id })?;

                if stream.len() != *len {
                    return Err(RsrcError::StreamLengthDisagrees {
                        node: *len,
                        stream: stream.len(),
                    });
                }

                stream.copy_to(&mut self.sink)?;
                Ok(Walk::Skip)
            }
            Node::Composite(_) | Node::Sequence(_) => Ok(Walk::Descend),
        }
    }
}

/// Writes a resolved object to `sink`, pulling its manifest from `streams`.
///
/// Returns the number of bytes written.
pub fn emit<W: Write>(coff: &CoffObject, streams: &mut [SizedStream], sink: W) -> Result<u64> {
    emit_node(&coff.to_node(), streams, sink)
}

/// Writes `root` to `sink`, pulling stream nodes from `streams` by id.
pub fn emit_node<W: Write>(root: &Node, streams: &mut [SizedStream], sink: W) -> Result<u64> {
    let mut emitter = Emitter {
        sink: CountingWriter {
            inner: sink,
            written: 0,
        },
        streams,
    };

    walk(root, &mut emitter)?;
    emitter
        .sink
        .flush()
        .map_err(|source| RsrcError::FailedToWrite { source })?;

    debug!("emitted {} bytes", emitter.sink.written);
    Ok(emitter.sink.written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_writes_scalars_little_endian_in_order() {
        let root = Node::Composite(vec![
            ("A", Node::Scalar(Scalar::U16(0x0102))),
            ("B", Node::Scalar(Scalar::U32(0x0304_0506))),
            ("C", Node::Scalar(Scalar::U8(0x07))),
            ("D", Node::Scalar(Scalar::Name(*b".rsrc\0\0\0"))),
        ]);

        let mut out = vec![];
        let written = emit_node(&root, &mut [], &mut out).unwrap();

        assert_eq!(written, 15);
        assert_eq!(
            out,
            vec![
                0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0x07, b'.', b'r', b's', b'r', b'c', 0, 0, 0
            ]
        );
    }

    #[test]
    fn test_copies_streams_between_scalars() {
        let root = Node::Sequence(vec![
            Node::Scalar(Scalar::U8(0xAA)),
            Node::Stream { id: 0, len: 3 },
            Node::Scalar(Scalar::U8(0xBB)),
        ]);
        let mut streams = [SizedStream::from_bytes(b"xyz".to_vec())];

        let mut out = vec![];
        emit_node(&root, &mut streams, &mut out).unwrap();

        assert_eq!(out, b"\xAAxyz\xBB".to_vec());
    }

    #[test]
    fn test_unknown_stream_is_an_error() {
        let root = Node::Stream { id: 1, len: 0 };
        let mut streams = [SizedStream::from_bytes(vec![])];

        assert!(matches!(
            emit_node(&root, &mut streams, io::sink()),
            Err(RsrcError::UnknownStream { id: 1 })
        ));
    }

    #[test]
    fn test_stream_length_disagreeing_with_node_is_an_error() {
        let root = Node::Stream { id: 0, len: 4 };
        let mut streams = [SizedStream::from_bytes(b"abc".to_vec())];

        assert!(matches!(
            emit_node(&root, &mut streams, io::sink()),
            Err(RsrcError::StreamLengthDisagrees { node: 4, stream: 3 })
        ));
        // Nothing was taken from the stream.
        assert!(!streams[0].is_consumed());
    }

    #[test]
    fn test_sink_failure_is_reported() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let root = Node::Scalar(Scalar::U32(1));
        assert!(matches!(
            emit_node(&root, &mut [], Broken),
            Err(RsrcError::FailedToWrite { .. })
        ));
    }
}
