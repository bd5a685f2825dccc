//! Generic traversal of the schema tree.
//!
//! Every record that ends up in the object file exposes itself as a [`Node`]: a closed set of
//! node kinds that can be walked without knowing anything about COFF. Both the layout pass and
//! the emission pass are [`SchemaVisitor`]s driven by [`walk`], so they observe the same nodes,
//! at the same paths, in the same order.
//!
//! Traversal behavior:
//! - Pre-order: a composite or sequence node is visited before its children.
//! - Children are visited in declaration order (composites) or index order (sequences).
//! - Stream nodes are opaque and are never decomposed.
//! - A visitor may return [`Walk::Skip`] to avoid descending into a node.
//! - The first visitor error aborts the walk and is returned as-is.

use std::fmt;

/// A fixed-width little-endian value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8(u8),
    U16(u16),
    U32(u32),
    /// An 8-byte zero-padded short name (section and symbol names).
    Name([u8; 8]),
}

impl Scalar {
    /// Encoded width in bytes.
    pub const fn width(&self) -> u32 {
        match self {
            Scalar::U8(_) => 1,
            Scalar::U16(_) => 2,
            Scalar::U32(_) => 4,
            Scalar::Name(_) => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(Scalar),
    /// Named children, in declaration order.
    Composite(Vec<(&'static str, Node)>),
    Sequence(Vec<Node>),
    /// Raw bytes supplied out of band; `id` indexes the streams handed to the emitter.
    Stream { id: usize, len: u64 },
}

/// Anything that can present itself as a schema [`Node`].
pub trait ToNode {
    fn to_node(&self) -> Node;
}

impl<T: ToNode> ToNode for Vec<T> {
    fn to_node(&self) -> Node {
        Node::Sequence(self.iter().map(ToNode::to_node).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Field(&'static str),
    Index(usize),
}

/// Canonical location of a node: `/` for the root, `/Name` per named child, `[i]` per element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath {
    segments: Vec<Segment>,
}

impl NodePath {
    pub fn root() -> Self {
        NodePath::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is(&self, pattern: &[Segment]) -> bool {
        self.segments.as_slice() == pattern
    }

    fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    fn pop(&mut self) {
        self.segments.pop();
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }

        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, "/{}", name)?,
                Segment::Index(i) => write!(f, "[{}]", i)?,
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Descend,
    Skip,
}

/// Visitor interface for [`walk`].
pub trait SchemaVisitor {
    type Error;

    /// Called once per node, before any of its children.
    fn visit(&mut self, path: &NodePath, node: &Node) -> Result<Walk, Self::Error>;
}

/// Depth-first, pre-order walk of `root`.
pub fn walk<V: SchemaVisitor>(root: &Node, visitor: &mut V) -> Result<(), V::Error> {
    let mut path = NodePath::root();
    walk_node(root, &mut path, visitor)
}

fn walk_node<V: SchemaVisitor>(
    node: &Node,
    path: &mut NodePath,
    visitor: &mut V,
) -> Result<(), V::Error> {
    if visitor.visit(path, node)? == Walk::Skip {
        return Ok(());
    }

    match node {
        Node::Composite(fields) => {
            for (name, child) in fields {
                path.push(Segment::Field(*name));
                let res = walk_node(child, path, visitor);
                path.pop();
                res?;
            }
        }
        Node::Sequence(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(Segment::Index(i));
                let res = walk_node(child, path, visitor);
                path.pop();
                res?;
            }
        }
        Node::Scalar(_) | Node::Stream { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Node {
        Node::Composite(vec![
            ("Header", Node::Scalar(Scalar::U16(1))),
            (
                "Items",
                Node::Sequence(vec![
                    Node::Composite(vec![("Value", Node::Scalar(Scalar::U32(2)))]),
                    Node::Stream { id: 0, len: 5 },
                ]),
            ),
            ("Trailer", Node::Scalar(Scalar::U8(3))),
        ])
    }

    struct Recorder {
        paths: Vec<String>,
        skip: Option<&'static str>,
        fail_at: Option<&'static str>,
    }

    impl SchemaVisitor for Recorder {
        type Error = String;

        fn visit(&mut self, path: &NodePath, _node: &Node) -> Result<Walk, String> {
            let path = path.to_string();
            if self.fail_at == Some(path.as_str()) {
                return Err(path);
            }
            self.paths.push(path.clone());

            if self.skip == Some(path.as_str()) {
                Ok(Walk::Skip)
            } else {
                Ok(Walk::Descend)
            }
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            paths: vec![],
            skip: None,
            fail_at: None,
        }
    }

    #[test]
    fn test_walks_pre_order_in_declaration_order() {
        let mut v = recorder();
        walk(&sample(), &mut v).unwrap();

        assert_eq!(
            v.paths,
            vec![
                "/",
                "/Header",
                "/Items",
                "/Items[0]",
                "/Items[0]/Value",
                "/Items[1]",
                "/Trailer",
            ]
        );
    }

    #[test]
    fn test_skip_does_not_descend() {
        let mut v = recorder();
        v.skip = Some("/Items");
        walk(&sample(), &mut v).unwrap();

        assert_eq!(v.paths, vec!["/", "/Header", "/Items", "/Trailer"]);
    }

    #[test]
    fn test_visitor_error_stops_traversal() {
        let mut v = recorder();
        v.fail_at = Some("/Items[0]/Value");

        let err = walk(&sample(), &mut v).unwrap_err();
        assert_eq!(err, "/Items[0]/Value");
        assert_eq!(v.paths, vec!["/", "/Header", "/Items", "/Items[0]"]);
    }

    #[test]
    fn test_two_walks_observe_identical_order() {
        let tree = sample();
        let (mut a, mut b) = (recorder(), recorder());
        walk(&tree, &mut a).unwrap();
        walk(&tree, &mut b).unwrap();

        assert_eq!(a.paths, b.paths);
    }

    #[test]
    fn test_path_matches_segment_pattern() {
        let mut path = NodePath::root();
        assert!(path.is(&[]));
        path.push(Segment::Field("Items"));
        path.push(Segment::Index(1));

        assert!(path.is(&[Segment::Field("Items"), Segment::Index(1)]));
        assert!(!path.is(&[Segment::Field("Items")]));
        assert_eq!(path.to_string(), "/Items[1]");
    }

    #[test]
    fn test_scalar_widths_are_fixed() {
        assert_eq!(Scalar::U8(0).width(), 1);
        assert_eq!(Scalar::U16(0).width(), 2);
        assert_eq!(Scalar::U32(0).width(), 4);
        assert_eq!(Scalar::Name(*b".rsrc\0\0\0").width(), 8);
    }
}
