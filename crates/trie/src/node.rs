//! [`TrieNode`] and [`NodeRef`] — the RLP node shapes: `Leaf(pathSegment, value)`,
//! `Extension(pathSegment, childRef)`, `Branch([16×childRef], value?)`.
//!
//! [`NodeRef`] distinguishes inline children (RLP encoding ≤ 31 bytes, embedded directly) from
//! hashed children (32-byte Keccak digest, fetched from the KV store by that digest).

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{length_of_length, Buf, BufMut, Decodable, Encodable, Header, EMPTY_STRING_CODE};
use alloy_trie::Nibbles;

/// Prefix for even-nibbled extension node paths.
const PREFIX_EXTENSION_EVEN: u8 = 0;
/// Prefix for odd-nibbled extension node paths.
const PREFIX_EXTENSION_ODD: u8 = 1;
/// Prefix for even-nibbled leaf node paths.
const PREFIX_LEAF_EVEN: u8 = 2;
/// Prefix for odd-nibbled leaf node paths.
const PREFIX_LEAF_ODD: u8 = 3;

/// A node within a hexary Merkle-Patricia trie.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum TrieNode {
    /// The empty trie (no nodes at all).
    #[default]
    Empty,
    /// A branch node refers to up to 16 child nodes plus an optional value.
    Branch {
        /// The 16 child slots of the branch, indexed by nibble.
        children: Box<[NodeRef; 16]>,
        /// The value stored at this branch, if the key path terminates here.
        value: Option<Bytes>,
    },
    /// A leaf node terminates a path with a value.
    Leaf {
        /// The remaining nibble path from this node to the value.
        key: Nibbles,
        /// The value stored at this leaf.
        value: Bytes,
    },
    /// An extension node is a shared-prefix pointer to a single child.
    Extension {
        /// The shared nibble prefix.
        prefix: Nibbles,
        /// The single child this extension points to.
        child: NodeRef,
    },
}

/// A reference to a child node: absent, inlined directly, or addressed by Keccak digest.
///
/// A `childRef` is either an inline RLP encoding `<= 31` bytes, or the 32-byte Keccak digest of
/// the child's encoding — in which case the child is stored under that digest in the KV store.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NodeRef {
    /// No child in this slot.
    Empty,
    /// The child node, embedded inline because its RLP encoding is short.
    Inline(Box<TrieNode>),
    /// The Keccak-256 digest of the child's RLP encoding; fetched from the KV store by digest.
    Hash(B256),
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::Empty
    }
}

impl NodeRef {
    /// Wraps `node`, inlining it if its encoding is short enough, or hashing it (and handing the
    /// caller the encoded bytes to persist) otherwise.
    ///
    /// Returns `(node_ref, Some((hash, encoded_bytes)))` when the caller must persist a new node
    /// under `hash` in the KV store.
    pub fn from_node(node: TrieNode) -> (Self, Option<(B256, Vec<u8>)>) {
        if matches!(node, TrieNode::Empty) {
            return (Self::Empty, None);
        }

        let mut encoded = Vec::with_capacity(node.length());
        node.encode(&mut encoded);

        if encoded.len() < 32 {
            (Self::Inline(Box::new(node)), None)
        } else {
            let hash = keccak256(&encoded);
            (Self::Hash(hash), Some((hash, encoded)))
        }
    }
}

impl Encodable for NodeRef {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Empty => out.put_u8(EMPTY_STRING_CODE),
            Self::Hash(hash) => hash.as_slice().encode(out),
            Self::Inline(node) => node.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Empty => 1,
            Self::Hash(hash) => hash.as_slice().length(),
            Self::Inline(node) => node.length(),
        }
    }
}

impl Decodable for NodeRef {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if buf.first() == Some(&EMPTY_STRING_CODE) {
            buf.advance(1);
            return Ok(Self::Empty);
        }

        let header = Header::decode(&mut &buf[..])?;
        if header.list {
            Ok(Self::Inline(Box::new(TrieNode::decode(buf)?)))
        } else {
            let bytes = Bytes::decode(buf)?;
            B256::try_from(bytes.as_ref())
                .map(Self::Hash)
                .map_err(|_| alloy_rlp::Error::UnexpectedLength)
        }
    }
}

impl Encodable for TrieNode {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Empty => out.put_u8(EMPTY_STRING_CODE),
            Self::Leaf { key, value } => {
                let path = hex_prefix_encode(key, true);
                let payload_length = path.length() + value.length();
                Header { list: true, payload_length }.encode(out);
                path.encode(out);
                value.encode(out);
            }
            Self::Extension { prefix, child } => {
                let path = hex_prefix_encode(prefix, false);
                let payload_length = path.length() + child.length();
                Header { list: true, payload_length }.encode(out);
                path.encode(out);
                child.encode(out);
            }
            Self::Branch { children, value } => {
                let payload_length = children.iter().map(Encodable::length).sum::<usize>()
                    + value.as_ref().map(Encodable::length).unwrap_or(1);
                Header { list: true, payload_length }.encode(out);
                for child in children.iter() {
                    child.encode(out);
                }
                match value {
                    Some(value) => value.encode(out),
                    None => out.put_u8(EMPTY_STRING_CODE),
                }
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Empty => 1,
            Self::Leaf { key, value } => {
                let payload_length = hex_prefix_encode(key, true).length() + value.length();
                length_of_length(payload_length) + payload_length
            }
            Self::Extension { prefix, child } => {
                let payload_length = hex_prefix_encode(prefix, false).length() + child.length();
                length_of_length(payload_length) + payload_length
            }
            Self::Branch { children, value } => {
                let payload_length = children.iter().map(Encodable::length).sum::<usize>()
                    + value.as_ref().map(Encodable::length).unwrap_or(1);
                length_of_length(payload_length) + payload_length
            }
        }
    }
}

impl Decodable for TrieNode {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if buf.first() == Some(&EMPTY_STRING_CODE) {
            buf.advance(1);
            return Ok(Self::Empty);
        }

        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let payload_view = &mut &buf[..header.payload_length];

        // Count elements by scanning the payload once.
        let mut count = 0usize;
        {
            let mut scan = &payload_view[..];
            while !scan.is_empty() {
                let h = Header::decode(&mut scan)?;
                scan.advance(h.payload_length);
                count += 1;
            }
        }

        let node = match count {
            17 => {
                let mut children: Box<[NodeRef; 16]> =
                    Box::new(core::array::from_fn(|_| NodeRef::Empty));
                for child in children.iter_mut() {
                    *child = NodeRef::decode(payload_view)?;
                }
                let value = decode_optional_value(payload_view)?;
                Self::Branch { children, value }
            }
            2 => {
                let path_bytes = Bytes::decode(payload_view)?;
                match path_bytes.first().map(|b| b >> 4) {
                    Some(PREFIX_LEAF_EVEN) | Some(PREFIX_LEAF_ODD) => {
                        let key = hex_prefix_decode(&path_bytes);
                        let value = Bytes::decode(payload_view)?;
                        Self::Leaf { key, value }
                    }
                    Some(PREFIX_EXTENSION_EVEN) | Some(PREFIX_EXTENSION_ODD) => {
                        let prefix = hex_prefix_decode(&path_bytes);
                        let child = NodeRef::decode(payload_view)?;
                        Self::Extension { prefix, child }
                    }
                    _ => return Err(alloy_rlp::Error::Custom("invalid hex-prefix nibble")),
                }
            }
            _ => return Err(alloy_rlp::Error::UnexpectedLength),
        };

        buf.advance(header.payload_length);
        Ok(node)
    }
}

fn decode_optional_value(buf: &mut &[u8]) -> alloy_rlp::Result<Option<Bytes>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        buf.advance(1);
        Ok(None)
    } else {
        Ok(Some(Bytes::decode(buf)?))
    }
}

/// Hex-prefix encodes a nibble path (Yellow Paper appendix C), tagging it as a leaf or extension
/// path and padding to a whole byte.
pub(crate) fn hex_prefix_encode(nibbles: &Nibbles, is_leaf: bool) -> Bytes {
    let odd = nibbles.len() % 2 == 1;
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);

    let prefix = match (is_leaf, odd) {
        (false, false) => PREFIX_EXTENSION_EVEN << 4,
        (false, true) => (PREFIX_EXTENSION_ODD << 4) | nibbles[0],
        (true, false) => PREFIX_LEAF_EVEN << 4,
        (true, true) => (PREFIX_LEAF_ODD << 4) | nibbles[0],
    };
    out.push(prefix);

    let start = if odd { 1 } else { 0 };
    let mut i = start;
    while i < nibbles.len() {
        out.push((nibbles[i] << 4) | nibbles[i + 1]);
        i += 2;
    }

    out.into()
}

/// Decodes a hex-prefix encoded path back into nibbles, dropping the leaf/extension tag.
pub(crate) fn hex_prefix_decode(path: &[u8]) -> Nibbles {
    let first = path[0];
    let odd = (first >> 4) & 1 == 1;

    let mut nibbles = Vec::with_capacity(path.len() * 2);
    if odd {
        nibbles.push(first & 0x0f);
    }
    for byte in &path[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }

    Nibbles::from_vec_unchecked(nibbles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_prefix_roundtrip_even_leaf() {
        let nibbles = Nibbles::from_vec_unchecked(vec![1, 2, 3, 4]);
        let encoded = hex_prefix_encode(&nibbles, true);
        assert_eq!(hex_prefix_decode(&encoded), nibbles);
    }

    #[test]
    fn hex_prefix_roundtrip_odd_extension() {
        let nibbles = Nibbles::from_vec_unchecked(vec![1, 2, 3]);
        let encoded = hex_prefix_encode(&nibbles, false);
        assert_eq!(hex_prefix_decode(&encoded), nibbles);
    }

    #[test]
    fn leaf_encode_decode_roundtrip() {
        let node = TrieNode::Leaf {
            key: Nibbles::from_vec_unchecked(vec![0xa, 0xb, 0xc]),
            value: Bytes::from_static(b"hello"),
        };
        let mut buf = Vec::new();
        node.encode(&mut buf);
        let decoded = TrieNode::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, node);
    }
}
