//! [`HexaryTrie`]: a persistent, mutable Merkle-Patricia trie backed by a [`KvStore`].

use crate::{
    node::{NodeRef, TrieNode},
    TrieError, TrieResult, EMPTY_TRIE_ROOT,
};
use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{Decodable, Encodable};
use alloy_trie::Nibbles;
use execore_kv::KvStore;

/// A hexary Merkle-Patricia trie over a [`KvStore`].
///
/// When `secure` is set, keys passed to `get`/`put`/`delete` are Keccak-256 hashed before
/// descending the trie — required for the accounts trie and every account's storage trie.
#[derive(Debug)]
pub struct HexaryTrie<'s, S: KvStore> {
    store: &'s mut S,
    root: NodeRef,
    secure: bool,
}

impl<'s, S: KvStore> HexaryTrie<'s, S> {
    /// Opens a secure trie (keys hashed with Keccak-256) rooted at `root`.
    pub fn new_secure(store: &'s mut S, root: B256) -> Self {
        Self { store, root: Self::root_ref(root), secure: true }
    }

    /// Opens a non-secure trie (keys used as-is) rooted at `root`.
    pub fn new(store: &'s mut S, root: B256) -> Self {
        Self { store, root: Self::root_ref(root), secure: false }
    }

    fn root_ref(root: B256) -> NodeRef {
        if root == EMPTY_TRIE_ROOT {
            NodeRef::Empty
        } else {
            NodeRef::Hash(root)
        }
    }

    fn path_for(&self, key: &[u8]) -> Nibbles {
        if self.secure {
            Nibbles::unpack(keccak256(key))
        } else {
            Nibbles::unpack(key)
        }
    }

    fn resolve(&self, node_ref: &NodeRef) -> TrieResult<TrieNode> {
        match node_ref {
            NodeRef::Empty => Ok(TrieNode::Empty),
            NodeRef::Inline(node) => Ok((**node).clone()),
            NodeRef::Hash(hash) => {
                let bytes = self
                    .store
                    .get(hash.as_slice())
                    .map_err(TrieError::Kv)?
                    .ok_or(TrieError::MissingNode(*hash))?;
                Ok(TrieNode::decode(&mut bytes.as_slice())?)
            }
        }
    }

    fn persist(&mut self, node: TrieNode) -> TrieResult<NodeRef> {
        let (node_ref, to_store) = NodeRef::from_node(node);
        if let Some((hash, bytes)) = to_store {
            self.store.put(hash.as_slice(), bytes).map_err(TrieError::Kv)?;
        }
        Ok(node_ref)
    }

    /// Fetches the value stored at `key`, if any.
    pub fn get(&self, key: &[u8]) -> TrieResult<Option<Bytes>> {
        let path = self.path_for(key);
        self.get_at(&self.root, &path)
    }

    fn get_at(&self, node_ref: &NodeRef, path: &Nibbles) -> TrieResult<Option<Bytes>> {
        match self.resolve(node_ref)? {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf { key, value } => Ok((key == *path).then_some(value)),
            TrieNode::Extension { prefix, child } => {
                if path.len() >= prefix.len() && &path[..prefix.len()] == &prefix[..] {
                    self.get_at(&child, &Nibbles::from_vec_unchecked(path[prefix.len()..].to_vec()))
                } else {
                    Ok(None)
                }
            }
            TrieNode::Branch { children, value } => {
                if path.is_empty() {
                    Ok(value)
                } else {
                    let nibble = path[0] as usize;
                    self.get_at(
                        &children[nibble],
                        &Nibbles::from_vec_unchecked(path[1..].to_vec()),
                    )
                }
            }
        }
    }

    /// Inserts `value` at `key`, overwriting any previous value.
    pub fn put(&mut self, key: &[u8], value: Bytes) -> TrieResult<()> {
        let path = self.path_for(key);
        let root = std::mem::replace(&mut self.root, NodeRef::Empty);
        self.root = self.put_at(root, path, value)?;
        Ok(())
    }

    fn put_at(&mut self, node_ref: NodeRef, path: Nibbles, value: Bytes) -> TrieResult<NodeRef> {
        let node = self.resolve(&node_ref)?;
        let new_node = match node {
            TrieNode::Empty => TrieNode::Leaf { key: path, value },
            TrieNode::Leaf { key, value: old_value } => {
                if key == path {
                    TrieNode::Leaf { key, value }
                } else {
                    self.split_leaf_or_extension(key, NodeRef::Empty, Some(old_value), path, value)?
                }
            }
            TrieNode::Extension { prefix, child } => {
                if path.len() >= prefix.len() && &path[..prefix.len()] == &prefix[..] {
                    let rest = Nibbles::from_vec_unchecked(path[prefix.len()..].to_vec());
                    let new_child = self.put_at(child, rest, value)?;
                    TrieNode::Extension { prefix, child: new_child }
                } else {
                    self.split_leaf_or_extension(prefix, child, None, path, value)?
                }
            }
            TrieNode::Branch { mut children, value: branch_value } => {
                if path.is_empty() {
                    TrieNode::Branch { children, value: Some(value) }
                } else {
                    let nibble = path[0] as usize;
                    let rest = Nibbles::from_vec_unchecked(path[1..].to_vec());
                    let existing = std::mem::replace(&mut children[nibble], NodeRef::Empty);
                    children[nibble] = self.put_at(existing, rest, value)?;
                    TrieNode::Branch { children, value: branch_value }
                }
            }
        };
        self.persist(new_node)
    }

    /// Splits a leaf (`old_key`/`old_value`) or extension (`old_key`/`old_child`) at the point it
    /// diverges from the incoming `new_key`/`new_value`, building the smallest branch (plus a
    /// covering extension, if a shared prefix remains) that covers both.
    fn split_leaf_or_extension(
        &mut self,
        old_key: Nibbles,
        old_child: NodeRef,
        old_leaf_value: Option<Bytes>,
        new_key: Nibbles,
        new_value: Bytes,
    ) -> TrieResult<TrieNode> {
        let common = common_prefix_len(&old_key, &new_key);
        let mut children: Box<[NodeRef; 16]> = Box::new(core::array::from_fn(|_| NodeRef::Empty));
        let mut branch_value = None;

        let old_rest = Nibbles::from_vec_unchecked(old_key[common..].to_vec());
        if old_rest.is_empty() {
            // Only reachable for a leaf: an extension's prefix fully consumed by `common` would
            // have been handled by the non-splitting recursion in `put_at`.
            branch_value = old_leaf_value;
        } else {
            let nibble = old_rest[0] as usize;
            let remainder = Nibbles::from_vec_unchecked(old_rest[1..].to_vec());
            children[nibble] = match old_leaf_value {
                Some(v) => self.persist(TrieNode::Leaf { key: remainder, value: v })?,
                None if remainder.is_empty() => old_child,
                None => self.persist(TrieNode::Extension { prefix: remainder, child: old_child })?,
            };
        }

        let new_rest = Nibbles::from_vec_unchecked(new_key[common..].to_vec());
        if new_rest.is_empty() {
            branch_value = Some(new_value);
        } else {
            let nibble = new_rest[0] as usize;
            let remainder = Nibbles::from_vec_unchecked(new_rest[1..].to_vec());
            children[nibble] = self.persist(TrieNode::Leaf { key: remainder, value: new_value })?;
        }

        let branch = TrieNode::Branch { children, value: branch_value };
        if common == 0 {
            Ok(branch)
        } else {
            let branch_ref = self.persist(branch)?;
            Ok(TrieNode::Extension {
                prefix: Nibbles::from_vec_unchecked(old_key[..common].to_vec()),
                child: branch_ref,
            })
        }
    }

    /// Removes `key`, if present. No-op if the key does not exist.
    pub fn delete(&mut self, key: &[u8]) -> TrieResult<()> {
        let path = self.path_for(key);
        let root = std::mem::replace(&mut self.root, NodeRef::Empty);
        self.root = self.delete_at(root, &path)?;
        Ok(())
    }

    fn delete_at(&mut self, node_ref: NodeRef, path: &Nibbles) -> TrieResult<NodeRef> {
        let node = self.resolve(&node_ref)?;
        match node {
            TrieNode::Empty => Ok(NodeRef::Empty),
            TrieNode::Leaf { key, value } => {
                if key == *path {
                    Ok(NodeRef::Empty)
                } else {
                    self.persist(TrieNode::Leaf { key, value })
                }
            }
            TrieNode::Extension { prefix, child } => {
                if path.len() >= prefix.len() && &path[..prefix.len()] == &prefix[..] {
                    let rest = Nibbles::from_vec_unchecked(path[prefix.len()..].to_vec());
                    let new_child = self.delete_at(child, &rest)?;
                    match new_child {
                        NodeRef::Empty => Ok(NodeRef::Empty),
                        other => self.merge_into_parent_prefix(prefix, other),
                    }
                } else {
                    self.persist(TrieNode::Extension { prefix, child })
                }
            }
            TrieNode::Branch { mut children, value } => {
                if path.is_empty() {
                    self.finish_branch(children, None)
                } else {
                    let nibble = path[0] as usize;
                    let rest = Nibbles::from_vec_unchecked(path[1..].to_vec());
                    let existing = std::mem::replace(&mut children[nibble], NodeRef::Empty);
                    children[nibble] = self.delete_at(existing, &rest)?;
                    self.finish_branch(children, value)
                }
            }
        }
    }

    /// Collapses a branch with one remaining child (and no value) into a merged
    /// extension/leaf, and a branch with no children but a value into a bare leaf — the trie
    /// must never hold a branch that a canonical encoder wouldn't produce.
    fn finish_branch(
        &mut self,
        children: Box<[NodeRef; 16]>,
        value: Option<Bytes>,
    ) -> TrieResult<NodeRef> {
        let non_empty: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, child)| !matches!(child, NodeRef::Empty))
            .map(|(i, _)| i)
            .collect();

        match (non_empty.len(), value) {
            (0, Some(value)) => {
                self.persist(TrieNode::Leaf { key: Nibbles::from_vec_unchecked(Vec::new()), value })
            }
            (0, None) => Ok(NodeRef::Empty),
            (1, None) => {
                let i = non_empty[0];
                let child_ref = children[i].clone();
                self.merge_into_parent_prefix(Nibbles::from_vec_unchecked(vec![i as u8]), child_ref)
            }
            (_, value) => self.persist(TrieNode::Branch { children, value }),
        }
    }

    /// Prepends `prefix` to whatever `child_ref` resolves to, merging consecutive
    /// extension/leaf path segments rather than stacking them.
    fn merge_into_parent_prefix(&mut self, prefix: Nibbles, child_ref: NodeRef) -> TrieResult<NodeRef> {
        match self.resolve(&child_ref)? {
            TrieNode::Empty => Ok(NodeRef::Empty),
            TrieNode::Leaf { key, value } => {
                let merged = Nibbles::from_vec_unchecked([prefix.to_vec(), key.to_vec()].concat());
                self.persist(TrieNode::Leaf { key: merged, value })
            }
            TrieNode::Extension { prefix: child_prefix, child } => {
                let merged =
                    Nibbles::from_vec_unchecked([prefix.to_vec(), child_prefix.to_vec()].concat());
                self.persist(TrieNode::Extension { prefix: merged, child })
            }
            TrieNode::Branch { .. } => self.persist(TrieNode::Extension { prefix, child: child_ref }),
        }
    }

    /// Returns the current root hash of the trie.
    ///
    /// Unlike a child reference, the root is always hashed regardless of its encoded size (per
    /// the Yellow Paper, `stateRoot = keccak256(rlp(root_node))`), and the hash is persisted so
    /// the trie can be reopened from it later via [`HexaryTrie::new`]/[`HexaryTrie::new_secure`].
    pub fn root_hash(&mut self) -> TrieResult<B256> {
        if let NodeRef::Hash(h) = &self.root {
            return Ok(*h);
        }

        let node = self.resolve(&self.root.clone())?;
        if matches!(node, TrieNode::Empty) {
            return Ok(EMPTY_TRIE_ROOT);
        }

        let mut buf = Vec::new();
        node.encode(&mut buf);
        let hash = keccak256(&buf);
        self.store.put(hash.as_slice(), buf).map_err(TrieError::Kv)?;
        self.root = NodeRef::Hash(hash);
        Ok(hash)
    }
}

fn common_prefix_len(a: &Nibbles, b: &Nibbles) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use execore_kv::MemoryKv;

    #[test]
    fn put_get_single_key() {
        let mut kv = MemoryKv::new();
        let mut trie = HexaryTrie::new(&mut kv, EMPTY_TRIE_ROOT);
        trie.put(b"key1", Bytes::from_static(b"value1")).unwrap();
        assert_eq!(trie.get(b"key1").unwrap(), Some(Bytes::from_static(b"value1")));
        assert_ne!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn put_get_many_keys_order_independent() {
        let mut kv_a = MemoryKv::new();
        let mut trie_a = HexaryTrie::new(&mut kv_a, EMPTY_TRIE_ROOT);
        trie_a.put(b"aaa", Bytes::from_static(b"1")).unwrap();
        trie_a.put(b"aab", Bytes::from_static(b"2")).unwrap();
        trie_a.put(b"b", Bytes::from_static(b"3")).unwrap();
        let root_a = trie_a.root_hash().unwrap();

        let mut kv_b = MemoryKv::new();
        let mut trie_b = HexaryTrie::new(&mut kv_b, EMPTY_TRIE_ROOT);
        trie_b.put(b"b", Bytes::from_static(b"3")).unwrap();
        trie_b.put(b"aab", Bytes::from_static(b"2")).unwrap();
        trie_b.put(b"aaa", Bytes::from_static(b"1")).unwrap();
        let root_b = trie_b.root_hash().unwrap();

        assert_eq!(root_a, root_b);
    }

    #[test]
    fn delete_removes_key() {
        let mut kv = MemoryKv::new();
        let mut trie = HexaryTrie::new(&mut kv, EMPTY_TRIE_ROOT);
        trie.put(b"a", Bytes::from_static(b"1")).unwrap();
        trie.put(b"b", Bytes::from_static(b"2")).unwrap();
        trie.delete(b"a").unwrap();
        assert_eq!(trie.get(b"a").unwrap(), None);
        assert_eq!(trie.get(b"b").unwrap(), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn secure_trie_hashes_keys() {
        let mut kv = MemoryKv::new();
        let mut trie = HexaryTrie::new_secure(&mut kv, EMPTY_TRIE_ROOT);
        trie.put(b"address", Bytes::from_static(b"account")).unwrap();
        assert_eq!(trie.get(b"address").unwrap(), Some(Bytes::from_static(b"account")));
    }

    #[test]
    fn empty_trie_root_matches_constant() {
        let mut kv = MemoryKv::new();
        let mut trie = HexaryTrie::new(&mut kv, EMPTY_TRIE_ROOT);
        assert_eq!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn delete_collapses_to_single_key_trie() {
        // Two keys sharing no prefix sit in a branch off the root; deleting one must collapse
        // the branch back down so the root matches a trie that only ever held the other key.
        let mut kv_a = MemoryKv::new();
        let mut trie_a = HexaryTrie::new(&mut kv_a, EMPTY_TRIE_ROOT);
        trie_a.put(b"a", Bytes::from_static(b"1")).unwrap();
        trie_a.put(b"b", Bytes::from_static(b"2")).unwrap();
        trie_a.delete(b"a").unwrap();
        let root_a = trie_a.root_hash().unwrap();

        let mut kv_b = MemoryKv::new();
        let mut trie_b = HexaryTrie::new(&mut kv_b, EMPTY_TRIE_ROOT);
        trie_b.put(b"b", Bytes::from_static(b"2")).unwrap();
        let root_b = trie_b.root_hash().unwrap();

        assert_eq!(root_a, root_b);
    }

    #[test]
    fn deleting_every_key_returns_to_empty_root() {
        let mut kv = MemoryKv::new();
        let mut trie = HexaryTrie::new(&mut kv, EMPTY_TRIE_ROOT);
        trie.put(b"aaa", Bytes::from_static(b"1")).unwrap();
        trie.put(b"aab", Bytes::from_static(b"2")).unwrap();
        trie.put(b"b", Bytes::from_static(b"3")).unwrap();
        trie.delete(b"aaa").unwrap();
        trie.delete(b"aab").unwrap();
        trie.delete(b"b").unwrap();
        assert_eq!(trie.root_hash().unwrap(), EMPTY_TRIE_ROOT);
    }
}
