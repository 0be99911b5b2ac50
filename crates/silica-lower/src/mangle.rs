//! Deterministic symbol naming.
//!
//! A global's mangled name is derived from its logical source location.
//! Numbers are encoded in base 31: the digits `0-9A-U` terminate a number
//! and `V-Z`, `a-z` are continuation digits, so names parse unambiguously
//! without separators.
//!
//! The name body is a depth-first serialisation of a small tree over the
//! logical path: interior nodes emit `2n+3` for `n` children, leaves emit
//! `2len` followed by the segment bytes, and a subtree structurally equal
//! to one already emitted is replaced by the escape `1` followed by the
//! earlier subtree's post-order index. Leaf headers are even and interior
//! headers are odd and at least `3`, so the escape digit is reachable by
//! neither — an interior with zero children (a root logical path) stays
//! distinguishable from a back-reference. Decoding reverses all of this.

use rustc_hash::FxHashMap;
use silica_common::{LogicalPath, PathInterner};

const LOW_DIGITS: &[u8; 31] = b"0123456789ABCDEFGHIJKLMNOPQRSTU";
const HIGH_DIGITS: &[u8; 31] = b"VWXYZabcdefghijklmnopqrstuvwxyz";

/// Append `n` in base 31 to `out`.
pub fn encode_number(out: &mut String, n: u64) {
    if n == 0 {
        out.push('0');
        return;
    }
    let mut digits = [0u8; 16];
    let mut len = 0;
    let mut m = n;
    while m > 0 {
        digits[len] = (m % 31) as u8;
        m /= 31;
        len += 1;
    }
    for i in (1..len).rev() {
        out.push(HIGH_DIGITS[digits[i] as usize] as char);
    }
    out.push(LOW_DIGITS[digits[0] as usize] as char);
}

/// Decode one base-31 number starting at `pos`. Returns the value and the
/// position after its terminating digit.
pub fn decode_number(bytes: &[u8], mut pos: usize) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    loop {
        let byte = *bytes.get(pos)?;
        pos += 1;
        if let Some(digit) = HIGH_DIGITS.iter().position(|&d| d == byte) {
            value = value.checked_mul(31)?.checked_add(digit as u64)?;
        } else if let Some(digit) = LOW_DIGITS.iter().position(|&d| d == byte) {
            value = value.checked_mul(31)?.checked_add(digit as u64)?;
            return Some((value, pos));
        } else {
            return None;
        }
    }
}

/// One node of the name tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum NameNode {
    Leaf(String),
    Interior(Vec<NameNode>),
}

/// Builds mangled names with intra-name structural sharing.
pub struct SymbolNameBuilder {
    roots: Vec<NameNode>,
}

impl SymbolNameBuilder {
    pub fn new() -> Self {
        SymbolNameBuilder { roots: Vec::new() }
    }

    /// Append one literal segment.
    pub fn emit_segment(&mut self, name: &str) {
        self.roots.push(NameNode::Leaf(name.to_string()));
    }

    /// Append a logical path as an interior node of its segments.
    pub fn emit_path(&mut self, paths: &PathInterner, path: LogicalPath) {
        let segments = paths
            .segments(path)
            .into_iter()
            .map(|s| NameNode::Leaf(s.to_string()))
            .collect();
        self.roots.push(NameNode::Interior(segments));
    }

    /// Serialise to the final `_Y`-prefixed name.
    pub fn name(self) -> String {
        let root = NameNode::Interior(self.roots);
        let mut out = String::from("_Y");
        let mut seen: FxHashMap<NameNode, u64> = FxHashMap::default();
        let mut counter = 0u64;
        serialize(&root, &mut out, &mut seen, &mut counter);
        out
    }
}

impl Default for SymbolNameBuilder {
    fn default() -> Self {
        SymbolNameBuilder::new()
    }
}

fn serialize(
    node: &NameNode,
    out: &mut String,
    seen: &mut FxHashMap<NameNode, u64>,
    counter: &mut u64,
) {
    if let Some(&index) = seen.get(node) {
        // Escape: leaves encode even headers, interiors odd headers >= 3.
        encode_number(out, 1);
        encode_number(out, index);
        return;
    }
    match node {
        NameNode::Leaf(name) => {
            encode_number(out, name.len() as u64 * 2);
            out.push_str(name);
        }
        NameNode::Interior(children) => {
            encode_number(out, children.len() as u64 * 2 + 3);
            for child in children {
                serialize(child, out, seen, counter);
            }
        }
    }
    // Post-order indexing, matching the decoder.
    seen.insert(node.clone(), *counter);
    *counter += 1;
}

fn deserialize(bytes: &[u8], pos: usize, seen: &mut Vec<NameNode>) -> Option<(NameNode, usize)> {
    let (header, mut pos) = decode_number(bytes, pos)?;
    if header == 1 {
        let (index, pos) = decode_number(bytes, pos)?;
        return Some((seen.get(index as usize)?.clone(), pos));
    }
    let node = if header % 2 == 1 {
        // The escape header 1 was consumed above; odd means >= 3 here.
        let n_children = (header - 3) / 2;
        let mut children = Vec::with_capacity(n_children as usize);
        for _ in 0..n_children {
            let (child, next) = deserialize(bytes, pos, seen)?;
            children.push(child);
            pos = next;
        }
        NameNode::Interior(children)
    } else {
        let len = (header / 2) as usize;
        let text = bytes.get(pos..pos + len)?;
        pos += len;
        NameNode::Leaf(String::from_utf8(text.to_vec()).ok()?)
    };
    seen.push(node.clone());
    Some((node, pos))
}

/// Recover the logical path segments from a mangled name.
///
/// Accepts names of the shape produced by `SymbolNameBuilder` with a
/// single emitted path; trailing bytes (a local-linkage counter suffix)
/// are tolerated and returned alongside.
pub fn decode_name(name: &str) -> Option<(Vec<String>, &str)> {
    let rest = name.strip_prefix("_Y")?;
    let bytes = rest.as_bytes();
    let mut seen = Vec::new();
    let (root, pos) = deserialize(bytes, 0, &mut seen)?;
    let NameNode::Interior(roots) = root else {
        return None;
    };
    let first = roots.into_iter().next()?;
    let NameNode::Interior(segments) = first else {
        return None;
    };
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            NameNode::Leaf(text) => out.push(text),
            NameNode::Interior(_) => return None,
        }
    }
    Some((out, &rest[pos..]))
}

/// Per-module set of assigned symbol names with a unique-suffix counter
/// for local-linkage symbols.
pub struct SymbolNameSet {
    unique: FxHashMap<String, u64>,
}

impl SymbolNameSet {
    pub fn new() -> Self {
        SymbolNameSet {
            unique: FxHashMap::default(),
        }
    }

    /// `base` with a per-base counter suffix appended.
    pub fn unique_name(&mut self, base: &str) -> String {
        let counter = self.unique.entry(base.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        let mut name = base.to_string();
        encode_number(&mut name, index);
        name
    }

    /// The mangled name for a global at `path` with the given linkage
    /// behaviour: local symbols are suffixed with a unique counter.
    pub fn path_name(&mut self, paths: &PathInterner, path: LogicalPath, local: bool) -> String {
        let mut builder = SymbolNameBuilder::new();
        builder.emit_path(paths, path);
        let name = builder.name();
        if local {
            self.unique_name(&name)
        } else {
            name
        }
    }
}

impl Default for SymbolNameSet {
    fn default() -> Self {
        SymbolNameSet::new()
    }
}

#[cfg(test)]
#[path = "tests/mangle.rs"]
mod tests;
