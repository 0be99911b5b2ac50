use super::*;
use silica_common::{LogicalPath, PathInterner};

#[test]
fn number_encoding_round_trips() {
    for n in [0u64, 1, 5, 30, 31, 32, 61, 62, 961, 1_000_000] {
        let mut s = String::new();
        encode_number(&mut s, n);
        let (decoded, pos) = decode_number(s.as_bytes(), 0).unwrap();
        assert_eq!(decoded, n, "value {n} encoded as {s}");
        assert_eq!(pos, s.len());
    }
}

#[test]
fn number_terminator_digits_are_unambiguous() {
    // A multi-digit number never ends in a continuation digit, so two
    // encoded numbers concatenate without separators.
    let mut s = String::new();
    encode_number(&mut s, 31);
    encode_number(&mut s, 0);
    let (first, pos) = decode_number(s.as_bytes(), 0).unwrap();
    let (second, end) = decode_number(s.as_bytes(), pos).unwrap();
    assert_eq!(first, 31);
    assert_eq!(second, 0);
    assert_eq!(end, s.len());
}

#[test]
fn path_names_round_trip() {
    let mut paths = PathInterner::new();
    let a = paths.named_child(LogicalPath::ROOT, "core");
    let b = paths.named_child(a, "list");
    let c = paths.named_child(b, "push");

    let mut builder = SymbolNameBuilder::new();
    builder.emit_path(&paths, c);
    let name = builder.name();
    assert!(name.starts_with("_Y"));

    let (segments, rest) = decode_name(&name).unwrap();
    assert_eq!(segments, vec!["core", "list", "push"]);
    assert!(rest.is_empty());
}

#[test]
fn root_logical_path_round_trips() {
    // The root path has no segments; its empty interior node must stay
    // distinguishable from a back-reference on decode.
    let paths = PathInterner::new();
    let mut builder = SymbolNameBuilder::new();
    builder.emit_path(&paths, LogicalPath::ROOT);
    let name = builder.name();
    let (segments, rest) = decode_name(&name).unwrap();
    assert!(segments.is_empty());
    assert!(rest.is_empty());
}

#[test]
fn empty_interior_does_not_desynchronize_later_nodes() {
    // An implementation-global name interleaves segments and paths; a
    // synthetic (root) parameter path in the middle must not corrupt what
    // follows.
    let mut paths = PathInterner::new();
    let after = paths.named_child(LogicalPath::ROOT, "after");
    let mut builder = SymbolNameBuilder::new();
    builder.emit_path(&paths, LogicalPath::ROOT);
    builder.emit_path(&paths, after);
    let name = builder.name();
    // The whole name parses: the first (empty) path decodes and the
    // trailing bytes belong to well-formed nodes, not a misread escape.
    let (segments, rest) = decode_name(&name).unwrap();
    assert!(segments.is_empty());
    assert!(rest.is_empty());
}

#[test]
fn equal_paths_produce_equal_names() {
    let mut paths = PathInterner::new();
    let a = paths.named_child(LogicalPath::ROOT, "m");
    let f = paths.named_child(a, "f");

    let mut b1 = SymbolNameBuilder::new();
    b1.emit_path(&paths, f);
    let mut b2 = SymbolNameBuilder::new();
    b2.emit_path(&paths, f);
    assert_eq!(b1.name(), b2.name());
}

#[test]
fn repeated_subtrees_emit_back_references() {
    let mut paths = PathInterner::new();
    let a = paths.named_child(LogicalPath::ROOT, "dup");
    let mut builder = SymbolNameBuilder::new();
    builder.emit_path(&paths, a);
    builder.emit_path(&paths, a);
    let name = builder.name();

    // The second occurrence is shorter than a literal re-emission: it is
    // the escape digit plus an index.
    let mut single = SymbolNameBuilder::new();
    single.emit_path(&paths, a);
    let single_name = single.name();
    assert!(name.len() < 2 * single_name.len());

    // And it still decodes to the same first path.
    let (segments, _rest) = decode_name(&name).unwrap();
    assert_eq!(segments, vec!["dup"]);
}

#[test]
fn local_symbols_get_unique_suffixes() {
    let mut paths = PathInterner::new();
    let a = paths.named_child(LogicalPath::ROOT, "local");
    let mut names = SymbolNameSet::new();
    let n1 = names.path_name(&paths, a, true);
    let n2 = names.path_name(&paths, a, true);
    let n3 = names.path_name(&paths, a, false);
    assert_ne!(n1, n2);
    assert_ne!(n1, n3);
    assert!(n1.starts_with(&n3));

    // Unique suffixes stay parseable: the path decodes and the suffix is
    // a bare number.
    let (segments, rest) = decode_name(&n2).unwrap();
    assert_eq!(segments, vec!["local"]);
    let (suffix, end) = decode_number(rest.as_bytes(), 0).unwrap();
    assert_eq!(suffix, 1);
    assert_eq!(end, rest.len());
}

#[test]
fn ctor_names_are_distinct() {
    let mut names = SymbolNameSet::new();
    let c1 = names.unique_name("_Y_ctor");
    let c2 = names.unique_name("_Y_ctor");
    let d1 = names.unique_name("_Y_dtor");
    assert_ne!(c1, c2);
    assert_ne!(c1, d1);
}
