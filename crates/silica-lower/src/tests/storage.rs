use super::*;

#[test]
fn merge_storage_is_a_join() {
    use Storage::*;
    // Stack absorbs everything.
    for s in [Functional, LvalueRef, RvalueRef, Stack] {
        assert_eq!(merge_storage(Stack, s), Stack);
        assert_eq!(merge_storage(s, Stack), Stack);
    }
    // Functional only joins with itself.
    assert_eq!(merge_storage(Functional, Functional), Functional);
    assert_eq!(merge_storage(Functional, LvalueRef), Stack);
    assert_eq!(merge_storage(Functional, RvalueRef), Stack);
    // References widen r-value to l-value.
    assert_eq!(merge_storage(RvalueRef, RvalueRef), RvalueRef);
    assert_eq!(merge_storage(LvalueRef, RvalueRef), LvalueRef);
    assert_eq!(merge_storage(RvalueRef, LvalueRef), LvalueRef);
    assert_eq!(merge_storage(LvalueRef, LvalueRef), LvalueRef);
}

#[test]
fn merge_storage_commutes() {
    use Storage::*;
    let all = [Functional, LvalueRef, RvalueRef, Stack];
    for &x in &all {
        for &y in &all {
            assert_eq!(merge_storage(x, y), merge_storage(y, x));
        }
    }
}
