//! Cross-representation behavior through the public object API
//!
//! The unit tests in each module check their own structure; these check
//! the promises that only show up when representations interact: trees
//! against flat arrays, splices against their sources, intervals against
//! materialized sequences, and the storage coalescing that equality
//! discovery performs.

use avail_core::descriptor::ReprKind;
use avail_core::object::AvailObject;
use avail_core::tuple::{
    concatenate, copy_tuple_from_to, empty_tuple, interval_tuple, string_from_str, tuple_at,
    tuple_at_put, tuple_from_objects, tuple_size,
};
use num_bigint::BigInt;

fn ints(values: impl IntoIterator<Item = i64>) -> AvailObject {
    tuple_from_objects(values.into_iter().map(AvailObject::from_i64).collect())
}

#[test]
fn test_interval_impersonates_byte_tuple() {
    // The same sequence through O(1) interval storage and a packed byte
    // array: equal, same hash, same reads. Construction would re-detect
    // the progression, so build the byte form with a broken tail and
    // repair it with tuple_at_put (which keeps the byte layout).
    let interval = interval_tuple(BigInt::from(5), BigInt::from(3), 40);
    assert_eq!(interval.repr_kind(), ReprKind::SmallIntegerIntervalTuple);
    let mut broken: Vec<AvailObject> =
        (0..40).map(|i| AvailObject::from_i64(5 + 3 * i)).collect();
    broken[39] = AvailObject::from_i64(0);
    let byte_form = tuple_from_objects(broken);
    assert_eq!(byte_form.repr_kind(), ReprKind::ByteTuple);
    let repaired = tuple_at_put(&byte_form, 40, &AvailObject::from_i64(5 + 3 * 39), false);
    assert_eq!(repaired.repr_kind(), ReprKind::ByteTuple);
    assert!(interval.equals(&repaired));
    assert_eq!(interval.hash(), repaired.hash());
    for index in [1usize, 2, 39, 40] {
        assert!(tuple_at(&interval, index).equals(&tuple_at(&repaired, index)));
    }
}

#[test]
fn test_tree_equals_flat_and_coalesces() {
    let left = ints(0..80);
    let right = ints(80..160);
    let tree = concatenate(&left, &right, false);
    assert_eq!(tree.repr_kind(), ReprKind::TreeTuple);
    let flat = ints(0..160);
    assert_eq!(tree.hash(), flat.hash());
    assert!(tree.equals(&flat));
    // Equality discovery rewrote the worse representation into an
    // indirection: both canonical forms are now the same cell.
    assert!(tree.traverse().same_identity(&flat.traverse()));
}

#[test]
fn test_splice_reads_through_to_source() {
    let base = ints((0..300).map(|i| (i * i) % 251));
    let slice = copy_tuple_from_to(&base, 30, 270, false);
    assert_eq!(slice.repr_kind(), ReprKind::SpliceTuple);
    assert_eq!(tuple_size(&slice), 241);
    for probe in [1usize, 100, 241] {
        assert!(tuple_at(&slice, probe).equals(&tuple_at(&base, probe + 29)));
    }
    // Slicing the splice re-slices the original zones.
    let inner = copy_tuple_from_to(&slice, 50, 200, false);
    assert!(tuple_at(&inner, 1).equals(&tuple_at(&base, 79)));
}

#[test]
fn test_concatenation_monoid_across_representations() {
    let byte_string = string_from_str("abcdef");
    let wide_string = string_from_str("snow☃man");
    let interval = interval_tuple(BigInt::from(1), BigInt::from(1), 30);
    let pieces = [byte_string, wide_string, interval];
    // ((a ∥ b) ∥ c) == (a ∥ (b ∥ c)) regardless of which layouts meet.
    let left = concatenate(
        &concatenate(&pieces[0], &pieces[1], false),
        &pieces[2],
        false,
    );
    let right = concatenate(
        &pieces[0],
        &concatenate(&pieces[1], &pieces[2], false),
        false,
    );
    assert!(left.equals(&right));
    assert_eq!(left.hash(), right.hash());
    assert_eq!(
        tuple_size(&left),
        pieces.iter().map(tuple_size).sum::<usize>()
    );
    // Identity element.
    assert!(concatenate(&empty_tuple(), &pieces[0], false).equals(&pieces[0]));
    assert!(concatenate(&pieces[0], &empty_tuple(), false).equals(&pieces[0]));
}

#[test]
fn test_slice_concatenation_round_trip_on_tree() {
    let tree = concatenate(&ints(0..90), &ints(90..180), false);
    let size = tuple_size(&tree);
    for split in [1usize, 45, 90, 135, 179] {
        let front = copy_tuple_from_to(&tree, 1, split, false);
        let back = copy_tuple_from_to(&tree, split + 1, size, false);
        assert!(concatenate(&front, &back, false).equals(&tree), "split {split}");
    }
}

#[test]
fn test_deep_structures_serialize_to_equal_objects() {
    use avail_core::map::{map_object, AvailMap};
    use avail_core::serialize::{deserialize_object, serialize_object};
    let tree = concatenate(&ints(0..70), &string_from_str("tail"), false);
    let map = map_object(
        AvailMap::new()
            .with(string_from_str("payload"), tree.clone())
            .with(AvailObject::from_i64(7), string_from_str("seven")),
    );
    let bytes = serialize_object(&map).unwrap();
    let restored = deserialize_object(&bytes).unwrap();
    assert!(restored.equals(&map));
    // The restored copy rebuilt its own layout; reads agree anyway.
    let payload = restored.as_map().unwrap().get(&string_from_str("payload")).unwrap();
    assert!(payload.equals(&tree));
    assert_eq!(payload.hash(), tree.hash());
}
