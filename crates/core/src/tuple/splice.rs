//! Splice tuples
//!
//! A splice presents runs ("zones") of other tuples as one tuple without
//! copying. Each zone records which subtuple it reads, where the run
//! starts inside that subtuple, and where the run ends in the whole.
//! Element lookup binary-searches the zone ends. Construction never nests
//! a splice inside a splice; slicing a splice re-slices its zones.

use super::{element_at, Element, TupleRepr};
use crate::object::{AvailObject, Repr};

#[derive(Clone)]
pub struct Zone {
    pub subtuple: AvailObject,
    /// 1-based index of the run's first element inside `subtuple`.
    pub start_in_sub: usize,
    /// 1-based index of the run's last element in the whole splice.
    pub end_in_whole: usize,
}

#[derive(Clone)]
pub struct SpliceTuple {
    /// Zones in order; `end_in_whole` strictly increases.
    pub zones: Vec<Zone>,
}

impl SpliceTuple {
    /// A splice over one run of `subtuple`. The subtuple must not itself
    /// be a splice; callers unwrap first.
    pub fn single_zone(subtuple: AvailObject, start_in_sub: usize, len: usize) -> SpliceTuple {
        debug_assert!(len > 0);
        debug_assert!(!matches!(
            &*subtuple.traverse().read_repr(),
            Repr::Tuple(TupleRepr::Splice(_))
        ));
        SpliceTuple {
            zones: vec![Zone {
                subtuple,
                start_in_sub,
                end_in_whole: len,
            }],
        }
    }

    pub fn size(&self) -> usize {
        self.zones.last().map(|z| z.end_in_whole).unwrap_or(0)
    }

    /// 1-based lookup: find the zone whose end covers `index`, then read
    /// through to its subtuple.
    pub fn element_at(&self, index: usize) -> Element {
        let zone_index = self
            .zones
            .partition_point(|zone| zone.end_in_whole < index);
        let zone = &self.zones[zone_index];
        let zone_start_in_whole = if zone_index == 0 {
            1
        } else {
            self.zones[zone_index - 1].end_in_whole + 1
        };
        let offset = index - zone_start_in_whole;
        let repr = match zone.subtuple.traverse().repr_snapshot() {
            Repr::Tuple(t) => t,
            _ => panic!("splice zone subtuple is not a tuple"),
        };
        element_at(&repr, zone.start_in_sub + offset)
    }

    /// Re-slice to the 1-based inclusive range `start..=end`, keeping only
    /// the overlapping zones with adjusted runs.
    pub fn subrange(&self, start: usize, end: usize) -> SpliceTuple {
        debug_assert!(start >= 1 && end >= start && end <= self.size());
        let mut zones = Vec::new();
        let mut produced = 0usize;
        let mut zone_start_in_whole = 1usize;
        for zone in &self.zones {
            let zone_end = zone.end_in_whole;
            if zone_end < start {
                zone_start_in_whole = zone_end + 1;
                continue;
            }
            if zone_start_in_whole > end {
                break;
            }
            let take_from = start.max(zone_start_in_whole);
            let take_to = end.min(zone_end);
            let len = take_to - take_from + 1;
            produced += len;
            zones.push(Zone {
                subtuple: zone.subtuple.clone(),
                start_in_sub: zone.start_in_sub + (take_from - zone_start_in_whole),
                end_in_whole: produced,
            });
            zone_start_in_whole = zone_end + 1;
        }
        SpliceTuple { zones }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{copy_tuple_from_to, tuple_at, tuple_from_objects, tuple_size};

    fn bytes(count: i64) -> AvailObject {
        tuple_from_objects(
            (0..count)
                .map(|v| AvailObject::from_i64((v * 7) % 256))
                .collect(),
        )
    }

    #[test]
    fn test_slice_of_slice_does_not_nest() {
        let base = bytes(300);
        let first = copy_tuple_from_to(&base, 20, 280, false);
        let second = copy_tuple_from_to(&first, 10, 200, false);
        if let Repr::Tuple(TupleRepr::Splice(s)) = &*second.traverse().read_repr() {
            for zone in &s.zones {
                assert!(!matches!(
                    &*zone.subtuple.traverse().read_repr(),
                    Repr::Tuple(TupleRepr::Splice(_))
                ));
            }
        } else {
            panic!("expected a splice");
        }
        // Reads agree with the base tuple.
        assert_eq!(tuple_size(&second), 191);
        for probe in [1usize, 50, 191] {
            let direct = tuple_at(&base, 19 + 9 + probe);
            assert!(tuple_at(&second, probe).equals(&direct));
        }
    }

    #[test]
    fn test_zone_boundaries() {
        let base = bytes(300);
        let splice = copy_tuple_from_to(&base, 2, 299, false);
        assert_eq!(tuple_size(&splice), 298);
        assert!(tuple_at(&splice, 1).equals(&tuple_at(&base, 2)));
        assert!(tuple_at(&splice, 298).equals(&tuple_at(&base, 299)));
    }
}
