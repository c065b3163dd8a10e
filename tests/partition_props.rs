//! Property-based tests for area partitioning.
//!
//! - Partitioning until empty tiles the area exactly
//! - Identical request sequences yield identical segments
//! - The empty sentinel is sticky

use proptest::prelude::*;

use fractile::{Area, AreaPartitioner, Canvas, Segment};

/// Area with a fragment size that fits inside it.
fn area_strategy() -> impl Strategy<Value = (Area, usize, usize)> {
    (1usize..64, 1usize..64).prop_flat_map(|(width, height)| {
        (Just(Area::new(width, height)), 1..=width, 1..=height)
    })
}

/// Fragment-count requests, zero included.
fn requests_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..12, 1..16)
}

/// Partition until empty, cycling through `requests`.
fn drain(partitioner: &mut AreaPartitioner, requests: &[usize]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for &count in requests.iter().cycle() {
        let segment = partitioner.partition(count);
        if segment.is_empty() {
            break;
        }
        segments.push(segment);
    }
    segments
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_partition_tiles_area(
        (area, fw, fh) in area_strategy(),
        requests in requests_strategy(),
    ) {
        let mut partitioner = AreaPartitioner::new(area, fw, fh).unwrap();
        let mut canvas = Canvas::new(area);

        for segment in drain(&mut partitioner, &requests) {
            prop_assert!(area.contains(&segment));
            prop_assert!(segment.height <= fh);
            canvas.blit(&segment, &vec![0.0; segment.pixels()]);
        }

        prop_assert_eq!(canvas.gaps(), 0);
        prop_assert_eq!(canvas.overlaps(), 0);
    }

    #[test]
    fn prop_partition_is_deterministic(
        (area, fw, fh) in area_strategy(),
        requests in requests_strategy(),
    ) {
        let mut a = AreaPartitioner::new(area, fw, fh).unwrap();
        let mut b = AreaPartitioner::new(area, fw, fh).unwrap();
        let first = drain(&mut a, &requests);
        prop_assert_eq!(&first, &drain(&mut b, &requests));

        a.reset();
        prop_assert_eq!(&first, &drain(&mut a, &requests));
    }

    #[test]
    fn prop_sentinel_is_sticky(
        (area, fw, fh) in area_strategy(),
        count in 0usize..8,
        extra in 1usize..10,
    ) {
        let mut partitioner = AreaPartitioner::new(area, fw, fh).unwrap();
        drain(&mut partitioner, &[count]);

        prop_assert!(partitioner.is_exhausted());
        for _ in 0..extra {
            prop_assert!(partitioner.partition(count + 1).is_empty());
        }
    }

    #[test]
    fn prop_widths_are_whole_fragments_except_at_edge(
        (area, fw, fh) in area_strategy(),
        requests in requests_strategy(),
    ) {
        let mut partitioner = AreaPartitioner::new(area, fw, fh).unwrap();
        for segment in drain(&mut partitioner, &requests) {
            if segment.right() < area.width {
                prop_assert_eq!(segment.width % fw, 0);
            }
        }
    }
}
