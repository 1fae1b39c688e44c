//! Property-based tests for queue components
//!
//! These tests use proptest to verify properties that should hold for all inputs

use crate::queue::{
    sequence::{Sequence, CLOSED_SEQUENCE},
    slots::SlotArray,
    ClosureProcessor, QueueBuilder, SleepingWaitStrategy, INITIAL_SEQUENCE_VALUE,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

/// Property tests for Sequence
mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn sequence_get_set_consistency(value in any::<i64>()) {
            let seq = Sequence::new(0);
            seq.set(value);
            prop_assert_eq!(seq.get(), value);
        }

        #[test]
        fn sequence_compare_and_set_success(initial in any::<i64>(), new_value in any::<i64>()) {
            let seq = Sequence::new(initial);
            prop_assert!(seq.compare_and_set(initial, new_value));
            prop_assert_eq!(seq.get(), new_value);
        }

        #[test]
        fn sequence_compare_and_set_failure(initial in any::<i64>(), wrong_expected in any::<i64>(), new_value in any::<i64>()) {
            prop_assume!(wrong_expected != initial);
            let seq = Sequence::new(initial);
            prop_assert!(!seq.compare_and_set(wrong_expected, new_value));
            prop_assert_eq!(seq.get(), initial);
        }

        #[test]
        fn closed_sequence_rejects_every_reservation(initial in -1i64..1_000_000, expected in -1i64..1_000_000) {
            let seq = Sequence::new(initial);
            prop_assert_eq!(seq.close(), Some(initial));
            prop_assert!(!seq.compare_and_set(expected, expected + 1));
            prop_assert_eq!(seq.get(), CLOSED_SEQUENCE);
            prop_assert_eq!(seq.close(), None);
        }
    }
}

/// Property tests for the reservation arithmetic
mod reservation_properties {
    use super::*;

    proptest! {
        #[test]
        fn slot_index_wraps_with_capacity(power in 0u32..8, sequences in prop::collection::vec(0i64..10_000, 1..50)) {
            let capacity = 1usize << power;
            let slots = SlotArray::new(capacity);
            for seq in sequences {
                unsafe { slots.publish(seq, seq) };
                prop_assert!(slots.is_published(seq + capacity as i64));
                prop_assert_eq!(unsafe { slots.take(seq) }, seq);
            }
        }

        #[test]
        fn try_put_respects_capacity(power in 0u32..7, attempts in 0usize..200) {
            let capacity = 1usize << power;
            let queue = QueueBuilder::<usize>::new()
                .capacity(capacity)
                .wait_strategy(SleepingWaitStrategy::default())
                .processor(ClosureProcessor::new(|_value: &usize| Ok(())))
                .build()
                .unwrap();

            let mut accepted = 0;
            for value in 0..attempts {
                let fits = value < capacity;
                prop_assert_eq!(queue.try_put(value), fits);
                if fits {
                    accepted += 1;
                }
            }

            prop_assert_eq!(queue.producer_sequence(), INITIAL_SEQUENCE_VALUE + accepted as i64);
            prop_assert_eq!(queue.remaining_capacity(), (capacity - accepted) as i64);
            prop_assert!(queue.producer_sequence() - queue.consumer_sequence() <= capacity as i64);
        }

        #[test]
        fn drain_preserves_reservation_order(values in prop::collection::vec(any::<u16>(), 0..64)) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            let queue = QueueBuilder::<u16>::new()
                .capacity(64)
                .wait_strategy(SleepingWaitStrategy::default())
                .processor(ClosureProcessor::new(move |value: &u16| {
                    sink.lock().push(*value);
                    Ok(())
                }))
                .build()
                .unwrap();

            for value in &values {
                queue.put(*value);
            }
            queue.stop().unwrap();

            prop_assert_eq!(&*seen.lock(), &values);
        }
    }
}
