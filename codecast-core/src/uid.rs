use std::sync::atomic::{AtomicU32, Ordering};

use rand::{thread_rng, Rng};

/// The exclusive upper bound of the provider-scoped uid space.
pub const UID_RANGE_END: u32 = 100_000;

/// A source of provider-scoped participant uids.
///
/// Injectable so call sites never reach for ambient randomness and tests can
/// supply deterministic values. Implementations must return values in
/// `1..UID_RANGE_END`; zero is reserved as "undefined" by the provider.
pub trait UidGenerator: Send + Sync {
    fn next_uid(&self) -> u32;
}

/// The production generator. Uids are drawn independently per call, so a
/// credential refresh for the same channel gets a fresh identity.
pub struct RandomUidGenerator;

impl UidGenerator for RandomUidGenerator {
    fn next_uid(&self) -> u32 {
        thread_rng().gen_range(1..UID_RANGE_END)
    }
}

/// A deterministic generator, mainly useful in tests.
#[derive(Default)]
pub struct SequenceUidGenerator {
    counter: AtomicU32,
}

impl UidGenerator for SequenceUidGenerator {
    fn next_uid(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) % (UID_RANGE_END - 1) + 1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_uids_stay_in_range() {
        let generator = RandomUidGenerator;

        for _ in 0..1000 {
            let uid = generator.next_uid();
            assert!(uid >= 1 && uid < UID_RANGE_END);
        }
    }

    #[test]
    fn test_sequence_uids_are_deterministic() {
        let generator = SequenceUidGenerator::default();

        assert_eq!(generator.next_uid(), 1);
        assert_eq!(generator.next_uid(), 2);
        assert_eq!(generator.next_uid(), 3);
    }
}
