mod id;

use std::sync::Arc;

use dashmap::DashMap;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub use id::*;

/// A shared map of values behind reference counting.
pub type ArcedStore<K, V> = Arc<DashMap<K, Arc<V>>>;

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}
