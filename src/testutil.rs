//! Synthetic transaction batches shared by tests

use crate::types::transaction::Transaction;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const USERS: usize = 20;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// `n` transactions over [`USERS`] users, each user's transactions three
/// hours apart. 90% of amounts fall in [1,000, 1,000,000]; a seeded random 10%
/// of rows are outliers, alternating between [100, 1,000) and
/// [5,000,000, 10,000,000].
///
/// Returns the batch and, per transaction, whether it was injected as an outlier.
pub fn synthetic_batch(n: usize, seed: u64) -> (Vec<Transaction>, Vec<bool>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Outlier rows picked at random so they land on many users; 0 for small, 1 for high
    let mut kind: Vec<Option<usize>> = vec![None; n];
    for (k, i) in sample(&mut rng, n, n / 10).into_iter().enumerate() {
        kind[i] = Some(k % 2);
    }

    let mut batch = Vec::with_capacity(n);
    let mut injected = Vec::with_capacity(n);

    for (i, outlier) in kind.into_iter().enumerate() {
        let user = i % USERS;
        let round = (i / USERS) as i64;
        // Stay inside daytime hours so no off-hours rule fires
        let ts = base_time() + Duration::days(round / 3) + Duration::hours((round % 3) * 3);

        let amount = match outlier {
            None => rng.gen_range(1_000.0..=1_000_000.0),
            Some(0) => rng.gen_range(100.0..1_000.0),
            Some(_) => rng.gen_range(5_000_000.0..=10_000_000.0),
        };

        batch.push(Transaction::at(format!("user_{user:03}"), amount, ts).unwrap());
        injected.push(outlier.is_some());
    }

    (batch, injected)
}
