//! Demo Transaction Generator
//!
//! Writes JSON-lines transactions for the scoring pipeline to train on and score.
//!
//! Usage: demo-generator [output] [count] [users] [seed]

use chrono::{Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Wire form accepted by the pipeline
#[derive(Debug, Serialize)]
struct DemoTransaction {
    user_id: String,
    amount: f64,
    timestamp: chrono::DateTime<Utc>,
    merchant: String,
    location: String,
}

struct TransactionGenerator {
    rng: ChaCha8Rng,
    users: usize,
}

impl TransactionGenerator {
    fn new(users: usize, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            users: users.max(1),
        }
    }

    /// 90% of amounts in [1,000, 1,000,000]; the rest split between
    /// [100, 1,000) and [5,000,000, 10,000,000].
    fn amount(&mut self) -> (f64, bool) {
        if self.rng.gen_bool(0.9) {
            (self.rng.gen_range(1_000.0..=1_000_000.0), false)
        } else if self.rng.gen_bool(0.5) {
            (self.rng.gen_range(100.0..1_000.0), true)
        } else {
            (self.rng.gen_range(5_000_000.0..=10_000_000.0), true)
        }
    }

    fn generate(&mut self, start: chrono::DateTime<Utc>, span_secs: i64) -> (DemoTransaction, bool) {
        let (amount, outlier) = self.amount();
        let transaction = DemoTransaction {
            user_id: format!("user_{:03}", self.rng.gen_range(0..self.users)),
            amount: (amount * 100.0).round() / 100.0,
            timestamp: start + Duration::seconds(self.rng.gen_range(0..span_secs)),
            merchant: self
                .random_choice(&["Grocery", "Electronics", "Fuel", "Travel", "Restaurant", "Online"])
                .to_string(),
            location: self
                .random_choice(&["Moscow", "Saint Petersburg", "Kazan", "Novosibirsk", "Online"])
                .to_string(),
        };
        (transaction, outlier)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("demo_generator=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("data/transactions.jsonl");
    let count: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let users: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(50);
    let seed: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(42);

    info!(output = %output, count = count, users = users, seed = seed, "Generating transactions");

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    // Thirty days ending now
    let span_secs = 30 * 24 * 3600;
    let start = Utc::now() - Duration::seconds(span_secs);

    let mut generator = TransactionGenerator::new(users, seed);
    let mut transactions: Vec<DemoTransaction> = Vec::with_capacity(count);
    let mut outliers = 0usize;
    for _ in 0..count {
        let (transaction, outlier) = generator.generate(start, span_secs);
        outliers += outlier as usize;
        transactions.push(transaction);
    }
    transactions.sort_by_key(|t| t.timestamp);

    let mut writer = BufWriter::new(std::fs::File::create(output)?);
    for transaction in &transactions {
        serde_json::to_writer(&mut writer, transaction)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} transactions ({} normal, {} injected outliers)",
        count,
        count - outliers,
        outliers
    );

    Ok(())
}
