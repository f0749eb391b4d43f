//! Shared benchmark catalog
//!
//! In-process resource list backing the fanout hub, plus the synthetic
//! entry generator used by the generation loop and burst requests.

use crate::types::{CatalogEntry, CatalogPage};
use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

const MANUFACTURERS: [&str; 2] = ["Intel", "AMD"];
const INTEL_SERIES: [&str; 4] = ["Core i3", "Core i5", "Core i7", "Core i9"];
const AMD_SERIES: [&str; 4] = ["Ryzen 3", "Ryzen 5", "Ryzen 7", "Ryzen 9"];
const GENERATIONS: [&str; 4] = ["11th", "12th", "13th", "14th"];

/// In-process catalog of benchmark entries
///
/// Append-only during normal operation. Owned by the fanout hub and
/// accessed only through it.
pub struct Catalog {
    entries: RwLock<Vec<CatalogEntry>>,
    next_id: AtomicU64,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append an entry, assigning its id
    pub async fn append(&self, mut entry: CatalogEntry) -> CatalogEntry {
        entry.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        entry
    }

    /// Slice entries in insertion order
    ///
    /// Oversized bounds clip to the catalog; they never error or wrap.
    pub async fn page(&self, start: usize, limit: usize) -> CatalogPage {
        let entries = self.entries.read().await;
        let total = entries.len();
        let end = start.saturating_add(limit).min(total);
        let data = if start < total {
            entries[start..end].to_vec()
        } else {
            Vec::new()
        };

        CatalogPage {
            data,
            total,
            has_more: end < total,
        }
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the catalog holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Populate the catalog with synthetic entries, without broadcasting
    pub async fn seed(&self, count: usize) {
        tracing::info!(count, "Seeding catalog");
        for _ in 0..count {
            self.append(generate_entry()).await;
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Manufacture one synthetic catalog entry
///
/// The id is assigned later by [`Catalog::append`].
pub fn generate_entry() -> CatalogEntry {
    let mut rng = rand::thread_rng();

    let manufacturer = MANUFACTURERS[rng.gen_range(0..MANUFACTURERS.len())];
    let series = if manufacturer == "Intel" {
        INTEL_SERIES[rng.gen_range(0..INTEL_SERIES.len())]
    } else {
        AMD_SERIES[rng.gen_range(0..AMD_SERIES.len())]
    };
    let generation = GENERATIONS[rng.gen_range(0..GENERATIONS.len())];
    let model_number: u32 = rng.gen_range(100..1000);

    CatalogEntry {
        id: 0,
        cpu_model: format!(
            "{} {}-{} {}",
            manufacturer, series, generation, model_number
        ),
        score: rng.gen_range(50..100) * 100,
        nr_cores: rng.gen_range(4..20),
        clock_speed: rng.gen_range(20..40) as f64 / 10.0,
        manufacturing_date: (Utc::now() - chrono::Duration::days(rng.gen_range(0..3 * 365)))
            .date_naive(),
        price_usd: rng.gen_range(100..600) as f64,
    }
}
