//! Shared fakes and fixtures for the import integration tests
//!
//! The fakes stand in for the external collaborators:
//!
//! - [`FakeGeocoder`]: resolves by longitude, optionally slow, fails at latitude 0
//! - [`FakeTaxRates`]: in-memory rate table with the usual fallback
//! - [`RecordingStore`]: remembers every batch and can fail on a chosen call

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use iwk_common::types::{Jurisdiction, Order, TaxBreakdown, TaxRate};
use iwk_import::config::ImportConfig;
use iwk_import::geocoder::Geocoder;
use iwk_import::store::OrderStore;
use iwk_import::tax_rates::TaxRateSource;
use iwk_import::ImportPipeline;

pub const HEADER: &str = "id,longitude,latitude,timestamp,subtotal";

/// Longitude of a delivery point in Brooklyn
pub const IN_REGION_LONGITUDE: f64 = -73.95;

/// Longitude of a delivery point in New Jersey
pub const OUT_OF_REGION_LONGITUDE: f64 = -74.80;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,iwk_import=info")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Geocoder
// ============================================================================

/// Everything west of -74.5 is New Jersey, everything else New York.
#[derive(Default)]
pub struct FakeGeocoder {
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn resolve_jurisdiction(&self, latitude: f64, longitude: f64) -> Result<Jurisdiction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if latitude == 0.0 {
            anyhow::bail!("ZERO_RESULTS");
        }

        if longitude < -74.5 {
            Ok(Jurisdiction::new("New Jersey", "Hudson", "Jersey City", ""))
        } else {
            Ok(Jurisdiction::new("New York", "Kings", "Brooklyn", ""))
        }
    }
}

// ============================================================================
// Tax rates
// ============================================================================

pub struct FakeTaxRates {
    rates: HashMap<String, TaxRate>,
}

impl FakeTaxRates {
    /// Kings County and the state fallback, no city rate
    pub fn new_york() -> Self {
        let mut rates = HashMap::new();
        rates.insert("Kings".to_string(), rate("0.08875", "0.04", "0.045", "0", "0.00375"));
        rates.insert("New York State".to_string(), rate("0.04", "0.04", "0", "0", "0"));
        Self { rates }
    }

    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }
}

#[async_trait]
impl TaxRateSource for FakeTaxRates {
    async fn find_rate(&self, jurisdiction_name: &str) -> Result<Option<TaxRate>> {
        Ok(self.rates.get(jurisdiction_name).cloned())
    }

    fn default_jurisdiction(&self) -> &str {
        "New York State"
    }
}

pub fn rate(composite: &str, state: &str, county: &str, city: &str, special: &str) -> TaxRate {
    let dec = |s: &str| BigDecimal::from_str(s).unwrap_or_default();
    TaxRate {
        composite: dec(composite),
        breakdown: TaxBreakdown {
            state_rate: dec(state),
            county_rate: dec(county),
            city_rate: dec(city),
            special_rate: dec(special),
        },
    }
}

// ============================================================================
// Order store
// ============================================================================

#[derive(Default)]
pub struct RecordingStore {
    batches: Mutex<Vec<Vec<Order>>>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl RecordingStore {
    /// Fails the `call`-th `create_batch` (1-based); later calls succeed
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .map(|b| b.iter().map(Vec::len).collect())
            .unwrap_or_default()
    }

    pub fn persisted(&self) -> Vec<Order> {
        self.batches
            .lock()
            .map(|b| b.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderStore for RecordingStore {
    async fn create_batch(&self, orders: &[Order]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            anyhow::bail!("could not serialize access due to concurrent update");
        }

        if let Ok(mut batches) = self.batches.lock() {
            batches.push(orders.to_vec());
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Pipeline settings that keep virtual time short
pub fn fast_config() -> ImportConfig {
    ImportConfig {
        rate_per_second: 1_000,
        ..ImportConfig::default()
    }
}

pub struct Harness {
    pub pipeline: ImportPipeline,
    pub geocoder: Arc<FakeGeocoder>,
    pub store: Arc<RecordingStore>,
}

pub fn harness(config: ImportConfig, geocoder: FakeGeocoder, store: RecordingStore) -> Harness {
    harness_with_rates(config, geocoder, FakeTaxRates::new_york(), store)
}

pub fn harness_with_rates(
    config: ImportConfig,
    geocoder: FakeGeocoder,
    rates: FakeTaxRates,
    store: RecordingStore,
) -> Harness {
    let geocoder = Arc::new(geocoder);
    let store = Arc::new(store);
    let pipeline = ImportPipeline::new(config, geocoder.clone(), Arc::new(rates), store.clone())
        .unwrap_or_else(|e| panic!("invalid test pipeline: {e:#}"));

    Harness {
        pipeline,
        geocoder,
        store,
    }
}

/// A well-formed row at the given longitude
pub fn row(id: usize, longitude: f64, subtotal: &str) -> String {
    format!("{id},{longitude},40.6782,2025-11-04 14:30:00,{subtotal}")
}

pub fn valid_row(id: usize) -> String {
    row(id, IN_REGION_LONGITUDE, "120.00")
}

/// CSV document with the header and the given data rows
pub fn csv(rows: &[String]) -> std::io::Cursor<Vec<u8>> {
    let mut doc = String::from(HEADER);
    doc.push('\n');
    for row in rows {
        doc.push_str(row);
        doc.push('\n');
    }
    std::io::Cursor::new(doc.into_bytes())
}

pub fn valid_rows(count: usize) -> std::io::Cursor<Vec<u8>> {
    let rows: Vec<String> = (0..count).map(valid_row).collect();
    csv(&rows)
}
