//! Tax rate lookup by jurisdiction name

use anyhow::{Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use iwk_common::types::{Jurisdiction, TaxBreakdown, TaxRate};
use sqlx::{PgPool, Row};
use tracing::debug;

/// Source of composite tax rates keyed by jurisdiction name
#[async_trait]
pub trait TaxRateSource: Send + Sync {
    /// Rate stored for exactly this jurisdiction name, if any
    async fn find_rate(&self, jurisdiction_name: &str) -> Result<Option<TaxRate>>;

    /// Jurisdiction whose rate applies when neither city nor county has one
    fn default_jurisdiction(&self) -> &str;

    /// Resolve the rate for a delivery point.
    ///
    /// Tries the city, then the county, then [`default_jurisdiction`]. Empty
    /// names are skipped. A miss or error on city or county falls through to
    /// the next candidate; only the default's miss or error is returned.
    ///
    /// [`default_jurisdiction`]: TaxRateSource::default_jurisdiction
    async fn lookup_rate(&self, jurisdiction: &Jurisdiction) -> Result<TaxRate> {
        for name in [jurisdiction.city.as_str(), jurisdiction.county.as_str()] {
            if name.is_empty() {
                continue;
            }
            match self.find_rate(name).await {
                Ok(Some(rate)) => return Ok(rate),
                Ok(None) => debug!(jurisdiction = name, "No tax rate, falling back"),
                Err(e) => debug!(jurisdiction = name, error = %e, "Tax rate lookup failed, falling back"),
            }
        }

        let fallback = self.default_jurisdiction();
        self.find_rate(fallback)
            .await?
            .with_context(|| format!("No tax rate configured for '{fallback}'"))
    }
}

/// Tax rates read from the `tax_rates` table
#[derive(Debug, Clone)]
pub struct PgTaxRates {
    pool: PgPool,
    default_jurisdiction: String,
}

impl PgTaxRates {
    pub fn new(pool: PgPool, default_jurisdiction: impl Into<String>) -> Self {
        Self {
            pool,
            default_jurisdiction: default_jurisdiction.into(),
        }
    }
}

#[async_trait]
impl TaxRateSource for PgTaxRates {
    async fn find_rate(&self, jurisdiction_name: &str) -> Result<Option<TaxRate>> {
        let row = sqlx::query(
            r#"
            SELECT composite_rate, state_rate, county_rate, city_rate, special_rate
            FROM tax_rates
            WHERE jurisdiction_name = $1
            "#,
        )
        .bind(jurisdiction_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to query tax rate for '{jurisdiction_name}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rate = |column: &str| -> Result<BigDecimal> {
            row.try_get(column)
                .with_context(|| format!("Invalid {column} for '{jurisdiction_name}'"))
        };

        Ok(Some(TaxRate {
            composite: rate("composite_rate")?,
            breakdown: TaxBreakdown {
                state_rate: rate("state_rate")?,
                county_rate: rate("county_rate")?,
                city_rate: rate("city_rate")?,
                special_rate: rate("special_rate")?,
            },
        }))
    }

    fn default_jurisdiction(&self) -> &str {
        &self.default_jurisdiction
    }
}
