use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{RateProviderConfig, RatesConfig};
use crate::db::models::ExchangeRate;
use crate::db::{DatabaseError, ReferenceStore};
use crate::web::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateProvider {
    Official,
    Forex,
    Parallel,
}

impl RateProvider {
    pub const ALL: [RateProvider; 3] = [
        RateProvider::Official,
        RateProvider::Forex,
        RateProvider::Parallel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RateProvider::Official => "official",
            RateProvider::Forex => "forex",
            RateProvider::Parallel => "parallel",
        }
    }
}

impl FromStr for RateProvider {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Ok(RateProvider::Official),
            "forex" => Ok(RateProvider::Forex),
            "parallel" => Ok(RateProvider::Parallel),
            _ => Err(RateError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for RateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("unknown rate provider: {0}")]
    UnknownProvider(String),
    #[error("rate provider {0} is not configured")]
    NotConfigured(RateProvider),
    #[error("failed to fetch rates from {provider}: {message}")]
    Fetch {
        provider: RateProvider,
        message: String,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Body served by every provider endpoint.
#[derive(Debug, Deserialize)]
struct RatesPayload {
    #[serde(default)]
    base: Option<String>,
    rates: BTreeMap<String, f64>,
}

fn parse_payload(provider: RateProvider, body: &str) -> Result<Vec<ExchangeRate>, RateError> {
    let payload: RatesPayload = serde_json::from_str(body).map_err(|e| RateError::Fetch {
        provider,
        message: format!("invalid payload: {e}"),
    })?;
    let fetched_at = Utc::now();

    let mut rates: Vec<ExchangeRate> = payload
        .rates
        .into_iter()
        .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
        .map(|(currency, rate)| ExchangeRate {
            provider: provider.as_str().to_string(),
            currency: currency.trim().to_ascii_uppercase(),
            rate,
            fetched_at,
        })
        .collect();

    if let Some(base) = payload.base {
        let base = base.trim().to_ascii_uppercase();
        if !rates.iter().any(|r| r.currency == base) {
            rates.push(ExchangeRate {
                provider: provider.as_str().to_string(),
                currency: base,
                rate: 1.0,
                fetched_at,
            });
        }
    }
    Ok(rates)
}

struct ProviderEndpoint {
    url: String,
    timeout: Duration,
}

impl From<&RateProviderConfig> for ProviderEndpoint {
    fn from(config: &RateProviderConfig) -> Self {
        Self {
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Clone)]
pub struct RateService {
    client: Client,
    endpoints: Arc<BTreeMap<RateProvider, ProviderEndpoint>>,
    store: Arc<dyn ReferenceStore>,
}

impl RateService {
    pub fn new(config: &RatesConfig, store: Arc<dyn ReferenceStore>) -> Result<Self, RateError> {
        let mut endpoints = BTreeMap::new();
        for (name, provider) in &config.providers {
            endpoints.insert(name.parse::<RateProvider>()?, ProviderEndpoint::from(provider));
        }
        Ok(Self {
            client: Client::new(),
            endpoints: Arc::new(endpoints),
            store,
        })
    }

    pub fn configured(&self) -> Vec<RateProvider> {
        self.endpoints.keys().copied().collect()
    }

    pub async fn latest(&self, provider: RateProvider) -> Result<Vec<ExchangeRate>, RateError> {
        Ok(self.store.list_rates(provider.as_str()).await?)
    }

    /// Fetches the provider's current table and stores every rate in it.
    pub async fn refresh(&self, provider: RateProvider) -> Result<usize, RateError> {
        let endpoint = self
            .endpoints
            .get(&provider)
            .ok_or(RateError::NotConfigured(provider))?;
        debug!(%provider, url = %endpoint.url, "fetching rates");

        let fetch_error = |message: String| RateError::Fetch { provider, message };
        let response = self
            .client
            .get(&endpoint.url)
            .timeout(endpoint.timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("status {}", response.status())));
        }
        let body = response.text().await.map_err(|e| fetch_error(e.to_string()))?;

        let rates = parse_payload(provider, &body)?;
        self.store.upsert_rates(&rates).await?;
        info!(%provider, count = rates.len(), "exchange rates refreshed");
        Ok(rates.len())
    }

    /// Refreshes every configured provider; one failing provider does not
    /// stop the others.
    pub async fn refresh_all(&self) -> usize {
        let mut updated = 0;
        for provider in self.configured() {
            match self.refresh(provider).await {
                Ok(count) => {
                    Metrics::rate_refresh(true);
                    updated += count;
                }
                Err(e) => {
                    Metrics::rate_refresh(false);
                    warn!(%provider, error = %e, "rate refresh failed");
                }
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::manager::temp_sqlite;

    #[test]
    fn provider_names_parse() {
        assert_eq!("official".parse::<RateProvider>().unwrap(), RateProvider::Official);
        assert_eq!(" Parallel ".parse::<RateProvider>().unwrap(), RateProvider::Parallel);
        assert!("crypto".parse::<RateProvider>().is_err());
    }

    #[test]
    fn payload_adds_base_and_drops_bad_rates() {
        let rates = parse_payload(
            RateProvider::Forex,
            r#"{"base": "usd", "rates": {"eur": 0.92, "ARS": 980.5, "BAD": -1}}"#,
        )
        .unwrap();
        let currencies: Vec<&str> = rates.iter().map(|r| r.currency.as_str()).collect();
        assert_eq!(currencies, vec!["ARS", "EUR", "USD"]);
        assert!(rates.iter().all(|r| r.provider == "forex"));
        assert_eq!(rates[2].rate, 1.0);

        assert!(parse_payload(RateProvider::Forex, r#"{"data": []}"#).is_err());
    }

    #[tokio::test]
    async fn unconfigured_provider_is_reported() {
        let (_file, manager) = temp_sqlite().await;
        let config = RatesConfig {
            providers: BTreeMap::from([(
                "official".to_string(),
                RateProviderConfig {
                    url: "http://127.0.0.1:9/rates".to_string(),
                    timeout_secs: 1,
                },
            )]),
        };
        let service = RateService::new(&config, manager.reference_store()).unwrap();
        assert_eq!(service.configured(), vec![RateProvider::Official]);
        assert!(matches!(
            service.refresh(RateProvider::Parallel).await,
            Err(RateError::NotConfigured(RateProvider::Parallel))
        ));
        assert!(service.latest(RateProvider::Official).await.unwrap().is_empty());
    }
}
