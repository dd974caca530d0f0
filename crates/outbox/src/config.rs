//! Environment configuration for the outbox daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;

use crate::routing::DestinationRegistry;
use crate::store::FileStore;

const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    /// Outbox directory; `None` means the OS data directory.
    pub data_dir: Option<PathBuf>,
    pub quotation_webhook: Option<Url>,
    pub minor_sale_webhook: Option<Url>,
    /// Connectivity probe target; without it the client is assumed online.
    pub health_url: Option<Url>,
    pub probe_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            quotation_webhook: None,
            minor_sale_webhook: None,
            health_url: None,
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = |name: &str| -> anyhow::Result<Option<Url>> {
            get(name)
                .map(|raw| raw.parse::<Url>().with_context(|| format!("{name} is not a valid URL: {raw:?}")))
                .transpose()
        };
        let secs = |name: &str, default: u64| -> anyhow::Result<Duration> {
            let secs = match get(name) {
                Some(raw) => raw
                    .parse::<u64>()
                    .with_context(|| format!("{name} must be a whole number of seconds, got {raw:?}"))?,
                None => default,
            };
            anyhow::ensure!(secs > 0, "{name} must be positive");
            Ok(Duration::from_secs(secs))
        };

        Ok(Self {
            data_dir: get("MOTODESK_DATA_DIR").map(PathBuf::from),
            quotation_webhook: url("MOTODESK_QUOTATION_WEBHOOK_URL")?,
            minor_sale_webhook: url("MOTODESK_MINOR_SALE_WEBHOOK_URL")?,
            health_url: url("MOTODESK_HEALTH_URL")?,
            probe_interval: secs("MOTODESK_PROBE_INTERVAL_SECS", DEFAULT_PROBE_INTERVAL_SECS)?,
            request_timeout: secs("MOTODESK_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        })
    }

    pub fn registry(&self) -> DestinationRegistry {
        DestinationRegistry::defaults(self.quotation_webhook.clone(), self.minor_sale_webhook.clone())
    }

    pub fn open_store(&self) -> anyhow::Result<FileStore> {
        match &self.data_dir {
            Some(dir) => FileStore::open(dir),
            None => FileStore::open_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Route, UnconfiguredPolicy};
    use crate::types::JobType;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = OutboxConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OutboxConfig::default());
        assert_eq!(
            config.registry().resolve(JobType::QuotationSave),
            Route::Unconfigured(UnconfiguredPolicy::Hold)
        );
    }

    #[test]
    fn reads_urls_and_durations() {
        let config = OutboxConfig::from_lookup(lookup(&[
            ("MOTODESK_DATA_DIR", "/var/lib/motodesk"),
            ("MOTODESK_QUOTATION_WEBHOOK_URL", "https://script.example.com/q/exec"),
            ("MOTODESK_MINOR_SALE_WEBHOOK_URL", "  "),
            ("MOTODESK_PROBE_INTERVAL_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/motodesk")));
        assert!(config.quotation_webhook.is_some());
        assert!(config.minor_sale_webhook.is_none());
        assert_eq!(config.probe_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        assert!(matches!(config.registry().resolve(JobType::QuotationSave), Route::Ready(_)));
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = OutboxConfig::from_lookup(lookup(&[("MOTODESK_HEALTH_URL", "not a url")])).unwrap_err();
        assert!(err.to_string().contains("MOTODESK_HEALTH_URL"));

        assert!(OutboxConfig::from_lookup(lookup(&[("MOTODESK_REQUEST_TIMEOUT_SECS", "ten")])).is_err());
        assert!(OutboxConfig::from_lookup(lookup(&[("MOTODESK_PROBE_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn opens_store_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutboxConfig {
            data_dir: Some(dir.path().join("outbox")),
            ..OutboxConfig::default()
        };
        let store = config.open_store().unwrap();
        assert!(store.root().is_dir());
    }
}
