use crate::{ConfigError, DEFAULT_CLIENTS, DEFAULT_RUN_DURATION, DEFAULT_THREADS};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The `host:port` endpoints of the service under test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSet(Vec<String>);

impl EndpointSet {
    pub fn new<I, S>(endpoints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.into().trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        for endpoint in &endpoints {
            validate_endpoint(endpoint)?;
        }

        Ok(Self(endpoints))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ConfigError::InvalidEndpoint(endpoint.to_string())),
    }
}

/// Parses a comma separated list, e.g. `node1:8983,node2:8983`.
impl FromStr for EndpointSet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(','))
    }
}

impl fmt::Display for EndpointSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Validated benchmark configuration.
///
/// Built once through [`BenchmarkConfig::builder`] and never mutated afterwards. Zero threads,
/// clients or durations are accepted here; the orchestrator treats such a run as a no-op.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(try_from = "settings::BenchmarkSettings", into = "settings::BenchmarkSettings")
)]
pub struct BenchmarkConfig {
    endpoints: EndpointSet,
    collection: String,
    threads: u32,
    clients: u32,
    skip_duration: Duration,
    run_duration: Duration,
    target_throughput: u32,
    write_percentage: f64,
    collect_latency: bool,
}

impl BenchmarkConfig {
    pub fn builder(endpoints: EndpointSet, collection: impl Into<String>) -> BenchmarkConfigBuilder {
        BenchmarkConfigBuilder {
            config: BenchmarkConfig {
                endpoints,
                collection: collection.into(),
                threads: DEFAULT_THREADS,
                clients: DEFAULT_CLIENTS,
                skip_duration: Duration::ZERO,
                run_duration: DEFAULT_RUN_DURATION,
                target_throughput: 0,
                write_percentage: 0.,
                collect_latency: false,
            },
        }
    }

    /// Reopen the configuration for edits, e.g. to apply command line overrides.
    pub fn into_builder(self) -> BenchmarkConfigBuilder {
        BenchmarkConfigBuilder { config: self }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn clients(&self) -> u32 {
        self.clients
    }

    /// Warm-up excluded from the reported measurement window.
    pub fn skip_duration(&self) -> Duration {
        self.skip_duration
    }

    pub fn run_duration(&self) -> Duration {
        self.run_duration
    }

    /// Skip duration plus measured duration. Workers run for this long.
    pub fn total_duration(&self) -> Duration {
        self.skip_duration + self.run_duration
    }

    /// Aggregate operations per second across all workers. `0` means unlimited.
    pub fn target_throughput(&self) -> u32 {
        self.target_throughput
    }

    pub fn write_percentage(&self) -> f64 {
        self.write_percentage
    }

    pub fn collect_latency(&self) -> bool {
        self.collect_latency
    }
}

pub struct BenchmarkConfigBuilder {
    config: BenchmarkConfig,
}

impl BenchmarkConfigBuilder {
    pub fn endpoints(mut self, endpoints: EndpointSet) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.collection = collection.into();
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn clients(mut self, clients: u32) -> Self {
        self.config.clients = clients;
        self
    }

    pub fn skip_duration(mut self, skip_duration: Duration) -> Self {
        self.config.skip_duration = skip_duration;
        self
    }

    pub fn run_duration(mut self, run_duration: Duration) -> Self {
        self.config.run_duration = run_duration;
        self
    }

    pub fn target_throughput(mut self, target_throughput: u32) -> Self {
        self.config.target_throughput = target_throughput;
        self
    }

    /// Share of capacity given to writes, within `[0, 1]`.
    pub fn write_percentage(mut self, write_percentage: f64) -> Self {
        self.config.write_percentage = write_percentage;
        self
    }

    pub fn collect_latency(mut self, collect_latency: bool) -> Self {
        self.config.collect_latency = collect_latency;
        self
    }

    pub fn build(self) -> Result<BenchmarkConfig, ConfigError> {
        let config = self.config;

        if config.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }

        if !(0. ..=1.).contains(&config.write_percentage) {
            return Err(ConfigError::WritePercentage(config.write_percentage));
        }

        Ok(config)
    }
}

#[cfg(feature = "serde")]
mod settings {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_with::{serde_as, DurationSeconds};

    /// On-disk shape of a [`BenchmarkConfig`]. Durations are whole seconds.
    #[serde_as]
    #[derive(Debug, Deserialize, Serialize)]
    #[serde(deny_unknown_fields)]
    pub(crate) struct BenchmarkSettings {
        endpoints: String,
        collection: String,
        #[serde(default = "default_threads")]
        threads: u32,
        #[serde(default = "default_clients")]
        clients: u32,
        #[serde_as(as = "DurationSeconds<u64>")]
        #[serde(default)]
        skip_duration: Duration,
        #[serde_as(as = "DurationSeconds<u64>")]
        #[serde(default = "default_run_duration")]
        run_duration: Duration,
        #[serde(default)]
        target_throughput: u32,
        #[serde(default)]
        write_percentage: f64,
        #[serde(default)]
        collect_latency: bool,
    }

    fn default_threads() -> u32 {
        DEFAULT_THREADS
    }

    fn default_clients() -> u32 {
        DEFAULT_CLIENTS
    }

    fn default_run_duration() -> Duration {
        DEFAULT_RUN_DURATION
    }

    impl TryFrom<BenchmarkSettings> for BenchmarkConfig {
        type Error = ConfigError;

        fn try_from(settings: BenchmarkSettings) -> Result<Self, Self::Error> {
            BenchmarkConfig::builder(settings.endpoints.parse()?, settings.collection)
                .threads(settings.threads)
                .clients(settings.clients)
                .skip_duration(settings.skip_duration)
                .run_duration(settings.run_duration)
                .target_throughput(settings.target_throughput)
                .write_percentage(settings.write_percentage)
                .collect_latency(settings.collect_latency)
                .build()
        }
    }

    impl From<BenchmarkConfig> for BenchmarkSettings {
        fn from(config: BenchmarkConfig) -> Self {
            Self {
                endpoints: config.endpoints.to_string(),
                collection: config.collection,
                threads: config.threads,
                clients: config.clients,
                skip_duration: config.skip_duration,
                run_duration: config.run_duration,
                target_throughput: config.target_throughput,
                write_percentage: config.write_percentage,
                collect_latency: config.collect_latency,
            }
        }
    }
}
