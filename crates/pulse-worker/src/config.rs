// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.
//!
//! Parsing works over a key lookup so it can be exercised without touching
//! the process environment; the `from_env` constructors wrap it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pulse_protocol::PulseClientConfig;
use pulse_sdk::TaskQueue;

use crate::error::ConfigError;

/// Host suffix appended to the namespace.
pub const DEFAULT_HOST_SUFFIX: &str = ".tmprl.cloud";
/// Well-known orchestrator port.
pub const DEFAULT_PORT: u16 = 7233;
pub const DEFAULT_TASK_QUEUE: &str = "mrn-test";
/// Number of recent samples kept by a run.
pub const DEFAULT_RECENT_WINDOW: usize = 16;

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn lookup_nonempty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup_nonempty(lookup, key)
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::invalid(key, "must be a number of milliseconds"))
        })
        .transpose()
}

/// Where and how to reach the orchestrator. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub namespace: String,
    pub host: String,
    pub port: u16,
    /// Name checked against the orchestrator's certificate
    pub server_name: String,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    /// Extra trust anchor for orchestrators signed by a private CA
    pub tls_ca: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `NAMESPACE`: orchestrator namespace, also the host prefix
    /// - `TLS_CERT`: client certificate chain (PEM)
    /// - `TLS_KEY`: client private key (PEM)
    ///
    /// Optional (with defaults):
    /// - `TLS_CA`: extra trust anchor (PEM)
    /// - `ORCHESTRATOR_HOST_SUFFIX`: host suffix (default: ".tmprl.cloud")
    /// - `ORCHESTRATOR_PORT`: port (default: 7233)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let namespace =
            lookup_nonempty(&lookup, "NAMESPACE").ok_or(ConfigError::Missing("NAMESPACE"))?;
        if namespace
            .chars()
            .any(|c| c.is_whitespace() || c == ':' || c == '/')
        {
            return Err(ConfigError::invalid(
                "NAMESPACE",
                "must not contain whitespace, ':' or '/'",
            ));
        }

        let tls_cert = lookup_nonempty(&lookup, "TLS_CERT")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("TLS_CERT"))?;
        let tls_key = lookup_nonempty(&lookup, "TLS_KEY")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("TLS_KEY"))?;
        let tls_ca = lookup_nonempty(&lookup, "TLS_CA").map(PathBuf::from);

        let suffix = lookup_nonempty(&lookup, "ORCHESTRATOR_HOST_SUFFIX")
            .unwrap_or_else(|| DEFAULT_HOST_SUFFIX.to_string());
        let port = match lookup_nonempty(&lookup, "ORCHESTRATOR_PORT") {
            Some(v) => v
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    ConfigError::invalid("ORCHESTRATOR_PORT", "must be a valid port number")
                })?,
            None => DEFAULT_PORT,
        };

        let host = format!("{namespace}{suffix}");
        Ok(Self {
            server_name: host.clone(),
            host,
            port,
            namespace,
            tls_cert,
            tls_key,
            tls_ca,
        })
    }

    /// `host:port` of the orchestrator frontend.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Transport settings for the QUIC client.
    pub fn client_config(&self) -> PulseClientConfig {
        PulseClientConfig {
            server_name: self.server_name.clone(),
            ..PulseClientConfig::for_host(self.host.clone(), self.port)
        }
    }
}

/// When a run stops looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Finish after this many successful iterations.
    FixedCount(u32),
    /// Loop until the orchestrator suggests continue-as-new, then restart.
    SignalDriven,
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "signal" => Ok(RestartPolicy::SignalDriven),
            other => {
                let count = other
                    .strip_prefix("fixed:")
                    .ok_or_else(|| format!("expected 'fixed:<n>' or 'signal', got '{other}'"))?;
                count
                    .parse()
                    .map(RestartPolicy::FixedCount)
                    .map_err(|_| format!("invalid iteration count '{count}'"))
            }
        }
    }
}

/// The recognized loop variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVariant {
    /// Fast sampler paced by a pause; a fixed number of iterations.
    Paced,
    /// Minute-long sampler calls; restarts when history grows.
    SlowSampler,
    /// Half-minute sampler calls; restarts when history grows.
    LongHaul,
}

impl FromStr for LoopVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "paced" => Ok(LoopVariant::Paced),
            "slow-sampler" => Ok(LoopVariant::SlowSampler),
            "long-haul" => Ok(LoopVariant::LongHaul),
            other => Err(format!(
                "expected 'paced', 'slow-sampler' or 'long-haul', got '{other}'"
            )),
        }
    }
}

/// Settings of the durable loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Deadline of each sampler invocation
    pub activity_timeout: Duration,
    /// Pause between iterations, if any
    pub inter_iteration_pause: Option<Duration>,
    pub restart_policy: RestartPolicy,
    /// How many recent samples a run keeps
    pub recent_window: usize,
}

impl LoopConfig {
    pub fn new(activity_timeout: Duration, restart_policy: RestartPolicy) -> Self {
        Self {
            activity_timeout,
            inter_iteration_pause: None,
            restart_policy,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.inter_iteration_pause = (!pause.is_zero()).then_some(pause);
        self
    }

    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window;
        self
    }
}

/// Loop and sampler settings of one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSettings {
    pub loop_config: LoopConfig,
    /// Simulated duration of each sampler call
    pub sampler_latency: Option<Duration>,
}

impl LoopVariant {
    pub fn settings(self) -> VariantSettings {
        match self {
            LoopVariant::Paced => VariantSettings {
                loop_config: LoopConfig::new(Duration::from_secs(2), RestartPolicy::FixedCount(36))
                    .with_pause(Duration::from_secs(5)),
                sampler_latency: None,
            },
            LoopVariant::SlowSampler => VariantSettings {
                loop_config: LoopConfig::new(Duration::from_secs(90), RestartPolicy::SignalDriven),
                sampler_latency: Some(Duration::from_secs(60)),
            },
            LoopVariant::LongHaul => VariantSettings {
                loop_config: LoopConfig::new(Duration::from_secs(60), RestartPolicy::SignalDriven),
                sampler_latency: Some(Duration::from_secs(30)),
            },
        }
    }
}

/// Everything the worker process needs besides the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub task_queue: TaskQueue,
    pub variant: LoopVariant,
    pub loop_config: LoopConfig,
    pub sampler_latency: Option<Duration>,
    /// Serve an in-process orchestrator instead of dialing out
    pub embedded: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `TASK_QUEUE`: task queue name (default: "mrn-test")
    /// - `LOOP_VARIANT`: `paced`, `slow-sampler` or `long-haul` (default: paced)
    /// - `LOOP_ACTIVITY_TIMEOUT_MS`: overrides the variant's activity timeout
    /// - `LOOP_PAUSE_MS`: overrides the variant's pause (0 disables it)
    /// - `LOOP_RESTART_POLICY`: `fixed:<n>` or `signal`
    /// - `SAMPLER_LATENCY_MS`: simulated sampler duration (0 disables it)
    /// - `PULSE_EMBEDDED`: run against the in-process orchestrator (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let task_queue = lookup_nonempty(&lookup, "TASK_QUEUE")
            .unwrap_or_else(|| DEFAULT_TASK_QUEUE.to_string());

        let variant = match lookup_nonempty(&lookup, "LOOP_VARIANT") {
            Some(v) => v
                .parse::<LoopVariant>()
                .map_err(|reason| ConfigError::invalid("LOOP_VARIANT", reason))?,
            None => LoopVariant::Paced,
        };
        let VariantSettings {
            mut loop_config,
            mut sampler_latency,
        } = variant.settings();

        if let Some(timeout) = parse_millis(&lookup, "LOOP_ACTIVITY_TIMEOUT_MS")? {
            if timeout.is_zero() {
                return Err(ConfigError::invalid(
                    "LOOP_ACTIVITY_TIMEOUT_MS",
                    "must be greater than zero",
                ));
            }
            loop_config.activity_timeout = timeout;
        }
        if let Some(pause) = parse_millis(&lookup, "LOOP_PAUSE_MS")? {
            loop_config = loop_config.with_pause(pause);
        }
        if let Some(policy) = lookup_nonempty(&lookup, "LOOP_RESTART_POLICY") {
            loop_config.restart_policy = policy
                .parse()
                .map_err(|reason| ConfigError::invalid("LOOP_RESTART_POLICY", reason))?;
        }
        if let Some(latency) = parse_millis(&lookup, "SAMPLER_LATENCY_MS")? {
            sampler_latency = (!latency.is_zero()).then_some(latency);
        }

        let embedded = match lookup_nonempty(&lookup, "PULSE_EMBEDDED").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(_) => {
                return Err(ConfigError::invalid("PULSE_EMBEDDED", "must be true or false"));
            }
        };

        Ok(Self {
            task_queue: TaskQueue::new(task_queue),
            variant,
            loop_config,
            sampler_latency,
            embedded,
        })
    }
}
