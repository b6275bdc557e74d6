// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The region sampler activity.
//!
//! Reads one named setting and returns it as a string. Reading never mutates
//! the source, so repeated calls return the same value until the setting
//! itself changes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use pulse_sdk::{Activity, ActivityContext, ActivityError, Payload};
use tracing::debug;

use crate::error::SamplerError;

/// Activity type name registered with the orchestrator.
pub const REGION_ACTIVITY: &str = "GetRegion";
/// Setting sampled by default.
pub const REGION_SETTING: &str = "REGION";

/// Read-only view of named settings.
pub trait SettingSource: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl SettingSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory settings, shareable between the sampler and whoever updates them.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl SettingSource for StaticSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// What the sampler returns when the setting is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingSetting {
    /// An empty string.
    #[default]
    Empty,
    /// A `ConfigurationUnavailable` failure.
    Error,
}

/// Samples one setting, optionally simulating a slow call first.
pub struct RegionSampler {
    source: Arc<dyn SettingSource>,
    setting: String,
    missing: MissingSetting,
    latency: Option<Duration>,
}

impl RegionSampler {
    pub fn new(source: impl SettingSource) -> Self {
        Self {
            source: Arc::new(source),
            setting: REGION_SETTING.to_string(),
            missing: MissingSetting::default(),
            latency: None,
        }
    }

    /// Sampler over the process environment.
    pub fn from_env() -> Self {
        Self::new(ProcessEnv)
    }

    pub fn with_setting(mut self, setting: impl Into<String>) -> Self {
        self.setting = setting.into();
        self
    }

    pub fn with_missing(mut self, missing: MissingSetting) -> Self {
        self.missing = missing;
        self
    }

    /// Block for `latency` before each read. Zero disables the delay.
    pub fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency.filter(|d| !d.is_zero());
        self
    }

    /// Current value of the setting.
    pub fn read(&self) -> Result<String, SamplerError> {
        match self.source.get(&self.setting) {
            Some(value) => Ok(value),
            None => match self.missing {
                MissingSetting::Empty => Ok(String::new()),
                MissingSetting::Error => {
                    Err(SamplerError::ConfigurationUnavailable(self.setting.clone()))
                }
            },
        }
    }
}

#[async_trait]
impl Activity for RegionSampler {
    async fn execute(
        &self,
        ctx: ActivityContext,
        _input: Payload,
    ) -> Result<Payload, ActivityError> {
        if let Some(latency) = self.latency {
            debug!(latency_ms = latency.as_millis() as u64, "Simulating slow sample");
            ctx.sleep(latency).await?;
        }

        let value = self
            .read()
            .map_err(|e| ActivityError::failed(ctx.activity_type(), e.to_string()))?;
        debug!(setting = %self.setting, value = %value, attempt = ctx.attempt(), "Sampled setting");
        Ok(Payload::String(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_returns_configured_value() {
        let settings = StaticSettings::new().with("REGION", "us-east-1");
        let sampler = RegionSampler::new(settings);
        assert_eq!(sampler.read().unwrap(), "us-east-1");
    }

    #[test]
    fn test_reading_twice_is_idempotent() {
        let settings = StaticSettings::new().with("REGION", "eu-west-2");
        let sampler = RegionSampler::new(settings.clone());

        let first = sampler.read().unwrap();
        let second = sampler.read().unwrap();
        assert_eq!(first, second);
        assert_eq!(settings.get("REGION").as_deref(), Some("eu-west-2"));
    }

    #[test]
    fn test_value_follows_setting_changes() {
        let settings = StaticSettings::new().with("REGION", "us-east-1");
        let sampler = RegionSampler::new(settings.clone());
        assert_eq!(sampler.read().unwrap(), "us-east-1");

        settings.set("REGION", "ap-south-1");
        assert_eq!(sampler.read().unwrap(), "ap-south-1");
    }

    #[test]
    fn test_unset_setting_yields_empty_string() {
        let sampler = RegionSampler::new(StaticSettings::new());
        assert_eq!(sampler.read().unwrap(), "");
    }

    #[test]
    fn test_unset_setting_can_be_an_error() {
        let sampler = RegionSampler::new(StaticSettings::new()).with_missing(MissingSetting::Error);
        let err = sampler.read().unwrap_err();
        assert_eq!(err.to_string(), "configuration unavailable: REGION is not set");
    }

    #[test]
    fn test_custom_setting_name() {
        let settings = StaticSettings::new().with("ZONE", "b");
        let sampler = RegionSampler::new(settings).with_setting("ZONE");
        assert_eq!(sampler.read().unwrap(), "b");
    }

    #[test]
    fn test_zero_latency_is_disabled() {
        let sampler =
            RegionSampler::new(StaticSettings::new()).with_latency(Some(Duration::ZERO));
        assert!(sampler.latency.is_none());
    }
}
