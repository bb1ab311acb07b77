//! Validated engine settings
//!
//! Converts the raw TOML model from `mmps_common::config` into typed,
//! range-checked values. Everything downstream can assume these hold:
//! - `instances >= 1` and `workers >= 1`
//! - every scheduled temperature lies in `[0, 2]`
//! - every scheduled token budget is `> 0`

use mmps_common::config::{FailurePolicy, SummaryScope, TomlConfig};
use mmps_common::{Error, Result};

/// Sampling parameters for one pipeline instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Linear sampling schedule: instance i gets `base + i * step`
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSchedule {
    pub instances: usize,
    pub base_temperature: f32,
    pub temperature_step: f32,
    pub base_max_tokens: u32,
    pub max_tokens_step: u32,
    /// Output budget for stage 5, identical across instances
    pub summary_max_tokens: u32,
}

impl SamplingSchedule {
    /// Sampling for stages 1-4 of instance `index`
    pub fn for_instance(&self, index: usize) -> SamplingConfig {
        SamplingConfig {
            temperature: self.base_temperature + index as f32 * self.temperature_step,
            max_output_tokens: self
                .base_max_tokens
                .saturating_add((index as u32).saturating_mul(self.max_tokens_step)),
        }
    }

    /// Sampling for stage 5 of instance `index`
    pub fn summary_for_instance(&self, index: usize) -> SamplingConfig {
        SamplingConfig {
            temperature: self.for_instance(index).temperature,
            max_output_tokens: self.summary_max_tokens,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.instances == 0 {
            return Err(Error::Config("schedule.instances must be at least 1".to_string()));
        }
        if self.summary_max_tokens == 0 {
            return Err(Error::Config(
                "schedule.summary_max_tokens must be greater than 0".to_string(),
            ));
        }

        for index in 0..self.instances {
            let temperature = self.base_temperature + index as f32 * self.temperature_step;
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::Config(format!(
                    "instance {} temperature {} outside [0, 2]",
                    index, temperature
                )));
            }

            let tokens = u32::try_from(index)
                .ok()
                .and_then(|i| i.checked_mul(self.max_tokens_step))
                .and_then(|step| step.checked_add(self.base_max_tokens));
            match tokens {
                Some(0) => {
                    return Err(Error::Config(format!(
                        "instance {} max_output_tokens must be greater than 0",
                        index
                    )))
                }
                None => {
                    return Err(Error::Config(format!(
                        "instance {} max_output_tokens overflows",
                        index
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Scoring call parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything a [`crate::Session`] needs besides the client
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub schedule: SamplingSchedule,
    /// Worker pool size
    pub workers: usize,
    pub summary_scope: SummaryScope,
    pub failure_policy: FailurePolicy,
    pub scoring: ScoringSettings,
    pub system_directive: String,
}

impl EngineSettings {
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::from_config_with_instances(config, None)
    }

    /// Like [`Self::from_config`] with `schedule.instances` overridden
    ///
    /// An unset `schedule.workers` follows the effective instance count; an
    /// explicit one is kept.
    pub fn from_config_with_instances(
        config: &TomlConfig,
        instances: Option<usize>,
    ) -> Result<Self> {
        let schedule = &config.schedule;
        let instances = instances.unwrap_or(schedule.instances);
        let settings = Self {
            schedule: SamplingSchedule {
                instances,
                base_temperature: schedule.base_temperature,
                temperature_step: schedule.temperature_step,
                base_max_tokens: schedule.base_max_tokens,
                max_tokens_step: schedule.max_tokens_step,
                summary_max_tokens: schedule.summary_max_tokens,
            },
            workers: schedule.workers.unwrap_or(instances),
            summary_scope: schedule.summary_scope,
            failure_policy: schedule.failure_policy,
            scoring: ScoringSettings {
                temperature: config.scoring.temperature,
                max_tokens: config.scoring.max_tokens,
            },
            system_directive: config.prompts.system_directive.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        if self.workers == 0 {
            return Err(Error::Config("schedule.workers must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.scoring.temperature) {
            return Err(Error::Config(format!(
                "scoring.temperature {} outside [0, 2]",
                self.scoring.temperature
            )));
        }
        if self.scoring.max_tokens == 0 {
            return Err(Error::Config(
                "scoring.max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.system_directive.trim().is_empty() {
            return Err(Error::Config(
                "prompts.system_directive must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
