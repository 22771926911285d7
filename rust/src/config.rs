//! Configuration types for the scheduling system.

use pyo3::prelude::*;
use std::str::FromStr;

use crate::scheduler::SchedulerError;

/// Scheduling policy selected by [`SchedulingConfig::method`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingMethod {
    Asap,
    Alap,
    AsapTimestep,
    AlapTimestep,
}

impl FromStr for SchedulingMethod {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asap" => Ok(SchedulingMethod::Asap),
            "alap" => Ok(SchedulingMethod::Alap),
            "asap_timestep" => Ok(SchedulingMethod::AsapTimestep),
            "alap_timestep" => Ok(SchedulingMethod::AlapTimestep),
            other => Err(SchedulerError::UnknownMethod(other.to_string())),
        }
    }
}

/// How a timestep is sized when only delays are ready.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DelayRule {
    /// Shortest ready delay; longer delays are split across steps.
    #[default]
    Shortest,
    /// Longest ready delay; fewer steps, more padding.
    Longest,
}

impl FromStr for DelayRule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shortest" => Ok(DelayRule::Shortest),
            "longest" => Ok(DelayRule::Longest),
            other => Err(SchedulerError::InvalidConfig(format!(
                "delay_only_dominance must be 'shortest' or 'longest', got {:?}",
                other
            ))),
        }
    }
}

/// Configuration for policy selection and diagnostics.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    /// Policy: "asap", "alap", "asap_timestep", or "alap_timestep"
    #[pyo3(get, set)]
    pub method: String,
    /// Timestep length for delay-only frontiers: "shortest" or "longest"
    #[pyo3(get, set)]
    pub delay_only_dominance: String,
    /// 0 = silent, 1 = changes, 2 = checks, 3 = debug
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            method: "asap".to_string(),
            delay_only_dominance: "shortest".to_string(),
            verbosity: 0,
        }
    }
}

#[pymethods]
impl SchedulingConfig {
    #[new]
    #[pyo3(signature = (method=None, delay_only_dominance=None, verbosity=None))]
    fn new(
        method: Option<String>,
        delay_only_dominance: Option<String>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            method: method.unwrap_or(defaults.method),
            delay_only_dominance: delay_only_dominance.unwrap_or(defaults.delay_only_dominance),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SchedulingConfig(method={:?}, delay_only_dominance={:?}, verbosity={})",
            self.method, self.delay_only_dominance, self.verbosity
        )
    }
}

impl SchedulingConfig {
    /// Config for `method` with the remaining fields defaulted.
    pub fn with_method(method: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Self::default()
        }
    }

    pub fn scheduling_method(&self) -> Result<SchedulingMethod, SchedulerError> {
        self.method.parse()
    }

    pub fn delay_rule(&self) -> Result<DelayRule, SchedulerError> {
        self.delay_only_dominance.parse()
    }
}
