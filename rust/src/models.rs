//! Core data types for the scheduling system.

use pyo3::prelude::*;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest schedulable time unit (one `dt` of the target).
pub type Tick = u64;

/// Flat index of a serially-exclusive resource (e.g. one qubit).
pub type ResourceId = u32;

/// Arena index of an operation inside a [`crate::Program`].
pub type OpId = u32;

/// Errors raised while turning loose records into operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid time unit: {0}")]
    InvalidUnit(String),
    #[error("Delay must act on exactly one resource, got {0}")]
    DelayArity(usize),
    #[error("Delay requires a duration")]
    MissingDelayDuration,
    #[error("Duration {0} in dt must be a non-negative integer")]
    FractionalTicks(f64),
}

/// Unit attached to a physical delay duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Already expressed in ticks of the target.
    Dt,
    S,
    Ms,
    Us,
    Ns,
    Ps,
}

impl TimeUnit {
    /// Seconds per unit. `None` for `Dt`, which depends on the target.
    pub fn seconds(self) -> Option<f64> {
        match self {
            TimeUnit::Dt => None,
            TimeUnit::S => Some(1.0),
            TimeUnit::Ms => Some(1e-3),
            TimeUnit::Us => Some(1e-6),
            TimeUnit::Ns => Some(1e-9),
            TimeUnit::Ps => Some(1e-12),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dt" => Ok(TimeUnit::Dt),
            "s" => Ok(TimeUnit::S),
            "ms" => Ok(TimeUnit::Ms),
            "us" | "µs" => Ok(TimeUnit::Us),
            "ns" => Ok(TimeUnit::Ns),
            "ps" => Ok(TimeUnit::Ps),
            other => Err(ModelError::InvalidUnit(other.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Dt => "dt",
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
        };
        f.write_str(s)
    }
}

/// Requested length of a delay.
#[derive(Clone, Debug, PartialEq)]
pub enum DelayDuration {
    Ticks(Tick),
    /// Converted to ticks through the duration table's `dt`.
    Physical { value: f64, unit: TimeUnit },
}

/// What an operation does. Identity never changes after construction.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    /// Named operation whose duration comes from the duration table.
    Gate { name: String },
    /// Idle on a single resource.
    Delay { duration: DelayDuration },
    /// Synchronizes its resources; zero duration.
    Barrier,
    /// Lock-step boundary emitted by the quantized schedulers.
    ///
    /// Zero footprint on every resource; `length` is the span it closes.
    Timestep { length: Tick },
}

/// An atomic timed action bound to an ordered list of resources.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    kind: OpKind,
    resources: Vec<ResourceId>,
}

impl Operation {
    pub fn gate(name: impl Into<String>, resources: impl Into<Vec<ResourceId>>) -> Self {
        Self {
            kind: OpKind::Gate { name: name.into() },
            resources: resources.into(),
        }
    }

    pub fn delay(ticks: Tick, resource: ResourceId) -> Self {
        Self {
            kind: OpKind::Delay {
                duration: DelayDuration::Ticks(ticks),
            },
            resources: vec![resource],
        }
    }

    pub fn delay_in(value: f64, unit: TimeUnit, resource: ResourceId) -> Self {
        let duration = match unit {
            TimeUnit::Dt if value >= 0.0 && value.fract() == 0.0 => {
                DelayDuration::Ticks(value as Tick)
            }
            _ => DelayDuration::Physical { value, unit },
        };
        Self {
            kind: OpKind::Delay { duration },
            resources: vec![resource],
        }
    }

    pub fn barrier(resources: impl Into<Vec<ResourceId>>) -> Self {
        Self {
            kind: OpKind::Barrier,
            resources: resources.into(),
        }
    }

    pub fn timestep(length: Tick, resources: impl Into<Vec<ResourceId>>) -> Self {
        Self {
            kind: OpKind::Timestep { length },
            resources: resources.into(),
        }
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn arity(&self) -> usize {
        self.resources.len()
    }

    /// Name used for duration and implementation lookups.
    pub fn name(&self) -> &str {
        match &self.kind {
            OpKind::Gate { name } => name,
            OpKind::Delay { .. } => "delay",
            OpKind::Barrier => "barrier",
            OpKind::Timestep { .. } => "timestep",
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, OpKind::Delay { .. })
    }

    pub fn is_timestep(&self) -> bool {
        matches!(self.kind, OpKind::Timestep { .. })
    }

    /// Barriers and timesteps have no lower-level implementation.
    pub fn is_marker(&self) -> bool {
        matches!(self.kind, OpKind::Barrier | OpKind::Timestep { .. })
    }

    /// `true` if some resource appears twice in the resource list.
    pub fn has_repeated_resource(&self) -> bool {
        self.resources
            .iter()
            .enumerate()
            .any(|(i, r)| self.resources[..i].contains(r))
    }
}

/// Operation record accepted by the Python entry point.
#[pyclass]
#[derive(Clone, Debug)]
pub struct OperationSpec {
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub resources: Vec<ResourceId>,
    /// Only read for delays.
    #[pyo3(get, set)]
    pub duration: Option<f64>,
    /// Unit of `duration`; `None` means ticks.
    #[pyo3(get, set)]
    pub unit: Option<String>,
}

#[pymethods]
impl OperationSpec {
    #[new]
    #[pyo3(signature = (name, resources, duration=None, unit=None))]
    fn new(
        name: String,
        resources: Vec<ResourceId>,
        duration: Option<f64>,
        unit: Option<String>,
    ) -> Self {
        Self {
            name,
            resources,
            duration,
            unit,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "OperationSpec(name={:?}, resources={:?}, duration={:?}, unit={:?})",
            self.name, self.resources, self.duration, self.unit
        )
    }
}

impl OperationSpec {
    /// Build the operation this record describes.
    pub fn to_operation(&self) -> Result<Operation, ModelError> {
        match self.name.as_str() {
            "barrier" => Ok(Operation::barrier(self.resources.clone())),
            "delay" => {
                if self.resources.len() != 1 {
                    return Err(ModelError::DelayArity(self.resources.len()));
                }
                let value = self.duration.ok_or(ModelError::MissingDelayDuration)?;
                let unit = match &self.unit {
                    Some(u) => u.parse::<TimeUnit>()?,
                    None => TimeUnit::Dt,
                };
                if unit == TimeUnit::Dt && (value < 0.0 || value.fract() != 0.0) {
                    return Err(ModelError::FractionalTicks(value));
                }
                Ok(Operation::delay_in(value, unit, self.resources[0]))
            }
            name => Ok(Operation::gate(name, self.resources.clone())),
        }
    }
}

/// An operation with its assigned start tick, as returned to Python.
#[pyclass]
#[derive(Clone, Debug)]
pub struct ScheduledOperation {
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub resources: Vec<ResourceId>,
    #[pyo3(get, set)]
    pub start: Tick,
    #[pyo3(get, set)]
    pub duration: Tick,
    /// Set for timestep markers only.
    #[pyo3(get, set)]
    pub length: Option<Tick>,
}

#[pymethods]
impl ScheduledOperation {
    fn __repr__(&self) -> String {
        format!(
            "ScheduledOperation(name={:?}, resources={:?}, start={}, duration={})",
            self.name, self.resources, self.start, self.duration
        )
    }
}

/// Result of a scheduling call, as returned to Python.
#[pyclass]
#[derive(Clone, Debug, Default)]
pub struct ScheduleResult {
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub duration: Tick,
    #[pyo3(get, set)]
    pub operations: Vec<ScheduledOperation>,
    #[pyo3(get, set)]
    pub anomalies: Vec<String>,
}

#[pymethods]
impl ScheduleResult {
    fn __repr__(&self) -> String {
        format!(
            "ScheduleResult(name={:?}, duration={}, operations={}, anomalies={})",
            self.name,
            self.duration,
            self.operations.len(),
            self.anomalies.len()
        )
    }
}
