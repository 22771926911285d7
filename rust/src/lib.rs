//! Timed scheduling of operations on serially-exclusive resources.
//!
//! Programs of operations (gates, delays, barriers) over resources such as
//! qubits are placed on a tick timeline with ASAP, ALAP, or lock-step
//! (timestep) policies, padded with explicit Delays so that every resource
//! is covered without gaps, and finally lowered to channel instructions.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;
use thiserror::Error;

mod config;
pub mod dag;
pub mod durations;
pub mod logging;
pub mod measure;
pub mod mirror;
mod models;
pub mod program;
pub mod schedule;
pub mod scheduler;
pub mod sequencer;

pub use config::{DelayRule, SchedulingConfig, SchedulingMethod};
pub use dag::{DagError, PrecedenceGraph};
pub use durations::{DurationError, DurationTable, RoundingAnomaly, WarningSink};
pub use measure::{align_measurements, MeasureError};
pub use mirror::{mirror_program, reverse_schedule, shift_timestep_markers, MirroredProgram};
pub use models::{
    DelayDuration, ModelError, OpId, OpKind, Operation, OperationSpec, ResourceId, ScheduleResult,
    ScheduledOperation, Tick, TimeUnit,
};
pub use program::{Program, ProgramError, ResourceLayout};
pub use schedule::{Schedule, ScheduledOp};
pub use scheduler::{
    schedule, AlapScheduler, AlapTimestepScheduler, ForwardScheduler, Scheduler, SchedulerError,
    TimestepGrouper,
};
pub use sequencer::{
    Channel, Implementation, ImplementationLookup, ImplementationMap, Instruction, SequencedProgram,
    Sequencer, SequencerError, TimedInstruction,
};

/// Any failure of [`schedule_specs`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QschedError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Duration(#[from] DurationError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Measure(#[from] MeasureError),
}

/// Build a physical program from loose records and schedule it.
///
/// # Arguments
/// * `name` - Program name
/// * `num_resources` - Size of the single resource register
/// * `operations` - Operations in program order
/// * `durations` - (name, resources, ticks) duration entries
/// * `config` - Policy and diagnostics
/// * `dt` - Seconds per tick, needed for delays given in physical units
/// * `meas_map` - Measurement groups to align measurements to, if any
pub fn schedule_specs(
    name: &str,
    num_resources: u32,
    operations: &[OperationSpec],
    durations: &[(String, Vec<ResourceId>, Tick)],
    config: &SchedulingConfig,
    dt: Option<f64>,
    meas_map: Option<&[Vec<ResourceId>]>,
) -> Result<Schedule, QschedError> {
    let mut table: DurationTable = durations
        .iter()
        .map(|(op, resources, ticks)| (op.as_str(), resources.clone(), *ticks))
        .collect();
    if let Some(dt) = dt {
        table.update(&DurationTable::with_dt(dt)?)?;
    }

    let mut program = Program::physical(name, num_resources);
    for spec in operations {
        program.push(spec.to_operation()?)?;
    }

    let scheduled = schedule(&program, &table, config)?;
    match meas_map {
        Some(groups) => Ok(align_measurements(&scheduled, groups)?),
        None => Ok(scheduled),
    }
}

/// Schedule a program described by operation records.
///
/// # Arguments
/// * `name` - Program name
/// * `num_resources` - Number of resources (qubits)
/// * `operations` - List of OperationSpec in program order
/// * `durations` - List of (name, resources, ticks) entries
/// * `config` - SchedulingConfig (method, delay_only_dominance, verbosity)
/// * `dt` - Seconds per tick for delays in physical units
/// * `meas_map` - Optional measurement groups
///
/// # Returns
/// * ScheduleResult with every placed operation, padding included
///
/// # Raises
/// * ValueError on unknown method, missing duration, or non-physical input
#[pyfunction]
#[pyo3(signature = (name, num_resources, operations, durations, config=None, dt=None, meas_map=None))]
fn schedule_program(
    name: String,
    num_resources: u32,
    operations: Vec<OperationSpec>,
    durations: Vec<(String, Vec<ResourceId>, Tick)>,
    config: Option<SchedulingConfig>,
    dt: Option<f64>,
    meas_map: Option<Vec<Vec<ResourceId>>>,
) -> PyResult<ScheduleResult> {
    let config = config.unwrap_or_default();
    match schedule_specs(
        &name,
        num_resources,
        &operations,
        &durations,
        &config,
        dt,
        meas_map.as_deref(),
    ) {
        Ok(schedule) => Ok(ScheduleResult::from(&schedule)),
        Err(e) => Err(pyo3::exceptions::PyValueError::new_err(e.to_string())),
    }
}

/// The qsched.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Records
    m.add_class::<OperationSpec>()?;
    m.add_class::<ScheduledOperation>()?;
    m.add_class::<ScheduleResult>()?;

    // Config types
    m.add_class::<SchedulingConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(schedule_program, m)?)?;

    Ok(())
}
