//! Scheduling passes: ASAP, mirror-derived ALAP, and their quantized
//! (timestep) variants.
//!
//! Every pass takes a physical [`Program`] and returns a gap-free
//! [`Schedule`]: each declared resource is covered from tick 0 to the
//! schedule's duration, with explicit Delays wherever it would otherwise idle.

mod alap;
mod asap;
mod frontier;
mod timeline;
mod timestep;

pub use alap::{AlapScheduler, AlapTimestepScheduler, Mirrored};
pub use asap::ForwardScheduler;
pub use frontier::{DominanceKey, ResidualGraph};
pub use timeline::ResourceTimeline;
pub use timestep::TimestepGrouper;

use thiserror::Error;

use crate::config::{SchedulingConfig, SchedulingMethod};
use crate::dag::DagError;
use crate::durations::{DurationError, DurationTable};
use crate::models::OpId;
use crate::program::Program;
use crate::schedule::Schedule;

/// Errors from the scheduling passes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Program is not physical: {0}")]
    NotPhysical(String),
    #[error("Circular dependency detected involving operation {0}")]
    CircularDependency(OpId),
    #[error(transparent)]
    Duration(#[from] DurationError),
    #[error("Internal scheduling invariant violated: {0}")]
    InternalSchedulingInvariantViolation(String),
    #[error("Unknown scheduling method: {0}")]
    UnknownMethod(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<DagError> for SchedulerError {
    fn from(err: DagError) -> Self {
        match err {
            DagError::CircularDependency(id) => SchedulerError::CircularDependency(id),
        }
    }
}

/// A scheduling policy.
///
/// Implementations are stateless between runs: scheduling the same program
/// twice yields the same schedule.
pub trait Scheduler {
    fn run(&self, program: &Program) -> Result<Schedule, SchedulerError>;

    /// The same policy, set up to run on a time-reversed program.
    fn for_mirror(self) -> Self
    where
        Self: Sized,
    {
        self
    }
}

pub(crate) fn ensure_physical(program: &Program) -> Result<(), SchedulerError> {
    match program.physical_violation() {
        Some(reason) => Err(SchedulerError::NotPhysical(reason)),
        None => Ok(()),
    }
}

/// Schedule `program` with the policy named in `config`.
pub fn schedule(
    program: &Program,
    table: &DurationTable,
    config: &SchedulingConfig,
) -> Result<Schedule, SchedulerError> {
    let method = config.scheduling_method()?;
    let verbosity = config.verbosity;
    let schedule = match method {
        SchedulingMethod::Asap => ForwardScheduler::new(table)
            .with_verbosity(verbosity)
            .run(program)?,
        SchedulingMethod::Alap => AlapScheduler::new(
            ForwardScheduler::new(table).with_verbosity(verbosity),
            table,
        )
        .run(program)?,
        SchedulingMethod::AsapTimestep => TimestepGrouper::new(table, config.delay_rule()?)
            .with_verbosity(verbosity)
            .run(program)?,
        SchedulingMethod::AlapTimestep => AlapTimestepScheduler::new(
            TimestepGrouper::new(table, config.delay_rule()?).with_verbosity(verbosity),
            table,
        )
        .run(program)?,
    };
    for anomaly in schedule.anomalies() {
        crate::log_warning!("{}", anomaly);
    }
    Ok(schedule)
}
