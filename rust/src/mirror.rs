//! Time-reversal of programs and schedules.
//!
//! A latest-start schedule of a program is the time reversal of an
//! earliest-start schedule of its mirror. The transforms here are kept
//! separate from the schedulers so each can be checked on its own:
//!
//! - [`mirror_program`] reverses operation order (and so every resource's
//!   order) and every explicit edge, recording which original operation each
//!   mirrored one came from;
//! - [`reverse_schedule`] maps a schedule of the mirror back onto the
//!   original program;
//! - [`shift_timestep_markers`] repairs marker placement after a quantized
//!   schedule has been reversed.

use crate::durations::{DurationError, DurationTable, WarningSink};
use crate::models::{OpId, OpKind, Tick};
use crate::program::Program;
use crate::schedule::{Schedule, ScheduledOp};

/// A program reversed in time.
#[derive(Clone, Debug)]
pub struct MirroredProgram {
    pub program: Program,
    /// `origin[m]` is the original id of mirrored operation `m`.
    pub origin: Vec<OpId>,
}

impl MirroredProgram {
    pub fn original_id(&self, mirrored: OpId) -> OpId {
        self.origin[mirrored as usize]
    }
}

/// Build the mirror of `program`.
///
/// Durations are resolved (and cached on `program`) first, so the mirror
/// carries exactly the durations the original will be scheduled with.
pub fn mirror_program<S>(
    program: &Program,
    table: &DurationTable,
    sink: &mut S,
) -> Result<MirroredProgram, DurationError>
where
    S: WarningSink + ?Sized,
{
    let n = program.len() as OpId;
    let mut ops = Vec::with_capacity(program.len());
    let mut origin = Vec::with_capacity(program.len());
    for id in (0..n).rev() {
        let ticks = program.resolve_duration(id, table, sink)?;
        ops.push((program.op(id).clone(), ticks));
        origin.push(id);
    }
    let flip = |id: OpId| n - 1 - id;
    let dependencies = program
        .dependencies()
        .iter()
        .map(|&(before, after)| (flip(after), flip(before)))
        .collect();

    Ok(MirroredProgram {
        program: Program::from_resolved(
            program.name().to_string(),
            program.layout().clone(),
            ops,
            dependencies,
        ),
        origin,
    })
}

/// Map a schedule of `mirrored` back onto `original`.
///
/// Entry order is reversed and each entry moves to
/// `total - start - duration`. Source ids are translated to the original
/// program, whose duration slots receive the scheduled durations.
pub fn reverse_schedule(mirrored: &Schedule, original: &Program, map: &MirroredProgram) -> Schedule {
    let total = mirrored
        .duration()
        .unwrap_or_else(|| mirrored.compute_duration());
    let mut schedule = Schedule::for_program(original);
    for entry in mirrored.entries().iter().rev() {
        let source = entry.source.map(|m| map.original_id(m));
        if let Some(id) = source {
            original.record_duration(id, entry.duration);
        }
        schedule.push(
            entry.op.clone(),
            total.saturating_sub(entry.end()),
            entry.duration,
            source,
        );
    }
    for anomaly in mirrored.anomalies() {
        schedule.warn(anomaly.clone());
    }
    schedule.seal();
    schedule
}

/// Move each timestep marker behind the group it precedes.
///
/// After reversal a marker sits in front of its group, stamped with the
/// group's opening tick. Each marker is re-emitted just before the next
/// one (the last at the very end) and boundaries are recomputed as running
/// sums of the marker lengths. Markers keep their source.
pub fn shift_timestep_markers(schedule: &mut Schedule) {
    let entries = std::mem::take(schedule.entries_mut());
    let mut shifted: Vec<ScheduledOp> = Vec::with_capacity(entries.len());
    let mut held: Option<ScheduledOp> = None;
    let mut boundary: Tick = 0;

    let mut close = |held: Option<ScheduledOp>, shifted: &mut Vec<ScheduledOp>| {
        if let Some(mut marker) = held {
            if let OpKind::Timestep { length } = marker.op.kind() {
                boundary += *length;
            }
            marker.start = boundary;
            shifted.push(marker);
        }
    };

    for entry in entries {
        if entry.op.is_timestep() {
            close(held.replace(entry), &mut shifted);
        } else {
            shifted.push(entry);
        }
    }
    close(held, &mut shifted);

    *schedule.entries_mut() = shifted;
    schedule.seal();
}
