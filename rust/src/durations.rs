//! Duration table: resolves (operation name, resources) to a tick count.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

use crate::models::{DelayDuration, OpKind, Operation, ResourceId, Tick};

/// Largest rounding error (seconds) accepted silently when converting to ticks.
pub const ROUNDING_TOLERANCE_SECONDS: f64 = 1e-15;

/// Errors raised while building or querying a duration table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("No duration registered for operation '{name}' on resources {resources:?}")]
    MissingDuration {
        name: String,
        resources: Vec<ResourceId>,
    },
    #[error("Cannot merge duration tables: dt={existing:e} s vs dt={incoming:e} s")]
    ConflictingUnit { existing: f64, incoming: f64 },
    #[error("Operation '{0}' has a physical duration but no dt is known")]
    MissingTimeQuantum(String),
    #[error("Invalid time quantum dt={0}")]
    InvalidTimeQuantum(f64),
    #[error("Negative duration {seconds:e} s for operation '{name}'")]
    NegativeDuration { name: String, seconds: f64 },
}

/// A physical duration whose conversion to ticks lost more than
/// [`ROUNDING_TOLERANCE_SECONDS`]. Scheduling proceeds with `ticks`.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundingAnomaly {
    pub name: String,
    /// Requested duration in seconds.
    pub requested: f64,
    pub ticks: Tick,
    pub dt: f64,
}

impl RoundingAnomaly {
    pub fn rounded(&self) -> f64 {
        self.ticks as f64 * self.dt
    }

    pub fn error(&self) -> f64 {
        (self.requested - self.rounded()).abs()
    }
}

impl fmt::Display for RoundingAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Duration of {} is rounded to {} dt = {:e} s from {:e}",
            self.name,
            self.ticks,
            self.rounded(),
            self.requested
        )
    }
}

/// Receives non-fatal rounding anomalies.
pub trait WarningSink {
    fn warn(&mut self, anomaly: RoundingAnomaly);
}

impl WarningSink for Vec<RoundingAnomaly> {
    fn warn(&mut self, anomaly: RoundingAnomaly) {
        self.push(anomaly);
    }
}

fn check_dt(dt: f64) -> Result<f64, DurationError> {
    if dt.is_finite() && dt > 0.0 {
        Ok(dt)
    } else {
        Err(DurationError::InvalidTimeQuantum(dt))
    }
}

/// Convert seconds to ticks by rounding to the nearest multiple of `dt`.
///
/// Returns the tick count and, when the rounding error exceeds
/// [`ROUNDING_TOLERANCE_SECONDS`], the anomaly to report.
pub fn seconds_to_ticks(
    name: &str,
    seconds: f64,
    dt: f64,
) -> Result<(Tick, Option<RoundingAnomaly>), DurationError> {
    let dt = check_dt(dt)?;
    if seconds < 0.0 || !seconds.is_finite() {
        return Err(DurationError::NegativeDuration {
            name: name.to_string(),
            seconds,
        });
    }
    let ticks = (seconds / dt).round() as Tick;
    let anomaly = RoundingAnomaly {
        name: name.to_string(),
        requested: seconds,
        ticks,
        dt,
    };
    if anomaly.error() > ROUNDING_TOLERANCE_SECONDS {
        Ok((ticks, Some(anomaly)))
    } else {
        Ok((ticks, None))
    }
}

/// Synchronization-only operations resolve to zero ticks regardless of entries.
fn is_sync_only(name: &str) -> bool {
    matches!(name, "barrier" | "timestep")
}

/// Authoritative (name, resources) -> ticks mapping.
///
/// Built once per session and read-only afterwards; safe to share between
/// threads scheduling independent programs.
#[derive(Debug, Clone, Default)]
pub struct DurationTable {
    entries: FxHashMap<String, FxHashMap<Vec<ResourceId>, Tick>>,
    defaults: FxHashMap<String, Tick>,
    dt: Option<f64>,
}

impl DurationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table with a time quantum (seconds per tick).
    pub fn with_dt(dt: f64) -> Result<Self, DurationError> {
        Ok(Self {
            dt: Some(check_dt(dt)?),
            ..Self::default()
        })
    }

    pub fn dt(&self) -> Option<f64> {
        self.dt
    }

    /// Number of exact (name, resources) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.defaults.is_empty()
    }

    /// Register the duration of `name` on exactly `resources`.
    pub fn register(&mut self, name: &str, resources: &[ResourceId], ticks: Tick) -> &mut Self {
        self.entries
            .entry(name.to_string())
            .or_default()
            .insert(resources.to_vec(), ticks);
        self
    }

    /// Register the duration used for `name` on any resources without an exact entry.
    pub fn register_default(&mut self, name: &str, ticks: Tick) -> &mut Self {
        self.defaults.insert(name.to_string(), ticks);
        self
    }

    /// Look up the duration of `name` on `resources`.
    ///
    /// Exact entries win over the per-name default. `barrier` and `timestep`
    /// always resolve to 0.
    pub fn lookup(&self, name: &str, resources: &[ResourceId]) -> Result<Tick, DurationError> {
        if is_sync_only(name) {
            return Ok(0);
        }
        let missing = || DurationError::MissingDuration {
            name: name.to_string(),
            resources: resources.to_vec(),
        };
        if let Some(ticks) = self.entries.get(name).and_then(|m| m.get(resources)) {
            return Ok(*ticks);
        }
        self.defaults.get(name).copied().ok_or_else(missing)
    }

    /// Merge `other` into this table. Entries from `other` override.
    ///
    /// # Errors
    /// * `ConflictingUnit` if both tables define a different `dt`.
    pub fn update(&mut self, other: &DurationTable) -> Result<&mut Self, DurationError> {
        if let (Some(existing), Some(incoming)) = (self.dt, other.dt) {
            if existing != incoming {
                return Err(DurationError::ConflictingUnit { existing, incoming });
            }
        }
        self.dt = other.dt.or(self.dt);

        for (name, by_resources) in &other.entries {
            let target = self.entries.entry(name.clone()).or_default();
            for (resources, ticks) in by_resources {
                target.insert(resources.clone(), *ticks);
            }
        }
        for (name, ticks) in &other.defaults {
            self.defaults.insert(name.clone(), *ticks);
        }
        Ok(self)
    }

    /// Build a table from backend metadata given in seconds.
    ///
    /// # Arguments
    /// * `entries` - (operation name, resources, duration in seconds) triples
    /// * `dt` - seconds per tick
    /// * `sink` - receives a [`RoundingAnomaly`] for every lossy conversion
    pub fn from_external_source<I, S>(
        entries: I,
        dt: f64,
        sink: &mut S,
    ) -> Result<Self, DurationError>
    where
        I: IntoIterator<Item = (String, Vec<ResourceId>, f64)>,
        S: WarningSink + ?Sized,
    {
        let mut table = Self::with_dt(dt)?;
        for (name, resources, seconds) in entries {
            let (ticks, anomaly) = seconds_to_ticks(&name, seconds, dt)?;
            if let Some(anomaly) = anomaly {
                sink.warn(anomaly);
            }
            table.register(&name, &resources, ticks);
        }
        Ok(table)
    }

    /// Resolve the tick duration of an operation.
    ///
    /// Delays carry their own length; physical delay lengths are converted
    /// through `dt`, reporting lossy conversions to `sink`.
    pub fn resolve<S>(&self, op: &Operation, sink: &mut S) -> Result<Tick, DurationError>
    where
        S: WarningSink + ?Sized,
    {
        match op.kind() {
            OpKind::Gate { name } => self.lookup(name, op.resources()),
            OpKind::Delay {
                duration: DelayDuration::Ticks(ticks),
            } => Ok(*ticks),
            OpKind::Delay {
                duration: DelayDuration::Physical { value, unit },
            } => {
                let dt = self
                    .dt
                    .ok_or_else(|| DurationError::MissingTimeQuantum(op.name().to_string()))?;
                // Whole dt-valued delays are normalized to Ticks on
                // construction; a fractional one rounds like any other unit.
                let seconds = match unit.seconds() {
                    Some(scale) => value * scale,
                    None => value * dt,
                };
                let (ticks, anomaly) = seconds_to_ticks(op.name(), seconds, dt)?;
                if let Some(anomaly) = anomaly {
                    sink.warn(anomaly);
                }
                Ok(ticks)
            }
            OpKind::Barrier | OpKind::Timestep { .. } => Ok(0),
        }
    }
}

/// Convenience for building a table from tick-valued triples.
impl<N: AsRef<str>> FromIterator<(N, Vec<ResourceId>, Tick)> for DurationTable {
    fn from_iter<T: IntoIterator<Item = (N, Vec<ResourceId>, Tick)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (name, resources, ticks) in iter {
            table.register(name.as_ref(), &resources, ticks);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_table() -> DurationTable {
        let mut table = DurationTable::new();
        table
            .register("sx", &[0], 160)
            .register("cx", &[0, 1], 1000)
            .register("cx", &[1, 0], 1100)
            .register_default("measure", 4000);
        table
    }

    #[test]
    fn test_lookup_exact_entry() {
        let table = make_table();
        assert_eq!(table.lookup("sx", &[0]), Ok(160));
        assert_eq!(table.lookup("cx", &[0, 1]), Ok(1000));
        // Resource order is part of the key
        assert_eq!(table.lookup("cx", &[1, 0]), Ok(1100));
    }

    #[test]
    fn test_lookup_falls_back_to_default() {
        let table = make_table();
        assert_eq!(table.lookup("measure", &[7]), Ok(4000));
    }

    #[test]
    fn test_sync_operations_are_zero() {
        let table = DurationTable::new();
        assert_eq!(table.lookup("barrier", &[0, 1, 2]), Ok(0));
        assert_eq!(table.lookup("timestep", &[0]), Ok(0));
    }

    #[test]
    fn test_missing_duration_names_operation_and_resources() {
        let table = make_table();
        let err = table.lookup("sx", &[3]).unwrap_err();
        assert_eq!(
            err,
            DurationError::MissingDuration {
                name: "sx".to_string(),
                resources: vec![3],
            }
        );
        let message = err.to_string();
        assert!(message.contains("sx"));
        assert!(message.contains("[3]"));

        assert!(matches!(
            table.lookup("rz", &[0]),
            Err(DurationError::MissingDuration { .. })
        ));
    }

    #[test]
    fn test_update_merges_and_overrides() {
        let mut table = make_table();
        let mut other = DurationTable::with_dt(2e-9).unwrap();
        other.register("sx", &[0], 170).register("x", &[1], 320);

        table.update(&other).unwrap();

        assert_eq!(table.lookup("sx", &[0]), Ok(170));
        assert_eq!(table.lookup("x", &[1]), Ok(320));
        assert_eq!(table.lookup("cx", &[0, 1]), Ok(1000));
        assert_eq!(table.dt(), Some(2e-9));
    }

    #[test]
    fn test_update_adds_unknown_names() {
        let mut table = DurationTable::new();
        let mut other = DurationTable::new();
        other.register("rz", &[2], 0).register_default("measure", 4000);

        table.update(&other).unwrap();

        assert_eq!(table.lookup("rz", &[2]), Ok(0));
        assert_eq!(table.lookup("measure", &[7]), Ok(4000));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_conflicting_unit() {
        let mut table = DurationTable::with_dt(2e-9).unwrap();
        let other = DurationTable::with_dt(1e-9).unwrap();
        assert_eq!(
            table.update(&other).map(|_| ()),
            Err(DurationError::ConflictingUnit {
                existing: 2e-9,
                incoming: 1e-9,
            })
        );
    }

    #[test]
    fn test_update_keeps_existing_dt() {
        let mut table = DurationTable::with_dt(2e-9).unwrap();
        table.update(&DurationTable::new()).unwrap();
        assert_eq!(table.dt(), Some(2e-9));
    }

    #[test]
    fn test_from_external_source_exact() {
        let mut anomalies: Vec<RoundingAnomaly> = Vec::new();
        let dt = 0.5;
        let table = DurationTable::from_external_source(
            vec![
                ("sx".to_string(), vec![0], 1.5),
                ("cx".to_string(), vec![0, 1], 4.0),
            ],
            dt,
            &mut anomalies,
        )
        .unwrap();

        assert_eq!(table.lookup("sx", &[0]), Ok(3));
        assert_eq!(table.lookup("cx", &[0, 1]), Ok(8));
        assert!(anomalies.is_empty());
        assert_eq!(table.dt(), Some(0.5));
    }

    #[test]
    fn test_from_external_source_reports_rounding() {
        let mut anomalies: Vec<RoundingAnomaly> = Vec::new();
        let dt = 2e-9;
        let table = DurationTable::from_external_source(
            vec![("sx".to_string(), vec![0], 35.5e-9)],
            dt,
            &mut anomalies,
        )
        .unwrap();

        // 35.5 ns / 2 ns = 17.75 -> 18 ticks
        assert_eq!(table.lookup("sx", &[0]), Ok(18));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].ticks, 18);
        assert!((anomalies[0].error() - 0.5e-9).abs() < 1e-18);
        assert!(anomalies[0].to_string().starts_with("Duration of sx is rounded to 18 dt"));
    }

    #[test]
    fn test_invalid_dt() {
        assert_eq!(
            DurationTable::with_dt(0.0).map(|_| ()),
            Err(DurationError::InvalidTimeQuantum(0.0))
        );
        assert!(DurationTable::with_dt(f64::NAN).is_err());
    }

    #[test]
    fn test_resolve_operations() {
        use crate::models::TimeUnit;

        let mut sink: Vec<RoundingAnomaly> = Vec::new();
        let mut table = make_table();
        table.update(&DurationTable::with_dt(1e-9).unwrap()).unwrap();

        assert_eq!(
            table.resolve(&Operation::gate("sx", vec![0]), &mut sink),
            Ok(160)
        );
        assert_eq!(table.resolve(&Operation::delay(42, 1), &mut sink), Ok(42));
        assert_eq!(
            table.resolve(&Operation::delay_in(0.1, TimeUnit::Us, 1), &mut sink),
            Ok(100)
        );
        assert_eq!(
            table.resolve(&Operation::barrier(vec![0, 1]), &mut sink),
            Ok(0)
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_resolve_physical_delay_without_dt() {
        use crate::models::TimeUnit;

        let mut sink: Vec<RoundingAnomaly> = Vec::new();
        let table = make_table();
        assert_eq!(
            table.resolve(&Operation::delay_in(100.0, TimeUnit::Ns, 0), &mut sink),
            Err(DurationError::MissingTimeQuantum("delay".to_string()))
        );
    }

    #[test]
    fn test_resolve_fractional_dt_delay() {
        use crate::models::TimeUnit;

        let op = Operation::delay_in(2.75, TimeUnit::Dt, 0);
        let mut sink: Vec<RoundingAnomaly> = Vec::new();
        assert_eq!(
            make_table().resolve(&op, &mut sink),
            Err(DurationError::MissingTimeQuantum("delay".to_string()))
        );
        assert!(sink.is_empty());

        let table = DurationTable::with_dt(2e-9).unwrap();
        assert_eq!(table.resolve(&op, &mut sink), Ok(3));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].dt, 2e-9);
        assert!(sink[0].to_string().starts_with("Duration of delay is rounded to 3 dt"));
    }

    #[test]
    fn test_negative_physical_duration() {
        assert!(matches!(
            seconds_to_ticks("delay", -1e-9, 1e-9),
            Err(DurationError::NegativeDuration { .. })
        ));
    }

    #[test]
    fn test_from_iterator() {
        let table: DurationTable = vec![("h", vec![0], 3), ("h", vec![1], 4)]
            .into_iter()
            .collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("h", &[1]), Ok(4));
    }
}
