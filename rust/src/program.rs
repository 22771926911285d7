//! Programs: an arena of operations over declared resources.

use std::ops::Range;
use std::sync::OnceLock;
use thiserror::Error;

use crate::durations::{DurationError, DurationTable, RoundingAnomaly, WarningSink};
use crate::models::{OpId, Operation, ResourceId, Tick};

/// Errors raised while building a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Resource {resource} is not declared ({declared} resources available)")]
    UnknownResource {
        resource: ResourceId,
        declared: u32,
    },
    #[error("Operation '{0}' touches no resources")]
    NoResources(String),
    #[error("Operation {0} does not exist")]
    UnknownOperation(OpId),
    #[error("Operation {0} cannot depend on itself")]
    SelfDependency(OpId),
}

/// A named group of resources, e.g. a quantum register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub size: u32,
}

/// Resource declarations shared by a program and the schedules built from it.
///
/// Resource ids are flat: registers are enumerated in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLayout {
    registers: Vec<Register>,
}

impl ResourceLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single register named `q` with `size` resources.
    pub fn physical(size: u32) -> Self {
        let mut layout = Self::new();
        layout.add_register("q", size);
        layout
    }

    /// Declare a register and return the flat ids it occupies.
    pub fn add_register(&mut self, name: impl Into<String>, size: u32) -> Range<ResourceId> {
        let first = self.num_resources();
        self.registers.push(Register {
            name: name.into(),
            size,
        });
        first..first + size
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn num_resources(&self) -> u32 {
        self.registers.iter().map(|r| r.size).sum()
    }

    pub fn resources(&self) -> Range<ResourceId> {
        0..self.num_resources()
    }

    /// A physical layout has exactly one resource namespace.
    pub fn is_physical(&self) -> bool {
        self.registers.len() == 1
    }

    /// Human-readable label such as `q[3]`.
    pub fn label(&self, resource: ResourceId) -> String {
        let mut offset = 0;
        for register in &self.registers {
            if resource < offset + register.size {
                return format!("{}[{}]", register.name, resource - offset);
            }
            offset += register.size;
        }
        format!("?[{}]", resource)
    }
}

/// Operations plus precedence edges.
///
/// Operations touching a common resource keep program order; explicit edges
/// add further constraints. Each operation owns a write-once duration slot:
/// the first scheduling pass that resolves a duration caches it there, along
/// with any rounding anomaly, and later passes reuse both, even if given a
/// different table.
#[derive(Clone, Debug)]
pub struct Program {
    name: String,
    layout: ResourceLayout,
    ops: Vec<Operation>,
    dependencies: Vec<(OpId, OpId)>,
    durations: Vec<OnceLock<(Tick, Option<RoundingAnomaly>)>>,
}

impl Program {
    pub fn new(name: impl Into<String>, layout: ResourceLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            ops: Vec::new(),
            dependencies: Vec::new(),
            durations: Vec::new(),
        }
    }

    /// Program over a single register of `size` resources.
    pub fn physical(name: impl Into<String>, size: u32) -> Self {
        Self::new(name, ResourceLayout::physical(size))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    pub fn num_resources(&self) -> u32 {
        self.layout.num_resources()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// # Panics
    /// If `id` was not returned by this program.
    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id as usize]
    }

    /// Iterate `(id, operation)` in program order.
    pub fn iter(&self) -> impl Iterator<Item = (OpId, &Operation)> {
        self.ops.iter().enumerate().map(|(i, op)| (i as OpId, op))
    }

    /// Explicit edges as `(before, after)` pairs.
    pub fn dependencies(&self) -> &[(OpId, OpId)] {
        &self.dependencies
    }

    /// Append an operation at the end of the program.
    pub fn push(&mut self, op: Operation) -> Result<OpId, ProgramError> {
        if op.resources().is_empty() {
            return Err(ProgramError::NoResources(op.name().to_string()));
        }
        let declared = self.num_resources();
        if let Some(&resource) = op.resources().iter().find(|&&r| r >= declared) {
            return Err(ProgramError::UnknownResource { resource, declared });
        }
        let id = self.ops.len() as OpId;
        self.ops.push(op);
        self.durations.push(OnceLock::new());
        Ok(id)
    }

    pub fn gate(&mut self, name: &str, resources: &[ResourceId]) -> Result<OpId, ProgramError> {
        self.push(Operation::gate(name, resources))
    }

    pub fn delay(&mut self, ticks: Tick, resource: ResourceId) -> Result<OpId, ProgramError> {
        self.push(Operation::delay(ticks, resource))
    }

    pub fn barrier(&mut self, resources: &[ResourceId]) -> Result<OpId, ProgramError> {
        self.push(Operation::barrier(resources))
    }

    /// Require `before` to finish before `after` starts.
    pub fn depend(&mut self, before: OpId, after: OpId) -> Result<(), ProgramError> {
        for id in [before, after] {
            if id as usize >= self.ops.len() {
                return Err(ProgramError::UnknownOperation(id));
            }
        }
        if before == after {
            return Err(ProgramError::SelfDependency(before));
        }
        if !self.dependencies.contains(&(before, after)) {
            self.dependencies.push((before, after));
        }
        Ok(())
    }

    /// Describe why this program is not over concrete, disjoint resources.
    pub fn physical_violation(&self) -> Option<String> {
        if !self.layout.is_physical() {
            return Some(format!(
                "program '{}' declares {} resource registers, expected exactly one",
                self.name,
                self.layout.registers().len()
            ));
        }
        self.iter()
            .find(|(_, op)| op.has_repeated_resource())
            .map(|(id, op)| {
                format!(
                    "operation {} ('{}') names a resource twice: {:?}",
                    id,
                    op.name(),
                    op.resources()
                )
            })
    }

    /// Cached duration of an operation, if some pass already resolved it.
    pub fn resolved_duration(&self, id: OpId) -> Option<Tick> {
        self.durations[id as usize].get().map(|(ticks, _)| *ticks)
    }

    /// Store a resolved duration. The first write wins; returns the stored value.
    pub fn record_duration(&self, id: OpId, ticks: Tick) -> Tick {
        self.durations[id as usize].get_or_init(|| (ticks, None)).0
    }

    /// Resolve (and cache) the duration of an operation.
    ///
    /// A rounding anomaly raised by the first resolution is reported to
    /// `sink` on every call, so each schedule of the program carries it.
    pub fn resolve_duration<S>(
        &self,
        id: OpId,
        table: &DurationTable,
        sink: &mut S,
    ) -> Result<Tick, DurationError>
    where
        S: WarningSink + ?Sized,
    {
        let slot = &self.durations[id as usize];
        let (ticks, anomaly) = match slot.get() {
            Some(resolved) => resolved,
            None => {
                let mut raised: Vec<RoundingAnomaly> = Vec::new();
                let ticks = table.resolve(self.op(id), &mut raised)?;
                slot.get_or_init(|| (ticks, raised.pop()))
            }
        };
        if let Some(anomaly) = anomaly {
            sink.warn(anomaly.clone());
        }
        Ok(*ticks)
    }

    /// Build a program with the same layout from operations that already
    /// carry resolved durations.
    pub(crate) fn from_resolved(
        name: String,
        layout: ResourceLayout,
        ops: Vec<(Operation, Tick)>,
        dependencies: Vec<(OpId, OpId)>,
    ) -> Self {
        let mut program = Self::new(name, layout);
        for (op, ticks) in ops {
            program.ops.push(op);
            program.durations.push(OnceLock::from((ticks, None)));
        }
        program.dependencies = dependencies;
        program
    }
}
