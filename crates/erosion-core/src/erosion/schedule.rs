//! Stage table and the even/odd buffer binding schedule.
//!
//! Every stage reads the current slot of each field and writes the opposite
//! slot of the fields it produces, which then becomes current. Walking the
//! stage list once per parity yields a fixed binding table; at run time an
//! iteration only looks up `passes[i & 1]`.
//!
//! A field written an odd number of times per iteration alternates its
//! starting slot with parity (even iterations read A, odd read B); a field
//! written an even number of times always starts in A.
use crate::grid::Slot;

pub const FIELD_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Terrain,
    Water,
    Sediment,
    Velocity,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [Field::Terrain, Field::Water, Field::Sediment, Field::Velocity];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Field::Terrain  => 0,
            Field::Water    => 1,
            Field::Sediment => 2,
            Field::Velocity => 3,
        }
    }
}

/// The six hydraulic stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Water,
    Flow,
    Erosion,
    Transport,
    Deposition,
    Evaporation,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Water,
        Stage::Flow,
        Stage::Erosion,
        Stage::Transport,
        Stage::Deposition,
        Stage::Evaporation,
    ];

    /// Fields this stage writes.
    pub fn writes(self) -> &'static [Field] {
        match self {
            Stage::Water       => &[Field::Water],
            Stage::Flow        => &[Field::Velocity],
            Stage::Erosion     => &[Field::Terrain, Field::Sediment],
            Stage::Transport   => &[Field::Water, Field::Sediment],
            Stage::Deposition  => &[Field::Terrain, Field::Sediment],
            Stage::Evaporation => &[Field::Water],
        }
    }

    /// Instrumentation labels, parallel to [`Stage::writes`].
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Stage::Water       => &["pass1_water"],
            Stage::Flow        => &["pass2_velocity"],
            Stage::Erosion     => &["pass3_terrain", "pass3_sediment"],
            Stage::Transport   => &["pass4_water", "pass4_sediment"],
            Stage::Deposition  => &["pass5_terrain", "pass5_sediment"],
            Stage::Evaporation => &["pass6_water"],
        }
    }
}

/// Slot roles for one stage of one iteration parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBinding {
    pub stage: Stage,
    read: [Slot; FIELD_COUNT],
}

impl StageBinding {
    /// Slot holding the current value of `field` when this stage starts.
    #[inline]
    pub fn read(&self, field: Field) -> Slot {
        self.read[field.index()]
    }

    /// Slot this stage writes for `field` (only meaningful for written fields).
    #[inline]
    pub fn write(&self, field: Field) -> Slot {
        self.read(field).other()
    }
}

/// Binding table for both parities, built once per resize.
#[derive(Debug, Clone)]
pub struct BindingSchedule {
    passes: [Vec<StageBinding>; 2],
    writes_per_iteration: [u32; FIELD_COUNT],
}

impl BindingSchedule {
    pub fn new(stages: &[Stage]) -> Self {
        let mut writes_per_iteration = [0u32; FIELD_COUNT];
        for stage in stages {
            for f in stage.writes() {
                writes_per_iteration[f.index()] += 1;
            }
        }

        let build = |parity: usize| {
            let mut current = [Slot::A; FIELD_COUNT];
            for f in Field::ALL {
                current[f.index()] = Slot::from_parity(parity * (writes_per_iteration[f.index()] as usize & 1));
            }
            let mut pass = Vec::with_capacity(stages.len());
            for &stage in stages {
                pass.push(StageBinding { stage, read: current });
                for f in stage.writes() {
                    current[f.index()] = current[f.index()].other();
                }
            }
            pass
        };

        Self { passes: [build(0), build(1)], writes_per_iteration }
    }

    /// Bindings for iteration `iteration` (selected by its parity).
    pub fn for_iteration(&self, iteration: u32) -> &[StageBinding] {
        &self.passes[(iteration & 1) as usize]
    }

    /// Slot holding the final value of `field` after `completed` iterations.
    pub fn authoritative(&self, field: Field, completed: u32) -> Slot {
        Slot::from_parity(((completed & 1) * (self.writes_per_iteration[field.index()] & 1)) as usize)
    }
}
