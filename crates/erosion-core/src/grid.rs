//! Square grid fields and their double-buffered pairs.
//!
//! Every field is row-major, `size × size`, with `size` a power of two.
//! Fields that are written by a stage live in a [`BufferPair`] with explicit
//! slots [`Slot::A`] and [`Slot::B`]; callers pick read/write roles by slot,
//! never by swapping references.

/// Largest supported edge length.
pub const MAX_GRID_SIZE: usize = 4096;

/// Velocity sample `(vx, vy)`.
pub type Vec2 = [f32; 2];

/// True if `size` is an accepted grid edge length.
pub fn is_valid_grid_size(size: usize) -> bool {
    size >= 2 && size <= MAX_GRID_SIZE && size.is_power_of_two()
}

/// A row-major `size × size` grid of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GridField<T> {
    pub data: Vec<T>,
    pub size: usize,
}

impl<T: Copy + Default> GridField<T> {
    /// Create a zero-filled (default-filled) grid.
    pub fn new(size: usize) -> Self {
        Self { data: vec![T::default(); size * size], size }
    }

    pub fn fill(&mut self, val: T) {
        self.data.iter_mut().for_each(|v| *v = val);
    }
}

/// Row-major index of `(row, col)` after clamping both to `[0, size)`.
#[inline]
pub(crate) fn clamped_index(size: usize, row: isize, col: isize) -> usize {
    let max = size as isize - 1;
    row.clamp(0, max) as usize * size + col.clamp(0, max) as usize
}

// ── Double buffering ──────────────────────────────────────────────────────────

/// One side of a double-buffered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    #[inline]
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Slot selected by an iteration parity (`0 → A`, `1 → B`).
    #[inline]
    pub fn from_parity(parity: usize) -> Slot {
        if parity & 1 == 0 { Slot::A } else { Slot::B }
    }
}

/// Two equally sized grids; slot A is authoritative between operations.
#[derive(Debug, Clone)]
pub struct BufferPair<T> {
    slots: [GridField<T>; 2],
}

impl<T: Copy + Default> BufferPair<T> {
    pub fn new(size: usize) -> Self {
        Self { slots: [GridField::new(size), GridField::new(size)] }
    }

    pub fn slot(&self, slot: Slot) -> &GridField<T> {
        &self.slots[slot.index()]
    }

    /// Borrow `read` immutably and the opposite slot mutably.
    pub fn split(&mut self, read: Slot) -> (&GridField<T>, &mut GridField<T>) {
        let [a, b] = &mut self.slots;
        match read {
            Slot::A => (&*a, b),
            Slot::B => (&*b, a),
        }
    }

    /// Copy `from` into the opposite slot so both agree.
    pub fn copy_across(&mut self, from: Slot) {
        let (src, dst) = self.split(from);
        dst.data.copy_from_slice(&src.data);
    }

    /// Overwrite both slots with `data`.
    pub fn load(&mut self, data: &[T]) {
        for s in &mut self.slots {
            s.data.copy_from_slice(data);
        }
    }

    pub fn fill(&mut self, val: T) {
        for s in &mut self.slots {
            s.fill(val);
        }
    }
}
