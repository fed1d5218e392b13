//! Iteration domains and their partitioning.
//!
//! A [`Window`] is one `[start, end)` range with a step per tensor dimension,
//! outermost first. Starts may be negative: a window over a padded buffer
//! addresses the halo that way.
//!
//! # Partitioning
//!
//! [`Window::split`] cuts a window along one dimension into disjoint,
//! gap-free pieces. Every piece but the last spans a whole multiple of
//! `lcm(step, granularity)`; the last piece absorbs the remainder.
//!
//! ```rust
//! use briny_exec::window::Window;
//!
//! let w = Window::from_shape(&[10, 4]);
//! let parts = w.split(0, 3, 4);
//! let extents: Vec<usize> = parts.iter().map(|p| p.dim(0).extent()).collect();
//! assert_eq!(extents, vec![3, 3, 4]);
//! ```

use core::fmt;

/// One dimension of a [`Window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    start: isize,
    end: isize,
    step: usize,
}

impl Dimension {
    /// # Panics
    /// Panics if `step` is zero, `end < start`, or the extent is not a
    /// multiple of `step`.
    pub fn new(start: isize, end: isize, step: usize) -> Self {
        assert!(step > 0, "window step must be positive");
        assert!(end >= start, "window dimension [{start}, {end}) is reversed");
        assert!(
            (end - start).unsigned_abs() % step == 0,
            "window extent {} is not a multiple of step {step}",
            end - start
        );
        Self { start, end, step }
    }

    pub const fn start(&self) -> isize {
        self.start
    }

    pub const fn end(&self) -> isize {
        self.end
    }

    pub const fn step(&self) -> usize {
        self.step
    }

    /// `end - start`.
    pub const fn extent(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Number of positions visited along this dimension.
    pub const fn num_iterations(&self) -> usize {
        self.extent() / self.step
    }
}

/// Multi-dimensional iteration domain of one kernel invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Window {
    dims: Vec<Dimension>,
}

impl Window {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self { dims }
    }

    /// The window `[0, extent)` with unit step in every dimension.
    pub fn from_shape(shape: &[usize]) -> Self {
        Self {
            dims: shape
                .iter()
                .map(|&n| Dimension::new(0, n as isize, 1))
                .collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// # Panics
    /// Panics if `index >= rank`.
    pub fn dim(&self, index: usize) -> Dimension {
        self.dims[index]
    }

    /// The same window with dimension `index` replaced.
    ///
    /// # Panics
    /// Panics if `index >= rank`.
    #[must_use]
    pub fn with_dim(&self, index: usize, dim: Dimension) -> Self {
        let mut out = self.clone();
        out.dims[index] = dim;
        out
    }

    /// Total number of positions visited.
    pub fn num_iterations(&self) -> usize {
        self.dims.iter().map(Dimension::num_iterations).product()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|d| d.num_iterations() == 0)
    }

    /// Grows every dimension by `before[i]` and `after[i]` elements.
    ///
    /// Missing entries count as zero. Only unit-step dimensions may grow.
    ///
    /// # Panics
    /// Panics when a dimension with a non-unit step would be resized.
    pub fn expanded(&self, before: &[usize], after: &[usize]) -> Self {
        let dims = self
            .dims
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let lo = before.get(i).copied().unwrap_or(0);
                let hi = after.get(i).copied().unwrap_or(0);
                assert!(
                    d.step == 1 || (lo == 0 && hi == 0),
                    "cannot expand dimension {i} with step {}",
                    d.step
                );
                Dimension::new(d.start - lo as isize, d.end + hi as isize, d.step)
            })
            .collect();
        Self { dims }
    }

    /// Whether `coords` is one of the positions this window visits.
    pub fn contains(&self, coords: &[isize]) -> bool {
        coords.len() == self.dims.len()
            && self.dims.iter().zip(coords).all(|(d, &c)| {
                c >= d.start && c < d.end && (c - d.start).unsigned_abs() % d.step == 0
            })
    }

    /// Visits every position in row-major order (last dimension fastest).
    pub fn for_each(&self, mut f: impl FnMut(&[isize])) {
        if self.is_empty() {
            return;
        }
        let mut coords: Vec<isize> = self.dims.iter().map(|d| d.start).collect();
        loop {
            f(&coords);
            let mut axis = self.dims.len();
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                let d = &self.dims[axis];
                coords[axis] += d.step as isize;
                if coords[axis] < d.end {
                    break;
                }
                coords[axis] = d.start;
            }
        }
    }

    /// Outermost dimension with more than one position, or 0.
    pub fn preferred_split_dimension(&self) -> usize {
        self.dims
            .iter()
            .position(|d| d.num_iterations() > 1)
            .unwrap_or(0)
    }

    /// Cuts the window along `dim` into at most `max_parts` pieces.
    ///
    /// Pieces are returned in ascending order, are pairwise disjoint and
    /// cover the window exactly. All pieces but the last have an extent that
    /// is a multiple of `lcm(step, granularity)`. An empty window yields no
    /// pieces; a window shorter than one unit yields itself.
    ///
    /// # Panics
    /// Panics if `dim >= rank`.
    pub fn split(&self, dim: usize, granularity: usize, max_parts: usize) -> Vec<Self> {
        if self.is_empty() {
            return Vec::new();
        }
        let axis = self.dims[dim];
        let unit = lcm(axis.step, granularity.max(1));
        let units = axis.extent() / unit;
        let parts = max_parts.max(1).min(units.max(1));
        let chunk = (units / parts * unit) as isize;

        let mut pieces = Vec::with_capacity(parts);
        let mut start = axis.start;
        for i in 0..parts {
            let end = if i + 1 == parts { axis.end } else { start + chunk };
            let mut piece = self.clone();
            piece.dims[dim] = Dimension::new(start, end, axis.step);
            pieces.push(piece);
            start = end;
        }
        pieces
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}..{}", d.start, d.end)?;
            if d.step != 1 {
                write!(f, ":{}", d.step)?;
            }
        }
        f.write_str("]")
    }
}

const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

const fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}
