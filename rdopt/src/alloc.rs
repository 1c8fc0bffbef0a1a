//! Allocation and reduction vectors.
//!
//! Both are plain value objects: every candidate carries its own copy, and
//! the best candidate of a run owns a deep copy decoupled from whatever the
//! search mutates next.

use std::fmt::Display;

/// Quality layers requested per subband.
///
/// Entries are ordered low to high temporal frequency for the textures,
/// followed by one entry per motion field. Within one search run, accepted
/// allocations only ever grow entrywise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation(Vec<usize>);

impl Allocation {
    pub fn new(entries: Vec<usize>) -> Self {
        Self(entries)
    }

    pub fn zeros(subbands: usize) -> Self {
        Self(vec![0; subbands])
    }

    pub fn entries(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, z: usize) -> usize {
        self.0[z]
    }

    pub fn set(&mut self, z: usize, layers: usize) {
        self.0[z] = layers;
    }

    /// True for the zero-allocation baseline candidate.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&l| l == 0)
    }

    pub fn contains_zero(&self) -> bool {
        self.0.iter().any(|&l| l == 0)
    }

    /// Index of the first entry differing from zero, if any.
    pub fn first_nonzero(&self) -> Option<usize> {
        self.0.iter().position(|&l| l != 0)
    }
}

impl Display for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{joined}")
    }
}

/// Spatial-resolution levels discarded per subband.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction(Vec<usize>);

impl Reduction {
    pub fn new(entries: Vec<usize>) -> Self {
        Self(entries)
    }

    pub fn zeros(subbands: usize) -> Self {
        Self(vec![0; subbands])
    }

    pub fn entries(&self) -> &[usize] {
        &self.0
    }

    pub fn get(&self, z: usize) -> usize {
        self.0[z]
    }

    pub fn set(&mut self, z: usize, levels: usize) {
        self.0[z] = levels;
    }

    /// Sets all texture entries (the first `trls`) to `levels`. Textures are
    /// reduced together; motion fields independently.
    pub fn set_textures(&mut self, trls: usize, levels: usize) {
        for entry in &mut self.0[..trls] {
            *entry = levels;
        }
    }

    /// Clamps every entry to the per-subband maximum. Idempotent.
    pub fn normalized(&self, limits: &Reduction) -> Reduction {
        Reduction(
            self.0
                .iter()
                .zip(&limits.0)
                .map(|(&r, &max)| r.min(max))
                .collect(),
        )
    }

    /// Bumps every nonzero entry by one, so that the first consumption step
    /// of the full search lands back on the requested value.
    pub fn denormalized(&self) -> Reduction {
        Reduction(
            self.0
                .iter()
                .map(|&r| if r > 0 { r + 1 } else { r })
                .collect(),
        )
    }
}

impl Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{joined}")
    }
}

/// One unit of evaluation: a layer allocation with its reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub layers: Allocation,
    pub reduces: Reduction,
}

impl Candidate {
    pub fn new(layers: Allocation, reduces: Reduction) -> Self {
        Self { layers, reduces }
    }
}
