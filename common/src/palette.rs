//! Deterministic per-class colors.
//!
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Number of colors in the palette, one per COCO class.
pub const PALETTE_SIZE: usize = 80;

/// Seed the palette is drawn from.
pub const PALETTE_SEED: u64 = 42;

/// Fixed sequence of RGB colors, indexed by class id modulo its length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Create the default palette of `PALETTE_SIZE` colors seeded with `PALETTE_SEED`.
    pub fn new() -> Self {
        Self::with_seed(PALETTE_SEED, PALETTE_SIZE)
    }

    /// Create a palette of `size` colors from a seed.
    ///
    /// The same seed and size always yield the same colors.
    pub fn with_seed(seed: u64, size: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let colors = (0..size.max(1)).map(|_| rng.gen::<[u8; 3]>()).collect();

        Self { colors }
    }

    /// Color of a class.
    pub fn color(&self, class_id: usize) -> [u8; 3] {
        self.colors[class_id % self.colors.len()]
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}
