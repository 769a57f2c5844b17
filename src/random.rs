//! Random (white noise) dithering.
//!
//! The noise for a pixel is a hash of the seed and the pixel's position, so like
//! ordered dithering every pixel is independent, and the same frame always maps the same way.
use crate::error::Error;
use crate::frame::{map_rows, Frame};
use crate::lut::LookupTable;
use crate::pal::{PalIndex, RGB};

/// Largest noise amplitude. Beyond that every channel can be pushed across its whole range.
pub const MAX_NOISE_WEIGHT: u32 = 255;

/// Uniform noise in `-weight..=weight` added to every channel separately
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RandomDither {
    weight: u32,
    seed: u64,
}

impl RandomDither {
    pub const LIGHT_WEIGHT: u32 = 32;
    pub const NORMAL_WEIGHT: u32 = 64;
    pub const HEAVY_WEIGHT: u32 = 128;

    /// Seed 0. `weight` can be at most [`MAX_NOISE_WEIGHT`].
    pub fn new(weight: u32) -> Result<Self, Error> {
        if weight > MAX_NOISE_WEIGHT {
            return Err(Error::ValueOutOfRange("noise weight must be between 0 and 255"));
        }
        Ok(Self { weight, seed: 0 })
    }

    /// Frames mapped with different seeds get unrelated noise
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn light() -> Self {
        Self { weight: Self::LIGHT_WEIGHT, seed: 0 }
    }

    #[must_use]
    pub fn normal() -> Self {
        Self { weight: Self::NORMAL_WEIGHT, seed: 0 }
    }

    #[must_use]
    pub fn heavy() -> Self {
        Self { weight: Self::HEAVY_WEIGHT, seed: 0 }
    }

    /// `light`, `normal` or `heavy`
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        Some(match name {
            "light" => Self::light(),
            "normal" => Self::normal(),
            "heavy" => Self::heavy(),
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Noise for the red, green and blue channel of the pixel at `x`, `y`
    #[inline(always)]
    #[must_use]
    pub fn noise(&self, x: usize, y: usize) -> [i32; 3] {
        let pos = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (y as u64).wrapping_mul(0x6C8E_9CF5_7093_2BD5);
        let h = mix(self.seed.wrapping_add(pos));
        let span = u64::from(self.weight) * 2 + 1;
        let w = self.weight as i32;
        // 21 bits per channel, so the modulo bias is negligible
        [0, 21, 42].map(|shift| ((h >> shift) & 0x1F_FFFF) % span).map(|n| n as i32 - w)
    }

    #[inline(always)]
    #[must_use]
    pub fn noisy(&self, px: RGB, x: usize, y: usize) -> RGB {
        let [nr, ng, nb] = self.noise(x, y);
        let apply = |c: u8, n: i32| (i32::from(c) + n).clamp(0, 255) as u8;
        RGB::new(apply(px.r, nr), apply(px.g, ng), apply(px.b, nb))
    }

    /// Maps every pixel independently, rows spread across the thread pool
    pub fn remap(&self, lut: &LookupTable, frame: &Frame<'_>, transparent_index: Option<PalIndex>, output: &mut [PalIndex]) -> Result<(), Error> {
        map_rows(frame, output, |x, y, px| {
            match transparent_index {
                Some(idx) if px.a == 0 => idx,
                _ => lut.lookup(self.noisy(RGB::new(px.r, px.g, px.b), x, y)),
            }
        })
    }
}

/// splitmix64 finalizer
#[inline(always)]
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[test]
fn weights() {
    assert!(RandomDither::new(256).is_err());
    assert_eq!(RandomDither::new(255).unwrap().weight(), 255);
    assert_eq!(RandomDither::named("heavy"), Some(RandomDither::heavy()));
    assert_eq!(RandomDither::named("loud"), None);

    let zero = RandomDither::new(0).unwrap();
    assert!((0..50).all(|i| zero.noise(i, i * 3) == [0; 3]));
    assert_eq!(zero.noisy(RGB::new(1, 2, 3), 7, 7), RGB::new(1, 2, 3));
}

#[test]
fn noise_in_range() {
    let d = RandomDither::light().with_seed(42);
    let mut lo = [0; 3];
    let mut hi = [0; 3];
    for y in 0..64 {
        for x in 0..64 {
            let n = d.noise(x, y);
            assert_eq!(n, d.noise(x, y));
            for c in 0..3 {
                assert!((-32..=32).contains(&n[c]), "{n:?}");
                lo[c] = lo[c].min(n[c]);
                hi[c] = hi[c].max(n[c]);
            }
        }
    }
    // 4096 samples reach both ends of 65 values
    assert_eq!((lo, hi), ([-32; 3], [32; 3]));
    assert_ne!((0..16).map(|x| d.noise(x, 0)).collect::<Vec<_>>(), (0..16).map(|x| d.with_seed(43).noise(x, 0)).collect::<Vec<_>>());
}

#[test]
fn clamps() {
    let d = RandomDither::new(255).unwrap();
    for x in 0..32 {
        let px = d.noisy(RGB::new(0, 128, 255), x, 1);
        let n = d.noise(x, 1);
        assert_eq!(px.r, n[0].clamp(0, 255) as u8);
        assert_eq!(px.b, (255 + n[2]).clamp(0, 255) as u8);
    }
}
