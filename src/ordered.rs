//! Ordered (threshold matrix) dithering.
//!
//! Every pixel gets a bias that depends only on its position, so pixels can be
//! mapped in any order and on any thread.
use crate::error::Error;
use crate::frame::{map_rows, Frame};
use crate::lut::LookupTable;
use crate::pal::{PalIndex, RGB};

/// No dithering at all, the matrix has no effect
pub const STRENGTH_MIN: f32 = 0.;
pub const STRENGTH_NORMAL: f32 = 1.;
pub const STRENGTH_MAX: f32 = 2.;

/// Threshold values tiled over the frame, with the threshold they're relative to.
#[derive(Clone, Debug, PartialEq)]
pub struct DitherMatrix {
    cells: Vec<u32>,
    width: usize,
    height: usize,
    max: u32,
    strength: f32,
}

impl DitherMatrix {
    /// `rows` must be non-empty and all of the same non-zero length. `max` must be above zero.
    ///
    /// Strength starts at [`STRENGTH_NORMAL`].
    pub fn new(rows: &[Vec<u32>], max: u32) -> Result<Self, Error> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if width == 0 {
            return Err(Error::ValueOutOfRange("dither matrix must have at least one cell"));
        }
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::ValueOutOfRange("dither matrix rows must all have the same length"));
        }
        Self::from_cells(rows.concat(), width, height, max)
    }

    /// Row-major cells, `width * height` of them
    pub fn from_cells(cells: Vec<u32>, width: usize, height: usize, max: u32) -> Result<Self, Error> {
        if width == 0 || height == 0 || width.checked_mul(height) != Some(cells.len()) {
            return Err(Error::ValueOutOfRange("dither matrix cells don't match its dimensions"));
        }
        if max == 0 {
            return Err(Error::ValueOutOfRange("dither matrix max must be above 0"));
        }
        Ok(Self { cells, width, height, max, strength: STRENGTH_NORMAL })
    }

    /// 0 to 2. Multiplies every bias.
    pub fn set_strength(&mut self, strength: f32) -> Result<(), Error> {
        if !(STRENGTH_MIN..=STRENGTH_MAX).contains(&strength) {
            return Err(Error::ValueOutOfRange("dither strength must be between 0 and 2"));
        }
        self.strength = strength;
        Ok(())
    }

    pub fn with_strength(mut self, strength: f32) -> Result<Self, Error> {
        self.set_strength(strength)?;
        Ok(self)
    }

    /// Recursive Bayer matrix with values `0..size²`. Size must be a power of two, up to 64.
    pub fn bayer(size: usize) -> Result<Self, Error> {
        if !size.is_power_of_two() || size > 64 {
            return Err(Error::ValueOutOfRange("bayer matrix size must be a power of two up to 64"));
        }
        let mut cells = vec![0u32];
        let mut n = 1;
        while n < size {
            let mut next = vec![0; n * n * 4];
            for y in 0..n {
                for x in 0..n {
                    let v = cells[y * n + x] * 4;
                    next[y * 2 * n + x] = v;
                    next[y * 2 * n + x + n] = v + 2;
                    next[(y + n) * 2 * n + x] = v + 3;
                    next[(y + n) * 2 * n + x + n] = v + 1;
                }
            }
            cells = next;
            n *= 2;
        }
        Self::from_cells(cells, size, size, (size * size) as u32)
    }

    fn preset(rows: &[&[u32]], max: u32) -> Self {
        let width = rows[0].len();
        Self {
            cells: rows.concat(),
            width,
            height: rows.len(),
            max,
            strength: STRENGTH_NORMAL,
        }
    }

    #[must_use]
    pub fn bayer_2x2() -> Self {
        Self::preset(&[&[1, 3], &[4, 2]], 4)
    }

    #[must_use]
    pub fn bayer_4x4() -> Self {
        Self::preset(&[&[1, 9, 3, 11], &[13, 5, 15, 7], &[4, 12, 2, 10], &[16, 8, 14, 6]], 16)
    }

    #[must_use]
    pub fn bayer_8x8() -> Self {
        Self::preset(&[
            &[1, 49, 13, 61, 4, 52, 16, 64],
            &[33, 17, 45, 29, 36, 20, 48, 32],
            &[9, 57, 5, 53, 12, 60, 8, 56],
            &[41, 25, 37, 21, 44, 28, 40, 24],
            &[3, 51, 15, 63, 2, 50, 14, 62],
            &[35, 19, 47, 31, 34, 18, 46, 30],
            &[11, 59, 7, 55, 10, 58, 6, 54],
            &[43, 27, 39, 23, 42, 26, 38, 22],
        ], 64)
    }

    #[must_use]
    pub fn clustered_dot_6x6() -> Self {
        Self::preset(&[
            &[34, 29, 17, 21, 30, 35],
            &[28, 14, 9, 16, 20, 31],
            &[13, 8, 4, 5, 15, 19],
            &[12, 3, 0, 1, 10, 18],
            &[27, 7, 2, 6, 23, 24],
            &[33, 26, 11, 22, 25, 32],
        ], 36)
    }

    #[must_use]
    pub fn clustered_dot_8x8() -> Self {
        Self::preset(&[
            &[3, 9, 17, 27, 25, 15, 7, 1],
            &[11, 29, 38, 46, 44, 36, 23, 5],
            &[19, 40, 52, 58, 56, 50, 34, 13],
            &[31, 48, 60, 63, 62, 54, 42, 21],
            &[30, 47, 59, 63, 61, 53, 41, 20],
            &[18, 39, 51, 57, 55, 49, 33, 12],
            &[10, 28, 37, 45, 43, 35, 22, 4],
            &[2, 8, 16, 26, 24, 14, 6, 0],
        ], 64)
    }

    #[must_use]
    pub fn spiral_5x5() -> Self {
        Self::preset(&[
            &[20, 21, 22, 23, 24],
            &[19, 6, 7, 8, 9],
            &[18, 5, 0, 1, 10],
            &[17, 4, 3, 2, 11],
            &[16, 15, 14, 13, 12],
        ], 25)
    }

    #[must_use]
    pub fn horizontal_line() -> Self {
        Self::preset(&[
            &[35, 33, 31, 30, 32, 34],
            &[23, 21, 19, 18, 20, 22],
            &[11, 9, 7, 6, 8, 10],
            &[5, 3, 1, 0, 2, 4],
            &[17, 15, 13, 12, 14, 16],
            &[29, 27, 25, 24, 26, 28],
        ], 36)
    }

    #[must_use]
    pub fn vertical_line() -> Self {
        Self::preset(&[
            &[35, 23, 11, 5, 17, 29],
            &[33, 21, 9, 3, 15, 27],
            &[31, 19, 7, 1, 13, 25],
            &[30, 18, 6, 0, 12, 24],
            &[32, 20, 8, 2, 14, 26],
            &[34, 22, 10, 4, 16, 28],
        ], 36)
    }

    #[must_use]
    pub fn clustered_dot_4x4() -> Self {
        Self::preset(&[&[12, 5, 6, 13], &[4, 0, 1, 7], &[11, 3, 2, 8], &[15, 10, 9, 14]], 16)
    }

    /// "Central white point" variant of [`DitherMatrix::clustered_dot_6x6`]
    #[must_use]
    pub fn clustered_dot_6x6_2() -> Self {
        Self::preset(&[
            &[34, 25, 21, 17, 29, 33],
            &[30, 13, 9, 5, 12, 24],
            &[18, 6, 1, 0, 8, 20],
            &[22, 10, 2, 3, 4, 16],
            &[26, 14, 7, 11, 15, 28],
            &[35, 31, 19, 23, 27, 32],
        ], 36)
    }

    /// "Balanced centered point" variant of [`DitherMatrix::clustered_dot_6x6`]
    #[must_use]
    pub fn clustered_dot_6x6_3() -> Self {
        Self::preset(&[
            &[30, 22, 16, 21, 33, 35],
            &[24, 11, 7, 9, 26, 28],
            &[13, 5, 0, 2, 14, 19],
            &[15, 3, 1, 4, 12, 18],
            &[27, 8, 6, 10, 25, 29],
            &[32, 20, 17, 23, 31, 34],
        ], 36)
    }

    /// Dots on a 45° grid, 19 levels
    #[must_use]
    pub fn clustered_dot_diagonal_6x6() -> Self {
        Self::preset(&[
            &[8, 6, 7, 9, 11, 10],
            &[5, 0, 1, 12, 17, 16],
            &[4, 3, 2, 13, 14, 15],
            &[9, 11, 10, 8, 6, 7],
            &[12, 17, 16, 5, 0, 1],
            &[13, 14, 15, 4, 3, 2],
        ], 18)
    }

    /// Newspaper-style halftone on a 45° grid
    #[must_use]
    pub fn clustered_dot_diagonal_8x8() -> Self {
        Self::preset(&[
            &[24, 10, 12, 26, 35, 47, 49, 37],
            &[8, 0, 2, 14, 45, 59, 61, 51],
            &[22, 6, 4, 16, 43, 57, 63, 53],
            &[30, 20, 18, 28, 33, 41, 55, 39],
            &[34, 46, 48, 36, 25, 11, 13, 27],
            &[44, 58, 60, 50, 9, 1, 3, 15],
            &[42, 56, 62, 52, 23, 7, 5, 17],
            &[32, 40, 54, 38, 31, 21, 19, 29],
        ], 64)
    }

    /// Like [`DitherMatrix::clustered_dot_diagonal_8x8`] with fewer levels
    #[must_use]
    pub fn clustered_dot_diagonal_8x8_2() -> Self {
        Self::preset(&[
            &[13, 11, 12, 15, 18, 20, 19, 16],
            &[4, 3, 2, 9, 27, 28, 29, 22],
            &[5, 0, 1, 10, 26, 31, 30, 21],
            &[8, 6, 7, 14, 23, 25, 24, 17],
            &[18, 20, 19, 16, 13, 11, 12, 15],
            &[27, 28, 29, 22, 4, 3, 2, 9],
            &[26, 31, 30, 21, 5, 0, 1, 10],
            &[23, 25, 24, 17, 8, 6, 7, 14],
        ], 32)
    }

    #[must_use]
    pub fn clustered_dot_diagonal_8x8_3() -> Self {
        Self::preset(&[
            &[13, 9, 5, 12, 18, 22, 26, 19],
            &[6, 1, 0, 8, 25, 30, 31, 23],
            &[10, 2, 3, 4, 21, 29, 28, 27],
            &[14, 7, 11, 15, 17, 24, 20, 16],
            &[18, 22, 26, 19, 13, 9, 5, 12],
            &[25, 30, 31, 23, 6, 1, 0, 8],
            &[21, 29, 28, 27, 10, 2, 3, 4],
            &[17, 24, 20, 16, 14, 7, 11, 15],
        ], 32)
    }

    /// 129 levels
    #[must_use]
    pub fn clustered_dot_diagonal_16x16() -> Self {
        Self::preset(&[
            &[63, 58, 50, 40, 41, 51, 59, 60, 64, 69, 77, 87, 86, 76, 68, 67],
            &[57, 33, 27, 18, 19, 28, 34, 52, 70, 94, 100, 109, 108, 99, 93, 75],
            &[49, 26, 13, 11, 12, 15, 29, 44, 78, 101, 114, 116, 115, 112, 98, 83],
            &[39, 17, 4, 3, 2, 9, 20, 42, 88, 110, 123, 124, 125, 118, 107, 85],
            &[38, 16, 5, 0, 1, 10, 21, 43, 89, 111, 122, 127, 126, 117, 106, 84],
            &[48, 25, 8, 6, 7, 14, 30, 45, 79, 102, 119, 121, 120, 113, 97, 82],
            &[56, 32, 24, 23, 22, 31, 35, 53, 71, 95, 103, 104, 105, 96, 92, 74],
            &[62, 55, 47, 37, 36, 46, 54, 61, 65, 72, 80, 90, 91, 81, 73, 66],
            &[64, 69, 77, 87, 86, 76, 68, 67, 63, 58, 50, 40, 41, 51, 59, 60],
            &[70, 94, 100, 109, 108, 99, 93, 75, 57, 33, 27, 18, 19, 28, 34, 52],
            &[78, 101, 114, 116, 115, 112, 98, 83, 49, 26, 13, 11, 12, 15, 29, 44],
            &[88, 110, 123, 124, 125, 118, 107, 85, 39, 17, 4, 3, 2, 9, 20, 42],
            &[89, 111, 122, 127, 126, 117, 106, 84, 38, 16, 5, 0, 1, 10, 21, 43],
            &[79, 102, 119, 121, 120, 113, 97, 82, 48, 25, 8, 6, 7, 14, 30, 45],
            &[71, 95, 103, 104, 105, 96, 92, 74, 56, 32, 24, 23, 22, 31, 35, 53],
            &[65, 72, 80, 90, 91, 81, 73, 66, 62, 55, 47, 37, 36, 46, 54, 61],
        ], 128)
    }

    /// 5 wide, 3 tall. Leaves vertical streaks.
    #[must_use]
    pub fn vertical_5x3() -> Self {
        Self::preset(&[&[9, 3, 0, 6, 12], &[10, 4, 1, 7, 13], &[11, 5, 2, 8, 14]], 15)
    }

    /// [`DitherMatrix::vertical_5x3`] turned on its side
    #[must_use]
    pub fn horizontal_3x5() -> Self {
        Self::preset(&[&[9, 10, 11], &[3, 4, 5], &[0, 1, 2], &[6, 7, 8], &[12, 13, 14]], 15)
    }

    /// Built-in matrix by its config name
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        Some(match name {
            "bayer-2x2" => Self::bayer_2x2(),
            "bayer-4x4" => Self::bayer_4x4(),
            "bayer-8x8" => Self::bayer_8x8(),
            "clustered-dot-6x6" => Self::clustered_dot_6x6(),
            "clustered-dot-8x8" => Self::clustered_dot_8x8(),
            "spiral-5x5" => Self::spiral_5x5(),
            "horizontal-line" => Self::horizontal_line(),
            "vertical-line" => Self::vertical_line(),
            "clustered-dot-4x4" => Self::clustered_dot_4x4(),
            "clustered-dot-6x6-2" => Self::clustered_dot_6x6_2(),
            "clustered-dot-6x6-3" => Self::clustered_dot_6x6_3(),
            "clustered-dot-diagonal-6x6" => Self::clustered_dot_diagonal_6x6(),
            "clustered-dot-diagonal-8x8" => Self::clustered_dot_diagonal_8x8(),
            "clustered-dot-diagonal-8x8-2" => Self::clustered_dot_diagonal_8x8_2(),
            "clustered-dot-diagonal-8x8-3" => Self::clustered_dot_diagonal_8x8_3(),
            "clustered-dot-diagonal-16x16" => Self::clustered_dot_diagonal_16x16(),
            "vertical-5x3" => Self::vertical_5x3(),
            "horizontal-3x5" => Self::horizontal_3x5(),
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[inline]
    #[must_use]
    pub fn strength(&self) -> f32 {
        self.strength
    }

    #[inline]
    #[must_use]
    pub fn cell(&self, x: usize, y: usize) -> u32 {
        self.cells[(y % self.height) * self.width + x % self.width]
    }
}

/// A [`DitherMatrix`] turned into additive biases, ready to map frames
#[derive(Clone, Debug)]
pub struct OrderedDither {
    biases: Vec<f32>,
    width: usize,
    height: usize,
}

impl OrderedDither {
    /// `bias = 65535 × strength × ((cell + 1) / max − 0.5)`
    #[must_use]
    pub fn new(matrix: &DitherMatrix) -> Self {
        let scale = 65535. * f64::from(matrix.strength);
        let max = f64::from(matrix.max);
        let biases = matrix.cells.iter()
            .map(|&v| (scale * ((f64::from(v) + 1.) / max - 0.5)) as f32)
            .collect();
        Self { biases, width: matrix.width, height: matrix.height }
    }

    /// Bias for a frame position, tiled
    #[inline(always)]
    #[must_use]
    pub fn bias(&self, x: usize, y: usize) -> f32 {
        self.biases[(y % self.height) * self.width + x % self.width]
    }

    /// Some cell pushes every channel to 0 or 255, whatever the pixel's color
    #[must_use]
    pub fn saturates(&self) -> bool {
        self.biases.iter().any(|b| b.abs() >= 255.)
    }

    /// The same bias is added to all three channels, then they're clamped and truncated
    #[inline(always)]
    #[must_use]
    pub fn biased(&self, px: RGB, x: usize, y: usize) -> RGB {
        let bias = self.bias(x, y);
        let apply = |c: u8| (f32::from(c) + bias).clamp(0., 255.) as u8;
        RGB::new(apply(px.r), apply(px.g), apply(px.b))
    }

    /// Maps every pixel independently, rows spread across the thread pool.
    ///
    /// `output` must hold at least `width * height` indices. Fully transparent pixels become `transparent_index` if it's set.
    pub fn remap(&self, lut: &LookupTable, frame: &Frame<'_>, transparent_index: Option<PalIndex>, output: &mut [PalIndex]) -> Result<(), Error> {
        map_rows(frame, output, |x, y, px| {
            match transparent_index {
                Some(idx) if px.a == 0 => idx,
                _ => lut.lookup(self.biased(RGB::new(px.r, px.g, px.b), x, y)),
            }
        })
    }
}

#[test]
fn rejects_bad_matrices() {
    assert!(DitherMatrix::new(&[], 4).is_err());
    assert!(DitherMatrix::new(&[vec![]], 4).is_err());
    assert!(DitherMatrix::new(&[vec![1, 2], vec![3]], 4).is_err());
    assert!(DitherMatrix::new(&[vec![1, 2]], 0).is_err());
    assert!(DitherMatrix::from_cells(vec![1], usize::MAX, 2, 4).is_err());
    assert!(DitherMatrix::from_cells(vec![1, 2, 3], 2, 2, 4).is_err());
    assert!(DitherMatrix::from_cells(vec![1, 2, 3, 4], 2, 2, 4).is_ok());
    let m = DitherMatrix::new(&[vec![1, 2]], 2).unwrap();
    assert!(m.clone().with_strength(-0.1).is_err());
    assert!(m.clone().with_strength(2.01).is_err());
    assert_eq!(m.with_strength(2.).unwrap().strength(), 2.);
}

#[test]
fn bayer_generator() {
    let two = DitherMatrix::bayer(2).unwrap();
    assert_eq!((two.cell(0, 0), two.cell(1, 0), two.cell(0, 1), two.cell(1, 1)), (0, 2, 3, 1));
    let eight = DitherMatrix::bayer(8).unwrap();
    assert_eq!(eight.max(), 64);
    let mut seen: Vec<_> = (0..64).map(|i| eight.cell(i % 8, i / 8)).collect();
    seen.sort_unstable();
    assert!(seen.iter().copied().eq(0..64));
    assert!(DitherMatrix::bayer(3).is_err());
    assert!(DitherMatrix::bayer(0).is_err());
}

#[test]
fn presets() {
    let names = [
        "bayer-2x2", "bayer-4x4", "bayer-8x8", "clustered-dot-4x4", "clustered-dot-6x6", "clustered-dot-6x6-2", "clustered-dot-6x6-3",
        "clustered-dot-8x8", "clustered-dot-diagonal-6x6", "clustered-dot-diagonal-8x8", "clustered-dot-diagonal-8x8-2",
        "clustered-dot-diagonal-8x8-3", "clustered-dot-diagonal-16x16", "spiral-5x5", "horizontal-line", "vertical-line",
        "vertical-5x3", "horizontal-3x5",
    ];
    for name in names {
        let m = DitherMatrix::named(name).unwrap();
        assert_eq!(m.cells.len(), m.width() * m.height(), "{name}");
        assert!(m.cells.iter().all(|&c| c <= m.max()), "{name}");
        assert_eq!(DitherMatrix::from_cells(m.cells.clone(), m.width(), m.height(), m.max()).unwrap(), m, "{name}");
    }
    let v = DitherMatrix::vertical_5x3();
    assert_eq!((v.width(), v.height()), (5, 3));
    let h = DitherMatrix::horizontal_3x5();
    assert_eq!((h.width(), h.height()), (3, 5));
    // every level of the 16×16 halftone shows up
    let mut seen = DitherMatrix::clustered_dot_diagonal_16x16().cells;
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 128);
    assert!(DitherMatrix::named("bayer-3x3").is_none());
}

#[test]
fn biases() {
    let m = DitherMatrix::bayer_2x2().with_strength(0.).unwrap();
    let d = OrderedDither::new(&m);
    assert!((0..4).all(|i| d.bias(i, i / 2) == 0.));
    assert!(!d.saturates());
    assert!(!OrderedDither::new(&DitherMatrix::bayer_4x4().with_strength(0.003).unwrap()).saturates());

    let m = DitherMatrix::new(&[vec![1, 3]], 4).unwrap().with_strength(0.01).unwrap();
    let d = OrderedDither::new(&m);
    // 655.35 × (0.5 − 0.5) and 655.35 × (1 − 0.5)
    assert_eq!(d.bias(0, 0), 0.);
    assert!((d.bias(1, 0) - 327.675).abs() < 0.01);
    assert_eq!(d.bias(2, 5), d.bias(0, 0));
    assert_eq!(d.biased(RGB::new(10, 100, 200), 1, 0), RGB::new(255, 255, 255));
    assert_eq!(d.biased(RGB::new(10, 100, 200), 0, 0), RGB::new(10, 100, 200));

    assert!(OrderedDither::new(&DitherMatrix::bayer_4x4()).saturates());
}
