//! Error diffusion.
//!
//! Pixels are visited one at a time. Whatever the chosen palette color misses by
//! is split among pixels not visited yet, so this can't be spread over threads
//! within a frame. Separate frames are independent.
use crate::error::Error;
use crate::frame::Frame;
use crate::lut::LookupTable;
use crate::pal::{PalIndex, Palette, RGB};

/// Furthest row below the current one that a kernel may reach
pub const MAX_KERNEL_ROWS: u32 = 8;

/// One destination of the error: `weight / divisor` of it goes `dx` pixels along the row and `dy` rows down.
///
/// `dx` is given for left-to-right scanning and gets mirrored on rows scanned the other way.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tap {
    pub dx: i32,
    pub dy: u32,
    pub weight: i32,
}

impl Tap {
    #[must_use]
    pub const fn new(dx: i32, dy: u32, weight: i32) -> Self {
        Self { dx, dy, weight }
    }
}

/// Weights of error distribution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffusionKernel {
    taps: Vec<Tap>,
    divisor: i32,
    max_dy: u32,
}

impl DiffusionKernel {
    /// Every tap must point at a pixel that comes later in the scan (below, or to the right on the same row),
    /// and the weights may add up to at most `divisor`. Whatever they leave out is dropped.
    pub fn new(taps: &[Tap], divisor: i32) -> Result<Self, Error> {
        if divisor <= 0 {
            return Err(Error::ValueOutOfRange("kernel divisor must be above 0"));
        }
        let mut sum = 0i64;
        for tap in taps {
            if tap.dy == 0 && tap.dx <= 0 {
                return Err(Error::ValueOutOfRange("kernel taps must point at pixels that haven't been visited yet"));
            }
            if tap.dy > MAX_KERNEL_ROWS {
                return Err(Error::ValueOutOfRange("kernel reaches too many rows down"));
            }
            if tap.weight <= 0 {
                return Err(Error::ValueOutOfRange("kernel weights must be above 0"));
            }
            sum += i64::from(tap.weight);
        }
        if sum > i64::from(divisor) {
            return Err(Error::ValueOutOfRange("kernel weights add up to more than the divisor"));
        }
        Ok(Self {
            taps: taps.to_vec(),
            divisor,
            max_dy: taps.iter().map(|t| t.dy).max().unwrap_or(0),
        })
    }

    fn preset(taps: &[Tap], divisor: i32) -> Self {
        Self {
            taps: taps.to_vec(),
            divisor,
            max_dy: taps.iter().map(|t| t.dy).max().unwrap_or(0),
        }
    }

    /// Sierra "filter lite": half to the right, a quarter below and a quarter below-left
    #[must_use]
    pub fn filter_lite() -> Self {
        Self::preset(&[Tap::new(1, 0, 2), Tap::new(-1, 1, 1), Tap::new(0, 1, 1)], 4)
    }

    #[must_use]
    pub fn floyd_steinberg() -> Self {
        Self::preset(&[Tap::new(1, 0, 7), Tap::new(-1, 1, 3), Tap::new(0, 1, 5), Tap::new(1, 1, 1)], 16)
    }

    /// Spreads only 3/4 of the error, the rest is dropped
    #[must_use]
    pub fn atkinson() -> Self {
        Self::preset(&[
            Tap::new(1, 0, 1), Tap::new(2, 0, 1),
            Tap::new(-1, 1, 1), Tap::new(0, 1, 1), Tap::new(1, 1, 1),
            Tap::new(0, 2, 1),
        ], 8)
    }

    #[must_use]
    pub fn burkes() -> Self {
        Self::preset(&[
            Tap::new(1, 0, 8), Tap::new(2, 0, 4),
            Tap::new(-2, 1, 2), Tap::new(-1, 1, 4), Tap::new(0, 1, 8), Tap::new(1, 1, 4), Tap::new(2, 1, 2),
        ], 32)
    }

    #[must_use]
    pub fn stucki() -> Self {
        Self::preset(&[
            Tap::new(1, 0, 8), Tap::new(2, 0, 4),
            Tap::new(-2, 1, 2), Tap::new(-1, 1, 4), Tap::new(0, 1, 8), Tap::new(1, 1, 4), Tap::new(2, 1, 2),
            Tap::new(-2, 2, 1), Tap::new(-1, 2, 2), Tap::new(0, 2, 4), Tap::new(1, 2, 2), Tap::new(2, 2, 1),
        ], 42)
    }

    /// Jarvis, Judice and Ninke
    #[must_use]
    pub fn jarvis_judice_ninke() -> Self {
        Self::preset(&[
            Tap::new(1, 0, 7), Tap::new(2, 0, 5),
            Tap::new(-2, 1, 3), Tap::new(-1, 1, 5), Tap::new(0, 1, 7), Tap::new(1, 1, 5), Tap::new(2, 1, 3),
            Tap::new(-2, 2, 1), Tap::new(-1, 2, 3), Tap::new(0, 2, 5), Tap::new(1, 2, 3), Tap::new(2, 2, 1),
        ], 48)
    }

    /// Stevenson and Arce. Taps sit on a hexagonal grid, every other column, three rows down.
    #[must_use]
    pub fn stevenson_arce() -> Self {
        Self::preset(&[
            Tap::new(2, 0, 32),
            Tap::new(-3, 1, 12), Tap::new(-1, 1, 26), Tap::new(1, 1, 30), Tap::new(3, 1, 16),
            Tap::new(-2, 2, 12), Tap::new(0, 2, 26), Tap::new(2, 2, 12),
            Tap::new(-3, 3, 5), Tap::new(-1, 3, 12), Tap::new(1, 3, 12), Tap::new(3, 3, 5),
        ], 200)
    }

    /// Built-in kernel by its config name
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        Some(match name {
            "filter-lite" => Self::filter_lite(),
            "floyd-steinberg" => Self::floyd_steinberg(),
            "atkinson" => Self::atkinson(),
            "burkes" => Self::burkes(),
            "stucki" => Self::stucki(),
            "jarvis-judice-ninke" => Self::jarvis_judice_ninke(),
            "stevenson-arce" => Self::stevenson_arce(),
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub fn taps(&self) -> &[Tap] {
        &self.taps
    }

    #[inline]
    #[must_use]
    pub fn divisor(&self) -> i32 {
        self.divisor
    }

    /// How many rows below the current one receive error
    #[inline]
    #[must_use]
    pub fn max_dy(&self) -> u32 {
        self.max_dy
    }
}

impl Default for DiffusionKernel {
    fn default() -> Self {
        Self::filter_lite()
    }
}

/// Direction of travel along rows
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum ScanOrder {
    /// Every row left to right
    RowMajor,
    /// Even rows left to right, odd rows right to left
    #[default]
    Serpentine,
}

/// Signed error carried to pixels that haven't been visited yet.
///
/// Holds the current row and as many rows below it as the kernel reaches. It's zeroed
/// at the start of every frame, so one accumulator can be reused for any number of frames,
/// but never for two frames at once.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    cells: Vec<[i32; 3]>,
    width: usize,
    rows: usize,
    current: usize,
}

impl ErrorAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self, width: usize, rows: usize) -> Result<(), Error> {
        let len = width.checked_mul(rows).ok_or(Error::OutOfMemory)?;
        self.cells.clear();
        self.cells.try_reserve_exact(len)?;
        self.cells.resize(len, [0; 3]);
        self.width = width;
        self.rows = rows;
        self.current = 0;
        Ok(())
    }

    #[inline(always)]
    fn offset(&self, dy: usize, x: usize) -> usize {
        ((self.current + dy) % self.rows) * self.width + x
    }

    /// Removes the error carried to `x` of the current row
    #[inline(always)]
    fn take(&mut self, x: usize) -> [i32; 3] {
        let off = self.offset(0, x);
        std::mem::take(&mut self.cells[off])
    }

    #[inline(always)]
    fn add(&mut self, dy: usize, x: usize, err: [i32; 3]) {
        let off = self.offset(dy, x);
        let cell = &mut self.cells[off];
        cell[0] += err[0];
        cell[1] += err[1];
        cell[2] += err[2];
    }

    /// The current row's slot becomes the furthest row ahead
    fn next_row(&mut self) {
        let start = self.current * self.width;
        self.cells[start..start + self.width].fill([0; 3]);
        self.current = (self.current + 1) % self.rows;
    }
}

/// Error that didn't end up in any output pixel, per channel.
///
/// Covers taps that fall off the frame, remainders of integer division, weight the kernel
/// leaves out, and values clamped to 0-255. For the mapped pixels of a frame,
/// `Σ original − Σ output = discarded`, exactly.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Residual {
    pub discarded: [i64; 3],
    /// Pixels that went through diffusion (transparent ones don't)
    pub mapped_pixels: usize,
}

impl Residual {
    #[inline(always)]
    fn discard(&mut self, err: [i32; 3]) {
        self.discarded[0] += i64::from(err[0]);
        self.discarded[1] += i64::from(err[1]);
        self.discarded[2] += i64::from(err[2]);
    }
}

/// Error-diffusion strategy: a kernel and the direction rows are scanned in
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Diffusion {
    kernel: DiffusionKernel,
    scan: ScanOrder,
}

impl Diffusion {
    /// Serpentine scan
    #[must_use]
    pub fn new(kernel: DiffusionKernel) -> Self {
        Self { kernel, scan: ScanOrder::default() }
    }

    #[must_use]
    pub fn with_scan_order(mut self, scan: ScanOrder) -> Self {
        self.scan = scan;
        self
    }

    #[inline]
    #[must_use]
    pub fn kernel(&self) -> &DiffusionKernel {
        &self.kernel
    }

    #[inline]
    #[must_use]
    pub fn scan_order(&self) -> ScanOrder {
        self.scan
    }

    /// Maps one frame. `acc` is scratch space, its previous content is ignored.
    pub fn remap(&self, lut: &LookupTable, palette: &Palette, frame: &Frame<'_>, transparent_index: Option<PalIndex>, acc: &mut ErrorAccumulator, output: &mut [PalIndex]) -> Result<Residual, Error> {
        let width = frame.width();
        let height = frame.height();
        let needed = frame.pixel_count();
        if output.len() < needed {
            return Err(Error::BufferTooSmall { needed, got: output.len() });
        }
        acc.reset(width, self.kernel.max_dy as usize + 1)?;

        let colors = palette.as_slice();
        let divisor = i64::from(self.kernel.divisor);
        let mut residual = Residual::default();

        for (y, output_row) in output[..needed].chunks_exact_mut(width).enumerate() {
            let row = frame.row(y);
            let reverse = self.scan == ScanOrder::Serpentine && y % 2 == 1;

            for i in 0..width {
                let x = if reverse { width - 1 - i } else { i };
                let carried = acc.take(x);
                let px = row.pixel(x);

                if let Some(idx) = transparent_index.filter(|_| px.a == 0) {
                    output_row[x] = idx;
                    residual.discard(carried);
                    continue;
                }

                let wanted = [
                    i32::from(px.r) + carried[0],
                    i32::from(px.g) + carried[1],
                    i32::from(px.b) + carried[2],
                ];
                let clamped = wanted.map(|c| c.clamp(0, 255));
                let idx = lut.lookup(RGB::new(clamped[0] as u8, clamped[1] as u8, clamped[2] as u8));
                output_row[x] = idx;
                residual.mapped_pixels += 1;

                let chosen = colors[usize::from(idx)];
                let err = [
                    clamped[0] - i32::from(chosen.r),
                    clamped[1] - i32::from(chosen.g),
                    clamped[2] - i32::from(chosen.b),
                ];

                let mut lost = [
                    wanted[0] - clamped[0] + err[0],
                    wanted[1] - clamped[1] + err[1],
                    wanted[2] - clamped[2] + err[2],
                ];
                for tap in &self.kernel.taps {
                    let dx = if reverse { -tap.dx } else { tap.dx };
                    let tx = x as isize + dx as isize;
                    let ty = y + tap.dy as usize;
                    if tx < 0 || tx as usize >= width || ty >= height {
                        continue;
                    }
                    // integer division truncates toward zero, the remainder stays in `lost`.
                    // |part| <= |e|, but the product needs 64 bits for large divisors.
                    let part = err.map(|e| (i64::from(e) * i64::from(tap.weight) / divisor) as i32);
                    acc.add(tap.dy as usize, tx as usize, part);
                    lost[0] -= part[0];
                    lost[1] -= part[1];
                    lost[2] -= part[2];
                }
                residual.discard(lost);
            }
            acc.next_row();
        }
        Ok(residual)
    }
}

#[test]
fn kernel_validation() {
    assert!(DiffusionKernel::new(&[Tap::new(0, 0, 1)], 2).is_err());
    assert!(DiffusionKernel::new(&[Tap::new(-1, 0, 1)], 2).is_err());
    assert!(DiffusionKernel::new(&[Tap::new(1, 0, 3)], 2).is_err());
    assert!(DiffusionKernel::new(&[Tap::new(1, 0, 0)], 2).is_err());
    assert!(DiffusionKernel::new(&[Tap::new(0, 9, 1)], 2).is_err());
    assert!(DiffusionKernel::new(&[Tap::new(1, 0, 1)], 0).is_err());
    let k = DiffusionKernel::new(&[Tap::new(-3, 2, 1), Tap::new(1, 0, 1)], 2).unwrap();
    assert_eq!(k.max_dy(), 2);
    assert!(DiffusionKernel::new(&[], 1).is_ok());
}

#[test]
fn presets_are_valid() {
    for name in ["filter-lite", "floyd-steinberg", "atkinson", "burkes", "stucki", "jarvis-judice-ninke", "stevenson-arce"] {
        let k = DiffusionKernel::named(name).unwrap();
        assert_eq!(DiffusionKernel::new(k.taps(), k.divisor()).unwrap(), k, "{name}");
    }
    let sa = DiffusionKernel::stevenson_arce();
    assert_eq!(sa.max_dy(), 3);
    assert_eq!(sa.taps().iter().map(|t| t.weight).sum::<i32>(), sa.divisor());
    assert_eq!(DiffusionKernel::default().divisor(), 4);
    assert!(DiffusionKernel::named("sierra").is_none());
}

#[test]
fn accumulator_ring() {
    let mut acc = ErrorAccumulator::new();
    acc.reset(3, 2).unwrap();
    acc.add(0, 2, [1, 2, 3]);
    acc.add(1, 0, [4, 5, 6]);
    assert_eq!(acc.take(2), [1, 2, 3]);
    assert_eq!(acc.take(2), [0, 0, 0]);
    acc.next_row();
    assert_eq!(acc.take(0), [4, 5, 6]);
    acc.add(1, 1, [7, 7, 7]);
    acc.next_row();
    assert_eq!(acc.take(1), [7, 7, 7]);

    acc.add(0, 0, [9, 9, 9]);
    acc.reset(5, 2).unwrap();
    assert!(acc.cells.iter().all(|c| *c == [0; 3]));
}

#[test]
fn error_reaches_next_pixel() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    let px = [RGB::new(100, 100, 100); 2];
    let frame = Frame::new_rgb(&px, 2, 1).unwrap();
    let mut out = [9; 2];
    let mut acc = ErrorAccumulator::new();
    let res = Diffusion::default().remap(&lut, &pal, &frame, None, &mut acc, &mut out).unwrap();
    // 100 → black, half of +100 carried: 150 → white, -105 has nowhere to go
    assert_eq!(out, [0, 1]);
    assert_eq!(res.mapped_pixels, 2);
    assert_eq!(res.discarded, [200 - 255; 3]);
}

#[test]
fn large_divisor() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    let px = [RGB::new(100, 100, 100); 2];
    let frame = Frame::new_rgb(&px, 2, 1).unwrap();
    let kernel = DiffusionKernel::new(&[Tap::new(1, 0, 1 << 30)], 1 << 30).unwrap();
    let mut out = [9; 2];
    let res = Diffusion::new(kernel).remap(&lut, &pal, &frame, None, &mut ErrorAccumulator::new(), &mut out).unwrap();
    // all of +100 goes right: 200 → white, and -55 falls off the edge
    assert_eq!(out, [0, 1]);
    assert_eq!(res.discarded, [200 - 255; 3]);

    let half = DiffusionKernel::new(&[Tap::new(1, 0, i32::MAX / 2)], i32::MAX).unwrap();
    let res = Diffusion::new(half).remap(&lut, &pal, &frame, None, &mut ErrorAccumulator::new(), &mut out).unwrap();
    // 100 * (2^30 - 1) / (2^31 - 1) truncates to 49
    assert_eq!(out, [0, 1]);
    assert_eq!(res.discarded, [200 - 255; 3]);
}
