//! Nearest palette entry for every quantized color, computed once per palette.
use crate::error::Error;
use crate::pal::{PalIndex, Palette, MAX_COLORS, RGB};
use crate::rayoff::*;
use arrayvec::ArrayVec;
use std::time::Instant;

/// Bits kept of every 8-bit channel
pub const CHANNEL_BITS: u32 = 7;

/// Distinct quantized values per channel
pub const CHANNEL_LEVELS: usize = 1 << CHANNEL_BITS;

/// Number of entries in a [`LookupTable`], 128³
pub const TABLE_LEN: usize = CHANNEL_LEVELS * CHANNEL_LEVELS * CHANNEL_LEVELS;

/// A color with every channel reduced to 7 bits.
///
/// Each coordinate stands for two adjacent 8-bit values, and its color is the
/// midpoint of the two (`2q + 0.5`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuantizedCoordinate {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl QuantizedCoordinate {
    #[inline(always)]
    #[must_use]
    pub fn from_rgb(px: RGB) -> Self {
        Self {
            r: px.r >> (8 - CHANNEL_BITS),
            g: px.g >> (8 - CHANNEL_BITS),
            b: px.b >> (8 - CHANNEL_BITS),
        }
    }

    /// Inverse of [`QuantizedCoordinate::index`]
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= TABLE_LEN {
            return None;
        }
        let mask = CHANNEL_LEVELS - 1;
        Some(Self {
            r: (index >> (2 * CHANNEL_BITS)) as u8,
            g: ((index >> CHANNEL_BITS) & mask) as u8,
            b: (index & mask) as u8,
        })
    }

    /// Position in the flat table: `r << 14 | g << 7 | b`
    #[inline(always)]
    #[must_use]
    pub fn index(self) -> usize {
        (usize::from(self.r) << (2 * CHANNEL_BITS)) | (usize::from(self.g) << CHANNEL_BITS) | usize::from(self.b)
    }

    /// Center of the bucket in 8-bit units
    #[must_use]
    pub fn midpoint(self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|q| f32::from(q) * 2. + 0.5)
    }

    /// Midpoint times two, `4q + 1`, exact in integers
    #[inline(always)]
    pub(crate) fn doubled_midpoint(self) -> [i32; 3] {
        [self.r, self.g, self.b].map(|q| i32::from(q) * 4 + 1)
    }
}

/// Dense 128³ map from [`QuantizedCoordinate`] to palette index.
///
/// Built once, then only read. It's plain data, so it can be shared by reference
/// between any number of threads.
pub struct LookupTable {
    entries: Box<[PalIndex]>,
    palette_len: usize,
}

impl LookupTable {
    /// Fills every entry with the palette index nearest to the entry's midpoint.
    ///
    /// Uses the current rayon pool. Every entry is computed independently, so the
    /// result is the same for any number of threads.
    pub fn build(palette: &Palette) -> Result<Self, Error> {
        let start = Instant::now();

        let mut entries = Vec::new();
        entries.try_reserve_exact(TABLE_LEN)?;
        entries.resize(TABLE_LEN, 0 as PalIndex);

        let doubled = palette.doubled();
        // each chunk is a run of 128 blue values for one (red, green) pair
        entries.par_chunks_mut(CHANNEL_LEVELS).enumerate().for_each(|(rg, blues)| {
            fill_blue_run(&doubled, rg, blues);
        });

        tracing::debug!(
            colors = palette.len(),
            threads = num_cpus(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.,
            "built lookup table"
        );

        Ok(Self {
            entries: entries.into_boxed_slice(),
            palette_len: palette.len(),
        })
    }

    /// Nearest palette index for an 8-bit color
    #[inline(always)]
    #[must_use]
    pub fn lookup(&self, px: RGB) -> PalIndex {
        self.get(QuantizedCoordinate::from_rgb(px))
    }

    #[inline(always)]
    #[must_use]
    pub fn get(&self, q: QuantizedCoordinate) -> PalIndex {
        self.entries[q.index()]
    }

    /// All entries in flat index order
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[PalIndex] {
        &self.entries
    }

    /// Always [`TABLE_LEN`]
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the palette the table was built for. Every entry is below this.
    #[inline]
    #[must_use]
    pub fn palette_len(&self) -> usize {
        self.palette_len
    }
}

impl std::fmt::Debug for LookupTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupTable").field("len", &self.entries.len()).field("palette_len", &self.palette_len).finish()
    }
}

/// Red and green are fixed for the whole run, so their part of the distance is computed once per palette entry.
fn fill_blue_run(doubled: &[[i32; 3]], rg: usize, blues: &mut [PalIndex]) {
    let Some(corner) = QuantizedCoordinate::from_index(rg << CHANNEL_BITS) else { return };
    let [tr, tg, _] = corner.doubled_midpoint();
    let partial: ArrayVec<i32, MAX_COLORS> = doubled.iter().map(|&[pr, pg, _]| {
        (tr - pr) * (tr - pr) + (tg - pg) * (tg - pg)
    }).collect();

    for (b, out) in blues.iter_mut().enumerate() {
        let tb = b as i32 * 4 + 1;
        let mut best = 0;
        let mut best_dist = i32::MAX;
        for (idx, (&rg_dist, &[_, _, pb])) in partial.iter().zip(doubled).enumerate() {
            let dist = rg_dist + (tb - pb) * (tb - pb);
            // strict, so the lowest index keeps a tie
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        *out = best as PalIndex;
    }
}

#[test]
fn coordinates() {
    let q = QuantizedCoordinate::from_rgb(RGB::new(255, 128, 1));
    assert_eq!(q, QuantizedCoordinate { r: 127, g: 64, b: 0 });
    assert_eq!(q.index(), 127 << 14 | 64 << 7);
    assert_eq!(QuantizedCoordinate::from_index(q.index()), Some(q));
    assert_eq!(QuantizedCoordinate::from_index(TABLE_LEN), None);
    assert_eq!(q.midpoint(), [254.5, 128.5, 0.5]);
    assert_eq!(q.doubled_midpoint(), [509, 257, 1]);
}

#[test]
fn gray_splits_at_midpoint() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    assert_eq!(lut.len(), TABLE_LEN);
    assert_eq!(lut.lookup(RGB::new(126, 126, 126)), 0);
    assert_eq!(lut.lookup(RGB::new(127, 127, 127)), 0);
    // 128 and 129 share a bucket whose midpoint is 128.5
    assert_eq!(lut.lookup(RGB::new(128, 128, 128)), 1);
    assert_eq!(lut.lookup(RGB::new(129, 129, 129)), 1);
}

#[test]
fn ties_go_to_lowest_index() {
    let pal = Palette::new(&[RGB::new(7, 7, 7), RGB::new(200, 0, 0), RGB::new(7, 7, 7)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    assert!(lut.as_slice().iter().all(|&i| i < 2));

    // red 64 and 65 are both 0.5 away from the midpoint 64.5 of the red bucket 32
    for pal in [[RGB::new(65, 9, 9), RGB::new(64, 9, 9)], [RGB::new(64, 9, 9), RGB::new(65, 9, 9)]] {
        let pal = Palette::new(&pal).unwrap();
        let lut = LookupTable::build(&pal).unwrap();
        for g in (0..128).step_by(9) {
            for b in (0..128).step_by(7) {
                assert_eq!(lut.get(QuantizedCoordinate { r: 32, g, b }), 0);
                let q = QuantizedCoordinate { r: 31, g, b };
                assert_eq!(usize::from(lut.get(q)), brute_force(&pal, q));
                let q = QuantizedCoordinate { r: 33, g, b };
                assert_eq!(usize::from(lut.get(q)), brute_force(&pal, q));
            }
        }
    }

    // the corner bucket's midpoint (0.5, 0.5, 0.5) is equally far from all of these
    let pal = Palette::new(&[RGB::new(0, 1, 0), RGB::new(1, 0, 1), RGB::new(0, 0, 0), RGB::new(1, 1, 1)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    let corner = QuantizedCoordinate { r: 0, g: 0, b: 0 };
    assert_eq!(brute_force(&pal, corner), 0);
    assert_eq!(lut.get(corner), 0);
}

#[cfg(test)]
fn brute_force(pal: &Palette, q: QuantizedCoordinate) -> usize {
    let mid = q.midpoint();
    let mut best = (0, f32::MAX);
    for (i, c) in pal.iter().enumerate() {
        let d: f32 = [c.r, c.g, c.b].iter().zip(mid).map(|(&c, m)| (f32::from(c) - m).powi(2)).sum();
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

#[test]
fn send() {
    fn is_send_sync<T: Send + Sync>() {}

    is_send_sync::<LookupTable>();
}
