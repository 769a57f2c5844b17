use crate::error::Error;
use crate::source::ColorSource;
use arrayvec::ArrayVec;
use std::ops::Deref;

/// 8-bit RGB. Palettes and mapped output use this.
pub type RGB = rgb::RGB8;

/// 8-bit RGBA. Frames may carry alpha, the palette never does.
pub type RGBA = rgb::RGBA8;

/// Position of a color in the [`Palette`], and the value stored in the lookup table
pub type PalIndex = u8;

/// Table entries are one byte each
pub const MAX_COLORS: usize = PalIndex::MAX as usize + 1;

/// Fixed, ordered set of displayable colors.
///
/// Indices `0..len()` are stable for the life of the palette, and there's no way to change the colors after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: ArrayVec<RGB, MAX_COLORS>,
}

impl Palette {
    /// Copies the colors. Fails if there are none, or more than 256.
    pub fn new(colors: &[RGB]) -> Result<Self, Error> {
        if colors.is_empty() {
            return Err(Error::InvalidPalette("palette has no colors".into()));
        }
        let mut pal = ArrayVec::new();
        pal.try_extend_from_slice(colors).map_err(|_| {
            Error::InvalidPalette(format!("palette has {} colors, at most {MAX_COLORS} are supported", colors.len()))
        })?;
        Ok(Self { colors: pal })
    }

    /// Takes the flat color list from any provider. Labels or other metadata of the source are not kept.
    pub fn from_source<S: ColorSource + ?Sized>(source: &S) -> Result<Self, Error> {
        Self::new(&source.colors()?)
    }

    /// Colors as `0xRRGGBB` integers. The top byte is ignored, so ARGB ints work too.
    pub fn from_packed(colors: &[u32]) -> Result<Self, Error> {
        Self::from_source(colors)
    }

    /// Red, green, blue, white, black, yellow, cyan and purple
    #[must_use]
    pub fn eight_bit() -> Self {
        let colors = [
            RGB::new(0xff, 0x00, 0x00),
            RGB::new(0x00, 0xd9, 0x3a),
            RGB::new(0x37, 0x37, 0xdc),
            RGB::new(0xff, 0xff, 0xff),
            RGB::new(0x00, 0x00, 0x00),
            RGB::new(0xe5, 0xe5, 0x33),
            RGB::new(0x5c, 0xdb, 0xd5),
            RGB::new(0xb2, 0x4c, 0xd8),
        ];
        Self { colors: colors.into_iter().collect() }
    }

    /// Palette colors
    #[inline(always)]
    #[must_use]
    pub fn as_slice(&self) -> &[RGB] {
        &self.colors
    }

    /// `None` if the index is past the end of the palette
    #[inline]
    #[must_use]
    pub fn color(&self, index: PalIndex) -> Option<RGB> {
        self.colors.get(usize::from(index)).copied()
    }

    /// Linear scan over all colors at full 8-bit precision.
    ///
    /// Returns the index and squared distance. The lowest index wins a tie.
    /// This is slow, the lookup table exists so that frames never need it.
    #[must_use]
    pub fn nearest(&self, px: RGB) -> (PalIndex, u32) {
        let mut best = (0, u32::MAX);
        for (idx, &color) in self.colors.iter().enumerate() {
            let d = diff(px, color);
            if d < best.1 {
                best = (idx as PalIndex, d);
            }
        }
        best
    }

    /// Replaces every index with its color, for consumers that want pixels rather than indices.
    pub fn expand_into(&self, indices: &[PalIndex], output: &mut [RGB]) -> Result<(), Error> {
        if output.len() < indices.len() {
            return Err(Error::BufferTooSmall { needed: indices.len(), got: output.len() });
        }
        for (&idx, out) in indices.iter().zip(output) {
            *out = self.color(idx).ok_or(Error::ValueOutOfRange("palette index past the end of the palette"))?;
        }
        Ok(())
    }

    /// Every channel doubled, so that midpoints of quantization buckets can be compared in integers
    pub(crate) fn doubled(&self) -> ArrayVec<[i32; 3], MAX_COLORS> {
        self.colors.iter().map(|c| [i32::from(c.r) * 2, i32::from(c.g) * 2, i32::from(c.b) * 2]).collect()
    }
}

impl Deref for Palette {
    type Target = [RGB];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

/// Squared Euclidean distance in RGB
#[inline(always)]
#[must_use]
pub fn diff(a: RGB, b: RGB) -> u32 {
    let dr = i32::from(a.r) - i32::from(b.r);
    let dg = i32::from(a.g) - i32::from(b.g);
    let db = i32::from(a.b) - i32::from(b.b);
    (dr * dr + dg * dg + db * db) as u32
}

#[test]
fn rejects_empty_and_oversized() {
    assert!(matches!(Palette::new(&[]), Err(Error::InvalidPalette(_))));
    let too_many = vec![RGB::new(1, 2, 3); MAX_COLORS + 1];
    assert!(matches!(Palette::new(&too_many), Err(Error::InvalidPalette(_))));
    let max = vec![RGB::new(1, 2, 3); MAX_COLORS];
    assert_eq!(Palette::new(&max).unwrap().len(), MAX_COLORS);
}

#[test]
fn nearest_prefers_lowest_index() {
    let pal = Palette::new(&[RGB::new(10, 10, 10), RGB::new(30, 30, 30), RGB::new(10, 10, 10)]).unwrap();
    assert_eq!(pal.nearest(RGB::new(20, 20, 20)).0, 0);
    assert_eq!(pal.nearest(RGB::new(12, 10, 10)), (0, 4));
    assert_eq!(pal.nearest(RGB::new(29, 30, 31)), (1, 2));
}

#[test]
fn packed_and_expand() {
    let pal = Palette::from_packed(&[0xff000000, 0x00ff8000, 0xff123456]).unwrap();
    assert_eq!(pal.color(1), Some(RGB::new(0xff, 0x80, 0)));
    assert_eq!(pal.color(2), Some(RGB::new(0x12, 0x34, 0x56)));
    assert_eq!(pal.color(3), None);

    let mut out = [RGB::default(); 3];
    pal.expand_into(&[2, 0, 1], &mut out).unwrap();
    assert_eq!(out, [RGB::new(0x12, 0x34, 0x56), RGB::new(0, 0, 0), RGB::new(0xff, 0x80, 0)]);
    assert!(pal.expand_into(&[3], &mut out).is_err());
    assert!(pal.expand_into(&[0; 4], &mut out).is_err());
}

#[test]
fn eight_bit_preset() {
    let pal = Palette::eight_bit();
    assert_eq!(pal.len(), 8);
    assert_eq!(pal.nearest(RGB::new(250, 5, 5)).0, 0);
    assert_eq!(pal.nearest(RGB::new(3, 3, 3)).0, 4);
}
