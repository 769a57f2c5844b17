use crate::error::Error;
use crate::pal::{PalIndex, RGB, RGBA};
use crate::rayoff::*;
use rgb::FromSlice;

/// Channel layout of the frame's pixels, 8 bits per channel
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "lowercase"))]
pub enum PixelLayout {
    #[default]
    Rgb,
    Rgba,
}

impl PixelLayout {
    #[inline]
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

#[derive(Copy, Clone)]
enum Pixels<'a> {
    Rgb(&'a [RGB]),
    Rgba(&'a [RGBA]),
}

/// Borrowed view of one video frame.
///
/// Rows are `stride` pixels apart, of which the first `width` are used.
/// The frame doesn't own the pixels, and nothing in this crate keeps it past the call it was passed to.
#[derive(Copy, Clone)]
pub struct Frame<'a> {
    pixels: Pixels<'a>,
    width: usize,
    height: usize,
    stride: usize,
}

/// One row of a [`Frame`], exactly `width` pixels long
#[derive(Copy, Clone)]
pub enum Row<'a> {
    Rgb(&'a [RGB]),
    Rgba(&'a [RGBA]),
}

impl<'a> Row<'a> {
    /// RGB pixels are returned as opaque
    #[inline(always)]
    #[must_use]
    pub fn pixel(&self, x: usize) -> RGBA {
        match self {
            Self::Rgb(px) => {
                let px = px[x];
                RGBA::new(px.r, px.g, px.b, 255)
            },
            Self::Rgba(px) => px[x],
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rgb(px) => px.len(),
            Self::Rgba(px) => px.len(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> Frame<'a> {
    /// Tightly packed RGB pixels
    pub fn new_rgb(pixels: &'a [RGB], width: usize, height: usize) -> Result<Self, Error> {
        Self::new_rgb_stride(pixels, width, height, width)
    }

    /// Tightly packed RGBA pixels
    pub fn new_rgba(pixels: &'a [RGBA], width: usize, height: usize) -> Result<Self, Error> {
        Self::new_rgba_stride(pixels, width, height, width)
    }

    /// Rows start every `stride` pixels. The last row doesn't need padding.
    pub fn new_rgb_stride(pixels: &'a [RGB], width: usize, height: usize, stride: usize) -> Result<Self, Error> {
        Self::validated(Pixels::Rgb(pixels), width, height, stride)
    }

    pub fn new_rgba_stride(pixels: &'a [RGBA], width: usize, height: usize, stride: usize) -> Result<Self, Error> {
        Self::validated(Pixels::Rgba(pixels), width, height, stride)
    }

    /// Raw interleaved bytes, as decoders usually hand them out. Trailing bytes that don't make a whole pixel are ignored.
    pub fn from_bytes(bytes: &'a [u8], layout: PixelLayout, width: usize, height: usize) -> Result<Self, Error> {
        let pixels = match layout {
            PixelLayout::Rgb => Pixels::Rgb(bytes.as_rgb()),
            PixelLayout::Rgba => Pixels::Rgba(bytes.as_rgba()),
        };
        Self::validated(pixels, width, height, width)
    }

    /// Same pixels, different row pitch (in pixels, not bytes)
    pub fn with_stride(self, stride: usize) -> Result<Self, Error> {
        Self::validated(self.pixels, self.width, self.height, stride)
    }

    fn validated(pixels: Pixels<'a>, width: usize, height: usize, stride: usize) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!("{width}×{height} frame has no pixels")));
        }
        if stride < width {
            return Err(Error::InvalidFrame(format!("stride {stride} is smaller than width {width}")));
        }
        let needed = (height - 1).checked_mul(stride).and_then(|n| n.checked_add(width))
            .ok_or_else(|| Error::InvalidFrame(format!("{width}×{height} frame is too large")))?;
        let len = match pixels {
            Pixels::Rgb(px) => px.len(),
            Pixels::Rgba(px) => px.len(),
        };
        if len < needed {
            return Err(Error::InvalidFrame(format!("buffer has {len} pixels, {width}×{height} with stride {stride} needs {needed}")));
        }
        Ok(Self { pixels, width, height, stride })
    }

    #[inline(always)]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `width * height`, the size of the output buffer
    #[inline]
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> PixelLayout {
        match self.pixels {
            Pixels::Rgb(_) => PixelLayout::Rgb,
            Pixels::Rgba(_) => PixelLayout::Rgba,
        }
    }

    /// Panics if `y >= height`
    #[inline(always)]
    #[must_use]
    pub fn row(&self, y: usize) -> Row<'a> {
        let start = y * self.stride;
        let end = start + self.width;
        match self.pixels {
            Pixels::Rgb(px) => Row::Rgb(&px[start..end]),
            Pixels::Rgba(px) => Row::Rgba(&px[start..end]),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'a>> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("layout", &self.layout())
            .finish()
    }
}

/// Calls `map(x, y, pixel)` for every pixel, rows in parallel. For mappings where no pixel depends on another.
pub(crate) fn map_rows<F>(frame: &Frame<'_>, output: &mut [PalIndex], map: F) -> Result<(), Error>
where
    F: Fn(usize, usize, RGBA) -> PalIndex + Send + Sync,
{
    let needed = frame.pixel_count();
    let got = output.len();
    let output = output.get_mut(..needed).ok_or(Error::BufferTooSmall { needed, got })?;
    output.par_chunks_mut(frame.width()).enumerate().for_each(|(y, out_row)| {
        let row = frame.row(y);
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = map(x, y, row.pixel(x));
        }
    });
    Ok(())
}

#[test]
fn rejects_malformed() {
    let px = vec![RGB::new(1, 2, 3); 12];
    assert!(matches!(Frame::new_rgb(&px, 0, 3), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::new_rgb(&px, 4, 0), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::new_rgb(&px, 4, 4), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::new_rgb_stride(&px, 4, 3, 3), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::new_rgb(&px, usize::MAX, 3), Err(Error::InvalidFrame(_))));
    assert!(Frame::new_rgb(&px, 4, 3).is_ok());
    assert!(Frame::new_rgb(&px, 12, 1).is_ok());
}

#[test]
fn stride_and_bytes() {
    // 2×2 frame with one padding pixel per row, last row unpadded
    let px = [RGB::new(1, 1, 1), RGB::new(2, 2, 2), RGB::new(9, 9, 9), RGB::new(3, 3, 3), RGB::new(4, 4, 4)];
    let frame = Frame::new_rgb(&px, 2, 2).unwrap().with_stride(3).unwrap();
    assert_eq!(frame.pixel_count(), 4);
    assert_eq!(frame.row(1).pixel(0), RGBA::new(3, 3, 3, 255));
    assert_eq!(frame.rows().map(|r| r.len()).sum::<usize>(), 4);
    assert!(frame.with_stride(4).is_err());

    let bytes = [10u8, 20, 30, 0, 40, 50, 60, 255];
    let frame = Frame::from_bytes(&bytes, PixelLayout::Rgba, 2, 1).unwrap();
    assert_eq!(frame.layout(), PixelLayout::Rgba);
    assert_eq!(frame.row(0).pixel(0), RGBA::new(10, 20, 30, 0));
    assert!(Frame::from_bytes(&bytes, PixelLayout::Rgb, 3, 1).is_err());
    assert!(Frame::from_bytes(&bytes[..6], PixelLayout::Rgb, 2, 1).is_ok());
}
