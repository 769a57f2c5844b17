use crate::diffuse::{Diffusion, ErrorAccumulator, Residual};
use crate::error::Error;
use crate::frame::{map_rows, Frame};
use crate::lut::LookupTable;
use crate::ordered::OrderedDither;
use crate::pal::{PalIndex, Palette, RGB};
use crate::random::RandomDither;
use crate::rayoff::*;
use crate::settings::{Settings, Strategy};
use crate::source::ColorSource;
use std::cell::RefCell;

enum Prepared {
    Nearest,
    Ordered(OrderedDither),
    Random(RandomDither),
    Diffusion(Diffusion),
}

/// One palette, its lookup table and a dithering strategy, ready to map frames.
///
/// Creating it is the expensive part (the table has 2M entries). After that it's
/// read-only, so a single engine can be shared by any number of threads and pipelines.
pub struct Engine {
    palette: Palette,
    lut: LookupTable,
    strategy: Prepared,
    settings: Settings,
    #[cfg(feature = "threads")]
    pool: Option<rayon::ThreadPool>,
}

impl Engine {
    /// Reads the palette from `source` and builds its lookup table. Blocks until the table is complete.
    pub fn new<S: ColorSource + ?Sized>(settings: &Settings, source: &S) -> Result<Self, Error> {
        Self::with_palette(settings, Palette::from_source(source)?)
    }

    pub fn with_palette(settings: &Settings, palette: Palette) -> Result<Self, Error> {
        if let Some(idx) = settings.transparent_index() {
            if usize::from(idx) >= palette.len() {
                return Err(Error::ValueOutOfRange("transparent index is past the end of the palette"));
            }
        }

        #[cfg(feature = "threads")]
        let pool = settings.max_threads().map(|threads| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("framequant-{i}"))
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))
        }).transpose()?;

        let strategy = match settings.strategy() {
            Strategy::Nearest => Prepared::Nearest,
            Strategy::Ordered(matrix) => {
                let ordered = OrderedDither::new(matrix);
                if ordered.saturates() {
                    tracing::warn!(strength = matrix.strength(), max = matrix.max(), "ordered dither bias exceeds the channel range, some cells will map only to the darkest or brightest colors");
                }
                Prepared::Ordered(ordered)
            },
            Strategy::Random(random) => Prepared::Random(*random),
            Strategy::ErrorDiffusion(diffusion) => Prepared::Diffusion(diffusion.clone()),
        };

        #[cfg(feature = "threads")]
        let lut = match &pool {
            Some(pool) => pool.install(|| LookupTable::build(&palette)),
            None => LookupTable::build(&palette),
        }?;
        #[cfg(not(feature = "threads"))]
        let lut = LookupTable::build(&palette)?;

        tracing::debug!(strategy = settings.strategy().name(), colors = palette.len(), "engine ready");
        Ok(Self {
            palette,
            lut,
            strategy,
            settings: settings.clone(),
            #[cfg(feature = "threads")]
            pool,
        })
    }

    /// Runs `f` in the engine's own pool, if it has one
    #[cfg(feature = "threads")]
    fn run<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    #[cfg(not(feature = "threads"))]
    fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    #[inline]
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    #[inline]
    #[must_use]
    pub fn lookup_table(&self) -> &LookupTable {
        &self.lut
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Palette index for a single color, from the table
    #[inline(always)]
    #[must_use]
    pub fn nearest(&self, px: RGB) -> PalIndex {
        self.lut.lookup(px)
    }

    /// Error diffusion needs per-frame scratch memory and can't split a frame between threads
    #[inline]
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        matches!(self.strategy, Prepared::Diffusion(_))
    }

    /// Maps `frame` into `output`, one palette index per pixel, row after row without stride.
    pub fn remap_into(&self, frame: &Frame<'_>, output: &mut [PalIndex]) -> Result<(), Error> {
        self.remap_with_accumulator(frame, &mut ErrorAccumulator::new(), output).map(drop)
    }

    /// Like [`Engine::remap_into`], and reports how much diffusion error was lost.
    ///
    /// `None` for strategies that don't diffuse error.
    pub fn remap_with_residual(&self, frame: &Frame<'_>, output: &mut [PalIndex]) -> Result<Option<Residual>, Error> {
        self.remap_with_accumulator(frame, &mut ErrorAccumulator::new(), output)
    }

    /// Reuses `acc` instead of allocating scratch memory for error diffusion
    pub fn remap_with_accumulator(&self, frame: &Frame<'_>, acc: &mut ErrorAccumulator, output: &mut [PalIndex]) -> Result<Option<Residual>, Error> {
        let transparent_index = self.settings.transparent_index();
        match &self.strategy {
            Prepared::Nearest => self.run(|| self.remap_nearest(frame, output)).map(|()| None),
            Prepared::Ordered(ordered) => self.run(|| ordered.remap(&self.lut, frame, transparent_index, output)).map(|()| None),
            Prepared::Random(random) => self.run(|| random.remap(&self.lut, frame, transparent_index, output)).map(|()| None),
            Prepared::Diffusion(diffusion) => diffusion.remap(&self.lut, &self.palette, frame, transparent_index, acc, output).map(Some),
        }
    }

    /// Nearest color for every pixel, whatever the strategy
    pub fn remap_undithered_into(&self, frame: &Frame<'_>, output: &mut [PalIndex]) -> Result<(), Error> {
        self.run(|| self.remap_nearest(frame, output))
    }

    fn remap_nearest(&self, frame: &Frame<'_>, output: &mut [PalIndex]) -> Result<(), Error> {
        let transparent_index = self.settings.transparent_index();
        map_rows(frame, output, |_, _, px| match transparent_index {
            Some(idx) if px.a == 0 => idx,
            _ => self.lut.lookup(RGB::new(px.r, px.g, px.b)),
        })
    }

    /// Allocates the output
    pub fn remapped(&self, frame: &Frame<'_>) -> Result<Vec<PalIndex>, Error> {
        let mut output = index_buf(frame.pixel_count())?;
        self.remap_into(frame, &mut output)?;
        Ok(output)
    }

    /// Maps many frames at once, in parallel. Results are in the same order as `frames`.
    ///
    /// Every frame gets freshly zeroed error scratch, so results are identical to mapping them one by one.
    pub fn remap_frames(&self, frames: &[Frame<'_>]) -> Result<Vec<Vec<PalIndex>>, Error> {
        let accumulators = ThreadLocal::new();
        let results = self.run(|| {
            frames.par_iter().map(|frame| {
                let mut output = index_buf(frame.pixel_count())?;
                if self.is_sequential() {
                    let mut acc = accumulators.get_or(|| RefCell::new(ErrorAccumulator::new())).borrow_mut();
                    self.remap_with_accumulator(frame, &mut acc, &mut output)?;
                } else {
                    self.remap_into(frame, &mut output)?;
                }
                Ok(output)
            }).collect::<Result<Vec<_>, Error>>()
        })?;
        tracing::trace!(frames = results.len(), "remapped batch");
        Ok(results)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("palette", &self.palette)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn index_buf(len: usize) -> Result<Vec<PalIndex>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, 0);
    Ok(v)
}

#[test]
fn send() {
    fn is_send_sync<T: Send + Sync>() {}

    is_send_sync::<Engine>();
}

#[test]
fn transparent_index_must_exist() {
    let mut s = Settings::new(Strategy::Nearest);
    s.set_transparent_index(Some(2));
    let pal: &[RGB] = &[RGB::new(0, 0, 0), RGB::new(255, 255, 255)];
    assert!(matches!(Engine::new(&s, pal), Err(Error::ValueOutOfRange(_))));
    s.set_transparent_index(Some(1));
    assert!(Engine::new(&s, pal).is_ok());
}

#[test]
fn buffer_size_checked() {
    let pal: &[RGB] = &[RGB::new(0, 0, 0), RGB::new(255, 255, 255)];
    let px = [RGB::new(9, 9, 9); 6];
    let frame = Frame::new_rgb(&px, 3, 2).unwrap();
    for strategy in [Strategy::Nearest, Strategy::ErrorDiffusion(Diffusion::default())] {
        let engine = Engine::new(&Settings::new(strategy), pal).unwrap();
        let mut out = [0; 5];
        assert_eq!(engine.remap_into(&frame, &mut out), Err(Error::BufferTooSmall { needed: 6, got: 5 }));
        assert_eq!(engine.remapped(&frame).unwrap(), vec![0; 6]);
    }
}
