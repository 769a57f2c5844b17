use crate::diffuse::Diffusion;
use crate::error::Error;
use crate::ordered::DitherMatrix;
use crate::pal::PalIndex;
use crate::random::RandomDither;

/// How pixels are chosen from the palette
#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    /// Plain nearest color, no dithering
    Nearest,
    /// Position-dependent bias, every pixel independent
    Ordered(DitherMatrix),
    /// Per-pixel noise, every pixel independent
    Random(RandomDither),
    /// Sequential, carries each pixel's error to its neighbors
    ErrorDiffusion(Diffusion),
}

impl Strategy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Ordered(_) => "ordered",
            Self::Random(_) => "random",
            Self::ErrorDiffusion(_) => "error-diffusion",
        }
    }
}

/// Everything the engine needs besides the palette.
///
/// The strategy is always chosen explicitly, there's no default.
#[derive(Clone, Debug)]
pub struct Settings {
    strategy: Strategy,
    transparent_index: Option<PalIndex>,
    max_threads: Option<usize>,
}

impl Settings {
    #[inline]
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            transparent_index: None,
            max_threads: None,
        }
    }

    #[inline]
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Palette entry given to fully transparent RGBA pixels. Such pixels don't take part in error diffusion.
    ///
    /// `None` (the default) ignores alpha. The index is checked against the palette when the engine is created.
    #[inline]
    pub fn set_transparent_index(&mut self, index: Option<PalIndex>) {
        self.transparent_index = index;
    }

    /// Runs the engine's parallel work in its own pool of at most this many threads.
    ///
    /// By default the global rayon pool is used. 1 makes everything sequential.
    pub fn set_max_threads(&mut self, threads: Option<usize>) -> Result<(), Error> {
        if threads == Some(0) {
            return Err(Error::ValueOutOfRange("thread count must be at least 1"));
        }
        self.max_threads = threads;
        Ok(())
    }

    #[inline(always)]
    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    #[inline(always)]
    #[must_use]
    pub fn transparent_index(&self) -> Option<PalIndex> {
        self.transparent_index
    }

    #[inline(always)]
    #[must_use]
    pub fn max_threads(&self) -> Option<usize> {
        self.max_threads
    }
}

#[test]
fn setters() {
    let mut s = Settings::new(Strategy::Nearest);
    assert!(s.set_max_threads(Some(0)).is_err());
    assert_eq!(s.max_threads(), None);
    s.set_max_threads(Some(3)).unwrap();
    s.set_transparent_index(Some(7));
    s.set_strategy(Strategy::ErrorDiffusion(Diffusion::default()));
    assert_eq!(s.max_threads(), Some(3));
    assert_eq!(s.transparent_index(), Some(7));
    assert_eq!(s.strategy().name(), "error-diffusion");
    s.set_strategy(Strategy::Random(RandomDither::normal()));
    assert_eq!(s.strategy().name(), "random");
}
