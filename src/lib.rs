//! Maps 24/32-bit video frames onto a small fixed palette, fast enough for live video.
//!
//! An [`Engine`] precomputes the nearest palette entry for every color at 7 bits
//! per channel, then maps frames with plain nearest colors, ordered dithering,
//! random noise, or error diffusion. [`DitherFilter`] puts an engine into a frame-by-frame pipeline.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

mod diffuse;
mod engine;
mod error;
mod filter;
mod frame;
mod lut;
mod ordered;
mod pal;
mod random;
mod settings;
mod source;

#[cfg(feature = "serde")]
mod config;

#[cfg(not(feature = "threads"))]
mod rayoff;

#[cfg(feature = "threads")]
mod rayoff {
    pub(crate) fn num_cpus() -> usize {
        rayon::current_num_threads()
    }
    pub(crate) use rayon::prelude::*;
    pub(crate) use thread_local::ThreadLocal;
}

pub use crate::diffuse::{Diffusion, DiffusionKernel, ErrorAccumulator, Residual, ScanOrder, Tap, MAX_KERNEL_ROWS};
pub use crate::engine::Engine;
pub use crate::error::Error;
pub use crate::filter::{DitherFilter, DitherResult, FilterSignal, FrameMetadata, OutputMode, ResultSink, VideoFilter};
pub use crate::frame::{Frame, PixelLayout, Row};
pub use crate::lut::{LookupTable, QuantizedCoordinate, CHANNEL_BITS, CHANNEL_LEVELS, TABLE_LEN};
pub use crate::ordered::{DitherMatrix, OrderedDither, STRENGTH_MAX, STRENGTH_MIN, STRENGTH_NORMAL};
pub use crate::pal::{diff, PalIndex, Palette, MAX_COLORS, RGB, RGBA};
pub use crate::random::{RandomDither, MAX_NOISE_WEIGHT};
pub use crate::settings::{Settings, Strategy};
pub use crate::source::ColorSource;

#[cfg(feature = "serde")]
pub use crate::config::{EngineConfig, KernelConfig, MatrixConfig, PaletteConfig, StrategyConfig, WeightConfig};
#[cfg(feature = "serde")]
pub use crate::source::JsonColorTable;

#[test]
fn gray_on_black_and_white() {
    let pal = [RGB::new(0, 0, 0), RGB::new(255, 255, 255)];
    let px = [RGB::new(128, 128, 128)];
    let frame = Frame::new_rgb(&px, 1, 1).unwrap();

    let zero = DitherMatrix::new(&[vec![0]], 1).unwrap().with_strength(STRENGTH_MIN).unwrap();
    for strategy in [Strategy::Nearest, Strategy::Ordered(zero), Strategy::Random(RandomDither::new(0).unwrap()), Strategy::ErrorDiffusion(Diffusion::default())] {
        let engine = Engine::new(&Settings::new(strategy), &pal[..]).unwrap();
        // the bucket of 128 is centered on 128.5, which is closer to white
        assert_eq!(engine.remapped(&frame).unwrap(), [1]);
    }
}

#[test]
fn thread() {
    let engine = Engine::new(&Settings::new(Strategy::Nearest), &Palette::eight_bit()[..]).unwrap();
    let engine = std::sync::Arc::new(engine);
    let handles: Vec<_> = (0..4u8).map(|n| {
        let engine = engine.clone();
        std::thread::spawn(move || {
            let px = vec![RGB::new(n * 60, 0, 0); 16];
            let frame = Frame::new_rgb(&px, 4, 4).unwrap();
            engine.remapped(&frame).unwrap()
        })
    }).collect();
    for h in handles {
        assert_eq!(h.join().unwrap().len(), 16);
    }
}
