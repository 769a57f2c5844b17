//! Adapter that puts an [`Engine`] into a chain of per-frame video filters.
use crate::diffuse::ErrorAccumulator;
use crate::engine::Engine;
use crate::error::Error;
use crate::frame::Frame;
use crate::pal::{PalIndex, RGB};
use std::sync::Arc;

/// What the pipeline knows about a frame besides its pixels
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: usize,
    pub height: usize,
    /// Position in the stream, only used for logging
    pub index: u64,
    /// Map this frame with plain nearest colors, e.g. when the pipeline is running late
    pub skip_dither: bool,
}

impl FrameMetadata {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, ..Self::default() }
    }

    #[must_use]
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

/// Whether the frame should continue down the filter chain
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterSignal {
    Accept,
    Discard,
}

/// One stage of a video pipeline, called once per frame
pub trait VideoFilter {
    fn apply_filter(&mut self, frame: &Frame<'_>, metadata: &FrameMetadata) -> FilterSignal;
}

impl<F> VideoFilter for F where F: FnMut(&Frame<'_>, &FrameMetadata) -> FilterSignal {
    #[inline]
    fn apply_filter(&mut self, frame: &Frame<'_>, metadata: &FrameMetadata) -> FilterSignal {
        self(frame, metadata)
    }
}

/// What [`DitherFilter`] hands over
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Palette indices
    #[default]
    Indices,
    /// The palette colors the indices stand for
    Colors,
}

/// A mapped frame, `width * height` long. Only valid for the duration of the sink call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DitherResult<'a> {
    Indices(&'a [PalIndex]),
    Colors(&'a [RGB]),
}

/// Receives every mapped frame
pub trait ResultSink {
    fn process(&mut self, result: DitherResult<'_>, metadata: &FrameMetadata);
}

impl<F> ResultSink for F where F: FnMut(DitherResult<'_>, &FrameMetadata) {
    #[inline]
    fn process(&mut self, result: DitherResult<'_>, metadata: &FrameMetadata) {
        self(result, metadata)
    }
}

/// Maps every frame with a shared engine and passes the result to a sink.
///
/// Output buffers and error scratch are kept between frames, so a steady stream
/// of same-sized frames doesn't allocate. Frames that can't be mapped are discarded
/// with a warning, and the next frame is processed normally.
pub struct DitherFilter<S> {
    engine: Arc<Engine>,
    sink: S,
    mode: OutputMode,
    indices: Vec<PalIndex>,
    colors: Vec<RGB>,
    acc: ErrorAccumulator,
}

impl<S: ResultSink> DitherFilter<S> {
    #[must_use]
    pub fn new(engine: Arc<Engine>, sink: S) -> Self {
        Self {
            engine,
            sink,
            mode: OutputMode::default(),
            indices: Vec::new(),
            colors: Vec::new(),
            acc: ErrorAccumulator::new(),
        }
    }

    #[must_use]
    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn process(&mut self, frame: &Frame<'_>, metadata: &FrameMetadata) -> Result<(), Error> {
        if metadata.width != frame.width() || metadata.height != frame.height() {
            return Err(Error::InvalidFrame(format!(
                "metadata says {}×{}, but the frame is {}×{}",
                metadata.width, metadata.height, frame.width(), frame.height()
            )));
        }
        let len = frame.pixel_count();
        resize(&mut self.indices, len, 0)?;

        if metadata.skip_dither {
            self.engine.remap_undithered_into(frame, &mut self.indices)?;
        } else {
            self.engine.remap_with_accumulator(frame, &mut self.acc, &mut self.indices)?;
        }

        let result = match self.mode {
            OutputMode::Indices => DitherResult::Indices(&self.indices),
            OutputMode::Colors => {
                resize(&mut self.colors, len, RGB::default())?;
                self.engine.palette().expand_into(&self.indices, &mut self.colors)?;
                DitherResult::Colors(&self.colors)
            },
        };
        self.sink.process(result, metadata);
        Ok(())
    }
}

impl<S: ResultSink> VideoFilter for DitherFilter<S> {
    fn apply_filter(&mut self, frame: &Frame<'_>, metadata: &FrameMetadata) -> FilterSignal {
        match self.process(frame, metadata) {
            Ok(()) => FilterSignal::Accept,
            Err(err) => {
                tracing::warn!(frame = metadata.index, %err, "discarding frame");
                FilterSignal::Discard
            },
        }
    }
}

fn resize<T: Copy>(buf: &mut Vec<T>, len: usize, fill: T) -> Result<(), Error> {
    if buf.len() != len {
        buf.clear();
        buf.try_reserve_exact(len)?;
        buf.resize(len, fill);
    }
    Ok(())
}

#[test]
fn closures_are_filters() {
    let px = [RGB::new(1, 2, 3); 4];
    let frame = Frame::new_rgb(&px, 2, 2).unwrap();
    let mut seen = 0;
    let mut count = |f: &Frame<'_>, _: &FrameMetadata| {
        seen += f.pixel_count();
        FilterSignal::Accept
    };
    assert_eq!(count.apply_filter(&frame, &FrameMetadata::new(2, 2)), FilterSignal::Accept);
    assert_eq!(seen, 4);
}

#[test]
fn discards_and_recovers() {
    use crate::settings::{Settings, Strategy};

    let pal: &[RGB] = &[RGB::new(0, 0, 0), RGB::new(255, 255, 255)];
    let engine = Arc::new(Engine::new(&Settings::new(Strategy::Nearest), pal).unwrap());
    let mut got = Vec::new();
    let mut filter = DitherFilter::new(engine, |res: DitherResult<'_>, meta: &FrameMetadata| {
        if let DitherResult::Colors(c) = res {
            got.push((meta.index, c.to_vec()));
        }
    }).with_output_mode(OutputMode::Colors);

    let px = [RGB::new(250, 250, 250), RGB::new(3, 3, 3)];
    let frame = Frame::new_rgb(&px, 2, 1).unwrap();
    assert_eq!(filter.apply_filter(&frame, &FrameMetadata::new(1, 2)), FilterSignal::Discard);
    assert_eq!(filter.apply_filter(&frame, &FrameMetadata::new(2, 1).with_index(1)), FilterSignal::Accept);
    drop(filter);
    assert_eq!(got, vec![(1, vec![RGB::new(255, 255, 255), RGB::new(0, 0, 0)])]);
}
