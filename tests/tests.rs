use framequant::*;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// xorshift, so that "random" frames are the same on every run
struct Noise(u32);

impl Noise {
    fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0
    }

    fn rgb(&mut self) -> RGB {
        let n = self.next();
        RGB::new(n as u8, (n >> 8) as u8, (n >> 16) as u8)
    }
}

fn random_palette(len: usize, seed: u32) -> Palette {
    let mut noise = Noise(seed);
    let colors: Vec<_> = (0..len).map(|_| noise.rgb()).collect();
    Palette::new(&colors).unwrap()
}

fn gradient(width: usize, height: usize) -> Vec<RGB> {
    (0..width * height).map(|i| {
        let (x, y) = (i % width, i / width);
        RGB::new((x * 255 / (width - 1)) as u8, (y * 255 / (height - 1)) as u8, ((x + y) * 255 / (width + height - 2)) as u8)
    }).collect()
}

fn output_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("framequant-{name}.png"))
}

#[test]
fn table_matches_brute_force() {
    init_logging();
    let pal = random_palette(37, 12345);
    let lut = LookupTable::build(&pal).unwrap();
    assert_eq!(lut.palette_len(), 37);

    let mut noise = Noise(99);
    for _ in 0..20_000 {
        let q = QuantizedCoordinate::from_index(noise.next() as usize % TABLE_LEN).unwrap();
        let [r, g, b] = q.midpoint().map(f64::from);
        let mut best = (0, f64::MAX);
        for (i, c) in pal.iter().enumerate() {
            let d = (r - f64::from(c.r)).powi(2) + (g - f64::from(c.g)).powi(2) + (b - f64::from(c.b)).powi(2);
            if d < best.1 {
                best = (i, d);
            }
        }
        assert_eq!(usize::from(lut.get(q)), best.0, "{q:?}");
    }
}

#[test]
fn corners_of_the_table() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255), RGB::new(255, 0, 0), RGB::new(0, 0, 255)]).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    assert_eq!(lut.lookup(RGB::new(0, 0, 0)), 0);
    assert_eq!(lut.lookup(RGB::new(255, 255, 255)), 1);
    assert_eq!(lut.lookup(RGB::new(255, 0, 0)), 2);
    assert_eq!(lut.lookup(RGB::new(1, 0, 254)), 3);
}

#[test]
fn build_is_deterministic() {
    let pal = random_palette(200, 777);
    let a = LookupTable::build(&pal).unwrap();
    let b = LookupTable::build(&pal).unwrap();
    assert!(a.as_slice() == b.as_slice());
}

#[test]
fn worker_count_does_not_change_the_table() {
    let pal = random_palette(64, 4242);
    let mut one = Settings::new(Strategy::Nearest);
    one.set_max_threads(Some(1)).unwrap();
    let mut many = Settings::new(Strategy::Nearest);
    many.set_max_threads(Some(4)).unwrap();

    let a = Engine::with_palette(&one, pal.clone()).unwrap();
    let b = Engine::with_palette(&many, pal.clone()).unwrap();
    let c = Engine::with_palette(&Settings::new(Strategy::Nearest), pal).unwrap();
    assert!(a.lookup_table().as_slice() == b.lookup_table().as_slice());
    assert!(a.lookup_table().as_slice() == c.lookup_table().as_slice());
}

#[test]
fn full_palette_table() {
    let colors: Vec<_> = (0..=255u8).map(|i| RGB::new(i, i.wrapping_mul(7), 255 - i)).collect();
    let pal = Palette::new(&colors).unwrap();
    let lut = LookupTable::build(&pal).unwrap();
    assert_eq!(lut.len(), 128 * 128 * 128);
    assert!(lut.as_slice().iter().all(|&i| usize::from(i) < pal.len()));
    // exact palette colors find themselves
    assert_eq!(lut.lookup(RGB::new(0, 0, 255)), 0);
}

#[test]
fn ordered_uniform_frame_repeats_tile() {
    init_logging();
    let pal = [RGB::new(0, 0, 0), RGB::new(85, 85, 85), RGB::new(170, 170, 170), RGB::new(255, 255, 255)];
    let matrix = DitherMatrix::bayer_4x4().with_strength(0.004).unwrap();
    let engine = Engine::new(&Settings::new(Strategy::Ordered(matrix)), &pal[..]).unwrap();

    let (w, h) = (37, 23);
    let px = vec![RGB::new(120, 120, 120); w * h];
    let frame = Frame::new_rgb(&px, w, h).unwrap();
    let out = engine.remapped(&frame).unwrap();

    for y in 0..h {
        for x in 0..w {
            assert_eq!(out[y * w + x], out[(y % 4) * w + x % 4], "{x},{y}");
        }
    }
    // the pattern actually varies within the tile
    let tile: Vec<_> = (0..16).map(|i| out[(i / 4) * w + i % 4]).collect();
    assert!(tile.iter().any(|&i| i != tile[0]));
}

#[test]
fn ordered_zero_strength_is_nearest() {
    let pal = random_palette(16, 5);
    let px = gradient(64, 32);
    let frame = Frame::new_rgb(&px, 64, 32).unwrap();

    let matrix = DitherMatrix::bayer(8).unwrap().with_strength(0.).unwrap();
    let ordered = Engine::with_palette(&Settings::new(Strategy::Ordered(matrix)), pal.clone()).unwrap();
    let nearest = Engine::with_palette(&Settings::new(Strategy::Nearest), pal).unwrap();
    assert_eq!(ordered.remapped(&frame).unwrap(), nearest.remapped(&frame).unwrap());
}

#[test]
fn random_dither_is_repeatable() {
    let pal = [RGB::new(0, 0, 0), RGB::new(255, 255, 255)];
    let (w, h) = (48, 32);
    let px = vec![RGB::new(128, 128, 128); w * h];
    let frame = Frame::new_rgb(&px, w, h).unwrap();

    let engine = |random: RandomDither| Engine::new(&Settings::new(Strategy::Random(random)), &pal[..]).unwrap();
    let a = engine(RandomDither::heavy().with_seed(1)).remapped(&frame).unwrap();
    assert_eq!(a, engine(RandomDither::heavy().with_seed(1)).remapped(&frame).unwrap());
    assert_ne!(a, engine(RandomDither::heavy().with_seed(2)).remapped(&frame).unwrap());

    // mid gray with symmetric noise lands on both colors, roughly half each
    let white = a.iter().filter(|&&i| i == 1).count();
    assert!((w * h / 3..w * h * 2 / 3).contains(&white), "{white}");

    // without noise it's plain nearest color
    let quiet = engine(RandomDither::new(0).unwrap().with_seed(7)).remapped(&frame).unwrap();
    assert!(quiet.iter().all(|&i| i == 1));

    // the worker count doesn't matter
    let mut settings = Settings::new(Strategy::Random(RandomDither::heavy().with_seed(1)));
    settings.set_max_threads(Some(1)).unwrap();
    assert_eq!(Engine::new(&settings, &pal[..]).unwrap().remapped(&frame).unwrap(), a);
}

fn assert_conserved(pal: &Palette, frame: &Frame<'_>, out: &[PalIndex], res: &Residual) {
    let mut diff = [0i64; 3];
    let mut mapped = 0;
    for y in 0..frame.height() {
        let row = frame.row(y);
        for x in 0..frame.width() {
            let px = row.pixel(x);
            let c = pal[usize::from(out[y * frame.width() + x])];
            diff[0] += i64::from(px.r) - i64::from(c.r);
            diff[1] += i64::from(px.g) - i64::from(c.g);
            diff[2] += i64::from(px.b) - i64::from(c.b);
            mapped += 1;
        }
    }
    assert_eq!(mapped, res.mapped_pixels);
    assert_eq!(diff, res.discarded);
}

#[test]
fn diffusion_conserves_error() {
    init_logging();
    let pal = random_palette(6, 31337);
    let mut noise = Noise(2024);
    let (w, h) = (53, 41);
    let px: Vec<_> = (0..w * h).map(|_| noise.rgb()).collect();
    let frame = Frame::new_rgb(&px, w, h).unwrap();

    let kernels = [
        DiffusionKernel::filter_lite(),
        DiffusionKernel::floyd_steinberg(),
        DiffusionKernel::atkinson(),
        DiffusionKernel::burkes(),
        DiffusionKernel::stucki(),
        DiffusionKernel::jarvis_judice_ninke(),
        DiffusionKernel::stevenson_arce(),
    ];
    for kernel in kernels {
        for scan in [ScanOrder::RowMajor, ScanOrder::Serpentine] {
            let diffusion = Diffusion::new(kernel.clone()).with_scan_order(scan);
            let engine = Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(diffusion)), pal.clone()).unwrap();
            let mut out = vec![0; w * h];
            let res = engine.remap_with_residual(&frame, &mut out).unwrap().unwrap();
            assert_conserved(&pal, &frame, &out, &res);
        }
    }
}

#[test]
fn diffusion_single_pixel() {
    let pal = random_palette(9, 8);
    let px = [RGB::new(200, 30, 90)];
    let frame = Frame::new_rgb(&px, 1, 1).unwrap();
    let engine = Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(Diffusion::default())), pal.clone()).unwrap();
    let mut out = [0];
    let res = engine.remap_with_residual(&frame, &mut out).unwrap().unwrap();
    assert_eq!(out[0], engine.nearest(px[0]));
    assert_conserved(&pal, &frame, &out, &res);
}

#[test]
fn diffusion_frames_are_independent() {
    let pal = random_palette(4, 77);
    let engine = Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(Diffusion::default())), pal).unwrap();
    let a = gradient(40, 30);
    let b = vec![RGB::new(250, 10, 10); 40 * 30];
    let fa = Frame::new_rgb(&a, 40, 30).unwrap();
    let fb = Frame::new_rgb(&b, 40, 30).unwrap();

    let mut acc = ErrorAccumulator::new();
    let mut first = vec![0; 1200];
    let mut again = vec![0; 1200];
    engine.remap_with_accumulator(&fa, &mut acc, &mut first).unwrap();
    engine.remap_with_accumulator(&fb, &mut acc, &mut again).unwrap();
    engine.remap_with_accumulator(&fa, &mut acc, &mut again).unwrap();
    assert_eq!(first, again);
}

#[test]
fn serpentine_differs_from_row_major() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255)]).unwrap();
    let px = vec![RGB::new(90, 90, 90); 16 * 16];
    let frame = Frame::new_rgb(&px, 16, 16).unwrap();
    let map = |scan| {
        let d = Diffusion::new(DiffusionKernel::floyd_steinberg()).with_scan_order(scan);
        Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(d)), pal.clone()).unwrap().remapped(&frame).unwrap()
    };
    let serpentine = map(ScanOrder::Serpentine);
    let row_major = map(ScanOrder::RowMajor);
    assert_ne!(serpentine, row_major);
    // same first row, scanned the same way
    assert_eq!(serpentine[..16], row_major[..16]);
    // about 90/255 of the pixels are white either way
    for out in [serpentine, row_major] {
        let white = out.iter().filter(|&&i| i == 1).count();
        assert!((75..106).contains(&white), "{white}");
    }
}

#[test]
fn transparent_pixels() {
    let pal = Palette::new(&[RGB::new(0, 0, 0), RGB::new(255, 255, 255), RGB::new(255, 0, 255)]).unwrap();
    let mut px = vec![RGBA::new(100, 100, 100, 255); 8 * 8];
    for i in (0..64).step_by(3) {
        px[i] = RGBA::new(255, 255, 255, 0);
    }
    let frame = Frame::new_rgba(&px, 8, 8).unwrap();

    let mut settings = Settings::new(Strategy::ErrorDiffusion(Diffusion::default()));
    settings.set_transparent_index(Some(2));
    let engine = Engine::with_palette(&settings, pal.clone()).unwrap();
    let mut out = vec![0; 64];
    let res = engine.remap_with_residual(&frame, &mut out).unwrap().unwrap();
    assert_eq!(res.mapped_pixels, 64 - 22);

    let mut diff = [0i64; 3];
    for (i, (&p, &idx)) in px.iter().zip(&out).enumerate() {
        if i % 3 == 0 {
            assert_eq!(idx, 2);
            continue;
        }
        assert_ne!(idx, 2);
        let c = pal[usize::from(idx)];
        diff[0] += i64::from(p.r) - i64::from(c.r);
        diff[1] += i64::from(p.g) - i64::from(c.g);
        diff[2] += i64::from(p.b) - i64::from(c.b);
    }
    assert_eq!(diff, res.discarded);

    // without a transparent index alpha is ignored
    let engine = Engine::with_palette(&Settings::new(Strategy::Nearest), pal).unwrap();
    let out = engine.remapped(&frame).unwrap();
    assert_eq!(out[0], 1);
    assert_eq!(out[1], 0);
}

#[test]
fn batch_matches_single_frames() {
    let pal = Palette::eight_bit();
    let a = gradient(31, 17);
    let b = gradient(64, 48);
    let mut noise = Noise(3);
    let c: Vec<_> = (0..20 * 20).map(|_| noise.rgb()).collect();
    let frames = [
        Frame::new_rgb(&a, 31, 17).unwrap(),
        Frame::new_rgb(&b, 64, 48).unwrap(),
        Frame::new_rgb(&c, 20, 20).unwrap(),
        Frame::new_rgb(&a, 31, 17).unwrap(),
    ];
    let strategies = [
        Strategy::Nearest,
        Strategy::Ordered(DitherMatrix::clustered_dot_6x6().with_strength(0.002).unwrap()),
        Strategy::Random(RandomDither::normal().with_seed(5)),
        Strategy::ErrorDiffusion(Diffusion::default()),
    ];
    for strategy in strategies {
        let mut settings = Settings::new(strategy);
        settings.set_max_threads(Some(3)).unwrap();
        let engine = Engine::with_palette(&settings, pal.clone()).unwrap();
        let batch = engine.remap_frames(&frames).unwrap();
        assert_eq!(batch.len(), frames.len());
        for (frame, out) in frames.iter().zip(&batch) {
            assert_eq!(&engine.remapped(frame).unwrap(), out);
        }
        assert_eq!(batch[0], batch[3]);
    }
}

#[test]
fn strided_frames() {
    let pal = Palette::eight_bit();
    let engine = Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(Diffusion::default())), pal).unwrap();
    let tight = gradient(10, 10);
    let mut padded = vec![RGB::new(255, 0, 0); 13 * 10];
    for y in 0..10 {
        padded[y * 13..y * 13 + 10].copy_from_slice(&tight[y * 10..y * 10 + 10]);
    }
    let a = engine.remapped(&Frame::new_rgb(&tight, 10, 10).unwrap()).unwrap();
    let b = engine.remapped(&Frame::new_rgb_stride(&padded, 10, 10, 13).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn invalid_inputs() {
    assert!(matches!(Palette::new(&[]), Err(Error::InvalidPalette(_))));
    let too_many: Vec<u32> = (0..257).collect();
    assert!(matches!(Engine::new(&Settings::new(Strategy::Nearest), &too_many[..]), Err(Error::InvalidPalette(_))));

    let px = [RGB::new(0, 0, 0); 4];
    assert!(matches!(Frame::new_rgb(&px, 0, 0), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::new_rgb(&px, 3, 2), Err(Error::InvalidFrame(_))));
    assert!(matches!(Frame::from_bytes(&[0; 11], PixelLayout::Rgb, 2, 2), Err(Error::InvalidFrame(_))));
}

#[test]
fn filter_in_a_pipeline() {
    init_logging();
    let engine = std::sync::Arc::new(Engine::with_palette(
        &Settings::new(Strategy::ErrorDiffusion(Diffusion::default())),
        Palette::eight_bit(),
    ).unwrap());

    let mut frames_seen = Vec::new();
    let sink = |res: DitherResult<'_>, meta: &FrameMetadata| {
        if let DitherResult::Indices(idx) = res {
            frames_seen.push((meta.index, idx.len()));
        }
    };
    let mut stages: Vec<Box<dyn VideoFilter + '_>> = vec![
        Box::new(|f: &Frame<'_>, _: &FrameMetadata| if f.width() > 100 { FilterSignal::Discard } else { FilterSignal::Accept }),
        Box::new(DitherFilter::new(engine.clone(), sink)),
    ];

    let small = gradient(20, 10);
    let big = gradient(120, 2);
    let inputs = [
        (Frame::new_rgb(&small, 20, 10).unwrap(), FrameMetadata::new(20, 10).with_index(0)),
        (Frame::new_rgb(&big, 120, 2).unwrap(), FrameMetadata::new(120, 2).with_index(1)),
        (Frame::new_rgb(&small, 20, 10).unwrap(), FrameMetadata::new(10, 20).with_index(2)),
        (Frame::new_rgb(&small, 20, 10).unwrap(), FrameMetadata { skip_dither: true, ..FrameMetadata::new(20, 10).with_index(3) }),
    ];
    let mut accepted = Vec::new();
    for (frame, meta) in &inputs {
        let passed = stages.iter_mut().all(|stage| stage.apply_filter(frame, meta) == FilterSignal::Accept);
        accepted.push(passed);
    }
    drop(stages);
    assert_eq!(accepted, [true, false, false, true]);
    assert_eq!(frames_seen, [(0, 200), (3, 200)]);
}

#[cfg(feature = "serde")]
#[test]
fn engine_from_json() {
    let json = r#"{
        "strategy": {"type": "ordered", "matrix": "bayer-8x8", "strength": 0.001},
        "max-threads": 2,
        "palette": [[0, 0, 0], {"label": "snow", "color": [250, 250, 250]}, [200, 30, 30]]
    }"#;
    let engine = EngineConfig::from_json(json).unwrap().engine().unwrap();
    assert_eq!(engine.palette().len(), 3);
    assert_eq!(engine.nearest(RGB::new(210, 20, 20)), 2);

    let table = JsonColorTable::from_str("[[1, 2, 3], [4, 5, 6]]").unwrap();
    let engine = Engine::new(&Settings::new(Strategy::Nearest), &table).unwrap();
    assert_eq!(engine.palette().as_slice(), &[RGB::new(1, 2, 3), RGB::new(4, 5, 6)]);
}

#[test]
fn visual_output() {
    init_logging();
    let (w, h) = (256, 96);
    let px = gradient(w, h);
    let frame = Frame::new_rgb(&px, w, h).unwrap();
    let pal = Palette::eight_bit();

    let strategies = [
        ("nearest", Strategy::Nearest),
        ("bayer", Strategy::Ordered(DitherMatrix::bayer_8x8().with_strength(0.002).unwrap())),
        ("filter-lite", Strategy::ErrorDiffusion(Diffusion::default())),
        ("atkinson", Strategy::ErrorDiffusion(Diffusion::new(DiffusionKernel::atkinson()))),
        ("stevenson-arce", Strategy::ErrorDiffusion(Diffusion::new(DiffusionKernel::stevenson_arce()))),
        ("noise", Strategy::Random(RandomDither::normal())),
        ("halftone", Strategy::Ordered(DitherMatrix::clustered_dot_diagonal_8x8().with_strength(0.002).unwrap())),
    ];
    for (name, strategy) in strategies {
        let engine = Engine::with_palette(&Settings::new(strategy), pal.clone()).unwrap();
        let idx = engine.remapped(&frame).unwrap();
        let mut colors = vec![RGB::default(); idx.len()];
        pal.expand_into(&idx, &mut colors).unwrap();
        lodepng::encode24_file(output_path(name), &colors, w, h).unwrap();
        assert!(idx.iter().all(|&i| usize::from(i) < pal.len()));
    }
}
