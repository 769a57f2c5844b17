#![feature(test)]

extern crate test;
use test::Bencher;

use framequant::*;

fn frame_pixels(width: usize, height: usize) -> Vec<RGB> {
    (0..width * height).map(|i| {
        let (x, y) = (i % width, i / width);
        RGB::new((x * 255 / width) as u8, (y * 255 / height) as u8, ((x ^ y) & 255) as u8)
    }).collect()
}

#[bench]
fn build_table(b: &mut Bencher) {
    let pal = Palette::eight_bit();
    b.iter(move || {
        LookupTable::build(&pal).unwrap()
    });
}

#[bench]
fn build_table_256(b: &mut Bencher) {
    let colors: Vec<_> = (0..256u32).map(|i| i.wrapping_mul(0x9e37_79b9) & 0xff_ffff).collect();
    let pal = Palette::from_packed(&colors).unwrap();
    b.iter(move || {
        LookupTable::build(&pal).unwrap()
    });
}

fn remap(b: &mut Bencher, strategy: Strategy) {
    let (w, h) = (640, 360);
    let px = frame_pixels(w, h);
    let engine = Engine::with_palette(&Settings::new(strategy), Palette::eight_bit()).unwrap();
    let mut out = vec![0; w * h];
    b.iter(move || {
        let frame = Frame::new_rgb(&px, w, h).unwrap();
        engine.remap_into(&frame, &mut out).unwrap();
    });
}

#[bench]
fn remap_nearest(b: &mut Bencher) {
    remap(b, Strategy::Nearest);
}

#[bench]
fn remap_ord(b: &mut Bencher) {
    remap(b, Strategy::Ordered(DitherMatrix::bayer_8x8().with_strength(0.002).unwrap()));
}

#[bench]
fn remap_filter_lite(b: &mut Bencher) {
    remap(b, Strategy::ErrorDiffusion(Diffusion::default()));
}

#[bench]
fn remap_floyd(b: &mut Bencher) {
    remap(b, Strategy::ErrorDiffusion(Diffusion::new(DiffusionKernel::floyd_steinberg())));
}

#[bench]
fn remap_random(b: &mut Bencher) {
    remap(b, Strategy::Random(RandomDither::normal()));
}
