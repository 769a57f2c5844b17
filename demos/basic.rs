//! cargo run --example basic -- input.png output.png [config.json]
use framequant::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: basic <input.png> <output.png> [config.json]");
        std::process::exit(1);
    };

    // Image loading/saving is outside scope of this library
    let img = match lodepng::decode24_file(&input) {
        Ok(img) => img,
        Err(err) => panic!("Can't load {input}: {err}"),
    };

    // Either a JSON config with its own palette, or the eight-color palette with error diffusion
    let engine = match args.next() {
        Some(path) => {
            let file = std::fs::File::open(&path).unwrap();
            EngineConfig::from_reader(std::io::BufReader::new(file)).and_then(|c| c.engine())
        },
        None => Engine::with_palette(&Settings::new(Strategy::ErrorDiffusion(Diffusion::default())), Palette::eight_bit()),
    };
    let engine = match engine {
        Ok(engine) => engine,
        Err(err) => panic!("Can't set up the engine, because: {err}"),
    };

    let frame = Frame::new_rgb(&img.buffer, img.width, img.height).unwrap();
    let (indices, residual) = {
        let mut out = vec![0; frame.pixel_count()];
        let residual = engine.remap_with_residual(&frame, &mut out).unwrap();
        (out, residual)
    };

    let mut colors = vec![RGB::default(); indices.len()];
    engine.palette().expand_into(&indices, &mut colors).unwrap();
    lodepng::encode24_file(&output, &colors, img.width, img.height).unwrap();

    println!("Done! Mapped {} pixels onto {} colors", indices.len(), engine.palette().len());
    if let Some(residual) = residual {
        println!("Error left over at the bottom/right edges: {:?}", residual.discarded);
    }
}
