//! Engine setup from a JSON file.
use crate::diffuse::{Diffusion, DiffusionKernel, ScanOrder, Tap};
use crate::engine::Engine;
use crate::error::Error;
use crate::ordered::{DitherMatrix, STRENGTH_NORMAL};
use crate::pal::{PalIndex, Palette};
use crate::random::RandomDither;
use crate::settings::{Settings, Strategy};
use crate::source::JsonColorTable;
use serde::Deserialize;

/// Everything needed to create an [`Engine`], e.g.
///
/// ```json
/// {
///   "strategy": { "type": "error-diffusion", "kernel": "floyd-steinberg", "scan": "row-major" },
///   "transparent-index": 0,
///   "palette": [[0, 0, 0], [255, 255, 255]]
/// }
/// ```
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    pub strategy: StrategyConfig,

    /// Palette entry for fully transparent pixels
    #[serde(default)]
    pub transparent_index: Option<PalIndex>,

    /// Size of the engine's own thread pool
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Inline colors or a built-in palette name. Can be left out when the palette comes from elsewhere.
    #[serde(default)]
    pub palette: Option<PaletteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StrategyConfig {
    Nearest,
    Ordered {
        matrix: MatrixConfig,
        #[serde(default = "default_strength")]
        strength: f32,
    },
    Random {
        #[serde(default)]
        weight: WeightConfig,
        #[serde(default)]
        seed: u64,
    },
    ErrorDiffusion {
        #[serde(default)]
        kernel: KernelConfig,
        #[serde(default)]
        scan: ScanOrder,
    },
}

fn default_strength() -> f32 {
    STRENGTH_NORMAL
}

/// `"bayer-4x4"` or `{"rows": [[..], ..], "max": 16}`
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum MatrixConfig {
    Preset(String),
    Custom { rows: Vec<Vec<u32>>, max: u32 },
}

/// `"filter-lite"` or `{"taps": [{"dx": 1, "dy": 0, "weight": 1}, ..], "divisor": 2}`
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum KernelConfig {
    Preset(String),
    Custom { taps: Vec<Tap>, divisor: i32 },
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::Preset("filter-lite".into())
    }
}

/// `"light"`, `"normal"`, `"heavy"` or a number up to 255
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum WeightConfig {
    Preset(String),
    Value(u32),
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self::Preset("normal".into())
    }
}

/// `"eight-bit"` or a color table
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum PaletteConfig {
    Preset(String),
    Colors(JsonColorTable),
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, Error> {
        serde_json::from_reader(reader).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolves preset names and validates values
    pub fn settings(&self) -> Result<Settings, Error> {
        let mut settings = Settings::new(self.strategy.resolve()?);
        settings.set_transparent_index(self.transparent_index);
        settings.set_max_threads(self.max_threads)?;
        Ok(settings)
    }

    /// `None` if the file doesn't name a palette
    pub fn palette(&self) -> Result<Option<Palette>, Error> {
        match &self.palette {
            None => Ok(None),
            Some(PaletteConfig::Preset(name)) => match name.as_str() {
                "eight-bit" => Ok(Some(Palette::eight_bit())),
                _ => Err(Error::Config(format!("unknown palette '{name}'"))),
            },
            Some(PaletteConfig::Colors(table)) => Palette::from_source(table).map(Some),
        }
    }

    /// Needs the palette to be in the config
    pub fn engine(&self) -> Result<Engine, Error> {
        let palette = self.palette()?.ok_or_else(|| Error::Config("no palette configured".into()))?;
        let settings = self.settings()?;
        tracing::debug!(strategy = settings.strategy().name(), colors = palette.len(), "loaded engine config");
        Engine::with_palette(&settings, palette)
    }
}

impl StrategyConfig {
    fn resolve(&self) -> Result<Strategy, Error> {
        Ok(match self {
            Self::Nearest => Strategy::Nearest,
            Self::Ordered { matrix, strength } => {
                let matrix = match matrix {
                    MatrixConfig::Preset(name) => DitherMatrix::named(name)
                        .ok_or_else(|| Error::Config(format!("unknown dither matrix '{name}'")))?,
                    MatrixConfig::Custom { rows, max } => DitherMatrix::new(rows, *max)?,
                };
                Strategy::Ordered(matrix.with_strength(*strength)?)
            },
            Self::Random { weight, seed } => {
                let random = match weight {
                    WeightConfig::Preset(name) => RandomDither::named(name)
                        .ok_or_else(|| Error::Config(format!("unknown noise weight '{name}'")))?,
                    WeightConfig::Value(weight) => RandomDither::new(*weight)?,
                };
                Strategy::Random(random.with_seed(*seed))
            },
            Self::ErrorDiffusion { kernel, scan } => {
                let kernel = match kernel {
                    KernelConfig::Preset(name) => DiffusionKernel::named(name)
                        .ok_or_else(|| Error::Config(format!("unknown diffusion kernel '{name}'")))?,
                    KernelConfig::Custom { taps, divisor } => DiffusionKernel::new(taps, *divisor)?,
                };
                Strategy::ErrorDiffusion(Diffusion::new(kernel).with_scan_order(*scan))
            },
        })
    }
}

#[test]
fn parses_strategies() {
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Nearest);
    assert!(c.palette().unwrap().is_none());
    assert!(matches!(c.engine(), Err(Error::Config(_))));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "ordered", "matrix": "bayer-2x2", "strength": 0.5}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Ordered(DitherMatrix::bayer_2x2().with_strength(0.5).unwrap()));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "ordered", "matrix": {"rows": [[0, 1], [1, 0]], "max": 2}}}"#).unwrap();
    let Strategy::Ordered(m) = c.settings().unwrap().strategy().clone() else { panic!() };
    assert_eq!((m.width(), m.height(), m.max(), m.strength()), (2, 2, 2, STRENGTH_NORMAL));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "random"}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Random(RandomDither::normal()));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "random", "weight": "light", "seed": 9}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Random(RandomDither::light().with_seed(9)));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "random", "weight": 100}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Random(RandomDither::new(100).unwrap()));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "ordered", "matrix": "clustered-dot-diagonal-16x16"}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::Ordered(DitherMatrix::clustered_dot_diagonal_16x16()));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "error-diffusion", "kernel": "stevenson-arce"}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::ErrorDiffusion(Diffusion::new(DiffusionKernel::stevenson_arce())));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "error-diffusion"}}"#).unwrap();
    assert_eq!(c.settings().unwrap().strategy(), &Strategy::ErrorDiffusion(Diffusion::default()));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "error-diffusion", "kernel": {"taps": [{"dx": 1, "dy": 0, "weight": 1}], "divisor": 2}, "scan": "row-major"}}"#).unwrap();
    let Strategy::ErrorDiffusion(d) = c.settings().unwrap().strategy().clone() else { panic!() };
    assert_eq!(d.scan_order(), ScanOrder::RowMajor);
    assert_eq!(d.kernel().taps(), &[Tap::new(1, 0, 1)]);
}

#[test]
fn rejects_bad_config() {
    assert!(matches!(EngineConfig::from_json(r#"{"strategy": {"type": "blue-noise"}}"#), Err(Error::Config(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "random", "weight": 300}}"#).unwrap();
    assert!(matches!(c.settings(), Err(Error::ValueOutOfRange(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "random", "weight": "loud"}}"#).unwrap();
    assert!(matches!(c.settings(), Err(Error::Config(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "error-diffusion", "kernel": {"taps": [{"dx": 1, "dy": 0, "weight": 1073741824}], "divisor": 1073741824}}}"#).unwrap();
    assert!(c.settings().is_ok());
    assert!(matches!(EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}, "colour": 1}"#), Err(Error::Config(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "ordered", "matrix": "bayer-3x3"}}"#).unwrap();
    assert!(matches!(c.settings(), Err(Error::Config(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "ordered", "matrix": "bayer-4x4", "strength": 3}}"#).unwrap();
    assert!(matches!(c.settings(), Err(Error::ValueOutOfRange(_))));
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}, "max-threads": 0}"#).unwrap();
    assert!(c.settings().is_err());
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}, "palette": "sixteen"}"#).unwrap();
    assert!(matches!(c.palette(), Err(Error::Config(_))));
}

#[test]
fn palette_from_config() {
    let c = EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}, "palette": "eight-bit"}"#).unwrap();
    assert_eq!(c.palette().unwrap(), Some(Palette::eight_bit()));

    let c = EngineConfig::from_json(r#"{"strategy": {"type": "nearest"}, "transparent-index": 1, "palette": [[0, 0, 0], {"label": "white", "color": [255, 255, 255]}]}"#).unwrap();
    let engine = c.engine().unwrap();
    assert_eq!(engine.palette().len(), 2);
    assert_eq!(engine.settings().transparent_index(), Some(1));
}
