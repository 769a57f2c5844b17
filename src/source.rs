//! Where palette colors come from.
//!
//! The engine only needs a flat, ordered list of colors. Whatever catalog the colors
//! were picked from (block materials, terminal colors, e-ink pigments) stays on the
//! caller's side of this trait.
use crate::error::Error;
use crate::pal::RGB;

/// Provider of an ordered color list
pub trait ColorSource {
    /// Colors in palette order. Index `n` of this list becomes palette index `n`.
    fn colors(&self) -> Result<Vec<RGB>, Error>;
}

impl ColorSource for [RGB] {
    #[inline]
    fn colors(&self) -> Result<Vec<RGB>, Error> {
        Ok(self.to_vec())
    }
}

impl ColorSource for Vec<RGB> {
    #[inline]
    fn colors(&self) -> Result<Vec<RGB>, Error> {
        Ok(self.clone())
    }
}

impl<const N: usize> ColorSource for [RGB; N] {
    #[inline]
    fn colors(&self) -> Result<Vec<RGB>, Error> {
        Ok(self.to_vec())
    }
}

/// `0xRRGGBB`, top byte ignored
impl ColorSource for [u32] {
    fn colors(&self) -> Result<Vec<RGB>, Error> {
        Ok(self.iter().map(|&c| RGB::new((c >> 16) as u8, (c >> 8) as u8, c as u8)).collect())
    }
}

#[cfg(feature = "serde")]
pub use self::json::JsonColorTable;

#[cfg(feature = "serde")]
mod json {
    use super::ColorSource;
    use crate::error::Error;
    use crate::pal::RGB;
    use serde::Deserialize;

    /// Entry of a color table file: either a bare `[r, g, b]` or a labelled color
    #[derive(Debug, Clone, Deserialize)]
    #[serde(untagged)]
    pub(crate) enum ColorEntry {
        Plain([u8; 3]),
        Labeled {
            #[allow(dead_code)]
            label: String,
            color: [u8; 3],
        },
    }

    impl ColorEntry {
        #[inline]
        pub(crate) fn rgb(&self) -> RGB {
            let [r, g, b] = match self {
                Self::Plain(c) | Self::Labeled { color: c, .. } => *c,
            };
            RGB::new(r, g, b)
        }
    }

    /// JSON color table, e.g. `[[0, 0, 0], [127, 178, 56]]` or
    /// `[{"label": "grass", "color": [127, 178, 56]}]`.
    ///
    /// Labels are accepted and dropped. Channels outside 0-255 or entries that
    /// are not exactly three numbers make the whole table invalid.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(transparent)]
    pub struct JsonColorTable {
        entries: Vec<ColorEntry>,
    }

    impl JsonColorTable {
        pub fn from_str(json: &str) -> Result<Self, Error> {
            serde_json::from_str(json)
                .map(|entries| Self { entries })
                .map_err(|e| Error::InvalidPalette(format!("color table: {e}")))
        }

        pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, Error> {
            serde_json::from_reader(reader)
                .map(|entries| Self { entries })
                .map_err(|e| Error::InvalidPalette(format!("color table: {e}")))
        }

        #[must_use]
        pub fn len(&self) -> usize {
            self.entries.len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }
    }

    impl ColorSource for JsonColorTable {
        fn colors(&self) -> Result<Vec<RGB>, Error> {
            Ok(self.entries.iter().map(ColorEntry::rgb).collect())
        }
    }

    #[test]
    fn plain_and_labeled() {
        let table = JsonColorTable::from_str(r#"[[0,0,0], {"label": "grass", "color": [127, 178, 56]}, [255, 255, 255]]"#).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.colors().unwrap(), vec![RGB::new(0, 0, 0), RGB::new(127, 178, 56), RGB::new(255, 255, 255)]);
    }

    #[test]
    fn malformed_tables() {
        assert!(matches!(JsonColorTable::from_str("[[0,0]]"), Err(Error::InvalidPalette(_))));
        assert!(matches!(JsonColorTable::from_str("[[0,0,256]]"), Err(Error::InvalidPalette(_))));
        assert!(matches!(JsonColorTable::from_str("{}"), Err(Error::InvalidPalette(_))));
        // parses, but the palette itself refuses to be empty
        let empty = JsonColorTable::from_str("[]").unwrap();
        assert!(crate::Palette::from_source(&empty).is_err());
    }
}

#[test]
fn packed_ints() {
    let packed: &[u32] = &[0xff0000, 0x00d93a, 0xffffffff];
    assert_eq!(packed.colors().unwrap(), vec![RGB::new(255, 0, 0), RGB::new(0, 0xd9, 0x3a), RGB::new(255, 255, 255)]);
}
