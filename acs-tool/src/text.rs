//! Pull printable text out of a greyscale image.

use acs_decode::{DecodedImage, RgbColor};
use thiserror::Error;

const PRINTABLE: std::ops::Range<u8> = 32..128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("pixel ({x}, {y}) is not grey: {rgb:?}")]
    NotGreyscale { x: usize, y: usize, rgb: RgbColor },
    #[error("pixel ({x}, {y}) uses palette index {index}, palette has {len} entries")]
    MissingColor {
        x: usize,
        y: usize,
        index: u8,
        len: usize,
    },
}

/// Read pixels top-down, left to right, treating each grey level as a
/// character code. Levels outside printable ASCII are dropped.
pub fn extract_text(image: &DecodedImage, palette: &[RgbColor]) -> Result<String, TextError> {
    let mut out = String::new();

    for (y, row) in image.rows().enumerate() {
        for (x, &index) in row.iter().enumerate() {
            let color = *palette.get(index as usize).ok_or(TextError::MissingColor {
                x,
                y,
                index,
                len: palette.len(),
            })?;
            if !color.is_grey() {
                return Err(TextError::NotGreyscale { x, y, rgb: color });
            }
            if PRINTABLE.contains(&color.r) {
                out.push(color.r as char);
            }
        }
    }

    Ok(out)
}
