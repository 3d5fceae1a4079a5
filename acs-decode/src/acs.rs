//! High-level ACS file API.
//!
//! Parses the header, character info and directories up front; images are
//! decoded lazily, one at a time or all at once in parallel.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::compression::DecompressionError;
use crate::reader::{
    AcsReader, AudioDirectoryEntry, CharacterInfo, ChecksumPolicy, Header, ImageDirectoryEntry,
    LocalizedInfo, ParseOptions, ReaderError, RgbColor, TypedList,
};

const EXPECTED_PALETTE_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum AcsError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("corrupt stream in image {index}: {source}")]
    CorruptStream {
        index: usize,
        #[source]
        source: DecompressionError,
    },
    #[error("invalid image index: {0}")]
    InvalidImageIndex(usize),
    #[error("invalid sound index: {0}")]
    InvalidSoundIndex(usize),
    #[error(
        "checksum mismatch for image {index}: stored 0x{expected:08X}, computed 0x{actual:08X}"
    )]
    ChecksumMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },
}

/// Palette indices of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedImage {
    pub width: u16,
    pub height: u16,
    /// Bottom-up rows of palette indices.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Distance between rows in `pixels`: DWORD aligned when the data is
    /// large enough for it, otherwise tightly packed.
    pub fn stride(&self) -> usize {
        let width = self.width as usize;
        let padded = (width + 3) & !3;
        if self.pixels.len() >= padded * self.height as usize {
            padded
        } else {
            width
        }
    }

    /// Rows in top-down order, each trimmed to the image width. Rows the
    /// pixel data does not cover are left out.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let width = self.width as usize;
        let stride = self.stride();
        (0..self.height as usize)
            .rev()
            .filter_map(move |y| self.pixels.get(y * stride..y * stride + width))
    }

    /// Apply the palette, producing top-down RGBA pixels.
    pub fn to_rgba(&self, palette: &[RgbColor], transparent_color: u8) -> Vec<u8> {
        let width = self.width as usize;
        let stride = self.stride();
        let mut rgba = Vec::with_capacity(width * self.height as usize * 4);

        // ACS images are stored bottom-up
        for y in (0..self.height as usize).rev() {
            for x in 0..width {
                match self.pixels.get(y * stride + x) {
                    Some(&index) if index == transparent_color => {
                        rgba.extend_from_slice(&[0, 0, 0, 0]);
                    }
                    Some(&index) => match palette.get(index as usize) {
                        Some(c) => rgba.extend_from_slice(&[c.r, c.g, c.b, 255]),
                        None => rgba.extend_from_slice(&[0, 0, 0, 255]),
                    },
                    None => rgba.extend_from_slice(&[0, 0, 0, 0]),
                }
            }
        }

        rgba
    }
}

pub struct Acs {
    data: Vec<u8>,
    options: ParseOptions,
    header: Header,
    character_info: CharacterInfo,
    image_list: Vec<ImageDirectoryEntry>,
    audio_list: Vec<AudioDirectoryEntry>,
    warnings: Vec<ReaderError>,
}

impl Acs {
    /// Parse an ACS file from a byte buffer.
    pub fn new(data: Vec<u8>) -> Result<Self, AcsError> {
        Self::with_options(data, ParseOptions::default())
    }

    pub fn with_options(data: Vec<u8>, options: ParseOptions) -> Result<Self, AcsError> {
        let mut reader = AcsReader::with_options(&data, &options);

        let header = reader.parse_header()?;
        let character_info = reader.parse_character_info(&header.character_info)?;
        let image_list = if header.image_info.is_empty() {
            Vec::new()
        } else {
            reader.parse_image_directory(&header.image_info)?.elems
        };
        let audio_list = if header.audio_info.is_empty() {
            Vec::new()
        } else {
            reader.parse_audio_directory(&header.audio_info)?.elems
        };
        let warnings = reader.into_warnings();

        if character_info.palette.len() != EXPECTED_PALETTE_LEN {
            warn!(
                entries = character_info.palette.len(),
                "palette does not have {EXPECTED_PALETTE_LEN} entries"
            );
        }
        debug!(
            size = data.len(),
            images = image_list.len(),
            sounds = audio_list.len(),
            warnings = warnings.len(),
            "parsed ACS file"
        );

        Ok(Self {
            data,
            options,
            header,
            character_info,
            image_list,
            audio_list,
            warnings,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get character metadata.
    pub fn character_info(&self) -> &CharacterInfo {
        &self.character_info
    }

    /// The character's palette, normally 256 entries.
    pub fn palette(&self) -> &[RgbColor] {
        &self.character_info.palette.elems
    }

    /// Non-fatal problems found while parsing.
    pub fn warnings(&self) -> &[ReaderError] {
        &self.warnings
    }

    /// Read the localized name/description table.
    pub fn localized_info(&self) -> Result<TypedList<LocalizedInfo>, AcsError> {
        let mut reader = AcsReader::with_options(&self.data, &self.options);
        Ok(reader.parse_localized_info(&self.character_info.localized_info)?)
    }

    /// Get the number of images in the file.
    pub fn image_count(&self) -> usize {
        self.image_list.len()
    }

    pub fn image_entries(&self) -> &[ImageDirectoryEntry] {
        &self.image_list
    }

    /// Get image by index (lazy decompress).
    pub fn image(&self, index: usize) -> Result<DecodedImage, AcsError> {
        let entry = self
            .image_list
            .get(index)
            .ok_or(AcsError::InvalidImageIndex(index))?;
        let mut reader = AcsReader::with_options(&self.data, &self.options);

        self.verify_checksum(index, entry, &reader)?;

        let record = reader.parse_image(&entry.locator)?;
        let pixels = record
            .pixel_indices()
            .map_err(|source| AcsError::CorruptStream { index, source })?
            .into_owned();

        Ok(DecodedImage {
            width: record.width,
            height: record.height,
            pixels,
        })
    }

    /// Decode every image in parallel. A failure only affects its own slot.
    pub fn decode_images(&self) -> Vec<Result<DecodedImage, AcsError>> {
        (0..self.image_list.len())
            .into_par_iter()
            .map(|index| self.image(index))
            .collect()
    }

    /// Decoded region data of an image, if it has any.
    pub fn image_region(&self, index: usize) -> Result<Option<Vec<u8>>, AcsError> {
        let entry = self
            .image_list
            .get(index)
            .ok_or(AcsError::InvalidImageIndex(index))?;
        let mut reader = AcsReader::with_options(&self.data, &self.options);
        let record = reader.parse_image(&entry.locator)?;

        reader
            .parse_region(&record)?
            .map(|region| region.decode())
            .transpose()
            .map_err(|source| AcsError::CorruptStream { index, source })
    }

    fn verify_checksum(
        &self,
        index: usize,
        entry: &ImageDirectoryEntry,
        reader: &AcsReader<'_>,
    ) -> Result<(), AcsError> {
        let ChecksumPolicy::Verify(checksum) = self.options.checksum else {
            return Ok(());
        };

        let actual = checksum(reader.slice(&entry.locator)?);
        if actual != entry.checksum {
            return Err(AcsError::ChecksumMismatch {
                index,
                expected: entry.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Get the number of sounds in the file.
    pub fn sound_count(&self) -> usize {
        self.audio_list.len()
    }

    /// Get raw sound data by index.
    pub fn sound(&self, index: usize) -> Result<&[u8], AcsError> {
        let entry = self
            .audio_list
            .get(index)
            .ok_or(AcsError::InvalidSoundIndex(index))?;
        let reader = AcsReader::new(&self.data);
        Ok(reader.slice(&entry.locator)?)
    }
}
