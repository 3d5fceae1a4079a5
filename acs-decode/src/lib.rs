//! Decoder for Microsoft Agent character (`.acs`) files.
//!
//! The crate has a low-level walker over the container's offset-addressed
//! records ([`reader`]), the bit-level decompressor used for image payloads
//! ([`compression`]), and a high-level [`Acs`] type tying them together.
//!
//! # Example
//!
//! ```ignore
//! use acs_decode::Acs;
//!
//! let data = std::fs::read("bonzi.acs").unwrap();
//! let acs = Acs::new(data).unwrap();
//!
//! println!("Palette: {} colors", acs.palette().len());
//!
//! // Get a specific image
//! let image = acs.image(0).unwrap();
//! println!("Image: {}x{}", image.width, image.height);
//! ```

mod acs;
mod bit_reader;
pub mod compression;
pub mod reader;

pub use acs::{Acs, AcsError, DecodedImage};
pub use compression::{DecompressionError, decompress};
pub use reader::{
    AcsReader, CharacterInfo, ChecksumPolicy, ColorPolicy, Header, Locator, ParseOptions,
    ReaderError, RgbColor, VoiceExtraData, VoiceInfo,
};
