//! Decompressor for the ACS image payload format.
//!
//! An LZ77-style scheme over a bit-reversed stream: each instruction starts
//! with a control bit, `0` for an 8-bit literal and `1` for a back-reference
//! made of a graduated-width distance and a unary-coded length.
//!
//! See: https://uploads.s.zeid.me/ms-agent-format-spec.html#Compression

use thiserror::Error;
use tracing::{debug, trace};

use crate::bit_reader::Bits;

/// Raw 20-bit distance value that ends the stream.
pub const END_OF_STREAM: u32 = 0x000F_FFFF;

/// Largest back-reference distance accepted after the bias is applied.
pub const MAX_DISTANCE: u32 = 0x000F_FFFF;

/// A length run of this many 1-bits followed by another 1-bit is reserved.
const MAX_LENGTH_LEVEL: usize = 11;

const MIN_MATCH_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompressionError {
    #[error("empty payload")]
    EmptyPayload,
    #[error("missing leading zero byte (found 0x{found:02X})")]
    MissingLeadingZero { found: u8 },
    #[error("bitstream exhausted reading {field} at bit {bit}")]
    Exhausted { field: &'static str, bit: usize },
    #[error("back-reference distance {distance} out of range")]
    DistanceOutOfRange { distance: u32 },
    #[error("reserved match length code at bit {bit}")]
    ReservedLengthCode { bit: usize },
}

/// Width class of a back-reference distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetClass {
    /// 6-bit distances 1..=64
    Short,
    /// 9-bit distances from 65
    Medium,
    /// 12-bit distances from 577
    Long,
    /// 20-bit distances from 4673, and the end-of-stream code
    Far,
}

impl OffsetClass {
    pub const fn bits(self) -> usize {
        match self {
            Self::Short => 6,
            Self::Medium => 9,
            Self::Long => 12,
            Self::Far => 20,
        }
    }

    pub const fn bias(self) -> u32 {
        match self {
            Self::Short => 1,
            Self::Medium => 65,
            Self::Long => 577,
            Self::Far => 4673,
        }
    }
}

/// Decompress one payload into palette-index bytes.
///
/// The first byte must be `0x00`. Decoding stops at the 20-bit end-of-stream
/// code, or when the stream runs out exactly at an instruction boundary; the
/// trailing `FF` sentinel bytes of a well-formed payload are never reached.
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    let (&marker, stream) = payload
        .split_first()
        .ok_or(DecompressionError::EmptyPayload)?;
    if marker != 0 {
        return Err(DecompressionError::MissingLeadingZero { found: marker });
    }

    let out = Decoder::new(stream).run()?;
    debug!(
        input = payload.len(),
        output = out.len(),
        "decompressed payload"
    );
    Ok(out)
}

struct Decoder {
    bits: Bits,
    out: Vec<u8>,
}

impl Decoder {
    fn new(stream: &[u8]) -> Self {
        Self {
            bits: Bits::new(stream),
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<u8>, DecompressionError> {
        while let Some(control) = self.bits.pop_bit() {
            match control {
                true => {
                    if !self.back_reference()? {
                        trace!(bit = self.bits.position(), "end of stream");
                        break;
                    }
                }
                false => {
                    let byte = self.literal()?;
                    self.out.push(byte);
                }
            }
        }
        Ok(self.out)
    }

    fn literal(&mut self) -> Result<u8, DecompressionError> {
        let (field, bit) = ("literal", self.bits.position());
        self.bits
            .pop_byte()
            .ok_or(DecompressionError::Exhausted { field, bit })
    }

    fn read(&mut self, count: usize, field: &'static str) -> Result<u32, DecompressionError> {
        let bit = self.bits.position();
        self.bits
            .pop_bits(count)
            .ok_or(DecompressionError::Exhausted { field, bit })
    }

    fn peek(&self, ahead: usize, field: &'static str) -> Result<bool, DecompressionError> {
        self.bits
            .peek_bit(ahead)
            .ok_or(DecompressionError::Exhausted {
                field,
                bit: self.bits.position() + ahead,
            })
    }

    fn skip(&mut self, count: usize, field: &'static str) -> Result<(), DecompressionError> {
        let bit = self.bits.position();
        self.bits
            .skip(count)
            .ok_or(DecompressionError::Exhausted { field, bit })
    }

    /// Decode one back-reference. Returns `false` on the end-of-stream code.
    fn back_reference(&mut self) -> Result<bool, DecompressionError> {
        let class = self.offset_class()?;
        let raw = self.read(class.bits(), "distance")?;

        if class == OffsetClass::Far && raw == END_OF_STREAM {
            return Ok(false);
        }

        let distance = raw + class.bias();
        if distance == 0 || distance > MAX_DISTANCE {
            return Err(DecompressionError::DistanceOutOfRange { distance });
        }

        let length = self.match_length()?;
        trace!(?class, distance, length, "back-reference");
        self.copy(distance as usize, length);
        Ok(true)
    }

    // The selector bit that ends the prefix is not consumed for the 9- and
    // 12-bit classes: it doubles as the low bit of the distance value.
    fn offset_class(&mut self) -> Result<OffsetClass, DecompressionError> {
        if !self.peek(0, "offset class")? {
            self.skip(1, "offset class")?;
            return Ok(OffsetClass::Short);
        }
        if !self.peek(1, "offset class")? {
            self.skip(1, "offset class")?;
            return Ok(OffsetClass::Medium);
        }
        let class = if self.peek(2, "offset class")? {
            OffsetClass::Far
        } else {
            OffsetClass::Long
        };
        self.skip(2, "offset class")?;
        Ok(class)
    }

    fn match_length(&mut self) -> Result<usize, DecompressionError> {
        let start = self.bits.position();

        let mut level = 0;
        while self.peek(level, "match length")? {
            if level == MAX_LENGTH_LEVEL {
                return Err(DecompressionError::ReservedLengthCode { bit: start });
            }
            level += 1;
        }

        let mut length = MIN_MATCH_LENGTH;
        if level == 0 {
            self.skip(1, "match length")?;
            return Ok(length);
        }

        // The run and its terminating zero read back as 2^level - 1.
        length += self.read(level + 1, "match length")? as usize;
        length += self.read(level, "match length")? as usize;
        Ok(length)
    }

    /// Copy `length` bytes starting `distance` bytes back, one at a time so a
    /// match may overlap the bytes it produces. Sources before the start of
    /// the output read from position 0 instead, which is still zero while the
    /// output is empty.
    fn copy(&mut self, distance: usize, length: usize) {
        let mut src = self.out.len() as isize - distance as isize;
        self.out.reserve(length);
        for _ in 0..length {
            let byte = if src < 0 {
                self.out.first().copied().unwrap_or(0)
            } else {
                self.out[src as usize]
            };
            self.out.push(byte);
            src += 1;
        }
    }
}
