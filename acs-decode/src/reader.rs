//! Low-level ACS container walker.
//!
//! Every record is read at an absolute offset and reports its own encoded
//! size through [`Record::total_len`], so list reads advance by exactly the
//! bytes each element consumed. Records addressed by a [`Locator`] are read
//! from that locator's slice and never past it. Payload bytes are borrowed
//! from the input buffer, not copied.

use std::borrow::Cow;
use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::compression::{DecompressionError, decompress};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("malformed header: invalid signature 0x{found:08X}")]
    MalformedHeader { found: u32 },
    #[error("truncated {record} at offset {offset}: needs {needed} bytes, {available} available")]
    TruncatedRecord {
        record: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid color at offset {offset}: reserved byte is 0x{reserved:02X}")]
    InvalidColor { offset: usize, reserved: u8 },
}

pub const ACS_SIGNATURE: u32 = 0xABCDABC3;

pub const HEADER_LEN: usize = 36;

/// Byte offset of the voice info inside the character info.
const CHARACTER_INFO_FIXED_LEN: usize = 41;
/// Unlabelled gap between the voice info and the balloon info.
const CHARACTER_INFO_GAP: usize = 2;
const VOICE_INFO_BASE_LEN: usize = 38;
const BALLOON_FONT_FIELDS_LEN: usize = 10;
const RGB_QUAD_LIST_HEADER_LEN: usize = 6;
const REGION_HEADER_LEN: usize = 8;

/// What to do with an RGB quad whose reserved byte is not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorPolicy {
    /// Collect the problem as a warning and keep going.
    #[default]
    Warn,
    /// Fail the record that holds the color.
    Deny,
}

/// Image checksum handling. Stored checksums are passed through untouched
/// unless a verifier is supplied.
#[derive(Clone, Copy, Default)]
pub enum ChecksumPolicy {
    #[default]
    Ignore,
    /// Hash the bytes addressed by an image's locator and compare the result
    /// with the checksum stored in the image directory.
    Verify(fn(&[u8]) -> u32),
}

impl fmt::Debug for ChecksumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "Ignore"),
            Self::Verify(_) => write!(f, "Verify(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub color_policy: ColorPolicy,
    pub checksum: ChecksumPolicy,
}

/// Absolute offset/size pair addressing a record inside the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Locator {
    pub offset: u32,
    pub size: u32,
}

impl Locator {
    pub fn start(&self) -> usize {
        self.offset as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub signature: u32,
    pub character_info: Locator,
    pub animation_info: Locator,
    pub image_info: Locator,
    pub audio_info: Locator,
}

impl Header {
    pub fn locators(&self) -> [(&'static str, &Locator); 4] {
        [
            ("character info", &self.character_info),
            ("animation info", &self.animation_info),
            ("image info", &self.image_info),
            ("audio info", &self.audio_info),
        ]
    }
}

/// Count-prefixed UCS-2 string. No terminator is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableString {
    pub units: Vec<u16>,
}

impl VariableString {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl From<&str> for VariableString {
    fn from(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }
}

impl fmt::Display for VariableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Serialize for VariableString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub reserved: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self {
            r,
            g,
            b,
            reserved: 0,
        }
    }

    pub fn is_grey(&self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CountWidth {
    Byte,
    Word,
    Dword,
}

impl CountWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
        }
    }
}

/// How a list stores its element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CountEncoding {
    /// Little-endian count directly before the elements.
    Uniform(CountWidth),
    /// Color lists: the count is the big-endian u32 at bytes 1..5 of the list
    /// and the elements start at byte 6.
    RgbQuadSpecial,
}

impl CountEncoding {
    pub const fn header_len(self) -> usize {
        match self {
            Self::Uniform(width) => width.bytes(),
            Self::RgbQuadSpecial => RGB_QUAD_LIST_HEADER_LEN,
        }
    }
}

/// A record whose encoded length can be computed from its decoded value.
pub trait Record: Sized {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError>;

    /// Number of bytes the record occupies in the file.
    fn total_len(&self) -> usize;

    /// Count encoding used by lists of this record.
    fn count_encoding(width: CountWidth) -> CountEncoding {
        CountEncoding::Uniform(width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedList<T> {
    pub encoding: CountEncoding,
    pub elems: Vec<T>,
}

impl<T> TypedList<T> {
    pub fn empty(encoding: CountEncoding) -> Self {
        Self {
            encoding,
            elems: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elems.iter()
    }

    pub fn header_len(&self) -> usize {
        self.encoding.header_len()
    }
}

impl<T: Record> TypedList<T> {
    pub fn total_len(&self) -> usize {
        self.header_len() + self.elems.iter().map(Record::total_len).sum::<usize>()
    }
}

impl<T> IntoIterator for TypedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elems.into_iter()
    }
}

/// Image or audio directory entry. The checksum is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub locator: Locator,
    pub checksum: u32,
}

pub type ImageDirectoryEntry = DirectoryEntry;
pub type AudioDirectoryEntry = DirectoryEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub tts_engine_id: [u8; 16],
    pub tts_mode_id: [u8; 16],
    pub speed: u32,
    pub pitch: u16,
    pub extra_data: Option<VoiceExtraData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceExtraData {
    pub lang_id: u16,
    pub lang_dialect: VariableString,
    pub gender: u16,
    pub age: u16,
    pub style: VariableString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalloonInfo {
    pub num_lines: u8,
    pub chars_per_line: u8,
    pub foreground: RgbColor,
    pub background: RgbColor,
    pub border: RgbColor,
    pub font_name: VariableString,
    pub font_height: u16,
    pub font_weight: u16,
    pub italic: bool,
    /// Opaque trailing byte.
    pub unknown: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalizedInfo {
    pub lang_id: u16,
    pub name: VariableString,
    pub description: VariableString,
    pub extra_data: VariableString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterInfo {
    pub minor_version: u16,
    pub major_version: u16,
    pub localized_info: Locator,
    pub guid: [u8; 16],
    pub width: u16,
    pub height: u16,
    pub transparent_color: u8,
    pub flags: u32,
    pub anim_set_major_version: u16,
    pub anim_set_minor_version: u16,
    pub voice_info: VoiceInfo,
    pub balloon_info: BalloonInfo,
    /// Absolute offset of the palette list.
    pub palette_offset: usize,
    pub palette: TypedList<RgbColor>,
    pub tray_icon: bool,
}

/// Size-prefixed run of raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    pub bytes: &'a [u8],
}

impl<'a> DataBlock<'a> {
    pub fn read(fields: &mut Fields<'a, '_>) -> Result<Self, ReaderError> {
        fields.scoped("DataBlock", |f| {
            let size = f.read_u32()? as usize;
            Ok(Self {
                bytes: f.take(size)?,
            })
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn total_len(&self) -> usize {
        4 + self.bytes.len()
    }
}

impl Serialize for DataBlock<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DataBlock", 1)?;
        state.serialize_field("size", &self.size())?;
        state.end()
    }
}

/// Compressed clipping region stored after an image's pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionData<'a> {
    pub uncompressed_size: u32,
    pub bytes: &'a [u8],
}

impl<'a> RegionData<'a> {
    pub fn read(fields: &mut Fields<'a, '_>) -> Result<Self, ReaderError> {
        fields.scoped("RegionData", |f| {
            let compressed_size = f.read_u32()? as usize;
            let uncompressed_size = f.read_u32()?;
            Ok(Self {
                uncompressed_size,
                bytes: f.take(compressed_size)?,
            })
        })
    }

    pub fn total_len(&self) -> usize {
        REGION_HEADER_LEN + self.bytes.len()
    }

    pub fn decode(&self) -> Result<Vec<u8>, DecompressionError> {
        if self.bytes.is_empty() {
            return Ok(Vec::new());
        }
        decompress(self.bytes)
    }
}

impl Serialize for RegionData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RegionData", 2)?;
        state.serialize_field("compressed_size", &self.bytes.len())?;
        state.serialize_field("uncompressed_size", &self.uncompressed_size)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageRecord<'a> {
    pub reserved: u8,
    pub width: u16,
    pub height: u16,
    pub compression_flag: u8,
    pub data: DataBlock<'a>,
    /// Bytes left in the image locator after the pixel block, normally a
    /// [`RegionData`]. Read with [`AcsReader::parse_region`].
    #[serde(skip)]
    pub trailer: &'a [u8],
    #[serde(skip)]
    pub trailer_offset: usize,
}

impl<'a> ImageRecord<'a> {
    pub fn read(fields: &mut Fields<'a, '_>) -> Result<Self, ReaderError> {
        fields.scoped("ImageRecord", |f| {
            let reserved = f.read_u8()?;
            let width = f.read_u16()?;
            let height = f.read_u16()?;
            let compression_flag = f.read_u8()?;
            let data = DataBlock::read(f)?;
            let trailer_offset = f.offset();
            let trailer = f.take(f.remaining())?;

            Ok(Self {
                reserved,
                width,
                height,
                compression_flag,
                data,
                trailer,
                trailer_offset,
            })
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_flag != 0
    }

    pub fn total_len(&self) -> usize {
        6 + self.data.total_len() + self.trailer.len()
    }

    /// Palette indices of the image, decompressing the payload if needed.
    pub fn pixel_indices(&self) -> Result<Cow<'a, [u8]>, DecompressionError> {
        if self.is_compressed() {
            decompress(self.data.bytes).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(self.data.bytes))
        }
    }
}

#[derive(Debug, Default)]
struct Diagnostics {
    color_policy: ColorPolicy,
    warnings: Vec<ReaderError>,
}

/// Bounded cursor over the bytes a record lives in.
///
/// Offsets in errors are absolute file offsets.
pub struct Fields<'a, 'w> {
    data: &'a [u8],
    base: usize,
    pos: usize,
    record: &'static str,
    diagnostics: &'w mut Diagnostics,
}

impl<'a> Fields<'a, '_> {
    /// Absolute offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ReaderError> {
        let available = self.remaining();
        if len > available || self.pos > self.data.len() {
            return Err(ReaderError::TruncatedRecord {
                record: self.record,
                offset: self.offset(),
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ReaderError> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16], ReaderError> {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(self.take(16)?);
        Ok(guid)
    }

    pub fn read<T: Record>(&mut self) -> Result<T, ReaderError> {
        T::read(self)
    }

    /// Read a list whose count encoding is chosen by the element type.
    pub fn list<T: Record>(&mut self, width: CountWidth) -> Result<TypedList<T>, ReaderError> {
        self.scoped("list", |f| {
            let encoding = T::count_encoding(width);
            let header = f.take(encoding.header_len())?;
            let count = match encoding {
                CountEncoding::Uniform(width) => {
                    LittleEndian::read_uint(header, width.bytes()) as usize
                }
                CountEncoding::RgbQuadSpecial => BigEndian::read_u32(&header[1..5]) as usize,
            };

            let mut elems = Vec::with_capacity(count.min(f.remaining()));
            let mut running = f.pos;
            for _ in 0..count {
                f.pos = running;
                let elem = T::read(f)?;
                running += elem.total_len();
                debug_assert_eq!(f.pos, running, "record length mismatch");
                elems.push(elem);
            }
            f.pos = running;

            Ok(TypedList { encoding, elems })
        })
    }

    /// Run `read` with `record` as the name reported by truncation errors.
    pub fn scoped<T>(
        &mut self,
        record: &'static str,
        read: impl FnOnce(&mut Self) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        let outer = std::mem::replace(&mut self.record, record);
        let result = read(self);
        self.record = outer;
        result
    }

    fn report_color(&mut self, offset: usize, reserved: u8) -> Result<(), ReaderError> {
        let error = ReaderError::InvalidColor { offset, reserved };
        match self.diagnostics.color_policy {
            ColorPolicy::Warn => {
                warn!(offset, reserved, "color reserved byte is not zero");
                self.diagnostics.warnings.push(error);
                Ok(())
            }
            ColorPolicy::Deny => Err(error),
        }
    }
}

impl Record for Locator {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        Ok(Self {
            offset: fields.read_u32()?,
            size: fields.read_u32()?,
        })
    }

    fn total_len(&self) -> usize {
        8
    }
}

impl Record for Header {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("header", |f| {
            let signature = f.read_u32()?;
            if signature != ACS_SIGNATURE {
                return Err(ReaderError::MalformedHeader { found: signature });
            }

            Ok(Self {
                signature,
                character_info: f.read()?,
                animation_info: f.read()?,
                image_info: f.read()?,
                audio_info: f.read()?,
            })
        })
    }

    fn total_len(&self) -> usize {
        HEADER_LEN
    }
}

impl Record for VariableString {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("VariableString", |f| {
            let len = f.read_u32()? as usize;
            let bytes = f.take(len.saturating_mul(2))?;
            let units = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
            Ok(Self { units })
        })
    }

    fn total_len(&self) -> usize {
        4 + self.units.len() * 2
    }
}

impl Record for RgbColor {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("RGBColor", |f| {
            let offset = f.offset();
            let bytes = f.take(4)?;
            let color = Self {
                r: bytes[0],
                g: bytes[1],
                b: bytes[2],
                reserved: bytes[3],
            };
            if color.reserved != 0 {
                f.report_color(offset, color.reserved)?;
            }
            Ok(color)
        })
    }

    fn total_len(&self) -> usize {
        4
    }

    fn count_encoding(_width: CountWidth) -> CountEncoding {
        CountEncoding::RgbQuadSpecial
    }
}

impl Record for DirectoryEntry {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("directory entry", |f| {
            Ok(Self {
                locator: f.read()?,
                checksum: f.read_u32()?,
            })
        })
    }

    fn total_len(&self) -> usize {
        12
    }
}

impl Record for VoiceInfo {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("VoiceInfo", |f| {
            let tts_engine_id = f.read_guid()?;
            let tts_mode_id = f.read_guid()?;
            let speed = f.read_u32()?;
            let pitch = f.read_u16()?;
            let extra_data_exists = f.read_u8()? != 0;

            let extra_data = if extra_data_exists {
                let lang_id = f.read_u16()?;
                let lang_dialect = f.read()?;
                let gender = f.read_u16()?;
                let age = f.read_u16()?;
                let style = f.read()?;
                Some(VoiceExtraData {
                    lang_id,
                    lang_dialect,
                    gender,
                    age,
                    style,
                })
            } else {
                None
            };

            Ok(Self {
                tts_engine_id,
                tts_mode_id,
                speed,
                pitch,
                extra_data,
            })
        })
    }

    fn total_len(&self) -> usize {
        let extra = match &self.extra_data {
            Some(e) => 6 + e.lang_dialect.total_len() + e.style.total_len(),
            None => 0,
        };
        VOICE_INFO_BASE_LEN + 1 + extra
    }
}

impl Record for BalloonInfo {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("BalloonInfo", |f| {
            let num_lines = f.read_u8()?;
            let chars_per_line = f.read_u8()?;
            let foreground = f.read()?;
            let background = f.read()?;
            let border = f.read()?;
            let font_name = f.read()?;

            // Height is the low half of a 4-byte field; weight sits 6 bytes in.
            let font = f.take(BALLOON_FONT_FIELDS_LEN)?;

            Ok(Self {
                num_lines,
                chars_per_line,
                foreground,
                background,
                border,
                font_name,
                font_height: LittleEndian::read_u16(&font[0..2]),
                font_weight: LittleEndian::read_u16(&font[6..8]),
                italic: font[8] != 0,
                unknown: font[9],
            })
        })
    }

    fn total_len(&self) -> usize {
        14 + self.font_name.total_len() + BALLOON_FONT_FIELDS_LEN
    }
}

impl Record for LocalizedInfo {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("LocalizedInfo", |f| {
            Ok(Self {
                lang_id: f.read_u16()?,
                name: f.read()?,
                description: f.read()?,
                extra_data: f.read()?,
            })
        })
    }

    fn total_len(&self) -> usize {
        2 + self.name.total_len() + self.description.total_len() + self.extra_data.total_len()
    }
}

impl Record for CharacterInfo {
    fn read(fields: &mut Fields<'_, '_>) -> Result<Self, ReaderError> {
        fields.scoped("CharacterInfo", |f| {
            let minor_version = f.read_u16()?;
            let major_version = f.read_u16()?;
            let localized_info = f.read()?;
            let guid = f.read_guid()?;
            let width = f.read_u16()?;
            let height = f.read_u16()?;
            let transparent_color = f.read_u8()?;
            let flags = f.read_u32()?;
            let anim_set_major_version = f.read_u16()?;
            let anim_set_minor_version = f.read_u16()?;

            let voice_info = f.read()?;
            f.skip(CHARACTER_INFO_GAP)?;
            let balloon_info = f.read()?;

            // The two bytes after the count field double as the gap before
            // the tray icon flag.
            let palette_offset = f.offset();
            let palette = f.list::<RgbColor>(CountWidth::Dword)?;

            let tray_icon = f.read_u8()? != 0;

            Ok(Self {
                minor_version,
                major_version,
                localized_info,
                guid,
                width,
                height,
                transparent_color,
                flags,
                anim_set_major_version,
                anim_set_minor_version,
                voice_info,
                balloon_info,
                palette_offset,
                palette,
                tray_icon,
            })
        })
    }

    fn total_len(&self) -> usize {
        CHARACTER_INFO_FIXED_LEN
            + self.voice_info.total_len()
            + CHARACTER_INFO_GAP
            + self.balloon_info.total_len()
            + self.palette.total_len()
            + 1
    }
}

/// Walks the records of one in-memory ACS file.
pub struct AcsReader<'a> {
    data: &'a [u8],
    diagnostics: Diagnostics,
}

impl<'a> AcsReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, &ParseOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: &ParseOptions) -> Self {
        Self {
            data,
            diagnostics: Diagnostics {
                color_policy: options.color_policy,
                warnings: Vec::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Non-fatal problems seen so far.
    pub fn warnings(&self) -> &[ReaderError] {
        &self.diagnostics.warnings
    }

    pub fn into_warnings(self) -> Vec<ReaderError> {
        self.diagnostics.warnings
    }

    /// Bytes addressed by `locator`.
    pub fn slice(&self, locator: &Locator) -> Result<&'a [u8], ReaderError> {
        self.locate(locator, "data")
    }

    fn locate(&self, locator: &Locator, record: &'static str) -> Result<&'a [u8], ReaderError> {
        let data: &'a [u8] = self.data;
        data.get(locator.start()..locator.end())
            .ok_or(ReaderError::TruncatedRecord {
                record,
                offset: locator.start(),
                needed: locator.size as usize,
                available: data.len().saturating_sub(locator.start()),
            })
    }

    /// Cursor at an absolute offset, bounded by the end of the file.
    fn fields_at(&mut self, offset: usize, record: &'static str) -> Fields<'a, '_> {
        Fields {
            data: self.data,
            base: 0,
            pos: offset,
            record,
            diagnostics: &mut self.diagnostics,
        }
    }

    /// Cursor over the slice addressed by `locator`.
    fn fields_in(
        &mut self,
        locator: &Locator,
        record: &'static str,
    ) -> Result<Fields<'a, '_>, ReaderError> {
        let data = self.locate(locator, record)?;
        Ok(Fields {
            data,
            base: locator.start(),
            pos: 0,
            record,
            diagnostics: &mut self.diagnostics,
        })
    }

    pub fn parse_header(&mut self) -> Result<Header, ReaderError> {
        let header: Header = self.fields_at(0, "header").read()?;

        for (record, locator) in header.locators() {
            self.locate(locator, record)?;
        }

        debug!(
            character_info = header.character_info.offset,
            image_info = header.image_info.offset,
            audio_info = header.audio_info.offset,
            "read header"
        );
        Ok(header)
    }

    pub fn parse_string(&mut self, offset: usize) -> Result<VariableString, ReaderError> {
        self.fields_at(offset, "VariableString").read()
    }

    pub fn parse_list<T: Record>(
        &mut self,
        offset: usize,
        width: CountWidth,
    ) -> Result<TypedList<T>, ReaderError> {
        self.fields_at(offset, "list").list(width)
    }

    pub fn parse_character_info(
        &mut self,
        locator: &Locator,
    ) -> Result<CharacterInfo, ReaderError> {
        let info: CharacterInfo = self.fields_in(locator, "character info")?.read()?;
        debug!(
            offset = locator.offset,
            width = info.width,
            height = info.height,
            palette = info.palette.len(),
            "read character info"
        );
        Ok(info)
    }

    pub fn parse_localized_info(
        &mut self,
        locator: &Locator,
    ) -> Result<TypedList<LocalizedInfo>, ReaderError> {
        if locator.is_empty() {
            return Ok(TypedList::empty(CountEncoding::Uniform(CountWidth::Word)));
        }
        self.fields_in(locator, "localized info")?
            .list(CountWidth::Word)
    }

    pub fn parse_image_directory(
        &mut self,
        locator: &Locator,
    ) -> Result<TypedList<ImageDirectoryEntry>, ReaderError> {
        let list = self
            .fields_in(locator, "image directory")?
            .list(CountWidth::Dword)?;
        debug!(
            offset = locator.offset,
            images = list.len(),
            "read image directory"
        );
        Ok(list)
    }

    pub fn parse_audio_directory(
        &mut self,
        locator: &Locator,
    ) -> Result<TypedList<AudioDirectoryEntry>, ReaderError> {
        let list = self
            .fields_in(locator, "audio directory")?
            .list(CountWidth::Dword)?;
        debug!(
            offset = locator.offset,
            sounds = list.len(),
            "read audio directory"
        );
        Ok(list)
    }

    pub fn parse_image(&mut self, locator: &Locator) -> Result<ImageRecord<'a>, ReaderError> {
        ImageRecord::read(&mut self.fields_in(locator, "image")?)
    }

    /// Region data following an image's pixels. Trailers shorter than the
    /// region header are treated as absent.
    pub fn parse_region(
        &mut self,
        image: &ImageRecord<'a>,
    ) -> Result<Option<RegionData<'a>>, ReaderError> {
        if image.trailer.len() < REGION_HEADER_LEN {
            return Ok(None);
        }
        let mut fields = Fields {
            data: image.trailer,
            base: image.trailer_offset,
            pos: 0,
            record: "image",
            diagnostics: &mut self.diagnostics,
        };
        RegionData::read(&mut fields).map(Some)
    }
}
