//! Builders for synthetic ACS files and compressed payloads.

#![allow(dead_code)]

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

pub const SIGNATURE: u32 = 0xABCDABC3;

/// Longest match the length code can express.
pub const MAX_MATCH: usize = 4096;

const SEARCH_WINDOW: usize = 8192;

/// Writes instructions in the decoder's logical bit order: values go out
/// least-significant bit first, and each byte fills from bit 0 upwards.
#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bits
    }

    pub fn bit(&mut self, on: bool) {
        if self.bits % 8 == 0 {
            self.bytes.push(0);
        }
        if on {
            *self.bytes.last_mut().unwrap() |= 1 << (self.bits % 8);
        }
        self.bits += 1;
    }

    pub fn value(&mut self, value: u32, width: usize) {
        for shift in 0..width {
            self.bit((value >> shift) & 1 == 1);
        }
    }

    pub fn literal(&mut self, byte: u8) {
        self.bit(false);
        self.value(byte as u32, 8);
    }

    /// Emit a back-reference. Panics on distances the selector layout cannot
    /// express, see [`encodable`].
    pub fn back_reference(&mut self, distance: u32, length: usize) {
        assert!(encodable(distance), "distance {distance} is not encodable");
        assert!((2..=MAX_MATCH).contains(&length), "bad length {length}");

        self.bit(true);
        match distance {
            1..=64 => {
                self.bit(false);
                self.value(distance - 1, 6);
            }
            65..=576 => {
                self.bit(true);
                self.value(distance - 65, 9);
            }
            577..=4672 => {
                self.bit(true);
                self.bit(true);
                self.value(distance - 577, 12);
            }
            _ => {
                self.bit(true);
                self.bit(true);
                self.value(distance - 4673, 20);
            }
        }
        self.length(length);
    }

    /// Emit a length code: a run of 1-bits, a 0-bit, then the extra bits.
    pub fn length(&mut self, length: usize) {
        let value = length - 2;
        if value == 0 {
            self.bit(false);
            return;
        }
        let level = (usize::BITS - 1 - (value + 1).leading_zeros()) as usize;
        for _ in 0..level {
            self.bit(true);
        }
        self.bit(false);
        self.value((value + 1 - (1 << level)) as u32, level);
    }

    pub fn end_of_stream(&mut self) {
        self.bit(true);
        self.bit(true);
        self.bit(true);
        self.value(0xFFFFF, 20);
    }

    /// Pad the last byte with 1-bits and add the leading zero byte, plus the
    /// six `FF` sentinel bytes when `sentinel` is set.
    pub fn into_payload(mut self, sentinel: bool) -> Vec<u8> {
        while self.bits % 8 != 0 {
            self.bit(true);
        }
        let mut payload = vec![0x00];
        payload.extend_from_slice(&self.bytes);
        if sentinel {
            payload.extend_from_slice(&[0xFF; 6]);
        }
        payload
    }
}

/// Whether a distance fits the selector layout. The bit that ends the class
/// prefix doubles as the low bit of the 9-, 12- and 20-bit values, so those
/// classes only reach every other distance.
pub fn encodable(distance: u32) -> bool {
    match distance {
        1..=64 => true,
        65..=576 => (distance - 65) % 2 == 0,
        577..=4672 => (distance - 577) % 2 == 0,
        4673..=0xFFFFF => (distance - 4673) % 2 == 1,
        _ => false,
    }
}

/// Greedy encoder producing a well-formed payload with end code and sentinel.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    let mut pos = 0;
    while pos < data.len() {
        let (distance, length) = longest_match(data, pos);
        if length >= 2 {
            writer.back_reference(distance, length);
            pos += length;
        } else {
            writer.literal(data[pos]);
            pos += 1;
        }
    }
    writer.end_of_stream();
    writer.into_payload(true)
}

fn longest_match(data: &[u8], pos: usize) -> (u32, usize) {
    let max_len = (data.len() - pos).min(MAX_MATCH);
    let mut best = (0, 0);
    for distance in 1..=pos.min(SEARCH_WINDOW) {
        if !encodable(distance as u32) {
            continue;
        }
        let mut len = 0;
        while len < max_len && data[pos - distance + len] == data[pos + len] {
            len += 1;
        }
        if len > best.1 {
            best = (distance as u32, len);
            if len == max_len {
                break;
            }
        }
    }
    best
}

/// Deterministic pseudo-random bytes.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

pub fn write_string(out: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    out.write_u32::<LittleEndian>(units.len() as u32).unwrap();
    for unit in units {
        out.write_u16::<LittleEndian>(unit).unwrap();
    }
}

pub fn write_color_list(out: &mut Vec<u8>, colors: &[[u8; 4]]) {
    out.push(0x00);
    out.write_u32::<BigEndian>(colors.len() as u32).unwrap();
    out.push(0x00);
    for color in colors {
        out.extend_from_slice(color);
    }
}

pub struct ImageFixture {
    pub width: u16,
    pub height: u16,
    pub compression_flag: u8,
    pub data: Vec<u8>,
    pub region: Option<(u32, Vec<u8>)>,
    /// Bytes written after the region, still inside the image locator.
    pub trailer: Vec<u8>,
    pub checksum: u32,
}

impl ImageFixture {
    pub fn raw(width: u16, height: u16, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            compression_flag: 0,
            data: pixels,
            region: None,
            trailer: Vec::new(),
            checksum: 0,
        }
    }

    pub fn compressed(width: u16, height: u16, pixels: &[u8]) -> Self {
        Self::payload(width, height, encode(pixels))
    }

    pub fn payload(width: u16, height: u16, payload: Vec<u8>) -> Self {
        Self {
            width,
            height,
            compression_flag: 1,
            data: payload,
            region: None,
            trailer: Vec::new(),
            checksum: 0,
        }
    }

    pub fn with_region(mut self, uncompressed: &[u8]) -> Self {
        self.region = Some((uncompressed.len() as u32, encode(uncompressed)));
        self
    }

    pub fn with_trailer(mut self, bytes: &[u8]) -> Self {
        self.trailer = bytes.to_vec();
        self
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(0x00);
        out.write_u16::<LittleEndian>(self.width).unwrap();
        out.write_u16::<LittleEndian>(self.height).unwrap();
        out.push(self.compression_flag);
        out.write_u32::<LittleEndian>(self.data.len() as u32)
            .unwrap();
        out.extend_from_slice(&self.data);
        if let Some((uncompressed_size, bytes)) = &self.region {
            out.write_u32::<LittleEndian>(bytes.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(*uncompressed_size).unwrap();
            out.extend_from_slice(bytes);
        }
        out.extend_from_slice(&self.trailer);
    }
}

pub struct LocalizedFixture {
    pub lang_id: u16,
    pub name: &'static str,
    pub description: &'static str,
    pub extra_data: &'static str,
}

pub struct ContainerBuilder {
    pub palette: Vec<[u8; 4]>,
    pub images: Vec<ImageFixture>,
    pub sounds: Vec<Vec<u8>>,
    pub localized: Vec<LocalizedFixture>,
    pub voice_extra: bool,
    pub font_name: &'static str,
    pub trailing: Vec<u8>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self {
            palette: (0..=255u8).map(|i| [i, i, i, 0]).collect(),
            images: Vec::new(),
            sounds: Vec::new(),
            localized: Vec::new(),
            voice_extra: true,
            font_name: "Tahoma",
            trailing: vec![0xAA; 3],
        }
    }
}

/// Absolute offsets of interesting records in a built file.
#[derive(Debug, Default)]
pub struct Layout {
    pub character_info: usize,
    pub palette: usize,
    pub tray_icon: usize,
    pub images: Vec<usize>,
    pub image_directory: usize,
}

pub struct Built {
    pub bytes: Vec<u8>,
    pub layout: Layout,
}

impl ContainerBuilder {
    pub fn build(&self) -> Built {
        let mut out = vec![0u8; 36];
        let mut layout = Layout::default();

        let localized = if self.localized.is_empty() {
            (0, 0)
        } else {
            let start = out.len();
            out.write_u16::<LittleEndian>(self.localized.len() as u16)
                .unwrap();
            for entry in &self.localized {
                out.write_u16::<LittleEndian>(entry.lang_id).unwrap();
                write_string(&mut out, entry.name);
                write_string(&mut out, entry.description);
                write_string(&mut out, entry.extra_data);
            }
            (start as u32, (out.len() - start) as u32)
        };

        layout.character_info = out.len();
        self.write_character_info(&mut out, localized, &mut layout);
        let character_info = (
            layout.character_info as u32,
            (out.len() - layout.character_info) as u32,
        );

        let mut image_locators = Vec::new();
        for image in &self.images {
            let start = out.len();
            image.write(&mut out);
            layout.images.push(start);
            let size = (out.len() - start) as u32;
            image_locators.push((start as u32, size, image.checksum));
        }

        layout.image_directory = out.len();
        let image_info = write_directory(&mut out, &image_locators);

        let mut sound_locators = Vec::new();
        for sound in &self.sounds {
            let start = out.len();
            out.extend_from_slice(sound);
            sound_locators.push((start as u32, sound.len() as u32, 0));
        }
        let audio_info = write_directory(&mut out, &sound_locators);

        let mut header = Vec::new();
        header.write_u32::<LittleEndian>(SIGNATURE).unwrap();
        for (offset, size) in [character_info, (0, 0), image_info, audio_info] {
            header.write_u32::<LittleEndian>(offset).unwrap();
            header.write_u32::<LittleEndian>(size).unwrap();
        }
        out[..36].copy_from_slice(&header);

        Built { bytes: out, layout }
    }

    fn write_character_info(&self, out: &mut Vec<u8>, localized: (u32, u32), layout: &mut Layout) {
        out.write_u16::<LittleEndian>(2).unwrap(); // minor
        out.write_u16::<LittleEndian>(1).unwrap(); // major
        out.write_u32::<LittleEndian>(localized.0).unwrap();
        out.write_u32::<LittleEndian>(localized.1).unwrap();
        out.extend_from_slice(&[0x11; 16]);
        out.write_u16::<LittleEndian>(200).unwrap();
        out.write_u16::<LittleEndian>(160).unwrap();
        out.push(253);
        out.write_u32::<LittleEndian>(0x0000_0229).unwrap();
        out.write_u16::<LittleEndian>(3).unwrap();
        out.write_u16::<LittleEndian>(4).unwrap();

        // voice
        out.extend_from_slice(&[0x22; 16]);
        out.extend_from_slice(&[0x33; 16]);
        out.write_u32::<LittleEndian>(150).unwrap();
        out.write_u16::<LittleEndian>(100).unwrap();
        out.push(self.voice_extra as u8);
        if self.voice_extra {
            out.write_u16::<LittleEndian>(0x0409).unwrap();
            write_string(out, "American");
            out.write_u16::<LittleEndian>(2).unwrap();
            out.write_u16::<LittleEndian>(30).unwrap();
            write_string(out, "Casual");
        }

        out.extend_from_slice(&[0xEE, 0xEE]);

        // balloon
        out.push(2);
        out.push(32);
        out.extend_from_slice(&[0x01, 0x02, 0x03, 0x00]);
        out.extend_from_slice(&[0xFF, 0xFF, 0xE1, 0x00]);
        out.extend_from_slice(&[0x04, 0x05, 0x06, 0x00]);
        write_string(out, self.font_name);
        out.write_u16::<LittleEndian>(13).unwrap();
        out.extend_from_slice(&[0xCD, 0xCD, 0xBE, 0xEF]);
        out.write_u16::<LittleEndian>(400).unwrap();
        out.push(1);
        out.push(0x5A);

        layout.palette = out.len();
        write_color_list(out, &self.palette);

        layout.tray_icon = out.len();
        out.push(1);
        out.extend_from_slice(&self.trailing);
    }
}

fn write_directory(out: &mut Vec<u8>, entries: &[(u32, u32, u32)]) -> (u32, u32) {
    let start = out.len();
    out.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
    for (offset, size, checksum) in entries {
        out.write_u32::<LittleEndian>(*offset).unwrap();
        out.write_u32::<LittleEndian>(*size).unwrap();
        out.write_u32::<LittleEndian>(*checksum).unwrap();
    }
    (start as u32, (out.len() - start) as u32)
}
