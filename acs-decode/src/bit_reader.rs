/// Reverse the bit order inside every byte.
///
/// Applying it twice returns the input unchanged.
pub fn reverse_bit_order(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b.reverse_bits()).collect()
}

/// Bit cursor over the bit-reversed view of a payload.
///
/// Bits are consumed most-significant first from the reversed bytes, which is
/// least-significant first in the original bytes. Multi-bit values put the
/// first bit read in the lowest position.
pub struct Bits {
    bytes: Vec<u8>,
    pos: usize,
}

impl Bits {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            bytes: reverse_bit_order(payload),
            pos: 0,
        }
    }

    /// Total number of bits in the stream.
    pub fn len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    /// Look at the bit `ahead` positions past the cursor without consuming it.
    pub fn peek_bit(&self, ahead: usize) -> Option<bool> {
        let pos = self.pos + ahead;
        let byte = self.bytes.get(pos / 8)?;
        Some((byte >> (7 - pos % 8)) & 0b1 == 1)
    }

    pub fn skip(&mut self, count: usize) -> Option<()> {
        if count > self.remaining() {
            return None;
        }
        self.pos += count;
        Some(())
    }

    pub fn pop_bit(&mut self) -> Option<bool> {
        let bit = self.peek_bit(0)?;
        self.pos += 1;
        Some(bit)
    }

    /// Read `count` bits (at most 32) as a value. Nothing is consumed when
    /// fewer than `count` bits remain.
    pub fn pop_bits(&mut self, count: usize) -> Option<u32> {
        if count > self.remaining() {
            return None;
        }

        let mut ret = 0;
        for shift in 0..count {
            ret |= (self.pop_bit()? as u32) << shift;
        }

        Some(ret)
    }

    pub fn pop_byte(&mut self) -> Option<u8> {
        Some(self.pop_bits(8)? as u8)
    }
}
