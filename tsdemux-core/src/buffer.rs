//! Bit-level readers and writers for section payloads.
//!
//! [`PsiReader`] never fails loudly: once a read goes past the end of its
//! data, the error flag latches and every further read returns zero. Record
//! decoders read their fields in sequence and check [`PsiReader::error`]
//! once at the end, keeping whatever was parsed before the failure.

use bytes::{BufMut, Bytes, BytesMut};

use crate::section::MAX_PSI_LONG_SECTION_PAYLOAD_SIZE;

/// Bounded big-endian reader with a sticky error flag.
#[derive(Debug, Clone)]
pub struct PsiReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    error: bool,
}

impl<'a> PsiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PsiReader {
            data,
            bit_pos: 0,
            error: false,
        }
    }

    /// True once any read failed.
    pub fn error(&self) -> bool {
        self.error
    }

    /// Force the error state, e.g. on an inconsistent field value.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    /// Whole bytes left from the current position.
    pub fn remaining_bytes(&self) -> usize {
        self.remaining_bits() / 8
    }

    /// True if no error and data remain.
    pub fn can_read(&self) -> bool {
        !self.error && self.remaining_bits() > 0
    }

    /// True if no error and at least `n` bytes remain.
    pub fn can_read_bytes(&self, n: usize) -> bool {
        !self.error && self.remaining_bytes() >= n
    }

    /// True when every bit was consumed.
    pub fn end_of_read(&self) -> bool {
        self.remaining_bits() == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos % 8 == 0
    }

    fn fail(&mut self) -> u64 {
        self.error = true;
        0
    }

    /// Read up to 64 bits, most significant first.
    pub fn read_bits(&mut self, bits: u8) -> u64 {
        if self.error || bits > 64 || bits as usize > self.remaining_bits() {
            return self.fail();
        }
        let mut value = 0u64;
        for _ in 0..bits {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | bit as u64;
            self.bit_pos += 1;
        }
        value
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_bits(8) as u8
    }

    pub fn read_u16(&mut self) -> u16 {
        self.read_bits(16) as u16
    }

    pub fn read_u24(&mut self) -> u32 {
        self.read_bits(24) as u32
    }

    pub fn read_u32(&mut self) -> u32 {
        self.read_bits(32) as u32
    }

    /// Skip bits, typically reserved fields.
    pub fn skip_bits(&mut self, bits: usize) {
        if self.error || bits > self.remaining_bits() {
            self.fail();
        } else {
            self.bit_pos += bits;
        }
    }

    /// Read `n` aligned bytes.
    pub fn read_slice(&mut self, n: usize) -> &'a [u8] {
        if self.error || !self.is_byte_aligned() || n > self.remaining_bytes() {
            self.fail();
            return &[];
        }
        let start = self.bit_pos / 8;
        self.bit_pos += n * 8;
        &self.data[start..start + n]
    }

    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        self.read_slice(n).to_vec()
    }

    /// Everything left, from an aligned position.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let n = self.remaining_bytes();
        self.read_slice(n)
    }

    /// Detach the next `n` bytes as an independent reader. On overflow the
    /// error is set on both readers.
    pub fn sub_reader(&mut self, n: usize) -> PsiReader<'a> {
        if self.error || !self.is_byte_aligned() || n > self.remaining_bytes() {
            self.fail();
            let mut sub = PsiReader::new(&[]);
            sub.error = true;
            return sub;
        }
        PsiReader::new(self.read_slice(n))
    }

    /// Read a 16-bit field made of reserved bits and a `len_bits` length,
    /// then detach that many bytes.
    pub fn read_length_prefixed(&mut self, len_bits: u8) -> PsiReader<'a> {
        self.skip_bits(16 - len_bits as usize);
        let length = self.read_bits(len_bits) as usize;
        self.sub_reader(length)
    }

    /// Read `digits` BCD digits. A nibble above 9 sets the error.
    pub fn read_bcd(&mut self, digits: u8) -> u32 {
        let mut value = 0u32;
        for _ in 0..digits {
            let nibble = self.read_bits(4) as u32;
            if nibble > 9 {
                self.fail();
                return 0;
            }
            value = value * 10 + nibble;
        }
        value
    }
}

/// Placeholder for a length field patched once the counted data is written.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct LengthMark {
    position: usize,
    len_bits: u8,
}

/// Big-endian bit/byte writer.
#[derive(Debug, Clone, Default)]
pub struct PsiWriter {
    buf: BytesMut,
    acc: u8,
    acc_bits: u8,
}

impl PsiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.acc_bits == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.acc_bits == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Write the `bits` low-order bits of `value`, most significant first.
    pub fn put_bits(&mut self, value: u64, bits: u8) {
        for i in (0..bits.min(64)).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.acc = (self.acc << 1) | bit;
            self.acc_bits += 1;
            if self.acc_bits == 8 {
                self.buf.put_u8(self.acc);
                self.acc = 0;
                self.acc_bits = 0;
            }
        }
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_bits(value as u64, 1);
    }

    /// Reserved bits are written as ones.
    pub fn put_reserved(&mut self, bits: u8) {
        self.put_bits(u64::MAX, bits);
    }

    pub fn put_u8(&mut self, value: u8) {
        if self.is_byte_aligned() {
            self.buf.put_u8(value);
        } else {
            self.put_bits(value as u64, 8);
        }
    }

    pub fn put_u16(&mut self, value: u16) {
        if self.is_byte_aligned() {
            self.buf.put_u16(value);
        } else {
            self.put_bits(value as u64, 16);
        }
    }

    pub fn put_u24(&mut self, value: u32) {
        self.put_bits(value as u64, 24);
    }

    pub fn put_u32(&mut self, value: u32) {
        if self.is_byte_aligned() {
            self.buf.put_u32(value);
        } else {
            self.put_bits(value as u64, 32);
        }
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        if self.is_byte_aligned() {
            self.buf.put_slice(data);
        } else {
            for &b in data {
                self.put_bits(b as u64, 8);
            }
        }
    }

    /// Write `value` as `digits` BCD digits.
    pub fn put_bcd(&mut self, value: u32, digits: u8) {
        let mut divisor = 10u32.pow(digits.saturating_sub(1) as u32);
        for _ in 0..digits {
            self.put_bits(((value / divisor) % 10) as u64, 4);
            divisor = (divisor / 10).max(1);
        }
    }

    /// Start a 16-bit field of reserved ones followed by a `len_bits` length.
    pub fn start_length(&mut self, len_bits: u8) -> LengthMark {
        self.start_length_with(u16::MAX >> len_bits, len_bits)
    }

    /// Start a 16-bit field where the bits above the length hold `upper`.
    pub fn start_length_with(&mut self, upper: u16, len_bits: u8) -> LengthMark {
        debug_assert!(self.is_byte_aligned());
        let position = self.buf.len();
        let upper = if len_bits >= 16 { 0 } else { upper << len_bits };
        self.buf.put_u16(upper);
        LengthMark { position, len_bits }
    }

    /// Patch a length field with the number of bytes written since.
    pub fn end_length(&mut self, mark: LengthMark) {
        let length = self.buf.len() - mark.position - 2;
        let mask = if mark.len_bits >= 16 {
            u16::MAX
        } else {
            (1u16 << mark.len_bits) - 1
        };
        let current = u16::from_be_bytes([self.buf[mark.position], self.buf[mark.position + 1]]);
        let value = (current & !mask) | (length as u16 & mask);
        self.buf[mark.position..mark.position + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Append another writer's aligned content.
    pub fn put_writer(&mut self, other: &PsiWriter) {
        debug_assert!(other.is_byte_aligned());
        self.put_bytes(other.as_slice());
    }

    /// Final content; a partial byte is padded with zero bits.
    pub fn freeze(mut self) -> Bytes {
        if self.acc_bits > 0 {
            let pad = 8 - self.acc_bits;
            self.put_bits(0, pad);
        }
        self.buf.freeze()
    }
}

/// Collects a table payload split into sections.
///
/// The table writes into [`SectionsBuilder::writer`], checks
/// [`SectionsBuilder::fits`] before each entry and calls
/// [`SectionsBuilder::close_section`] when the current section is full.
#[derive(Debug)]
pub struct SectionsBuilder {
    max_payload: usize,
    payloads: Vec<Bytes>,
    current: PsiWriter,
}

impl Default for SectionsBuilder {
    fn default() -> Self {
        Self::new(MAX_PSI_LONG_SECTION_PAYLOAD_SIZE)
    }
}

impl SectionsBuilder {
    pub fn new(max_payload: usize) -> Self {
        SectionsBuilder {
            max_payload,
            payloads: Vec::new(),
            current: PsiWriter::new(),
        }
    }

    /// Writer of the current section payload.
    pub fn writer(&mut self) -> &mut PsiWriter {
        &mut self.current
    }

    /// Bytes still available in the current section.
    pub fn remaining(&self) -> usize {
        self.max_payload.saturating_sub(self.current.len())
    }

    pub fn fits(&self, size: usize) -> bool {
        size <= self.remaining()
    }

    pub fn is_section_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Number of closed sections.
    pub fn closed_count(&self) -> usize {
        self.payloads.len()
    }

    /// Close the current section and start a new, empty one.
    pub fn close_section(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.payloads.push(done.freeze());
    }

    /// All section payloads. A table always has at least one section.
    pub fn finish(mut self) -> Vec<Bytes> {
        if !self.current.is_empty() || self.payloads.is_empty() {
            self.close_section();
        }
        self.payloads
    }
}
