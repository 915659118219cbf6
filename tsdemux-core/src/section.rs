//! PSI (Program Specific Information) sections.
//!
//! A [`Section`] is an immutable, self-describing binary unit. This module
//! handles the common header layout (short and long form) and CRC32
//! validation.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::SectionError;
use crate::pid;

/// Size of the short-form header (table_id + flags/length).
pub const SHORT_SECTION_HEADER_SIZE: usize = 3;
/// Size of the long-form header.
pub const LONG_SECTION_HEADER_SIZE: usize = 8;
/// Size of the trailing CRC32 of long sections.
pub const SECTION_CRC32_SIZE: usize = 4;
/// Maximum size of an MPEG/DVB PSI section.
pub const MAX_PSI_SECTION_SIZE: usize = 1024;
/// Maximum size of a private section; ceiling of the reassembly buffer.
pub const MAX_PRIVATE_SECTION_SIZE: usize = 4096;
/// Maximum payload of a long PSI section.
pub const MAX_PSI_LONG_SECTION_PAYLOAD_SIZE: usize =
    MAX_PSI_SECTION_SIZE - LONG_SECTION_HEADER_SIZE - SECTION_CRC32_SIZE;
/// Maximum payload of a short PSI section.
pub const MAX_PSI_SHORT_SECTION_PAYLOAD_SIZE: usize =
    MAX_PSI_SECTION_SIZE - SHORT_SECTION_HEADER_SIZE;

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section syntax indicator.
    pub section_syntax_indicator: bool,
    /// Private indicator (reserved_future_use in DVB SI).
    pub private_indicator: bool,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (for long sections).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

impl PsiHeader {
    /// Header of a long section, section_length is computed when building.
    pub fn long(
        table_id: u8,
        private_indicator: bool,
        table_id_extension: u16,
        version_number: u8,
        current_next_indicator: bool,
        section_number: u8,
        last_section_number: u8,
    ) -> Self {
        PsiHeader {
            table_id,
            section_syntax_indicator: true,
            private_indicator,
            section_length: 0,
            table_id_extension,
            version_number: version_number & 0x1F,
            current_next_indicator,
            section_number,
            last_section_number,
        }
    }
}

/// A complete section, as extracted from a PID or built from a payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    data: Bytes,
    source_pid: u16,
}

impl Section {
    /// Wrap captured bytes without any check. The reassembler guarantees the
    /// size matches the declared length.
    pub(crate) fn from_captured(data: Bytes, source_pid: u16) -> Self {
        Section { data, source_pid }
    }

    /// Build a section from raw bytes, checking its structure (not its CRC).
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self, SectionError> {
        let section = Section {
            data: data.into(),
            source_pid: pid::NULL,
        };
        section.check_structure()?;
        Ok(section)
    }

    /// Build a short section around a payload.
    pub fn new_short(
        table_id: u8,
        private_indicator: bool,
        payload: &[u8],
    ) -> Result<Self, SectionError> {
        let total = SHORT_SECTION_HEADER_SIZE + payload.len();
        if total > MAX_PRIVATE_SECTION_SIZE {
            return Err(SectionError::TooLarge(total));
        }
        let length = payload.len() as u16;

        let mut data = BytesMut::with_capacity(total);
        data.put_u8(table_id);
        data.put_u16(flags_and_length(false, private_indicator, length));
        data.put_slice(payload);

        Ok(Section {
            data: data.freeze(),
            source_pid: pid::NULL,
        })
    }

    /// Build a long section around a payload, computing length and CRC32.
    pub fn new_long(header: PsiHeader, payload: &[u8]) -> Result<Self, SectionError> {
        let total = LONG_SECTION_HEADER_SIZE + payload.len() + SECTION_CRC32_SIZE;
        if total > MAX_PRIVATE_SECTION_SIZE {
            return Err(SectionError::TooLarge(total));
        }
        let length = (total - SHORT_SECTION_HEADER_SIZE) as u16;

        let mut data = BytesMut::with_capacity(total);
        data.put_u8(header.table_id);
        data.put_u16(flags_and_length(true, header.private_indicator, length));
        data.put_u16(header.table_id_extension);
        data.put_u8(
            0xC0 | ((header.version_number & 0x1F) << 1) | header.current_next_indicator as u8,
        );
        data.put_u8(header.section_number);
        data.put_u8(header.last_section_number);
        data.put_slice(payload);
        let crc = crc32_mpeg2(&data);
        data.put_u32(crc);

        Ok(Section {
            data: data.freeze(),
            source_pid: pid::NULL,
        })
    }

    /// Same section, tagged with the PID it came from.
    pub fn with_source_pid(mut self, source_pid: u16) -> Self {
        self.source_pid = source_pid;
        self
    }

    /// PID the section was extracted from (0x1FFF when unknown).
    pub fn source_pid(&self) -> u16 {
        self.source_pid
    }

    /// Full binary content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Full binary content, shared.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Table ID.
    pub fn table_id(&self) -> u8 {
        self.data.first().copied().unwrap_or(0xFF)
    }

    /// True for long-form sections.
    pub fn is_long(&self) -> bool {
        self.data.len() > 1 && self.data[1] & 0x80 != 0
    }

    /// True for short-form sections.
    pub fn is_short(&self) -> bool {
        !self.is_long()
    }

    /// Private indicator bit.
    pub fn is_private(&self) -> bool {
        self.data.len() > 1 && self.data[1] & 0x40 != 0
    }

    /// Declared section_length field.
    pub fn section_length(&self) -> usize {
        if self.data.len() < SHORT_SECTION_HEADER_SIZE {
            return 0;
        }
        ((self.data[1] as usize & 0x0F) << 8) | self.data[2] as usize
    }

    /// Table ID extension (0 for short sections).
    pub fn table_id_extension(&self) -> u16 {
        if self.is_long() && self.data.len() >= LONG_SECTION_HEADER_SIZE {
            u16::from_be_bytes([self.data[3], self.data[4]])
        } else {
            0
        }
    }

    /// Version number (0 for short sections).
    pub fn version(&self) -> u8 {
        if self.is_long() && self.data.len() >= LONG_SECTION_HEADER_SIZE {
            (self.data[5] >> 1) & 0x1F
        } else {
            0
        }
    }

    /// Current/next indicator (always current for short sections).
    pub fn is_current(&self) -> bool {
        if self.is_long() && self.data.len() >= LONG_SECTION_HEADER_SIZE {
            self.data[5] & 0x01 != 0
        } else {
            true
        }
    }

    /// Section number (0 for short sections).
    pub fn section_number(&self) -> u8 {
        if self.is_long() && self.data.len() >= LONG_SECTION_HEADER_SIZE {
            self.data[6]
        } else {
            0
        }
    }

    /// Last section number (0 for short sections).
    pub fn last_section_number(&self) -> u8 {
        if self.is_long() && self.data.len() >= LONG_SECTION_HEADER_SIZE {
            self.data[7]
        } else {
            0
        }
    }

    /// Parsed header.
    pub fn header(&self) -> PsiHeader {
        PsiHeader {
            table_id: self.table_id(),
            section_syntax_indicator: self.is_long(),
            private_indicator: self.is_private(),
            section_length: self.section_length() as u16,
            table_id_extension: self.table_id_extension(),
            version_number: self.version(),
            current_next_indicator: self.is_current(),
            section_number: self.section_number(),
            last_section_number: self.last_section_number(),
        }
    }

    /// Payload: after the header and, for long sections, before the CRC.
    pub fn payload(&self) -> &[u8] {
        if self.is_long() {
            let end = self.data.len().saturating_sub(SECTION_CRC32_SIZE);
            if end > LONG_SECTION_HEADER_SIZE {
                &self.data[LONG_SECTION_HEADER_SIZE..end]
            } else {
                &[]
            }
        } else if self.data.len() > SHORT_SECTION_HEADER_SIZE {
            &self.data[SHORT_SECTION_HEADER_SIZE..]
        } else {
            &[]
        }
    }

    /// CRC32 embedded at the end of a long section.
    pub fn crc32(&self) -> Option<u32> {
        if !self.is_long() || self.data.len() < LONG_SECTION_HEADER_SIZE + SECTION_CRC32_SIZE {
            return None;
        }
        let offset = self.data.len() - SECTION_CRC32_SIZE;
        Some(u32::from_be_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    /// Check length consistency and, for long sections, header sanity.
    pub fn check_structure(&self) -> Result<(), SectionError> {
        let size = self.data.len();
        if size < SHORT_SECTION_HEADER_SIZE {
            return Err(SectionError::TooShort(size));
        }
        if size > MAX_PRIVATE_SECTION_SIZE {
            return Err(SectionError::TooLarge(size));
        }
        let declared = SHORT_SECTION_HEADER_SIZE + self.section_length();
        if declared != size {
            return Err(SectionError::LengthMismatch {
                declared,
                actual: size,
            });
        }
        if self.is_long() {
            if self.section_length() < LONG_SECTION_HEADER_SIZE - SHORT_SECTION_HEADER_SIZE + SECTION_CRC32_SIZE
            {
                return Err(SectionError::LongSectionTooShort(self.section_length()));
            }
            if self.section_number() > self.last_section_number() {
                return Err(SectionError::InvalidSectionNumber {
                    number: self.section_number(),
                    last: self.last_section_number(),
                });
            }
        }
        Ok(())
    }

    /// Verify CRC32 of a long section. Short sections always pass.
    pub fn verify_crc(&self) -> Result<(), SectionError> {
        let Some(expected) = self.crc32() else {
            return Ok(());
        };
        let computed = crc32_mpeg2(&self.data[..self.data.len() - SECTION_CRC32_SIZE]);
        if computed == expected {
            Ok(())
        } else {
            Err(SectionError::CrcMismatch { expected, computed })
        }
    }

    /// Full validation: structure, then CRC when requested.
    pub fn validate(&self, check_crc: bool) -> Result<(), SectionError> {
        self.check_structure()?;
        if check_crc {
            self.verify_crc()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Section");
        s.field("table_id", &format_args!("0x{:02X}", self.table_id()))
            .field("pid", &format_args!("0x{:04X}", self.source_pid))
            .field("size", &self.size());
        if self.is_long() {
            s.field("ext", &format_args!("0x{:04X}", self.table_id_extension()))
                .field("version", &self.version())
                .field("current", &self.is_current())
                .field("section", &self.section_number())
                .field("last", &self.last_section_number());
        }
        s.finish()
    }
}

fn flags_and_length(long: bool, private_indicator: bool, length: u16) -> u16 {
    let mut value = 0x3000 | (length & 0x0FFF);
    if long {
        value |= 0x8000;
    }
    if private_indicator {
        value |= 0x4000;
    }
    value
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    // CRC32 lookup table for MPEG-2 polynomial
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x80000000 != 0 {
                    crc = (crc << 1) ^ 0x04C11DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) as usize;
        crc = (crc << 8) ^ CRC_TABLE[index];
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        // CRC32 of empty data with initial value 0xFFFFFFFF
        assert_eq!(crc32_mpeg2(&[]), 0xFFFFFFFF);
    }

    #[test]
    fn test_crc32_known_pat() {
        // PAT: TSID 1, version 0, program 1 -> PMT PID 0x1000
        let pat = [
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00,
        ];
        assert_eq!(crc32_mpeg2(&pat), 0x2AB1_04B2);
        // CRC over the whole section including its CRC is zero
        assert_eq!(crc32_mpeg2(&[&pat[..], &[0x2A, 0xB1, 0x04, 0xB2]].concat()), 0);
    }

    #[test]
    fn test_new_long_roundtrip_header() {
        let header = PsiHeader::long(0x42, true, 0x1234, 7, true, 1, 2);
        let section = Section::new_long(header, &[1, 2, 3]).unwrap();

        assert!(section.is_long());
        assert!(section.is_private());
        assert_eq!(section.table_id(), 0x42);
        assert_eq!(section.table_id_extension(), 0x1234);
        assert_eq!(section.version(), 7);
        assert!(section.is_current());
        assert_eq!(section.section_number(), 1);
        assert_eq!(section.last_section_number(), 2);
        assert_eq!(section.payload(), &[1, 2, 3]);
        assert_eq!(section.size(), 8 + 3 + 4);
        assert_eq!(section.section_length(), 12);
        assert!(section.validate(true).is_ok());
    }

    #[test]
    fn test_new_short() {
        let section = Section::new_short(0x70, true, &[0xE8, 0x7A, 0x12, 0x34, 0x56]).unwrap();
        assert!(section.is_short());
        assert_eq!(section.payload().len(), 5);
        assert_eq!(section.crc32(), None);
        assert!(section.validate(true).is_ok());
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let header = PsiHeader::long(0x00, false, 1, 0, true, 0, 0);
        let section = Section::new_long(header, &[0x00, 0x01, 0xE1, 0x00]).unwrap();
        let mut raw = section.as_bytes().to_vec();
        raw[9] ^= 0x01;
        let corrupted = Section::from_bytes(raw).unwrap();
        assert!(matches!(
            corrupted.validate(true),
            Err(SectionError::CrcMismatch { .. })
        ));
        assert!(corrupted.validate(false).is_ok());
    }

    #[test]
    fn test_length_mismatch() {
        let err = Section::from_bytes(vec![0x70, 0x70, 0x05, 0x00]).unwrap_err();
        assert_eq!(
            err,
            SectionError::LengthMismatch {
                declared: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn test_invalid_section_number() {
        let header = PsiHeader::long(0x00, false, 1, 0, true, 3, 1);
        let section = Section::new_long(header, &[]).unwrap();
        assert_eq!(
            section.check_structure(),
            Err(SectionError::InvalidSectionNumber { number: 3, last: 1 })
        );
    }
}
