//! MPEG-TS packet parsing.
//!
//! This module handles parsing of 188-byte MPEG Transport Stream packets.

use crate::error::PacketError;

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Size of the fixed packet header.
pub const TS_HEADER_SIZE: usize = 4;

/// Largest payload a packet can carry.
pub const MAX_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;

/// Parsed TS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Check if packet has adaptation field.
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    /// Check if packet has payload.
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    /// Check if packet is scrambled.
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }
}

/// The part of the adaptation field section reassembly looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Adaptation field length.
    pub length: u8,
    /// Discontinuity indicator.
    pub discontinuity: bool,
}

/// A parsed TS packet.
#[derive(Debug, Clone)]
pub struct TsPacket<'a> {
    /// Packet header.
    pub header: TsHeader,
    /// Adaptation field (if present).
    pub adaptation_field: Option<AdaptationField>,
    /// Payload data.
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from raw bytes.
    ///
    /// Only the first 188 bytes of `data` are used.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        if data.len() < TS_PACKET_SIZE {
            return Err(PacketError::TooShort(data.len()));
        }

        if data[0] != SYNC_BYTE {
            return Err(PacketError::InvalidSync(data[0]));
        }

        let header = TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        };

        let mut offset = TS_HEADER_SIZE;
        let adaptation_field = if header.has_adaptation_field() {
            let af_length = data[4] as usize;
            offset = 5 + af_length;
            if offset > TS_PACKET_SIZE {
                return Err(PacketError::InvalidAdaptationField(data[4]));
            }

            // An empty adaptation field has no flags byte.
            Some(AdaptationField {
                length: data[4],
                discontinuity: af_length > 0 && data[5] & 0x80 != 0,
            })
        } else {
            None
        };

        let payload = if header.has_payload() && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket {
            header,
            adaptation_field,
            payload,
        })
    }

    /// Packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid
    }

    /// True if the packet carries at least one payload byte.
    pub fn has_payload(&self) -> bool {
        self.header.has_payload() && !self.payload.is_empty()
    }

    /// Discontinuity indicator of the adaptation field.
    pub fn discontinuity_indicator(&self) -> bool {
        self.adaptation_field
            .as_ref()
            .map(|af| af.discontinuity)
            .unwrap_or(false)
    }
}

/// Iterator over TS packets in a byte stream.
pub struct TsPacketIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TsPacketIterator<'a> {
    /// Create a new iterator over TS packets.
    pub fn new(data: &'a [u8]) -> Self {
        // Find first sync byte
        let mut offset = 0;
        while offset < data.len() && data[offset] != SYNC_BYTE {
            offset += 1;
        }
        Self { data, offset }
    }

    /// Number of bytes consumed so far, including skipped garbage.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Resynchronize to next sync byte.
    fn resync(&mut self) {
        self.offset += 1;
        while self.offset < self.data.len() && self.data[self.offset] != SYNC_BYTE {
            self.offset += 1;
        }
    }
}

impl<'a> Iterator for TsPacketIterator<'a> {
    type Item = TsPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset + TS_PACKET_SIZE <= self.data.len() {
            if self.data[self.offset] != SYNC_BYTE {
                self.resync();
                continue;
            }

            match TsPacket::parse(&self.data[self.offset..]) {
                Ok(packet) => {
                    self.offset += TS_PACKET_SIZE;
                    return Some(packet);
                }
                Err(_) => {
                    self.resync();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_null_packet() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x1F; // PID high bits
        packet[2] = 0xFF; // PID low bits (NULL = 0x1FFF)
        packet[3] = 0x10; // adaptation_field_control = 01, has payload

        let parsed = TsPacket::parse(&packet).unwrap();
        assert_eq!(parsed.pid(), 0x1FFF);
        assert!(!parsed.header.transport_error);
        assert!(parsed.header.has_payload());
        assert!(!parsed.header.has_adaptation_field());
        assert_eq!(parsed.payload.len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_parse_pat_packet() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x40; // payload_unit_start = 1, PID = 0x0000
        packet[2] = 0x00;
        packet[3] = 0x17; // has payload, CC = 7

        let parsed = TsPacket::parse(&packet).unwrap();
        assert_eq!(parsed.pid(), 0x0000);
        assert!(parsed.header.payload_unit_start);
        assert_eq!(parsed.header.continuity_counter, 7);
    }

    #[test]
    fn test_invalid_sync_byte() {
        let packet = [0u8; 188];
        assert_eq!(
            TsPacket::parse(&packet).unwrap_err(),
            PacketError::InvalidSync(0)
        );
    }

    #[test]
    fn test_adaptation_field_discontinuity() {
        let mut packet = [0xFFu8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x01;
        packet[2] = 0x00;
        packet[3] = 0x30; // adaptation + payload
        packet[4] = 1; // af length
        packet[5] = 0x80; // discontinuity

        let parsed = TsPacket::parse(&packet).unwrap();
        assert!(parsed.discontinuity_indicator());
        assert_eq!(parsed.payload.len(), 188 - 6);
    }

    #[test]
    fn test_empty_adaptation_field() {
        let mut packet = [0xFFu8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x01;
        packet[2] = 0x00;
        packet[3] = 0x30;
        packet[4] = 0; // af length, no flags byte

        let parsed = TsPacket::parse(&packet).unwrap();
        assert_eq!(
            parsed.adaptation_field,
            Some(AdaptationField {
                length: 0,
                discontinuity: false
            })
        );
        assert!(!parsed.discontinuity_indicator());
        assert_eq!(parsed.payload.len(), 188 - 5);
    }

    #[test]
    fn test_adaptation_field_too_long() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[3] = 0x30;
        packet[4] = 200;
        assert_eq!(
            TsPacket::parse(&packet).unwrap_err(),
            PacketError::InvalidAdaptationField(200)
        );
    }

    #[test]
    fn test_iterator_resyncs() {
        let mut data = vec![0x00, 0x12];
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x1F;
        packet[2] = 0xFF;
        packet[3] = 0x10;
        data.extend_from_slice(&packet);
        data.extend_from_slice(&packet);

        let pids: Vec<u16> = TsPacketIterator::new(&data).map(|p| p.pid()).collect();
        assert_eq!(pids, vec![0x1FFF, 0x1FFF]);
    }

    #[test]
    fn test_ts_header_methods() {
        let header = TsHeader {
            transport_error: false,
            payload_unit_start: true,
            pid: 0x0000,
            scrambling_control: 0,
            adaptation_field_control: 0x03, // Has both
            continuity_counter: 0,
        };

        assert!(header.has_adaptation_field());
        assert!(header.has_payload());
        assert!(!header.is_scrambled());
    }
}
