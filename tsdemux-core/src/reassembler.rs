//! Per-PID section reassembly.
//!
//! A [`ChannelReassembler`] consumes the successive packets of one PID and
//! extracts the sections they carry, following the pointer field rules of
//! ISO/IEC 13818-1 2.4.4.

use bytes::{Bytes, BytesMut};
use log::{debug, trace};

use crate::error::SectionError;
use crate::packet::TsPacket;
use crate::section::{Section, MAX_PRIVATE_SECTION_SIZE, SHORT_SECTION_HEADER_SIZE};

/// Fill value: where a section header would start, it ends the payload.
pub const STUFFING_BYTE: u8 = 0xFF;

/// Something the reassembler noticed while consuming a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    /// A section with exactly its declared length was captured.
    Section(Section),
    /// Bytes that could not form a section. The raw bytes are kept for
    /// diagnostics.
    Malformed { section: Section, error: SectionError },
    /// Continuity counter gap. Any section in progress was dropped.
    Discontinuity,
}

/// Section reassembly state machine for one PID.
#[derive(Debug)]
pub struct ChannelReassembler {
    pid: u16,
    /// Bytes of the section in progress.
    buffer: BytesMut,
    /// Total size of the section in progress, once its header is known.
    expected_length: Option<usize>,
    /// Last continuity counter of a packet with payload.
    last_cc: Option<u8>,
    /// Last packet was a duplicate of the previous one.
    duplicate: bool,
}

impl ChannelReassembler {
    /// Create a reassembler for a PID.
    pub fn new(pid: u16) -> Self {
        ChannelReassembler {
            pid,
            buffer: BytesMut::with_capacity(MAX_PRIVATE_SECTION_SIZE),
            expected_length: None,
            last_cc: None,
            duplicate: false,
        }
    }

    /// PID this reassembler works on.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// True if a section is in progress.
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop all state, including continuity tracking.
    pub fn reset(&mut self) {
        self.drop_pending();
        self.last_cc = None;
        self.duplicate = false;
    }

    fn drop_pending(&mut self) {
        self.buffer.clear();
        self.expected_length = None;
    }

    /// Consume one packet of this PID, pushing events to `out`.
    pub fn feed(&mut self, packet: &TsPacket<'_>, out: &mut Vec<ReassemblyEvent>) {
        // Corrupted packets are skipped, the next one reveals the gap.
        if packet.header.transport_error || !packet.header.has_payload() {
            return;
        }

        if !self.check_continuity(packet, out) {
            return;
        }

        if packet.header.is_scrambled() {
            if self.is_pending() {
                debug!("PID 0x{:04X}: scrambled packet, dropping section in progress", self.pid);
                self.drop_pending();
            }
            return;
        }

        let payload = packet.payload;
        if payload.is_empty() {
            return;
        }

        if packet.header.payload_unit_start {
            let pointer = payload[0] as usize;
            let data = &payload[1..];
            if pointer > data.len() {
                self.drop_pending();
                out.push(ReassemblyEvent::Malformed {
                    section: Section::from_captured(Bytes::copy_from_slice(payload), self.pid),
                    error: SectionError::InvalidPointerField {
                        pointer,
                        payload_size: data.len(),
                    },
                });
                return;
            }

            // Bytes before the pointer end the section in progress, if any.
            if self.is_pending() {
                self.consume(&data[..pointer], false, out);
                if self.is_pending() {
                    self.report_truncated(out);
                }
            }
            self.consume(&data[pointer..], true, out);
        } else if self.is_pending() {
            self.consume(payload, false, out);
        } else {
            trace!("PID 0x{:04X}: payload without pending section ignored", self.pid);
        }
    }

    /// Returns false if the packet must be ignored (duplicate).
    fn check_continuity(&mut self, packet: &TsPacket<'_>, out: &mut Vec<ReassemblyEvent>) -> bool {
        let cc = packet.header.continuity_counter;
        let mut discontinuity = false;

        match self.last_cc {
            Some(_) if packet.discontinuity_indicator() => {}
            Some(last) if cc == last => {
                if !self.duplicate {
                    // One repetition of a packet is allowed by the standard.
                    self.duplicate = true;
                    trace!("PID 0x{:04X}: duplicate packet CC={}", self.pid, cc);
                    return false;
                }
                discontinuity = true;
            }
            Some(last) if cc != (last + 1) & 0x0F => discontinuity = true,
            _ => {}
        }

        if discontinuity {
            debug!(
                "PID 0x{:04X}: continuity error, expected CC={}, got {}",
                self.pid,
                self.last_cc.map(|c| (c + 1) & 0x0F).unwrap_or(0),
                cc
            );
            self.drop_pending();
            out.push(ReassemblyEvent::Discontinuity);
        }

        self.duplicate = false;
        self.last_cc = Some(cc);
        true
    }

    /// Append bytes to the section in progress and extract every completed
    /// section. New sections may only start when `may_start` is set.
    fn consume(&mut self, mut data: &[u8], may_start: bool, out: &mut Vec<ReassemblyEvent>) {
        while !data.is_empty() {
            if !self.is_pending() && (!may_start || data[0] == STUFFING_BYTE) {
                break;
            }

            let total = match self.expected_length {
                Some(total) => total,
                None => {
                    let take = (SHORT_SECTION_HEADER_SIZE - self.buffer.len()).min(data.len());
                    self.buffer.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    if self.buffer.len() < SHORT_SECTION_HEADER_SIZE {
                        break;
                    }

                    let section_length =
                        ((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize;
                    let total = SHORT_SECTION_HEADER_SIZE + section_length;
                    if total > MAX_PRIVATE_SECTION_SIZE {
                        let raw = self.buffer.split().freeze();
                        self.drop_pending();
                        out.push(ReassemblyEvent::Malformed {
                            section: Section::from_captured(raw, self.pid),
                            error: SectionError::TooLarge(total),
                        });
                        // Section boundaries in the rest of the packet are lost.
                        break;
                    }
                    self.expected_length = Some(total);
                    total
                }
            };

            let take = (total - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == total {
                let section = Section::from_captured(self.buffer.split().freeze(), self.pid);
                trace!(
                    "PID 0x{:04X}: section table_id=0x{:02X}, {} bytes",
                    self.pid,
                    section.table_id(),
                    section.size()
                );
                self.expected_length = None;
                out.push(ReassemblyEvent::Section(section));
            }
        }
    }

    fn report_truncated(&mut self, out: &mut Vec<ReassemblyEvent>) {
        let actual = self.buffer.len();
        let error = match self.expected_length {
            Some(declared) => SectionError::LengthMismatch { declared, actual },
            None => SectionError::TooShort(actual),
        };
        debug!("PID 0x{:04X}: truncated section, {}", self.pid, error);
        let raw = self.buffer.split().freeze();
        self.drop_pending();
        out.push(ReassemblyEvent::Malformed {
            section: Section::from_captured(raw, self.pid),
            error,
        });
    }
}
