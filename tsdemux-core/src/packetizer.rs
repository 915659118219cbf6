//! Section to packet conversion, the inverse of the reassembler.

use crate::packet::{MAX_PAYLOAD_SIZE, SYNC_BYTE, TS_PACKET_SIZE};
use crate::reassembler::STUFFING_BYTE;
use crate::section::Section;

/// How sections are laid out in packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StuffingPolicy {
    /// Sections are packed back to back; a section may start mid-packet.
    #[default]
    Never,
    /// Every section starts at the beginning of a packet, the end of the
    /// previous packet is stuffed.
    Always,
}

/// Generates the packets of one PID from sections.
#[derive(Debug, Clone)]
pub struct Packetizer {
    pid: u16,
    continuity_counter: u8,
    policy: StuffingPolicy,
}

impl Packetizer {
    pub fn new(pid: u16) -> Self {
        Packetizer {
            pid,
            continuity_counter: 0,
            policy: StuffingPolicy::default(),
        }
    }

    pub fn with_stuffing(mut self, policy: StuffingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_continuity_counter(mut self, cc: u8) -> Self {
        self.continuity_counter = cc & 0x0F;
        self
    }

    /// Continuity counter of the next generated packet.
    pub fn continuity_counter(&self) -> u8 {
        self.continuity_counter
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Packetize a list of sections. The last packet is stuffed.
    pub fn packetize<'s, I>(&mut self, sections: I) -> Vec<[u8; TS_PACKET_SIZE]>
    where
        I: IntoIterator<Item = &'s Section>,
    {
        let mut data = Vec::new();
        let mut starts = Vec::new();
        for section in sections {
            starts.push(data.len());
            data.extend_from_slice(section.as_bytes());
        }

        let mut packets = Vec::new();
        let mut pos = 0;
        let mut next = 0;

        while pos < data.len() {
            while next < starts.len() && starts[next] < pos {
                next += 1;
            }

            let (pointer, end) = match self.policy {
                StuffingPolicy::Never => match starts.get(next) {
                    Some(&start) if start - pos < MAX_PAYLOAD_SIZE - 1 => {
                        (Some(start - pos), pos + MAX_PAYLOAD_SIZE - 1)
                    }
                    _ => (None, pos + MAX_PAYLOAD_SIZE),
                },
                StuffingPolicy::Always => {
                    let at_start = starts.get(next) == Some(&pos);
                    let limit = if at_start {
                        pos + MAX_PAYLOAD_SIZE - 1
                    } else {
                        pos + MAX_PAYLOAD_SIZE
                    };
                    let following = starts[next..]
                        .iter()
                        .copied()
                        .find(|&s| s > pos)
                        .unwrap_or(usize::MAX);
                    (at_start.then_some(0), limit.min(following))
                }
            };
            let end = end.min(data.len());

            let mut packet = [STUFFING_BYTE; TS_PACKET_SIZE];
            packet[0] = SYNC_BYTE;
            packet[1] = ((self.pid >> 8) as u8 & 0x1F) | if pointer.is_some() { 0x40 } else { 0 };
            packet[2] = self.pid as u8;
            packet[3] = 0x10 | self.continuity_counter;
            let mut offset = 4;
            if let Some(pointer) = pointer {
                packet[offset] = pointer as u8;
                offset += 1;
            }
            packet[offset..offset + end - pos].copy_from_slice(&data[pos..end]);

            packets.push(packet);
            self.continuity_counter = (self.continuity_counter + 1) & 0x0F;
            pos = end;
        }

        packets
    }
}
