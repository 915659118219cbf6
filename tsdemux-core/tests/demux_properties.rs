use std::sync::Arc;

use proptest::prelude::*;
use tsdemux_core::{
    DemuxConfig, DemuxHandler, DemuxedSection, DemuxedTable, Packetizer, PsiHeader, Registry,
    Section, SectionDemux, SectionError, Standards, StuffingPolicy, Tdt, TS_PACKET_SIZE,
};

#[derive(Default)]
struct Collector {
    sections: Vec<Section>,
    tables: Vec<DemuxedTable>,
    shorts: Vec<DemuxedSection>,
    invalid: Vec<SectionError>,
    discontinuities: Vec<u16>,
}

impl DemuxHandler for Collector {
    fn handle_table(&mut self, table: DemuxedTable) {
        self.tables.push(table);
    }

    fn handle_short_section(&mut self, section: DemuxedSection) {
        self.shorts.push(section);
    }

    fn handle_section(&mut self, section: &Section) {
        self.sections.push(section.clone());
    }

    fn handle_invalid_section(&mut self, _section: Section, error: SectionError) {
        self.invalid.push(error);
    }

    fn handle_discontinuity(&mut self, pid: u16) {
        self.discontinuities.push(pid);
    }
}

fn new_demux(pids: &[u16]) -> SectionDemux<Collector> {
    let registry = Arc::new(Registry::with_default_catalog());
    let config = DemuxConfig {
        standards: Standards::DVB,
        ..DemuxConfig::default()
    };
    let mut demux = SectionDemux::new(registry, config, Collector::default());
    for pid in pids {
        demux.add_pid(*pid);
    }
    demux
}

fn private_section(extension: u16, number: u8, last: u8, payload: &[u8]) -> Section {
    let header = PsiHeader::long(0x90, true, extension, 1, true, number, last);
    Section::new_long(header, payload).unwrap()
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1200)
}

proptest! {
    #[test]
    fn prop_reassembly_any_sizes(
        payloads in prop::collection::vec(payload_strategy(), 1..12),
        stuffed in any::<bool>(),
    ) {
        let sections: Vec<Section> = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| private_section(i as u16, 0, 0, p))
            .collect();
        let policy = if stuffed { StuffingPolicy::Always } else { StuffingPolicy::Never };
        let packets = Packetizer::new(0x0100).with_stuffing(policy).packetize(&sections);

        let mut demux = new_demux(&[0x0100]);
        for packet in &packets {
            demux.feed(packet);
        }

        let handler = demux.handler();
        prop_assert!(handler.invalid.is_empty());
        prop_assert!(handler.discontinuities.is_empty());
        prop_assert_eq!(handler.sections.len(), sections.len());
        for (got, expected) in handler.sections.iter().zip(&sections) {
            prop_assert_eq!(got.as_bytes(), expected.as_bytes());
            prop_assert_eq!(got.source_pid(), 0x0100);
        }
        prop_assert_eq!(handler.tables.len(), sections.len());
    }

    #[test]
    fn prop_stream_split_anywhere(
        payloads in prop::collection::vec(payload_strategy(), 1..6),
        cut in 0usize..2000,
    ) {
        let sections: Vec<Section> = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| private_section(i as u16, 0, 0, p))
            .collect();
        let packets = Packetizer::new(0x0100).packetize(&sections);
        let stream: Vec<u8> = packets.iter().flatten().copied().collect();
        let cut = cut.min(stream.len());

        let mut demux = new_demux(&[0x0100]);
        demux.feed(&stream[..cut]);
        demux.feed(&stream[cut..]);
        prop_assert_eq!(demux.handler().tables.len(), sections.len());
    }
}

#[test]
fn skipped_counter_is_one_discontinuity_on_its_pid_only() {
    let c_sections: Vec<Section> = (0..4u16)
        .map(|i| private_section(i, 0, 0, &[i as u8; 300]))
        .collect();
    let d_sections: Vec<Section> = (0..4u16)
        .map(|i| private_section(0x100 + i, 0, 0, &[0x55; 300]))
        .collect();
    let c_packets = Packetizer::new(0x0C00).packetize(&c_sections);
    let d_packets = Packetizer::new(0x0D00).packetize(&d_sections);
    assert!(c_packets.len() > 4);

    let mut demux = new_demux(&[0x0C00, 0x0D00]);
    for (i, (c, d)) in c_packets.iter().zip(&d_packets).enumerate() {
        // One C packet is lost: its counter value is skipped.
        if i != 3 {
            demux.feed(c);
        }
        demux.feed(d);
    }

    let handler = demux.handler();
    assert_eq!(handler.discontinuities, vec![0x0C00]);
    let d_tables = handler.tables.iter().filter(|t| t.pid() == 0x0D00).count();
    let c_tables = handler.tables.iter().filter(|t| t.pid() == 0x0C00).count();
    assert_eq!(d_tables, d_sections.len());
    assert!(c_tables < c_sections.len());
}

#[test]
fn withheld_section_keeps_table_incomplete() {
    let sections: Vec<Section> = (0..3u8).map(|i| private_section(7, i, 2, &[i; 10])).collect();
    let mut packetizer = Packetizer::new(0x0100);
    let mut demux = new_demux(&[0x0100]);

    for packet in &packetizer.packetize([&sections[0], &sections[2]]) {
        demux.feed(packet);
    }
    assert!(demux.handler().tables.is_empty());
    assert_eq!(demux.handler().sections.len(), 2);

    for packet in &packetizer.packetize([&sections[1]]) {
        demux.feed(packet);
    }
    let tables = &demux.handler().tables;
    assert_eq!(tables.len(), 1);
    assert!(tables[0].binary.is_complete());
    let numbers: Vec<u8> = tables[0].binary.sections().map(Section::section_number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
}

#[test]
fn new_version_is_reported_again() {
    let mut packetizer = Packetizer::new(0x0100);
    let mut demux = new_demux(&[0x0100]);
    let v1 = Section::new_long(PsiHeader::long(0x90, true, 1, 1, true, 0, 0), &[1]).unwrap();
    let v2 = Section::new_long(PsiHeader::long(0x90, true, 1, 2, true, 0, 0), &[2]).unwrap();

    for packet in &packetizer.packetize([&v1, &v1, &v2, &v2]) {
        demux.feed(packet);
    }
    let versions: Vec<u8> = demux.handler().tables.iter().map(|t| t.binary.version()).collect();
    assert_eq!(versions, vec![1, 2]);
}

#[test]
fn corrupted_crc_is_rejected() {
    let good = private_section(1, 0, 0, &[0x10, 0x20, 0x30]);
    let mut bytes = good.as_bytes().to_vec();
    bytes[9] ^= 0x80;
    let bad = Section::from_bytes(bytes).unwrap();

    let mut demux = new_demux(&[0x0100]);
    for packet in &Packetizer::new(0x0100).packetize([&bad]) {
        demux.feed(packet);
    }
    let handler = demux.handler();
    assert!(handler.tables.is_empty());
    assert_eq!(handler.invalid.len(), 1);
    assert!(matches!(handler.invalid[0], SectionError::CrcMismatch { .. }));

    // Without CRC checking the section is accepted.
    let registry = Arc::new(Registry::with_default_catalog());
    let config = DemuxConfig {
        check_crc: false,
        ..DemuxConfig::default()
    };
    let mut demux = SectionDemux::new(registry, config, Collector::default());
    demux.add_pid(0x0100);
    for packet in &Packetizer::new(0x0100).packetize([&bad]) {
        demux.feed(packet);
    }
    assert_eq!(demux.handler().tables.len(), 1);
}

#[test]
fn short_section_in_one_packet() {
    // Pointer field 0, TDT 1993-10-13 12:45:00, stuffing.
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[..4].copy_from_slice(&[0x47, 0x40, 0x14, 0x10]);
    packet[4..13].copy_from_slice(&[0x00, 0x70, 0x70, 0x05, 0xC0, 0x79, 0x12, 0x45, 0x00]);

    let mut demux = new_demux(&[0x0014]);
    demux.feed(&packet);

    let handler = demux.handler();
    assert!(handler.invalid.is_empty());
    assert!(handler.tables.is_empty());
    assert_eq!(handler.shorts.len(), 1);
    let tdt = handler.shorts[0].table.valid_ref::<Tdt>().unwrap();
    assert_eq!(tdt.utc_time.format("%Y-%m-%d %H:%M:%S").to_string(), "1993-10-13 12:45:00");
}
