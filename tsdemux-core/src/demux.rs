//! Section demultiplexer.
//!
//! [`SectionDemux`] routes the packets of the PIDs it watches to one
//! [`ChannelReassembler`] each, validates the extracted sections, collects
//! long sections into tables and reports everything to a [`DemuxHandler`].
//!
//! Long-form sections are collected in slots keyed by PID, table id, table id
//! extension and current/next indicator. A slot holds at most one table in
//! progress: a section with another version or another section count
//! discards what was collected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::context::{ContextProvider, Standards};
use crate::error::SectionError;
use crate::packet::TsPacket;
use crate::packet::TsPacketIterator;
use crate::reassembler::{ChannelReassembler, ReassemblyEvent};
use crate::record::{Decoded, Table};
use crate::registry::Registry;
use crate::section::Section;
use crate::table::{BinaryTable, TableKey};

/// Demultiplexer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Reject long sections with a wrong CRC32.
    pub check_crc: bool,
    /// Report a completed table again each time it is repeated on air.
    pub notify_repeats: bool,
    /// Drop tables with the current/next indicator cleared.
    pub ignore_next: bool,
    /// Standards used to interpret tables when no context provider is set.
    pub standards: Standards,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            check_crc: true,
            notify_repeats: false,
            ignore_next: false,
            standards: Standards::NONE,
        }
    }
}

/// Counters since creation or the last [`SectionDemux::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemuxStatus {
    /// Packets submitted, watched or not.
    pub packets: u64,
    /// Valid sections extracted.
    pub sections: u64,
    /// Sections rejected by validation or reassembly.
    pub invalid_sections: u64,
    /// Continuity counter errors.
    pub discontinuities: u64,
    /// Complete long tables reported.
    pub tables: u64,
    /// Short sections reported.
    pub short_sections: u64,
    /// Sections of an already reported table version that were skipped.
    pub repeated_sections: u64,
}

/// A complete long table, with its binary form and its typed record.
#[derive(Debug)]
pub struct DemuxedTable {
    pub binary: BinaryTable,
    pub table: Decoded<dyn Table>,
}

impl DemuxedTable {
    pub fn pid(&self) -> u16 {
        self.binary.source_pid()
    }
}

/// A short section, with the typed record of its one-section table.
#[derive(Debug)]
pub struct DemuxedSection {
    pub section: Section,
    pub table: Decoded<dyn Table>,
}

/// Receives the demultiplexer output. Every method has an empty default.
///
/// Callbacks run synchronously from [`SectionDemux::submit`]; the handler
/// cannot reach the demux while it runs.
pub trait DemuxHandler {
    /// A long table is complete.
    fn handle_table(&mut self, _table: DemuxedTable) {}

    /// A valid short section was received.
    fn handle_short_section(&mut self, _section: DemuxedSection) {}

    /// Any valid section, before table processing.
    fn handle_section(&mut self, _section: &Section) {}

    /// A section failed validation or could not be reassembled.
    fn handle_invalid_section(&mut self, _section: Section, _error: SectionError) {}

    /// A continuity error was detected on a PID.
    fn handle_discontinuity(&mut self, _pid: u16) {}
}

impl DemuxHandler for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    pid: u16,
    key: TableKey,
    current: bool,
}

#[derive(Debug, Default)]
struct TableSlot {
    /// Table in progress.
    building: BinaryTable,
    /// Version of the last reported table.
    completed: Option<u8>,
}

/// Section demultiplexer for a set of PIDs.
pub struct SectionDemux<H: DemuxHandler> {
    registry: Arc<Registry>,
    config: DemuxConfig,
    context: Option<Box<dyn ContextProvider>>,
    handler: H,
    pids: HashSet<u16>,
    reassemblers: HashMap<u16, ChannelReassembler>,
    slots: HashMap<SlotKey, TableSlot>,
    status: DemuxStatus,
    /// Partial packet left over by `feed`.
    remainder: Vec<u8>,
    events: Vec<ReassemblyEvent>,
}

impl<H: DemuxHandler> SectionDemux<H> {
    /// Create a demux watching no PID.
    pub fn new(registry: Arc<Registry>, config: DemuxConfig, handler: H) -> Self {
        Self {
            registry,
            config,
            context: None,
            handler,
            pids: HashSet::new(),
            reassemblers: HashMap::new(),
            slots: HashMap::new(),
            status: DemuxStatus::default(),
            remainder: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Take the standards from a provider instead of the configuration.
    pub fn with_context(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context = Some(Box::new(provider));
        self
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Standards currently used to interpret tables.
    pub fn standards(&self) -> Standards {
        match &self.context {
            Some(provider) => provider.standards(),
            None => self.config.standards,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn status(&self) -> DemuxStatus {
        self.status
    }

    /// Start watching a PID.
    pub fn add_pid(&mut self, pid: u16) {
        if self.pids.insert(pid) {
            debug!("demux: watching PID 0x{:04X}", pid);
        }
    }

    /// Stop watching a PID, dropping its state.
    pub fn remove_pid(&mut self, pid: u16) {
        if self.pids.remove(&pid) {
            debug!("demux: no longer watching PID 0x{:04X}", pid);
        }
        self.reset_pid(pid);
    }

    pub fn has_pid(&self, pid: u16) -> bool {
        self.pids.contains(&pid)
    }

    /// Watched PIDs, in no particular order.
    pub fn pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.pids.iter().copied()
    }

    /// Forget everything collected. Watched PIDs are kept.
    pub fn reset(&mut self) {
        self.reassemblers.clear();
        self.slots.clear();
        self.remainder.clear();
        self.status = DemuxStatus::default();
    }

    /// Forget everything collected on one PID, so that its tables are
    /// reported again.
    pub fn reset_pid(&mut self, pid: u16) {
        self.reassemblers.remove(&pid);
        self.slots.retain(|k, _| k.pid != pid);
    }

    /// Feed raw transport stream bytes. Packets may be split across calls;
    /// the stream is resynchronized on the sync byte.
    pub fn feed(&mut self, data: &[u8]) {
        let mut buffer = std::mem::take(&mut self.remainder);
        buffer.extend_from_slice(data);

        let consumed = {
            let mut iter = TsPacketIterator::new(&buffer);
            for packet in iter.by_ref() {
                self.submit(&packet);
            }
            iter.consumed()
        };

        buffer.drain(..consumed.min(buffer.len()));
        self.remainder = buffer;
    }

    /// Process one packet.
    pub fn submit(&mut self, packet: &TsPacket<'_>) {
        self.status.packets += 1;
        let pid = packet.pid();
        if !self.pids.contains(&pid) {
            return;
        }

        let mut events = std::mem::take(&mut self.events);
        self.reassemblers
            .entry(pid)
            .or_insert_with(|| ChannelReassembler::new(pid))
            .feed(packet, &mut events);

        for event in events.drain(..) {
            match event {
                ReassemblyEvent::Section(section) => self.process_section(section),
                ReassemblyEvent::Malformed { section, error } => {
                    debug!("PID 0x{:04X}: malformed section: {}", pid, error);
                    self.status.invalid_sections += 1;
                    self.handler.handle_invalid_section(section, error);
                }
                ReassemblyEvent::Discontinuity => {
                    self.status.discontinuities += 1;
                    self.handler.handle_discontinuity(pid);
                }
            }
        }
        self.events = events;
    }

    fn process_section(&mut self, section: Section) {
        if let Err(e) = section.validate(self.config.check_crc) {
            debug!(
                "PID 0x{:04X}: invalid section, table id 0x{:02X}: {}",
                section.source_pid(),
                section.table_id(),
                e
            );
            self.status.invalid_sections += 1;
            self.handler.handle_invalid_section(section, e);
            return;
        }

        trace!(
            "PID 0x{:04X}: section table id 0x{:02X}, {} bytes",
            section.source_pid(),
            section.table_id(),
            section.size()
        );
        self.status.sections += 1;
        self.handler.handle_section(&section);

        if section.is_short() {
            self.process_short_section(section);
        } else {
            self.process_long_section(section);
        }
    }

    fn process_short_section(&mut self, section: Section) {
        let binary = match BinaryTable::from_sections([section.clone()]) {
            Ok(binary) => binary,
            Err(e) => {
                debug!("PID 0x{:04X}: short section rejected: {}", section.source_pid(), e);
                return;
            }
        };
        let table = self.registry.decode_table(&binary, self.standards());
        self.status.short_sections += 1;
        self.handler.handle_short_section(DemuxedSection { section, table });
    }

    fn process_long_section(&mut self, section: Section) {
        if self.config.ignore_next && !section.is_current() {
            return;
        }

        let pid = section.source_pid();
        let version = section.version();
        let slot_key = SlotKey {
            pid,
            key: TableKey::of(&section),
            current: section.is_current(),
        };
        let slot = self.slots.entry(slot_key).or_default();

        if slot.completed == Some(version) && !self.config.notify_repeats {
            self.status.repeated_sections += 1;
            return;
        }

        let count = section.last_section_number() as usize + 1;
        if !slot.building.is_empty()
            && (slot.building.version() != version || slot.building.section_count() != count)
        {
            debug!(
                "PID 0x{:04X}: table 0x{:02X}/0x{:04X} version {} superseded by version {}",
                pid,
                slot_key.key.table_id,
                slot_key.key.table_id_extension,
                slot.building.version(),
                version
            );
            slot.building = BinaryTable::new();
        }

        if let Err(e) = slot.building.add_section(section) {
            debug!("PID 0x{:04X}: section dropped: {}", pid, e);
            return;
        }
        if !slot.building.is_complete() {
            return;
        }

        let binary = std::mem::take(&mut slot.building);
        slot.completed = Some(version);

        let table = self.registry.decode_table(&binary, self.standards());
        debug!(
            "PID 0x{:04X}: table {} (0x{:02X}) version {} complete, {} section(s), valid={}",
            pid,
            table.record.xml_name(),
            binary.table_id(),
            version,
            binary.section_count(),
            table.valid
        );
        self.status.tables += 1;
        self.handler.handle_table(DemuxedTable { binary, table });
    }
}

impl<H: DemuxHandler> std::fmt::Debug for SectionDemux<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionDemux")
            .field("config", &self.config)
            .field("pids", &self.pids)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::Packetizer;
    use crate::section::PsiHeader;
    use crate::tables::Pat;

    #[derive(Default)]
    struct Recorder {
        tables: Vec<DemuxedTable>,
        shorts: Vec<DemuxedSection>,
        invalid: Vec<SectionError>,
        discontinuities: Vec<u16>,
        raw_sections: usize,
    }

    impl DemuxHandler for Recorder {
        fn handle_table(&mut self, table: DemuxedTable) {
            self.tables.push(table);
        }

        fn handle_short_section(&mut self, section: DemuxedSection) {
            self.shorts.push(section);
        }

        fn handle_section(&mut self, _section: &Section) {
            self.raw_sections += 1;
        }

        fn handle_invalid_section(&mut self, _section: Section, error: SectionError) {
            self.invalid.push(error);
        }

        fn handle_discontinuity(&mut self, pid: u16) {
            self.discontinuities.push(pid);
        }
    }

    struct Harness {
        demux: SectionDemux<Recorder>,
        packetizer: Packetizer,
    }

    impl Harness {
        fn new(config: DemuxConfig) -> Self {
            let registry = Arc::new(Registry::with_default_catalog());
            let mut demux = SectionDemux::new(registry, config, Recorder::default());
            demux.add_pid(0x0000);
            Harness {
                demux,
                packetizer: Packetizer::new(0x0000),
            }
        }

        fn feed(&mut self, sections: &[Section]) {
            for packet in &self.packetizer.packetize(sections) {
                self.demux.feed(packet);
            }
        }

        fn tables(&self) -> &[DemuxedTable] {
            &self.demux.handler().tables
        }
    }

    fn pat_section(version: u8, number: u8, last: u8) -> Section {
        let header = PsiHeader::long(0x00, false, 0x7FE0, version, true, number, last);
        let payload = [0x04, number, 0xE1, 0xF0];
        Section::new_long(header, &payload).unwrap()
    }

    #[test]
    fn test_single_pat() {
        let mut h = Harness::new(DemuxConfig::default());
        h.feed(&[pat_section(1, 0, 0)]);

        assert_eq!(h.tables().len(), 1);
        assert_eq!(h.demux.handler().raw_sections, 1);
        let pat = h.tables()[0].table.valid_ref::<Pat>().unwrap();
        assert_eq!(pat.transport_stream_id, 0x7FE0);
        assert_eq!(pat.version, 1);
        assert_eq!(pat.pmt_pid(0x0400), Some(0x01F0));
        assert_eq!(h.tables()[0].pid(), 0x0000);
        assert_eq!(h.demux.status().tables, 1);
    }

    #[test]
    fn test_repeats_not_notified() {
        let mut h = Harness::new(DemuxConfig::default());
        let section = pat_section(1, 0, 0);
        h.feed(&[section.clone(), section.clone(), section]);
        assert_eq!(h.tables().len(), 1);
        assert_eq!(h.demux.status().repeated_sections, 2);

        let mut h = Harness::new(DemuxConfig {
            notify_repeats: true,
            ..DemuxConfig::default()
        });
        let section = pat_section(1, 0, 0);
        h.feed(&[section.clone(), section]);
        assert_eq!(h.tables().len(), 2);
    }

    #[test]
    fn test_incomplete_table_not_reported() {
        let mut h = Harness::new(DemuxConfig::default());
        h.feed(&[pat_section(1, 0, 2), pat_section(1, 2, 2)]);
        assert!(h.tables().is_empty());

        h.feed(&[pat_section(1, 1, 2)]);
        assert_eq!(h.tables().len(), 1);
        assert_eq!(h.tables()[0].binary.section_count(), 3);
    }

    #[test]
    fn test_version_change_discards_partial() {
        let mut h = Harness::new(DemuxConfig::default());
        h.feed(&[pat_section(1, 0, 1), pat_section(2, 0, 1)]);
        assert!(h.tables().is_empty());

        // Version 1 was discarded, its second half cannot complete it.
        h.feed(&[pat_section(2, 1, 1)]);
        assert_eq!(h.tables().len(), 1);
        assert_eq!(h.tables()[0].binary.version(), 2);
    }

    #[test]
    fn test_ignore_next() {
        let mut h = Harness::new(DemuxConfig {
            ignore_next: true,
            ..DemuxConfig::default()
        });
        let header = PsiHeader::long(0x00, false, 1, 3, false, 0, 0);
        let next = Section::new_long(header, &[0x04, 0x00, 0xE1, 0xF0]).unwrap();
        h.feed(&[next]);
        assert!(h.tables().is_empty());
        assert_eq!(h.demux.handler().raw_sections, 1);
    }

    #[test]
    fn test_unwatched_pid_ignored() {
        let mut h = Harness::new(DemuxConfig::default());
        h.demux.remove_pid(0x0000);
        assert!(!h.demux.has_pid(0x0000));
        h.feed(&[pat_section(1, 0, 0)]);
        assert!(h.tables().is_empty());
        assert!(h.demux.status().packets > 0);
    }

    #[test]
    fn test_feed_split_bytes() {
        let mut h = Harness::new(DemuxConfig::default());
        let packets = h.packetizer.packetize(&[pat_section(5, 0, 0)]);
        let stream: Vec<u8> = packets.iter().flatten().copied().collect();
        let (head, tail) = stream.split_at(100);
        h.demux.feed(head);
        assert!(h.tables().is_empty());
        h.demux.feed(tail);
        assert_eq!(h.tables().len(), 1);
    }

    #[test]
    fn test_reset_pid_renotifies() {
        let mut h = Harness::new(DemuxConfig::default());
        h.feed(&[pat_section(1, 0, 0)]);
        h.demux.reset_pid(0x0000);
        h.feed(&[pat_section(1, 0, 0)]);
        assert_eq!(h.tables().len(), 2);
    }

    #[test]
    fn test_bad_crc_reported() {
        let mut h = Harness::new(DemuxConfig::default());
        let mut bytes = pat_section(1, 0, 0).as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let corrupted = Section::from_captured(bytes.into(), 0x0000);
        h.feed(&[corrupted]);
        assert!(h.tables().is_empty());
        assert_eq!(h.demux.handler().invalid.len(), 1);
        assert_eq!(h.demux.status().invalid_sections, 1);
    }

    #[test]
    fn test_short_section() {
        let mut h = Harness::new(DemuxConfig {
            standards: Standards::DVB,
            ..DemuxConfig::default()
        });
        h.demux.add_pid(0x0014);
        let tdt = Section::new_short(0x70, true, &[0xC0, 0x79, 0x12, 0x45, 0x00]).unwrap();
        let packets = Packetizer::new(0x0014).packetize([&tdt]);
        h.demux.feed(&packets[0]);

        let shorts = &h.demux.handler().shorts;
        assert_eq!(shorts.len(), 1);
        assert_eq!(shorts[0].section.source_pid(), 0x0014);
        assert!(shorts[0].table.valid_ref::<crate::tables::Tdt>().is_some());
        assert!(h.tables().is_empty());
    }

    #[test]
    fn test_discontinuity_reported() {
        let mut h = Harness::new(DemuxConfig::default());
        let packets = h.packetizer.packetize(&[pat_section(1, 0, 0), pat_section(1, 0, 0)]);
        let mut gap = h.packetizer.packetize(&[pat_section(2, 0, 0)]);
        h.demux.feed(&packets[0]);
        // Skip one counter value.
        gap[0][3] = (gap[0][3] & 0xF0) | ((gap[0][3] + 1) & 0x0F);
        h.demux.feed(&gap[0]);

        assert_eq!(h.demux.handler().discontinuities, vec![0x0000]);
        assert_eq!(h.demux.status().discontinuities, 1);
    }

    #[test]
    fn test_context_provider() {
        let registry = Arc::new(Registry::with_default_catalog());
        let demux = SectionDemux::new(registry, DemuxConfig::default(), ())
            .with_context(|| Standards::ISDB);
        assert_eq!(demux.standards(), Standards::ISDB);
    }
}
