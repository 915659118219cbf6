//! MPEG transport stream section demultiplexing and PSI/SI table codecs.
//!
//! This crate rebuilds the sections carried by 188-byte transport packets,
//! aggregates them into binary tables, and turns tables and descriptors into
//! typed records through an extensible [`Registry`]. Records convert back to
//! binary form and to a text tree (JSON / XML).
//!
//! # Layers
//!
//! ```text
//! packets --> ChannelReassembler --> Section --> BinaryTable --> Registry --> typed record
//!                 (per PID)              \                                    |
//!                                         +------> DemuxHandler <------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use tsdemux_core::{
//!     pid, DemuxConfig, DemuxHandler, DemuxedTable, Packetizer, Pat, Registry, Section,
//!     SectionDemux, Standards, Table,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Collect(Vec<u16>);
//!
//! impl DemuxHandler for Collect {
//!     fn handle_table(&mut self, table: DemuxedTable) {
//!         if let Some(pat) = table.table.valid_ref::<Pat>() {
//!             self.0.push(pat.transport_stream_id);
//!         }
//!     }
//! }
//!
//! let mut pat = Pat::default();
//! pat.transport_stream_id = 0x7FE0;
//! pat.programs.insert(0x0400, 0x01F0);
//! let binary = pat.encode().unwrap();
//!
//! let sections: Vec<Section> = binary.sections().cloned().collect();
//! let packets = Packetizer::new(pid::PAT).packetize(&sections);
//!
//! let registry = Arc::new(Registry::with_default_catalog());
//! let mut demux = SectionDemux::new(registry, DemuxConfig::default(), Collect::default());
//! demux.add_pid(pid::PAT);
//! for packet in &packets {
//!     demux.feed(packet);
//! }
//! assert_eq!(demux.handler().0, vec![0x7FE0]);
//! ```

pub mod buffer;
pub mod context;
pub mod demux;
pub mod descriptor_list;
pub mod descriptors;
pub mod entry_list;
pub mod error;
pub mod packet;
pub mod packetizer;
pub mod reassembler;
pub mod record;
pub mod registry;
pub mod section;
pub mod section_file;
pub mod table;
pub mod tables;
pub mod text;
pub mod tree;

pub use buffer::{PsiReader, PsiWriter, SectionsBuilder};
pub use context::{ContextProvider, Standards};
pub use demux::{DemuxConfig, DemuxHandler, DemuxStatus, DemuxedSection, DemuxedTable, SectionDemux};
pub use descriptor_list::{DescriptorBlock, DescriptorList};
pub use entry_list::{Entry, EntryList};
pub use error::{EncodeError, Error, PacketError, RegistryError, SectionError, TableError, TreeError};
pub use packet::{TsPacket, TsPacketIterator, TS_PACKET_SIZE};
pub use packetizer::{Packetizer, StuffingPolicy};
pub use reassembler::{ChannelReassembler, ReassemblyEvent};
pub use record::{Decoded, Descriptor, RawDescriptor, RawTable, Record, Table, TreeContext};
pub use registry::{DescriptorContext, Registry, RegistryBuilder};
pub use section::{PsiHeader, Section};
pub use section_file::SectionFile;
pub use table::{BinaryTable, TableKey};
pub use tables::{Bit, Nit, Pat, Pmt, Sdt, Tdt};
pub use text::EncodedText;
pub use tree::Element;

/// Well-known PIDs.
pub mod pid {
    /// Program Association Table PID.
    pub const PAT: u16 = 0x0000;
    /// Conditional Access Table PID.
    pub const CAT: u16 = 0x0001;
    /// Transport Stream Description Table PID.
    pub const TSDT: u16 = 0x0002;
    /// Network Information Table PID.
    pub const NIT: u16 = 0x0010;
    /// Service Description Table PID.
    pub const SDT: u16 = 0x0011;
    /// Event Information Table PID.
    pub const EIT: u16 = 0x0012;
    /// Time and Date Table PID.
    pub const TDT: u16 = 0x0014;
    /// Broadcaster Information Table PID (ISDB).
    pub const BIT: u16 = 0x0024;
    /// Null packet PID (stuffing).
    pub const NULL: u16 = 0x1FFF;
}

/// Table IDs for PSI/SI tables.
pub mod table_id {
    /// Program Association Section.
    pub const PAT: u8 = 0x00;
    /// Conditional Access Section.
    pub const CAT: u8 = 0x01;
    /// Program Map Section.
    pub const PMT: u8 = 0x02;
    /// Network Information Section - actual.
    pub const NIT_ACTUAL: u8 = 0x40;
    /// Network Information Section - other.
    pub const NIT_OTHER: u8 = 0x41;
    /// Service Description Section - actual.
    pub const SDT_ACTUAL: u8 = 0x42;
    /// Service Description Section - other.
    pub const SDT_OTHER: u8 = 0x46;
    /// Time and Date Section.
    pub const TDT: u8 = 0x70;
    /// Broadcaster Information Section (ISDB).
    pub const BIT: u8 = 0xC4;
}

/// Descriptor tags used in PSI/SI tables.
pub mod descriptor_tag {
    /// Conditional access descriptor (0x09).
    pub const CA: u8 = 0x09;
    /// Network name descriptor (0x40).
    pub const NETWORK_NAME: u8 = 0x40;
    /// Service list descriptor (0x41).
    pub const SERVICE_LIST: u8 = 0x41;
    /// Satellite delivery system descriptor.
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    /// Service descriptor (0x48).
    pub const SERVICE: u8 = 0x48;
    /// Stream identifier descriptor (0x52).
    pub const STREAM_IDENTIFIER: u8 = 0x52;
    /// AAC descriptor (0x7C).
    pub const AAC: u8 = 0x7C;
    /// TS information descriptor (0xCD).
    pub const TS_INFORMATION: u8 = 0xCD;
    /// Terrestrial delivery system descriptor (0xFA for ISDB-T).
    pub const TERRESTRIAL_DELIVERY: u8 = 0xFA;
}
