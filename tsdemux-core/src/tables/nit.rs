//! NIT (Network Information Table).
//!
//! The NIT describes the network and lists the transport streams it
//! carries, each with its delivery system descriptors.

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::context::Standards;
use crate::descriptor_list::DescriptorList;
use crate::descriptors::NetworkNameDescriptor;
use crate::entry_list::{Entry, EntryList};
use crate::error::TreeError;
use crate::record::{Record, Table, TreeContext};
use crate::registry::Registry;
use crate::section::Section;
use crate::table::BinaryTable;
use crate::table_id;
use crate::tree::Element;

/// Transport stream identification within a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportStreamId {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
}

/// A transport stream entry in the NIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NitTransport {
    /// Transport descriptors.
    pub descs: DescriptorList,
}

impl Entry<TransportStreamId> for NitTransport {
    fn write_entry(&self, ts: &TransportStreamId, w: &mut PsiWriter) {
        w.put_u16(ts.transport_stream_id);
        w.put_u16(ts.original_network_id);
        self.descs.write_with_length(w);
    }
}

/// Network information table, actual (0x40) or other (0x41) network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nit {
    pub version: u8,
    pub is_current: bool,
    /// Actual network (table id 0x40) or other network (0x41).
    pub actual: bool,
    pub network_id: u16,
    /// Network descriptors.
    pub descs: DescriptorList,
    pub transports: EntryList<TransportStreamId, NitTransport>,
}

impl Default for Nit {
    fn default() -> Self {
        Nit {
            version: 0,
            is_current: true,
            actual: true,
            network_id: 0,
            descs: DescriptorList::new(table_id::NIT_ACTUAL),
            transports: EntryList::new(),
        }
    }
}

impl Nit {
    fn list(&self) -> DescriptorList {
        DescriptorList::new(self.table_id())
    }

    /// Network name from the network name descriptor.
    pub fn network_name(&self, registry: &Registry, standards: Standards) -> Option<String> {
        self.descs
            .find::<NetworkNameDescriptor>(registry, standards)
            .map(|d| d.name.to_string_lossy())
    }

    /// Transport stream ids in table order.
    pub fn transport_stream_ids(&self) -> Vec<TransportStreamId> {
        self.transports.keys().copied().collect()
    }
}

impl Record for Nit {
    fn xml_name(&self) -> &'static str {
        "NIT"
    }

    fn clear(&mut self) {
        self.network_id = 0;
        self.descs = self.list();
        self.transports.clear();
    }

    fn build_tree(&self, element: &mut Element, ctx: &TreeContext<'_>) {
        element
            .set_hex("network_id", self.network_id, 4)
            .set_bool("actual", self.actual);
        self.descs.build_tree(element, ctx);
        for (ts, transport) in self.transports.iter() {
            let child = element.add_element("transport_stream");
            child
                .set_hex("transport_stream_id", ts.transport_stream_id, 4)
                .set_hex("original_network_id", ts.original_network_id, 4);
            transport.descs.build_tree(child, ctx);
        }
    }

    fn analyze_tree(&mut self, element: &Element, ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.actual = element.get_bool_or("actual", true)?;
        self.network_id = element.get_int("network_id")?;
        self.descs = self.list();
        self.descs.analyze_tree(element, ctx, &["transport_stream"])?;
        for child in element.children_named("transport_stream") {
            let ts = TransportStreamId {
                transport_stream_id: child.get_int("transport_stream_id")?,
                original_network_id: child.get_int("original_network_id")?,
            };
            let mut transport = NitTransport { descs: self.list() };
            transport.descs.analyze_tree(child, ctx, &[])?;
            self.transports.insert(ts, transport);
        }
        Ok(())
    }
}

impl Table for Nit {
    fn table_id(&self) -> u8 {
        if self.actual {
            table_id::NIT_ACTUAL
        } else {
            table_id::NIT_OTHER
        }
    }

    fn table_id_extension(&self) -> u16 {
        self.network_id
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn is_current(&self) -> bool {
        self.is_current
    }

    fn set_version(&mut self, version: u8, is_current: bool) {
        self.version = version;
        self.is_current = is_current;
    }

    fn set_identity(&mut self, table: &BinaryTable) -> bool {
        match table.table_id() {
            table_id::NIT_ACTUAL => self.actual = true,
            table_id::NIT_OTHER => self.actual = false,
            _ => return false,
        }
        self.descs = self.list();
        !table.is_short()
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, section: &Section) {
        self.network_id = section.table_id_extension();
        self.descs.read_with_length(r);

        let mut ts_loop = r.read_length_prefixed(12);
        while ts_loop.can_read() {
            let ts = TransportStreamId {
                transport_stream_id: ts_loop.read_u16(),
                original_network_id: ts_loop.read_u16(),
            };
            let mut transport = NitTransport { descs: self.list() };
            transport.descs.read_with_length(&mut ts_loop);
            if !ts_loop.error() && !self.transports.insert_new(ts, transport) {
                ts_loop.set_error();
            }
        }
        if ts_loop.error() {
            r.set_error();
        }
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        self.transports.serialize_into(out, |w, first| {
            if first {
                self.descs.write_with_length(w);
            } else {
                self.list().write_with_length(w);
            }
            Some(w.start_length(12))
        });
    }
}
