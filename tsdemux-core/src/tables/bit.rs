//! BIT (Broadcaster Information Table, ISDB).

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::descriptor_list::DescriptorList;
use crate::entry_list::{Entry, EntryList};
use crate::error::TreeError;
use crate::record::{Record, Table, TreeContext};
use crate::section::Section;
use crate::table_id;
use crate::tree::Element;

/// Descriptors of one broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcaster {
    pub descs: DescriptorList,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Broadcaster {
            descs: DescriptorList::new(table_id::BIT),
        }
    }
}

impl Entry<u8> for Broadcaster {
    fn write_entry(&self, broadcaster_id: &u8, w: &mut PsiWriter) {
        w.put_u8(*broadcaster_id);
        self.descs.write_with_length(w);
    }
}

/// Broadcaster information table, keyed by original network id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bit {
    pub version: u8,
    pub is_current: bool,
    pub original_network_id: u16,
    /// Presenting programs per broadcaster name is appropriate.
    pub broadcast_view_propriety: bool,
    /// Top-level descriptors.
    pub descs: DescriptorList,
    pub broadcasters: EntryList<u8, Broadcaster>,
}

impl Default for Bit {
    fn default() -> Self {
        Bit {
            version: 0,
            is_current: true,
            original_network_id: 0,
            broadcast_view_propriety: false,
            descs: DescriptorList::new(table_id::BIT),
            broadcasters: EntryList::new(),
        }
    }
}

impl Record for Bit {
    fn xml_name(&self) -> &'static str {
        "BIT"
    }

    fn clear(&mut self) {
        *self = Bit::default();
    }

    fn build_tree(&self, element: &mut Element, ctx: &TreeContext<'_>) {
        element
            .set_hex("original_network_id", self.original_network_id, 4)
            .set_bool("broadcast_view_propriety", self.broadcast_view_propriety);
        self.descs.build_tree(element, ctx);
        for (id, broadcaster) in self.broadcasters.iter() {
            let child = element.add_element("broadcaster");
            child.set_hex("broadcaster_id", *id, 2);
            broadcaster.descs.build_tree(child, ctx);
        }
    }

    fn analyze_tree(&mut self, element: &Element, ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.original_network_id = element.get_int("original_network_id")?;
        self.broadcast_view_propriety = element.get_bool_or("broadcast_view_propriety", false)?;
        self.descs.analyze_tree(element, ctx, &["broadcaster"])?;
        for child in element.children_named("broadcaster") {
            let mut broadcaster = Broadcaster::default();
            broadcaster.descs.analyze_tree(child, ctx, &[])?;
            self.broadcasters.insert(child.get_int("broadcaster_id")?, broadcaster);
        }
        Ok(())
    }
}

impl Table for Bit {
    fn table_id(&self) -> u8 {
        table_id::BIT
    }

    fn table_id_extension(&self) -> u16 {
        self.original_network_id
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

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, section: &Section) {
        self.original_network_id = section.table_id_extension();
        r.skip_bits(3);
        self.broadcast_view_propriety = r.read_bool();
        let mut first = r.read_length_prefixed(12);
        self.descs.read(&mut first);
        if first.error() {
            r.set_error();
        }

        while r.can_read() {
            let id = r.read_u8();
            let mut broadcaster = Broadcaster::default();
            broadcaster.descs.read_with_length(r);
            if !r.error() && !self.broadcasters.insert_new(id, broadcaster) {
                r.set_error();
            }
        }
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        self.broadcasters.serialize_into(out, |w, first| {
            let upper = 0b1110 | self.broadcast_view_propriety as u16;
            let mark = w.start_length_with(upper, 12);
            if first {
                self.descs.write(w);
            }
            w.end_length(mark);
            None
        });
    }
}
