//! SDT (Service Description Table).

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::context::Standards;
use crate::descriptor_list::DescriptorList;
use crate::descriptors::ServiceDescriptor;
use crate::entry_list::{Entry, EntryList};
use crate::error::TreeError;
use crate::record::{Record, Table, TreeContext};
use crate::registry::Registry;
use crate::section::Section;
use crate::table::BinaryTable;
use crate::table_id;
use crate::tree::Element;

/// A service entry in the SDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdtService {
    /// EIT schedule flag.
    pub eit_schedule: bool,
    /// EIT present/following flag.
    pub eit_present_following: bool,
    /// Running status (3 bits).
    pub running_status: u8,
    /// Free CA mode.
    pub free_ca_mode: bool,
    /// Service descriptors.
    pub descs: DescriptorList,
}

impl SdtService {
    pub fn new(table_id: u8) -> Self {
        SdtService {
            eit_schedule: false,
            eit_present_following: false,
            running_status: 0,
            free_ca_mode: false,
            descs: DescriptorList::new(table_id),
        }
    }

    /// Service descriptor of this service, if any.
    pub fn service_descriptor(&self, registry: &Registry, standards: Standards) -> Option<ServiceDescriptor> {
        self.descs.find::<ServiceDescriptor>(registry, standards)
    }
}

impl Entry<u16> for SdtService {
    fn write_entry(&self, service_id: &u16, w: &mut PsiWriter) {
        w.put_u16(*service_id);
        w.put_reserved(6);
        w.put_bool(self.eit_schedule);
        w.put_bool(self.eit_present_following);
        let upper = ((self.running_status as u16 & 0x07) << 1) | self.free_ca_mode as u16;
        let mark = w.start_length_with(upper, 12);
        self.descs.write(w);
        w.end_length(mark);
    }
}

/// Service description table, actual (0x42) or other (0x46) transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdt {
    pub version: u8,
    pub is_current: bool,
    pub actual: bool,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: EntryList<u16, SdtService>,
}

impl Default for Sdt {
    fn default() -> Self {
        Sdt {
            version: 0,
            is_current: true,
            actual: true,
            transport_stream_id: 0,
            original_network_id: 0,
            services: EntryList::new(),
        }
    }
}

impl Sdt {
    /// Service name from the service descriptor of a service.
    pub fn service_name(&self, service_id: u16, registry: &Registry, standards: Standards) -> Option<String> {
        self.services
            .get(&service_id)?
            .service_descriptor(registry, standards)
            .map(|d| d.service_name.to_string_lossy())
    }
}

impl Record for Sdt {
    fn xml_name(&self) -> &'static str {
        "SDT"
    }

    fn clear(&mut self) {
        self.transport_stream_id = 0;
        self.original_network_id = 0;
        self.services.clear();
    }

    fn build_tree(&self, element: &mut Element, ctx: &TreeContext<'_>) {
        element
            .set_hex("transport_stream_id", self.transport_stream_id, 4)
            .set_hex("original_network_id", self.original_network_id, 4)
            .set_bool("actual", self.actual);
        for (service_id, service) in self.services.iter() {
            let child = element.add_element("service");
            child
                .set_hex("service_id", *service_id, 4)
                .set_bool("EIT_schedule", service.eit_schedule)
                .set_bool("EIT_present_following", service.eit_present_following)
                .set_int("running_status", service.running_status)
                .set_bool("CA_mode", service.free_ca_mode);
            service.descs.build_tree(child, ctx);
        }
    }

    fn analyze_tree(&mut self, element: &Element, ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.actual = element.get_bool_or("actual", true)?;
        self.transport_stream_id = element.get_int("transport_stream_id")?;
        self.original_network_id = element.get_int("original_network_id")?;
        for child in element.children_named("service") {
            let mut service = SdtService::new(self.table_id());
            service.eit_schedule = child.get_bool_or("EIT_schedule", false)?;
            service.eit_present_following = child.get_bool_or("EIT_present_following", false)?;
            service.running_status = child.get_int_or("running_status", 0)?;
            if service.running_status > 7 {
                return Err(TreeError::InvalidAttribute {
                    element: child.name.clone(),
                    attribute: "running_status".to_string(),
                    value: service.running_status.to_string(),
                });
            }
            service.free_ca_mode = child.get_bool_or("CA_mode", false)?;
            service.descs.analyze_tree(child, ctx, &[])?;
            self.services.insert(child.get_int("service_id")?, service);
        }
        Ok(())
    }
}

impl Table for Sdt {
    fn table_id(&self) -> u8 {
        if self.actual {
            table_id::SDT_ACTUAL
        } else {
            table_id::SDT_OTHER
        }
    }

    fn table_id_extension(&self) -> u16 {
        self.transport_stream_id
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
            table_id::SDT_ACTUAL => self.actual = true,
            table_id::SDT_OTHER => self.actual = false,
            _ => return false,
        }
        !table.is_short()
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, section: &Section) {
        self.transport_stream_id = section.table_id_extension();
        self.original_network_id = r.read_u16();
        r.skip_bits(8);

        while r.can_read() {
            let service_id = r.read_u16();
            let mut service = SdtService::new(self.table_id());
            r.skip_bits(6);
            service.eit_schedule = r.read_bool();
            service.eit_present_following = r.read_bool();
            service.running_status = r.read_bits(3) as u8;
            service.free_ca_mode = r.read_bool();
            let mut descs = r.read_length_prefixed(12);
            service.descs.read(&mut descs);
            if descs.error() {
                r.set_error();
            }
            if !r.error() && !self.services.insert_new(service_id, service) {
                r.set_error();
            }
        }
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        self.services.serialize_into(out, |w, _| {
            w.put_u16(self.original_network_id);
            w.put_reserved(8);
            None
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::PsiHeader;

    fn sdt_payload() -> Vec<u8> {
        vec![
            // original_network_id, reserved
            0x7F, 0xE0, 0xFF,
            // service 0x0400: EIT p/f, running, 1 descriptor
            0x04, 0x00, 0xFD, 0x80, 0x09,
            0x48, 0x07, 0x01, 0x02, b'N', b'H', 0x02, b'T', b'V',
        ]
    }

    #[test]
    fn test_parse_sdt() {
        let header = PsiHeader::long(table_id::SDT_ACTUAL, true, 0x7FE1, 0, true, 0, 0);
        let binary =
            BinaryTable::from_sections([Section::new_long(header, &sdt_payload()).unwrap()])
                .unwrap();

        let mut sdt = Sdt::default();
        assert!(sdt.decode(&binary));
        assert!(sdt.actual);
        assert_eq!(sdt.transport_stream_id, 0x7FE1);
        assert_eq!(sdt.original_network_id, 0x7FE0);

        let service = sdt.services.get(&0x0400).unwrap();
        assert!(!service.eit_schedule);
        assert!(service.eit_present_following);
        assert_eq!(service.running_status, 4);
        assert!(!service.free_ca_mode);

        let registry = Registry::with_default_catalog();
        assert_eq!(
            sdt.service_name(0x0400, &registry, Standards::ISDB).as_deref(),
            Some("TV")
        );
        assert_eq!(sdt.service_name(0x0401, &registry, Standards::ISDB), None);

        assert_eq!(sdt.encode().unwrap(), binary);
    }
}
