//! Descriptors defined by ISO/IEC 13818-1.

use crate::buffer::{PsiReader, PsiWriter};
use crate::descriptor_tag;
use crate::error::TreeError;
use crate::record::{Descriptor, Record, TreeContext};
use crate::tree::Element;

/// Conditional access descriptor (0x09).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    /// PID of the ECM (in a PMT) or EMM (in the CAT) stream.
    pub ca_pid: u16,
    pub private_data: Vec<u8>,
}

impl Default for CaDescriptor {
    fn default() -> Self {
        CaDescriptor {
            ca_system_id: 0,
            ca_pid: crate::pid::NULL,
            private_data: Vec::new(),
        }
    }
}

impl Record for CaDescriptor {
    fn xml_name(&self) -> &'static str {
        "CA_descriptor"
    }

    fn clear(&mut self) {
        *self = CaDescriptor::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_hex("CA_system_id", self.ca_system_id, 4)
            .set_hex("CA_PID", self.ca_pid, 4);
        if !self.private_data.is_empty() {
            element.add_element("private_data").set_hex_text(&self.private_data);
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.ca_system_id = element.get_int("CA_system_id")?;
        self.ca_pid = element.get_int("CA_PID")?;
        if self.ca_pid > 0x1FFF {
            return Err(TreeError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "CA_PID".to_string(),
                value: self.ca_pid.to_string(),
            });
        }
        if let Some(data) = element.child("private_data") {
            self.private_data = data.hex_text()?;
        }
        Ok(())
    }
}

impl Descriptor for CaDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::CA
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.ca_system_id = r.read_u16();
        r.skip_bits(3);
        self.ca_pid = r.read_bits(13) as u16;
        self.private_data = r.read_remaining().to_vec();
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_u16(self.ca_system_id);
        w.put_reserved(3);
        w.put_bits(self.ca_pid as u64, 13);
        w.put_bytes(&self.private_data);
    }
}
