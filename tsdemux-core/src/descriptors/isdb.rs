//! Descriptors defined by ARIB STD-B10 (ISDB).

use crate::buffer::{PsiReader, PsiWriter};
use crate::descriptor_tag;
use crate::error::TreeError;
use crate::record::{Descriptor, Record, TreeContext};
use crate::text::EncodedText;
use crate::tree::Element;

/// One transmission type of a TS information descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmissionType {
    pub transmission_type_info: u8,
    pub service_ids: Vec<u16>,
}

/// TS information descriptor (0xCD).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsInformationDescriptor {
    /// Remote control key id (channel button number).
    pub remote_control_key_id: u8,
    /// TS name, at most 63 bytes.
    pub ts_name: EncodedText,
    /// At most 3 transmission types.
    pub transmission_types: Vec<TransmissionType>,
}

impl Record for TsInformationDescriptor {
    fn xml_name(&self) -> &'static str {
        "TS_information_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_int("remote_control_key_id", self.remote_control_key_id)
            .set_text_attr("ts_name", &self.ts_name);
        for tt in &self.transmission_types {
            let child = element.add_element("transmission_type");
            child.set_hex("transmission_type_info", tt.transmission_type_info, 2);
            for id in &tt.service_ids {
                child.add_element("service").set_hex("id", *id, 4);
            }
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.remote_control_key_id = element.get_int("remote_control_key_id")?;
        self.ts_name = element.get_text_attr("ts_name")?;
        if self.ts_name.len() > 0x3F {
            return Err(TreeError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "ts_name".to_string(),
                value: self.ts_name.to_string_lossy(),
            });
        }
        for child in element.children_named("transmission_type") {
            let mut tt = TransmissionType {
                transmission_type_info: child.get_int("transmission_type_info")?,
                service_ids: Vec::new(),
            };
            for service in child.children_named("service") {
                tt.service_ids.push(service.get_int("id")?);
            }
            self.transmission_types.push(tt);
        }
        if self.transmission_types.len() > 3 {
            return Err(TreeError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "transmission_type".to_string(),
                value: self.transmission_types.len().to_string(),
            });
        }
        Ok(())
    }
}

impl Descriptor for TsInformationDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::TS_INFORMATION
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.remote_control_key_id = r.read_u8();
        let name_len = r.read_bits(6) as usize;
        let count = r.read_bits(2) as usize;
        self.ts_name = EncodedText::new(r.read_slice(name_len));
        for _ in 0..count {
            let transmission_type_info = r.read_u8();
            let services = r.read_u8() as usize;
            let mut tt = TransmissionType {
                transmission_type_info,
                service_ids: Vec::with_capacity(services),
            };
            for _ in 0..services {
                tt.service_ids.push(r.read_u16());
            }
            if r.error() {
                return;
            }
            self.transmission_types.push(tt);
        }
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_u8(self.remote_control_key_id);
        let name = self.ts_name.as_bytes();
        let name = &name[..name.len().min(0x3F)];
        let count = self.transmission_types.len().min(3);
        w.put_bits(name.len() as u64, 6);
        w.put_bits(count as u64, 2);
        w.put_bytes(name);
        for tt in &self.transmission_types[..count] {
            w.put_u8(tt.transmission_type_info);
            w.put_u8(tt.service_ids.len() as u8);
            for id in &tt.service_ids {
                w.put_u16(*id);
            }
        }
    }
}

/// ISDB-T terrestrial delivery system descriptor (0xFA).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerrestrialDeliveryDescriptor {
    pub area_code: u16,
    pub guard_interval: u8,
    pub transmission_mode: u8,
    /// Center frequencies in 1/7 MHz units.
    pub frequencies: Vec<u16>,
}

impl TerrestrialDeliveryDescriptor {
    /// Convert a raw frequency value into Hz.
    pub fn frequency_hz(raw: u16) -> u64 {
        raw as u64 * 1_000_000 / 7
    }

    pub fn guard_interval_name(&self) -> &'static str {
        match self.guard_interval {
            0 => "1/32",
            1 => "1/16",
            2 => "1/8",
            _ => "1/4",
        }
    }
}

impl Record for TerrestrialDeliveryDescriptor {
    fn xml_name(&self) -> &'static str {
        "ISDB_terrestrial_delivery_system_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_hex("area_code", self.area_code, 3)
            .set_int("guard_interval", self.guard_interval)
            .set_int("transmission_mode", self.transmission_mode);
        for freq in &self.frequencies {
            element
                .add_element("frequency")
                .set_int("value", Self::frequency_hz(*freq));
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.area_code = element.get_int("area_code")?;
        self.guard_interval = element.get_int("guard_interval")?;
        self.transmission_mode = element.get_int("transmission_mode")?;
        for (name, value, max) in [
            ("area_code", self.area_code as u64, 0x0FFF),
            ("guard_interval", self.guard_interval as u64, 3),
            ("transmission_mode", self.transmission_mode as u64, 3),
        ] {
            if value > max {
                return Err(TreeError::InvalidAttribute {
                    element: element.name.clone(),
                    attribute: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
        for child in element.children_named("frequency") {
            let hz: u64 = child.get_int("value")?;
            // Round to the nearest 1/7 MHz step.
            let raw = (hz * 7 + 500_000) / 1_000_000;
            let raw = u16::try_from(raw).map_err(|_| TreeError::InvalidAttribute {
                element: child.name.clone(),
                attribute: "value".to_string(),
                value: hz.to_string(),
            })?;
            self.frequencies.push(raw);
        }
        Ok(())
    }
}

impl Descriptor for TerrestrialDeliveryDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::TERRESTRIAL_DELIVERY
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.area_code = r.read_bits(12) as u16;
        self.guard_interval = r.read_bits(2) as u8;
        self.transmission_mode = r.read_bits(2) as u8;
        while r.can_read() {
            let freq = r.read_u16();
            if !r.error() {
                self.frequencies.push(freq);
            }
        }
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_bits(self.area_code as u64, 12);
        w.put_bits(self.guard_interval as u64, 2);
        w.put_bits(self.transmission_mode as u64, 2);
        for freq in &self.frequencies {
            w.put_u16(*freq);
        }
    }
}
