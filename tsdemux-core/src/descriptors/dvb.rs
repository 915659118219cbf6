//! Descriptors defined by ETSI EN 300 468 (DVB SI), also used by ISDB.

use crate::buffer::{PsiReader, PsiWriter};
use crate::descriptor_tag;
use crate::error::TreeError;
use crate::record::{Descriptor, Record, TreeContext};
use crate::text::EncodedText;
use crate::tree::Element;

fn out_of_range(element: &Element, attribute: &str, value: impl ToString) -> TreeError {
    TreeError::InvalidAttribute {
        element: element.name.clone(),
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

/// Network name descriptor (0x40).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkNameDescriptor {
    /// Network name.
    pub name: EncodedText,
}

impl Record for NetworkNameDescriptor {
    fn xml_name(&self) -> &'static str {
        "network_name_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element.set_text_attr("network_name", &self.name);
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.name = element.get_text_attr("network_name")?;
        Ok(())
    }
}

impl Descriptor for NetworkNameDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::NETWORK_NAME
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.name = EncodedText::new(r.read_remaining());
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_bytes(self.name.as_bytes());
    }
}

/// One entry of a service list descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

/// Service list descriptor (0x41).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceListDescriptor {
    pub entries: Vec<ServiceListEntry>,
}

impl Record for ServiceListDescriptor {
    fn xml_name(&self) -> &'static str {
        "service_list_descriptor"
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        for entry in &self.entries {
            element
                .add_element("service")
                .set_hex("service_id", entry.service_id, 4)
                .set_hex("service_type", entry.service_type, 2);
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        for child in element.children_named("service") {
            self.entries.push(ServiceListEntry {
                service_id: child.get_int("service_id")?,
                service_type: child.get_int("service_type")?,
            });
        }
        Ok(())
    }
}

impl Descriptor for ServiceListDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::SERVICE_LIST
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        while r.can_read() {
            let service_id = r.read_u16();
            let service_type = r.read_u8();
            if !r.error() {
                self.entries.push(ServiceListEntry {
                    service_id,
                    service_type,
                });
            }
        }
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        for entry in &self.entries {
            w.put_u16(entry.service_id);
            w.put_u8(entry.service_type);
        }
    }
}

/// Satellite delivery system descriptor (0x43).
///
/// Numeric fields keep their BCD-decoded wire values; see the accessors
/// for physical units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SatelliteDeliveryDescriptor {
    /// Frequency, 8 BCD digits, in 10 kHz units.
    pub frequency: u32,
    /// Orbital position, 4 BCD digits, in 0.1 degree units.
    pub orbital_position: u16,
    /// West/East flag (false = East).
    pub west_east_flag: bool,
    /// Polarization.
    pub polarization: u8,
    /// Roll-off factor (DVB-S2).
    pub roll_off: u8,
    /// Modulation system (0 = DVB-S, 1 = DVB-S2).
    pub modulation_system: u8,
    /// Modulation type.
    pub modulation_type: u8,
    /// Symbol rate, 7 BCD digits, in 100 symbols/s units.
    pub symbol_rate: u32,
    /// FEC inner.
    pub fec_inner: u8,
}

impl SatelliteDeliveryDescriptor {
    /// Frequency in kHz.
    pub fn frequency_khz(&self) -> u64 {
        self.frequency as u64 * 10
    }

    /// Symbol rate in symbols/s.
    pub fn symbol_rate_sps(&self) -> u64 {
        self.symbol_rate as u64 * 100
    }
}

impl Record for SatelliteDeliveryDescriptor {
    fn xml_name(&self) -> &'static str {
        "satellite_delivery_system_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_int("frequency", self.frequency)
            .set_int("orbital_position", self.orbital_position)
            .set_bool("west_east_flag", self.west_east_flag)
            .set_int("polarization", self.polarization)
            .set_int("roll_off", self.roll_off)
            .set_int("modulation_system", self.modulation_system)
            .set_int("modulation_type", self.modulation_type)
            .set_int("symbol_rate", self.symbol_rate)
            .set_int("FEC_inner", self.fec_inner);
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.frequency = element.get_int("frequency")?;
        self.orbital_position = element.get_int("orbital_position")?;
        self.west_east_flag = element.get_bool("west_east_flag")?;
        self.polarization = element.get_int("polarization")?;
        self.roll_off = element.get_int_or("roll_off", 0)?;
        self.modulation_system = element.get_int_or("modulation_system", 0)?;
        self.modulation_type = element.get_int("modulation_type")?;
        self.symbol_rate = element.get_int("symbol_rate")?;
        self.fec_inner = element.get_int("FEC_inner")?;

        let limits: [(&str, u64, u64); 8] = [
            ("frequency", self.frequency as u64, 99_999_999),
            ("orbital_position", self.orbital_position as u64, 9_999),
            ("polarization", self.polarization as u64, 3),
            ("roll_off", self.roll_off as u64, 3),
            ("modulation_system", self.modulation_system as u64, 1),
            ("modulation_type", self.modulation_type as u64, 3),
            ("symbol_rate", self.symbol_rate as u64, 9_999_999),
            ("FEC_inner", self.fec_inner as u64, 15),
        ];
        for (name, value, max) in limits {
            if value > max {
                return Err(out_of_range(element, name, value));
            }
        }
        Ok(())
    }
}

impl Descriptor for SatelliteDeliveryDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::SATELLITE_DELIVERY
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.frequency = r.read_bcd(8);
        self.orbital_position = r.read_bcd(4) as u16;
        self.west_east_flag = r.read_bool();
        self.polarization = r.read_bits(2) as u8;
        self.roll_off = r.read_bits(2) as u8;
        self.modulation_system = r.read_bits(1) as u8;
        self.modulation_type = r.read_bits(2) as u8;
        self.symbol_rate = r.read_bcd(7);
        self.fec_inner = r.read_bits(4) as u8;
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_bcd(self.frequency, 8);
        w.put_bcd(self.orbital_position as u32, 4);
        w.put_bool(self.west_east_flag);
        w.put_bits(self.polarization as u64, 2);
        w.put_bits(self.roll_off as u64, 2);
        w.put_bits(self.modulation_system as u64, 1);
        w.put_bits(self.modulation_type as u64, 2);
        w.put_bcd(self.symbol_rate, 7);
        w.put_bits(self.fec_inner as u64, 4);
    }
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service type.
    pub service_type: u8,
    /// Service provider name.
    pub provider_name: EncodedText,
    /// Service name.
    pub service_name: EncodedText,
}

impl ServiceDescriptor {
    /// Get human-readable service type name.
    pub fn service_type_name(&self) -> &'static str {
        match self.service_type {
            0x01 => "Digital TV",
            0x02 => "Digital Audio",
            0x0C => "Data Service",
            0xA1 => "Special Video (ISDB)",
            0xA2 => "Special Audio (ISDB)",
            0xA3 => "Special Data (ISDB)",
            0xA4 => "Engineering (ISDB)",
            0xA5 => "Promotional Video (ISDB)",
            0xA6 => "Promotional Audio (ISDB)",
            0xA7 => "Promotional Data (ISDB)",
            0xA8 => "For Advance Storage (ISDB)",
            0xA9 => "For Exclusive Storage (ISDB)",
            0xAA => "Bookmark List (ISDB)",
            0xAB => "Server Type Simultaneous (ISDB)",
            0xAC => "Independent File (ISDB)",
            0xC0 => "1seg (ISDB)",
            _ => "Unknown",
        }
    }
}

impl Record for ServiceDescriptor {
    fn xml_name(&self) -> &'static str {
        "service_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_hex("service_type", self.service_type, 2)
            .set_text_attr("service_provider_name", &self.provider_name)
            .set_text_attr("service_name", &self.service_name);
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.service_type = element.get_int("service_type")?;
        self.provider_name = element.get_text_attr("service_provider_name")?;
        self.service_name = element.get_text_attr("service_name")?;
        Ok(())
    }
}

impl Descriptor for ServiceDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::SERVICE
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.service_type = r.read_u8();
        let len = r.read_u8() as usize;
        self.provider_name = EncodedText::new(r.read_slice(len));
        let len = r.read_u8() as usize;
        self.service_name = EncodedText::new(r.read_slice(len));
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_u8(self.service_type);
        w.put_u8(self.provider_name.len() as u8);
        w.put_bytes(self.provider_name.as_bytes());
        w.put_u8(self.service_name.len() as u8);
        w.put_bytes(self.service_name.as_bytes());
    }
}

/// Stream identifier descriptor (0x52).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamIdentifierDescriptor {
    pub component_tag: u8,
}

impl Record for StreamIdentifierDescriptor {
    fn xml_name(&self) -> &'static str {
        "stream_identifier_descriptor"
    }

    fn clear(&mut self) {
        self.component_tag = 0;
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element.set_hex("component_tag", self.component_tag, 2);
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.component_tag = element.get_int("component_tag")?;
        Ok(())
    }
}

impl Descriptor for StreamIdentifierDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::STREAM_IDENTIFIER
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.component_tag = r.read_u8();
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_u8(self.component_tag);
    }
}

/// AAC descriptor (0x7C).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AacDescriptor {
    pub profile_and_level: u8,
    pub saoc_de: bool,
    pub aac_type: Option<u8>,
    pub additional_info: Vec<u8>,
}

impl AacDescriptor {
    /// Name of an AAC type value (component type semantics).
    pub fn aac_type_name(aac_type: u8) -> &'static str {
        match aac_type {
            0x01 => "HE-AAC audio, single mono channel",
            0x03 => "HE-AAC audio, stereo",
            0x05 => "HE-AAC audio, surround sound",
            0x40 => "HE-AAC audio description for the visually impaired",
            0x41 => "HE-AAC audio for the hard of hearing",
            0x42 => "HE-AAC receiver-mixed supplementary audio",
            0x43 => "HE-AAC v2 audio, stereo",
            0x44 => "HE-AAC v2 audio description for the visually impaired",
            0x45 => "HE-AAC v2 audio for the hard of hearing",
            0x46 => "HE-AAC v2 receiver-mixed supplementary audio",
            0x47 => "HE-AAC receiver-mixed audio description",
            0x48 => "HE-AAC broadcast-mixed audio description",
            0x49 => "HE-AAC v2 receiver-mixed audio description",
            0x4A => "HE-AAC v2 broadcast-mixed audio description",
            _ => "Unknown",
        }
    }
}

impl Record for AacDescriptor {
    fn xml_name(&self) -> &'static str {
        "AAC_descriptor"
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_hex("profile_and_level", self.profile_and_level, 2)
            .set_bool("SAOC_DE", self.saoc_de)
            .set_opt_hex("AAC_type", self.aac_type, 2);
        if !self.additional_info.is_empty() {
            element
                .add_element("additional_info")
                .set_hex_text(&self.additional_info);
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.profile_and_level = element.get_int("profile_and_level")?;
        self.saoc_de = element.get_bool_or("SAOC_DE", false)?;
        self.aac_type = element.get_opt_int("AAC_type")?;
        if let Some(info) = element.child("additional_info") {
            self.additional_info = info.hex_text()?;
        }
        Ok(())
    }
}

impl Descriptor for AacDescriptor {
    fn tag(&self) -> u8 {
        descriptor_tag::AAC
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.profile_and_level = r.read_u8();
        if r.can_read() {
            let aac_type_flag = r.read_bool();
            self.saoc_de = r.read_bool();
            r.skip_bits(6);
            if aac_type_flag {
                self.aac_type = Some(r.read_u8());
            }
            self.additional_info = r.read_remaining().to_vec();
        }
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_u8(self.profile_and_level);
        if self.saoc_de || self.aac_type.is_some() || !self.additional_info.is_empty() {
            w.put_bool(self.aac_type.is_some());
            w.put_bool(self.saoc_de);
            w.put_reserved(6);
            if let Some(aac_type) = self.aac_type {
                w.put_u8(aac_type);
            }
            w.put_bytes(&self.additional_info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor_list::DescriptorBlock;

    #[test]
    fn test_parse_service_descriptor() {
        let block = DescriptorBlock::new(
            0x48,
            vec![0x01, 0x03, b'N', b'H', b'K', 0x05, b'N', b'H', b'K', b'G', b'1'],
        )
        .unwrap();
        let mut desc = ServiceDescriptor::default();
        assert!(desc.decode(&block));
        assert_eq!(desc.service_type, 0x01);
        assert_eq!(desc.provider_name.to_string(), "NHK");
        assert_eq!(desc.service_name.to_string(), "NHKG1");
        assert_eq!(desc.service_type_name(), "Digital TV");
        assert_eq!(desc.encode().unwrap(), block);
    }

    #[test]
    fn test_service_descriptor_bad_length() {
        let block = DescriptorBlock::new(0x48, vec![0x01, 0x09, b'N']).unwrap();
        let mut desc = ServiceDescriptor::default();
        assert!(!desc.decode(&block));
        assert_eq!(desc.service_type, 0x01);
    }

    #[test]
    fn test_satellite_delivery() {
        // 11.727480 GHz, 110.0 E, right circular, QPSK, 28.860 Msym/s, FEC 3/4
        let block = DescriptorBlock::new(
            0x43,
            vec![0x01, 0x17, 0x27, 0x48, 0x11, 0x00, 0x41, 0x02, 0x88, 0x60, 0x03],
        )
        .unwrap();
        let mut desc = SatelliteDeliveryDescriptor::default();
        assert!(desc.decode(&block));
        assert_eq!(desc.frequency, 1_172_748);
        assert_eq!(desc.frequency_khz(), 11_727_480);
        assert_eq!(desc.orbital_position, 1100);
        assert!(!desc.west_east_flag);
        assert_eq!(desc.polarization, 2);
        assert_eq!(desc.modulation_type, 1);
        assert_eq!(desc.symbol_rate, 288_600);
        assert_eq!(desc.symbol_rate_sps(), 28_860_000);
        assert_eq!(desc.fec_inner, 3);
        assert_eq!(desc.encode().unwrap(), block);
    }

    #[test]
    fn test_service_list() {
        let block =
            DescriptorBlock::new(0x41, vec![0x04, 0x00, 0x01, 0x04, 0x08, 0xC0]).unwrap();
        let mut desc = ServiceListDescriptor::default();
        assert!(desc.decode(&block));
        assert_eq!(
            desc.entries,
            vec![
                ServiceListEntry { service_id: 0x0400, service_type: 0x01 },
                ServiceListEntry { service_id: 0x0408, service_type: 0xC0 },
            ]
        );
        assert_eq!(desc.encode().unwrap(), block);

        let truncated = DescriptorBlock::new(0x41, vec![0x04, 0x00, 0x01, 0x04]).unwrap();
        assert!(!desc.decode(&truncated));
        assert_eq!(desc.entries.len(), 1);
    }

    #[test]
    fn test_aac_descriptor() {
        let short = DescriptorBlock::new(0x7C, vec![0x58]).unwrap();
        let mut desc = AacDescriptor::default();
        assert!(desc.decode(&short));
        assert_eq!(desc.aac_type, None);
        assert_eq!(desc.encode().unwrap(), short);

        let full =
            DescriptorBlock::new(0x7C, vec![0x58, 0xFF, 0x43, 0x01, 0x02]).unwrap();
        assert!(desc.decode(&full));
        assert!(desc.saoc_de);
        assert_eq!(desc.aac_type, Some(0x43));
        assert_eq!(AacDescriptor::aac_type_name(0x43), "HE-AAC v2 audio, stereo");
        assert_eq!(desc.additional_info, vec![0x01, 0x02]);
        assert_eq!(desc.encode().unwrap(), full);
    }
}
