//! Typed record contract.
//!
//! Every table and descriptor type implements [`Record`] plus either
//! [`Table`] or [`Descriptor`]. Decoding never fails loudly: a record is
//! cleared, filled from the payload and flagged valid or invalid. Fields
//! parsed before a structural error are kept. A record is valid only if it
//! encodes back to the exact payload it was decoded from.
//!
//! Kinds without a registered type decode into [`RawTable`] or
//! [`RawDescriptor`], which keep the payload bytes and re-encode them
//! unchanged.

use std::any::Any;
use std::fmt;

use log::trace;

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::context::Standards;
use crate::descriptor_list::DescriptorBlock;
use crate::error::{EncodeError, TreeError};
use crate::registry::Registry;
use crate::section::{
    PsiHeader, Section, MAX_PRIVATE_SECTION_SIZE, MAX_PSI_LONG_SECTION_PAYLOAD_SIZE,
    MAX_PSI_SHORT_SECTION_PAYLOAD_SIZE, SHORT_SECTION_HEADER_SIZE,
};
use crate::table::BinaryTable;
use crate::tree::Element;

/// Element name of tables without a registered type, short form.
pub const GENERIC_SHORT_TABLE: &str = "generic_short_table";
/// Element name of tables without a registered type, long form.
pub const GENERIC_LONG_TABLE: &str = "generic_long_table";
/// Element name of descriptors without a registered type.
pub const GENERIC_DESCRIPTOR: &str = "generic_descriptor";

/// Downcasting support for record trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Registry and standards used while converting to and from text trees.
#[derive(Clone, Copy)]
pub struct TreeContext<'a> {
    pub registry: &'a Registry,
    pub standards: Standards,
}

impl fmt::Debug for TreeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeContext")
            .field("standards", &self.standards)
            .finish_non_exhaustive()
    }
}

/// Behaviour shared by tables and descriptors.
pub trait Record: AsAny + Send + fmt::Debug {
    /// Element name in the text tree.
    fn xml_name(&self) -> &'static str;

    /// Reset all fields to their construction-time values. The table id of
    /// types registered for several ids is kept.
    fn clear(&mut self);

    /// Add attributes and children to an element named [`Record::xml_name`].
    fn build_tree(&self, element: &mut Element, ctx: &TreeContext<'_>);

    /// Load fields from an element. The record was freshly created.
    fn analyze_tree(&mut self, element: &Element, ctx: &TreeContext<'_>) -> Result<(), TreeError>;
}

/// A decoded record with its validity.
pub struct Decoded<R: ?Sized> {
    pub record: Box<R>,
    pub valid: bool,
}

impl<R: ?Sized + Record> Decoded<R> {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True if the record is of type `T`.
    pub fn is<T: Record>(&self) -> bool {
        AsAny::as_any(&*self.record).is::<T>()
    }

    /// Typed view of the record.
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        AsAny::as_any(&*self.record).downcast_ref::<T>()
    }

    /// Typed view of a valid record.
    pub fn valid_ref<T: Record>(&self) -> Option<&T> {
        if self.valid {
            self.downcast_ref()
        } else {
            None
        }
    }

    /// Take ownership of the typed record.
    pub fn into_inner<T: Record>(self) -> Option<Box<T>> {
        AsAny::into_any(self.record).downcast::<T>().ok()
    }
}

impl<R: ?Sized + Record> fmt::Debug for Decoded<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded")
            .field("valid", &self.valid)
            .field("record", &&*self.record)
            .finish()
    }
}

/// A table: one or more sections sharing table id, extension and version.
pub trait Table: Record {
    fn table_id(&self) -> u8;

    /// Private indicator written in the section headers.
    fn is_private(&self) -> bool {
        true
    }

    fn is_long(&self) -> bool {
        true
    }

    /// Extension of long sections, taken from the table's own fields.
    fn table_id_extension(&self) -> u16 {
        0
    }

    fn version(&self) -> u8 {
        0
    }

    fn is_current(&self) -> bool {
        true
    }

    /// Set version and current/next. Ignored by short tables.
    fn set_version(&mut self, _version: u8, _is_current: bool) {}

    /// Adopt the identity of a binary table before its sections are
    /// deserialized. Returns false if this type cannot represent it.
    fn set_identity(&mut self, table: &BinaryTable) -> bool {
        table.table_id() == self.table_id() && table.is_short() != self.is_long()
    }

    /// Parse the payload of one section, in section order. Errors are
    /// reported through the reader.
    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, section: &Section);

    /// Write the payload, split into sections at entry boundaries.
    fn serialize_payload(&self, out: &mut SectionsBuilder);

    fn max_payload_size(&self) -> usize {
        if self.is_long() {
            MAX_PSI_LONG_SECTION_PAYLOAD_SIZE
        } else {
            MAX_PSI_SHORT_SECTION_PAYLOAD_SIZE
        }
    }

    /// Decode a complete binary table. Returns the validity.
    fn decode(&mut self, table: &BinaryTable) -> bool {
        self.clear();
        if !table.is_complete() || !self.set_identity(table) {
            return false;
        }
        if self.is_long() {
            self.set_version(table.version(), table.is_current());
        }
        for section in table.sections() {
            let mut r = PsiReader::new(section.payload());
            self.deserialize_payload(&mut r, section);
            if r.error() || !r.end_of_read() {
                return false;
            }
        }
        self.reproduces(table)
    }

    /// True if encoding gives back the section payloads of `table`.
    /// Non-canonical input, such as an uneven section split or cleared
    /// reserved bits, fails this check.
    fn reproduces(&self, table: &BinaryTable) -> bool {
        let encoded = match self.encode() {
            Ok(encoded) => encoded,
            Err(_) => return false,
        };
        let same = encoded.section_count() == table.section_count()
            && encoded
                .sections()
                .zip(table.sections())
                .all(|(a, b)| a.payload() == b.payload());
        if !same {
            trace!(
                "{}: table 0x{:02X} does not re-encode to the same payload",
                self.xml_name(),
                table.table_id()
            );
        }
        same
    }

    /// Serialize into a binary table.
    fn encode(&self) -> Result<BinaryTable, EncodeError> {
        let mut out = SectionsBuilder::new(self.max_payload_size());
        self.serialize_payload(&mut out);
        let payloads = out.finish();

        if !self.is_long() {
            if payloads.len() != 1 {
                return Err(EncodeError::TooManySections(payloads.len()));
            }
            let section = Section::new_short(self.table_id(), self.is_private(), &payloads[0])?;
            return Ok(BinaryTable::from_sections([section])?);
        }

        if payloads.len() > 256 {
            return Err(EncodeError::TooManySections(payloads.len()));
        }
        let last = (payloads.len() - 1) as u8;
        let mut sections = Vec::with_capacity(payloads.len());
        for (index, payload) in payloads.iter().enumerate() {
            let header = PsiHeader::long(
                self.table_id(),
                self.is_private(),
                self.table_id_extension(),
                self.version(),
                self.is_current(),
                index as u8,
                last,
            );
            sections.push(Section::new_long(header, payload)?);
        }
        Ok(BinaryTable::from_sections(sections)?)
    }
}

/// A descriptor: a tagged block inside a descriptor loop.
pub trait Descriptor: Record {
    fn tag(&self) -> u8;

    /// Adopt the tag of a block, for types registered with several tags.
    fn set_tag(&mut self, _tag: u8) {}

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>);

    fn serialize_payload(&self, w: &mut PsiWriter);

    /// Decode a descriptor block. Returns the validity.
    fn decode(&mut self, block: &DescriptorBlock) -> bool {
        self.clear();
        self.set_tag(block.tag());
        if block.tag() != self.tag() {
            return false;
        }
        let mut r = PsiReader::new(block.payload());
        self.deserialize_payload(&mut r);
        if r.error() || !r.end_of_read() {
            return false;
        }
        // Accepted only when the fields serialize back to the same payload.
        let mut w = PsiWriter::new();
        self.serialize_payload(&mut w);
        let same = w.freeze().as_ref() == block.payload();
        if !same {
            trace!("{}: payload does not re-encode identically", self.xml_name());
        }
        same
    }

    fn encode(&self) -> Result<DescriptorBlock, EncodeError> {
        let mut w = PsiWriter::new();
        self.serialize_payload(&mut w);
        DescriptorBlock::new(self.tag(), w.freeze())
    }
}

/// Table of an unregistered kind: section payloads kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub table_id: u8,
    pub private: bool,
    pub long: bool,
    pub table_id_extension: u16,
    pub version: u8,
    pub is_current: bool,
    pub payloads: Vec<Vec<u8>>,
}

impl Default for RawTable {
    fn default() -> Self {
        RawTable {
            table_id: 0xFF,
            private: true,
            long: true,
            table_id_extension: 0,
            version: 0,
            is_current: true,
            payloads: Vec::new(),
        }
    }
}

impl RawTable {
    pub fn short() -> Self {
        RawTable {
            long: false,
            ..Default::default()
        }
    }
}

impl Record for RawTable {
    fn xml_name(&self) -> &'static str {
        if self.long {
            GENERIC_LONG_TABLE
        } else {
            GENERIC_SHORT_TABLE
        }
    }

    fn clear(&mut self) {
        self.payloads.clear();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element
            .set_hex("table_id", self.table_id, 2)
            .set_bool("private", self.private);
        if self.long {
            element.set_hex("table_id_ext", self.table_id_extension, 4);
        }
        for payload in &self.payloads {
            element.add_element("section").set_hex_text(payload);
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.long = element.name == GENERIC_LONG_TABLE;
        self.table_id = element.get_int("table_id")?;
        self.private = element.get_bool_or("private", true)?;
        if self.long {
            self.table_id_extension = element.get_int_or("table_id_ext", 0xFFFF)?;
        }
        self.payloads = element
            .children_named("section")
            .map(Element::hex_text)
            .collect::<Result<_, _>>()?;
        Ok(())
    }
}

impl Table for RawTable {
    fn table_id(&self) -> u8 {
        self.table_id
    }

    fn is_private(&self) -> bool {
        self.private
    }

    fn is_long(&self) -> bool {
        self.long
    }

    fn table_id_extension(&self) -> u16 {
        self.table_id_extension
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn is_current(&self) -> bool {
        self.is_current
    }

    fn set_version(&mut self, version: u8, is_current: bool) {
        self.version = version & 0x1F;
        self.is_current = is_current;
    }

    fn set_identity(&mut self, table: &BinaryTable) -> bool {
        self.table_id = table.table_id();
        self.long = !table.is_short();
        self.private = table.is_private();
        self.table_id_extension = table.table_id_extension();
        true
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, _section: &Section) {
        self.payloads.push(r.read_remaining().to_vec());
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        // One closed section per payload, empty ones included.
        for payload in &self.payloads {
            out.writer().put_bytes(payload);
            out.close_section();
        }
    }

    fn max_payload_size(&self) -> usize {
        MAX_PRIVATE_SECTION_SIZE - SHORT_SECTION_HEADER_SIZE
    }
}

/// Descriptor of an unregistered kind: payload kept as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDescriptor {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Record for RawDescriptor {
    fn xml_name(&self) -> &'static str {
        GENERIC_DESCRIPTOR
    }

    fn clear(&mut self) {
        self.payload.clear();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element.set_hex("tag", self.tag, 2).set_hex_text(&self.payload);
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.tag = element.get_int("tag")?;
        self.payload = element.hex_text()?;
        Ok(())
    }
}

impl Descriptor for RawDescriptor {
    fn tag(&self) -> u8 {
        self.tag
    }

    fn set_tag(&mut self, tag: u8) {
        self.tag = tag;
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>) {
        self.payload = r.read_remaining().to_vec();
    }

    fn serialize_payload(&self, w: &mut PsiWriter) {
        w.put_bytes(&self.payload);
    }
}

/// Text tree of a table.
pub fn table_to_tree(table: &dyn Table, ctx: &TreeContext<'_>) -> Element {
    let mut element = Element::new(table.xml_name());
    if table.is_long() {
        element
            .set_int("version", table.version())
            .set_bool("current", table.is_current());
    }
    table.build_tree(&mut element, ctx);
    element
}

/// Table from its text tree, using the registry to find the type by name.
pub fn table_from_tree(element: &Element, ctx: &TreeContext<'_>) -> Result<Box<dyn Table>, TreeError> {
    let mut table = ctx
        .registry
        .table_by_name(&element.name)
        .ok_or_else(|| TreeError::UnknownRecord(element.name.clone()))?;
    table.analyze_tree(element, ctx)?;
    if table.is_long() {
        let version: u8 = element.get_int_or("version", 0)?;
        if version > 0x1F {
            return Err(TreeError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "version".to_string(),
                value: version.to_string(),
            });
        }
        let current = element.get_bool_or("current", true)?;
        table.set_version(version, current);
    }
    Ok(table)
}

/// Text tree of a descriptor.
pub fn descriptor_to_tree(descriptor: &dyn Descriptor, ctx: &TreeContext<'_>) -> Element {
    let mut element = Element::new(descriptor.xml_name());
    descriptor.build_tree(&mut element, ctx);
    element
}

/// Descriptor from its text tree.
pub fn descriptor_from_tree(
    element: &Element,
    ctx: &TreeContext<'_>,
) -> Result<Box<dyn Descriptor>, TreeError> {
    let mut descriptor = ctx
        .registry
        .descriptor_by_name(&element.name)
        .ok_or_else(|| TreeError::UnknownRecord(element.name.clone()))?;
    descriptor.analyze_tree(element, ctx)?;
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_table() -> BinaryTable {
        let sections = (0..2u8).map(|i| {
            Section::new_long(PsiHeader::long(0x90, true, 0x0102, 5, false, i, 1), &[i, 0xAA])
                .unwrap()
        });
        BinaryTable::from_sections(sections).unwrap()
    }

    #[test]
    fn test_raw_table_roundtrip() {
        let binary = long_table();
        let mut raw = RawTable::default();
        assert!(raw.decode(&binary));
        assert_eq!(raw.table_id, 0x90);
        assert_eq!(raw.version, 5);
        assert!(!raw.is_current);
        assert_eq!(raw.payloads, vec![vec![0, 0xAA], vec![1, 0xAA]]);

        let encoded = raw.encode().unwrap();
        assert_eq!(encoded, binary);
    }

    #[test]
    fn test_raw_table_keeps_empty_last_section() {
        let sections = [&[0x01u8, 0x02][..], &[][..]].into_iter().enumerate().map(|(i, p)| {
            Section::new_long(PsiHeader::long(0x90, true, 7, 1, true, i as u8, 1), p).unwrap()
        });
        let binary = BinaryTable::from_sections(sections).unwrap();

        let mut raw = RawTable::default();
        assert!(raw.decode(&binary));
        assert_eq!(raw.payloads, vec![vec![0x01, 0x02], vec![]]);
        let encoded = raw.encode().unwrap();
        assert_eq!(encoded.section_count(), 2);
        assert_eq!(encoded, binary);
    }

    #[test]
    fn test_raw_short_table() {
        let section = Section::new_short(0x72, true, &[1, 2, 3]).unwrap();
        let binary = BinaryTable::from_sections([section]).unwrap();
        let mut raw = RawTable::default();
        assert!(raw.decode(&binary));
        assert!(!raw.long);
        assert_eq!(raw.xml_name(), GENERIC_SHORT_TABLE);
        assert_eq!(raw.encode().unwrap(), binary);
    }

    #[test]
    fn test_incomplete_table_is_invalid() {
        let section = Section::new_long(PsiHeader::long(0x90, true, 1, 0, true, 0, 1), &[]).unwrap();
        let binary = BinaryTable::from_sections([section]).unwrap();
        assert!(!RawTable::default().decode(&binary));
    }

    #[test]
    fn test_raw_descriptor() {
        let block = DescriptorBlock::new(0xE0, vec![1, 2, 3]).unwrap();
        let mut raw = RawDescriptor::default();
        assert!(raw.decode(&block));
        assert_eq!(raw.tag, 0xE0);
        assert_eq!(raw.encode().unwrap(), block);
    }

    #[test]
    fn test_decoded_downcast() {
        let decoded: Decoded<dyn Descriptor> = Decoded {
            record: Box::new(RawDescriptor {
                tag: 1,
                payload: vec![],
            }),
            valid: true,
        };
        assert!(decoded.is::<RawDescriptor>());
        assert_eq!(decoded.downcast_ref::<RawDescriptor>().map(|d| d.tag), Some(1));
        assert!(decoded.downcast_ref::<RawTable>().is_none());
        assert!(decoded.into_inner::<RawDescriptor>().is_some());
    }
}
