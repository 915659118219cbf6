//! Section files: binary files of concatenated sections, and their text
//! tree form.
//!
//! Sections are grouped into tables as they are loaded. Long sections that
//! never form a complete table are kept aside as orphans; they are saved
//! back in binary form but have no text representation.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Error, SectionError, TreeError};
use crate::record::{table_from_tree, table_to_tree, RawTable, Table, TreeContext};
use crate::section::{Section, SHORT_SECTION_HEADER_SIZE};
use crate::table::{BinaryTable, TableKey};
use crate::tree::Element;

/// Name of the root element of a section file tree.
pub const ROOT_ELEMENT: &str = "tsduck";

/// Tables and orphan sections, in load order.
#[derive(Debug, Clone, Default)]
pub struct SectionFile {
    tables: Vec<BinaryTable>,
    orphans: Vec<Section>,
    /// Long tables still missing sections.
    pending: Vec<BinaryTable>,
}

impl SectionFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete tables.
    pub fn tables(&self) -> &[BinaryTable] {
        &self.tables
    }

    /// Sections which do not belong to a complete table.
    pub fn orphans(&self) -> impl Iterator<Item = &Section> {
        self.orphans
            .iter()
            .chain(self.pending.iter().flat_map(|t| t.sections()))
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans().count()
    }

    /// Add a complete table.
    pub fn add_table(&mut self, table: BinaryTable) {
        if table.is_complete() {
            self.tables.push(table);
        } else {
            self.orphans.extend(table.into_sections());
        }
    }

    /// Add one section. Short sections are tables by themselves; long
    /// sections are collected until their table is complete.
    pub fn add_section(&mut self, section: Section) {
        if section.is_short() {
            match BinaryTable::from_sections([section.clone()]) {
                Ok(table) => self.tables.push(table),
                Err(_) => self.orphans.push(section),
            }
            return;
        }

        let count = section.last_section_number() as usize + 1;
        let matching = self.pending.iter().position(|t| {
            t.key() == TableKey::of(&section)
                && t.version() == section.version()
                && t.is_current() == section.is_current()
                && t.section_count() == count
                && t.section(section.section_number() as usize).is_none()
        });

        let index = match matching {
            Some(index) => index,
            None => {
                self.pending.push(BinaryTable::new());
                self.pending.len() - 1
            }
        };
        if let Err(e) = self.pending[index].add_section(section.clone()) {
            debug!("section file: orphan section: {}", e);
            self.orphans.push(section);
            return;
        }
        if self.pending[index].is_complete() {
            let table = self.pending.remove(index);
            self.tables.push(table);
        }
    }

    /// Parse concatenated sections. CRC32 of long sections is checked when
    /// `check_crc` is set.
    pub fn from_bytes(data: &[u8], check_crc: bool) -> Result<Self, SectionError> {
        let mut file = SectionFile::new();
        let mut rest = data;
        while !rest.is_empty() {
            if rest.len() < SHORT_SECTION_HEADER_SIZE {
                return Err(SectionError::TooShort(rest.len()));
            }
            let length = ((rest[1] as usize & 0x0F) << 8) | rest[2] as usize;
            let total = SHORT_SECTION_HEADER_SIZE + length;
            if total > rest.len() {
                return Err(SectionError::LengthMismatch {
                    declared: total,
                    actual: rest.len(),
                });
            }
            let section = Section::from_bytes(rest[..total].to_vec())?;
            section.validate(check_crc)?;
            file.add_section(section);
            rest = &rest[total..];
        }
        Ok(file)
    }

    /// Load a binary section file.
    pub fn load(path: impl AsRef<Path>, check_crc: bool) -> Result<Self, Error> {
        let data = fs::read(path.as_ref())?;
        let file = Self::from_bytes(&data, check_crc)?;
        debug!(
            "{}: {} table(s), {} orphan section(s)",
            path.as_ref().display(),
            file.tables.len(),
            file.orphan_count()
        );
        Ok(file)
    }

    /// Binary content: every table then every orphan section.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for table in &self.tables {
            out.extend_from_slice(&table.to_bytes());
        }
        for section in self.orphans() {
            out.extend_from_slice(section.as_bytes());
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Text tree of all complete tables. A table is rendered with its typed
    /// record only when the record is valid and encodes back to the same
    /// bytes; otherwise it becomes a generic table.
    pub fn to_tree(&self, ctx: &TreeContext<'_>) -> Element {
        let mut root = Element::new(ROOT_ELEMENT);
        for binary in &self.tables {
            let decoded = ctx.registry.decode_table(binary, ctx.standards);
            let exact = decoded.valid
                && decoded
                    .record
                    .encode()
                    .map(|encoded| encoded.to_bytes() == binary.to_bytes())
                    .unwrap_or(false);
            if exact {
                root.add_child(table_to_tree(&*decoded.record, ctx));
            } else {
                let mut raw = if binary.is_short() {
                    RawTable::short()
                } else {
                    RawTable::default()
                };
                raw.decode(binary);
                root.add_child(table_to_tree(&raw, ctx));
            }
        }
        root
    }

    /// Build from a text tree, encoding every table.
    pub fn from_tree(root: &Element, ctx: &TreeContext<'_>) -> Result<Self, Error> {
        root.expect_name(ROOT_ELEMENT)?;
        let mut file = SectionFile::new();
        for child in &root.children {
            let table = table_from_tree(child, ctx)?;
            file.add_table(table.encode()?);
        }
        Ok(file)
    }

    pub fn to_json(&self, ctx: &TreeContext<'_>) -> Result<String, TreeError> {
        self.to_tree(ctx).to_json()
    }

    pub fn from_json(json: &str, ctx: &TreeContext<'_>) -> Result<Self, Error> {
        Self::from_tree(&Element::from_json(json)?, ctx)
    }

    pub fn to_xml(&self, ctx: &TreeContext<'_>) -> String {
        self.to_tree(ctx).to_xml_string()
    }
}
