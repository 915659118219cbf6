//! Binary tables: ordered aggregates of sections sharing one identity.

use crate::error::TableError;
use crate::pid;
use crate::section::Section;

/// Identity of a table within a PID: table id and table id extension.
///
/// Short tables always use an extension of 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub table_id: u8,
    pub table_id_extension: u16,
}

impl TableKey {
    pub fn of(section: &Section) -> Self {
        TableKey {
            table_id: section.table_id(),
            table_id_extension: section.table_id_extension(),
        }
    }
}

/// A logical table rebuilt from its sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryTable {
    sections: Vec<Option<Section>>,
    source_pid: Option<u16>,
}

impl BinaryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a list of sections, in any order.
    pub fn from_sections<I>(sections: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = Section>,
    {
        let mut table = BinaryTable::new();
        for section in sections {
            table.add_section(section)?;
        }
        Ok(table)
    }

    /// Add a section. It must share the identity of the sections already
    /// present. A section with an index already stored replaces it.
    pub fn add_section(&mut self, section: Section) -> Result<(), TableError> {
        let index = section.section_number() as usize;
        let last = section.last_section_number() as usize;

        if let Some(first) = self.first() {
            if first.is_short() || section.is_short() {
                return Err(TableError::ShortSectionInLongTable);
            }
            if first.table_id() != section.table_id() {
                return Err(TableError::Inconsistent("table_id"));
            }
            if first.table_id_extension() != section.table_id_extension() {
                return Err(TableError::Inconsistent("table_id_extension"));
            }
            if first.version() != section.version() {
                return Err(TableError::Inconsistent("version"));
            }
            if first.is_current() != section.is_current() {
                return Err(TableError::Inconsistent("current_next_indicator"));
            }
            if self.sections.len() != last + 1 {
                return Err(TableError::Inconsistent("last_section_number"));
            }
        } else {
            self.sections = vec![None; last + 1];
        }

        if index >= self.sections.len() {
            return Err(TableError::Inconsistent("section_number"));
        }
        if self.source_pid.is_none() {
            self.source_pid = Some(section.source_pid());
        }
        self.sections[index] = Some(section);
        Ok(())
    }

    fn first(&self) -> Option<&Section> {
        self.sections.iter().flatten().next()
    }

    /// True if no section has been added.
    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    /// True when every section index in `0..=last` is present.
    pub fn is_complete(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(Option::is_some)
    }

    /// Number of section slots (last_section_number + 1).
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Number of sections actually present.
    pub fn present_count(&self) -> usize {
        self.sections.iter().flatten().count()
    }

    /// Section at an index.
    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index).and_then(Option::as_ref)
    }

    /// Present sections in index order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().flatten()
    }

    /// Consume the table, returning its present sections in index order.
    pub fn into_sections(self) -> Vec<Section> {
        self.sections.into_iter().flatten().collect()
    }

    pub fn table_id(&self) -> u8 {
        self.first().map(Section::table_id).unwrap_or(0xFF)
    }

    pub fn table_id_extension(&self) -> u16 {
        self.first().map(Section::table_id_extension).unwrap_or(0)
    }

    pub fn version(&self) -> u8 {
        self.first().map(Section::version).unwrap_or(0)
    }

    pub fn is_current(&self) -> bool {
        self.first().map(Section::is_current).unwrap_or(true)
    }

    pub fn is_short(&self) -> bool {
        self.first().map(Section::is_short).unwrap_or(false)
    }

    pub fn is_private(&self) -> bool {
        self.first().map(Section::is_private).unwrap_or(true)
    }

    pub fn key(&self) -> TableKey {
        TableKey {
            table_id: self.table_id(),
            table_id_extension: self.table_id_extension(),
        }
    }

    /// PID the first section came from.
    pub fn source_pid(&self) -> u16 {
        self.source_pid.unwrap_or(pid::NULL)
    }

    /// Total binary size of all present sections.
    pub fn total_size(&self) -> usize {
        self.sections().map(Section::size).sum()
    }

    /// Concatenated binary content of all present sections.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size());
        for section in self.sections() {
            out.extend_from_slice(section.as_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::PsiHeader;

    fn long(index: u8, last: u8, version: u8) -> Section {
        Section::new_long(PsiHeader::long(0x42, true, 0x10, version, true, index, last), &[index])
            .unwrap()
    }

    #[test]
    fn test_complete_in_order() {
        let mut table = BinaryTable::new();
        table.add_section(long(1, 2, 0)).unwrap();
        table.add_section(long(0, 2, 0)).unwrap();
        assert!(!table.is_complete());
        assert_eq!(table.present_count(), 2);

        table.add_section(long(2, 2, 0)).unwrap();
        assert!(table.is_complete());
        let numbers: Vec<u8> = table.sections().map(|s| s.section_number()).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(table.key().table_id_extension, 0x10);
    }

    #[test]
    fn test_inconsistent_version() {
        let mut table = BinaryTable::new();
        table.add_section(long(0, 1, 0)).unwrap();
        assert_eq!(
            table.add_section(long(1, 1, 1)),
            Err(TableError::Inconsistent("version"))
        );
    }

    #[test]
    fn test_inconsistent_last() {
        let mut table = BinaryTable::new();
        table.add_section(long(0, 1, 0)).unwrap();
        assert_eq!(
            table.add_section(long(1, 2, 0)),
            Err(TableError::Inconsistent("last_section_number"))
        );
    }

    #[test]
    fn test_short_table() {
        let short = Section::new_short(0x70, true, &[0; 5]).unwrap();
        let table = BinaryTable::from_sections([short.clone()]).unwrap();
        assert!(table.is_complete());
        assert!(table.is_short());
        assert_eq!(
            BinaryTable::from_sections([short.clone(), short]),
            Err(TableError::ShortSectionInLongTable)
        );
    }
}
