//! PAT (Program Association Table).
//!
//! The PAT is transmitted on PID 0x0000 and maps program numbers to the
//! PIDs of their PMT. Program number 0 designates the NIT PID.

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::entry_list::{Entry, EntryList};
use crate::error::TreeError;
use crate::record::{Record, Table, TreeContext};
use crate::section::Section;
use crate::table_id;
use crate::tree::Element;

/// Program association table. Entries map program numbers to PMT PIDs in
/// wire order, the NIT entry (program 0) included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub version: u8,
    pub is_current: bool,
    pub transport_stream_id: u16,
    pub programs: EntryList<u16, u16>,
}

impl Default for Pat {
    fn default() -> Self {
        Pat {
            version: 0,
            is_current: true,
            transport_stream_id: 0,
            programs: EntryList::new(),
        }
    }
}

impl Entry<u16> for u16 {
    fn write_entry(&self, program_number: &u16, w: &mut PsiWriter) {
        w.put_u16(*program_number);
        w.put_reserved(3);
        w.put_bits(*self as u64, 13);
    }
}

impl Pat {
    /// NIT PID (if present in PAT).
    pub fn nit_pid(&self) -> Option<u16> {
        self.programs.get(&0).copied()
    }

    /// Get PMT PID for a specific program number.
    pub fn pmt_pid(&self, program_number: u16) -> Option<u16> {
        if program_number == 0 {
            return None;
        }
        self.programs.get(&program_number).copied()
    }

    /// Program numbers (service IDs), NIT entry excluded.
    pub fn program_numbers(&self) -> Vec<u16> {
        self.programs.keys().copied().filter(|&p| p != 0).collect()
    }
}

impl Record for Pat {
    fn xml_name(&self) -> &'static str {
        "PAT"
    }

    fn clear(&mut self) {
        *self = Pat::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element.set_hex("transport_stream_id", self.transport_stream_id, 4);
        for (program_number, pid) in self.programs.iter() {
            element
                .add_element("service")
                .set_hex("service_id", *program_number, 4)
                .set_hex("program_map_PID", *pid, 4);
        }
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.transport_stream_id = element.get_int("transport_stream_id")?;
        for child in element.children_named("service") {
            let pid: u16 = child.get_int("program_map_PID")?;
            if pid > 0x1FFF {
                return Err(TreeError::InvalidAttribute {
                    element: child.name.clone(),
                    attribute: "program_map_PID".to_string(),
                    value: pid.to_string(),
                });
            }
            self.programs.insert(child.get_int("service_id")?, pid);
        }
        Ok(())
    }
}

impl Table for Pat {
    fn table_id(&self) -> u8 {
        table_id::PAT
    }

    fn is_private(&self) -> bool {
        false
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

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, section: &Section) {
        self.transport_stream_id = section.table_id_extension();
        while r.can_read() {
            let program_number = r.read_u16();
            r.skip_bits(3);
            let pid = r.read_bits(13) as u16;
            if !r.error() && !self.programs.insert_new(program_number, pid) {
                r.set_error();
            }
        }
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        self.programs.serialize_into(out, |_, _| None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::PsiHeader;
    use crate::table::BinaryTable;

    fn binary(payload: &[u8]) -> BinaryTable {
        let header = PsiHeader::long(table_id::PAT, false, 0x1234, 1, true, 0, 0);
        BinaryTable::from_sections([Section::new_long(header, payload).unwrap()]).unwrap()
    }

    #[test]
    fn test_parse_pat() {
        let data = [
            // NIT: PID=0x0010
            0x00, 0x00, 0xE0, 0x10,
            // Program 1: number=0x0101, PID=0x0100
            0x01, 0x01, 0xE1, 0x00,
            // Program 2: number=0x0102, PID=0x0200
            0x01, 0x02, 0xE2, 0x00,
        ];
        let mut pat = Pat::default();
        assert!(pat.decode(&binary(&data)));

        assert_eq!(pat.transport_stream_id, 0x1234);
        assert_eq!(pat.version, 1);
        assert_eq!(pat.nit_pid(), Some(0x0010));
        assert_eq!(pat.pmt_pid(0x0101), Some(0x0100));
        assert_eq!(pat.pmt_pid(0x0102), Some(0x0200));
        assert_eq!(pat.pmt_pid(0x0103), None);
        assert_eq!(pat.program_numbers(), vec![0x0101, 0x0102]);

        assert_eq!(pat.encode().unwrap(), binary(&data));
    }

    #[test]
    fn test_truncated_entry_is_invalid() {
        let mut pat = Pat::default();
        assert!(!pat.decode(&binary(&[0x01, 0x01, 0xE1])));
    }

    #[test]
    fn test_duplicate_program_is_invalid() {
        let data = [0x00, 0x01, 0xE1, 0x00, 0x00, 0x01, 0xE2, 0x00];
        let mut pat = Pat::default();
        assert!(!pat.decode(&binary(&data)));
        // the first entry is kept
        assert_eq!(pat.pmt_pid(1), Some(0x0100));
        assert_eq!(pat.programs.len(), 1);
    }

    #[test]
    fn test_cleared_reserved_bits_are_invalid() {
        let data = [0x00, 0x01, 0x01, 0x00];
        let mut pat = Pat::default();
        assert!(!pat.decode(&binary(&data)));
        assert_eq!(pat.pmt_pid(1), Some(0x0100));
    }

    #[test]
    fn test_uneven_split_is_invalid() {
        let sections = [[0x00, 0x01, 0xE1, 0x00], [0x00, 0x02, 0xE2, 0x00]]
            .iter()
            .enumerate()
            .map(|(i, payload)| {
                let header = PsiHeader::long(table_id::PAT, false, 0x1234, 1, true, i as u8, 1);
                Section::new_long(header, payload).unwrap()
            });
        let table = BinaryTable::from_sections(sections).unwrap();

        let mut pat = Pat::default();
        assert!(!pat.decode(&table));
        assert_eq!(pat.program_numbers(), vec![1, 2]);
        assert_eq!(pat.encode().unwrap().section_count(), 1);
    }

    #[test]
    fn test_large_pat_splits_sections() {
        let mut pat = Pat {
            transport_stream_id: 7,
            ..Default::default()
        };
        for n in 1..=300u16 {
            pat.programs.insert(n, 0x100 + n);
        }
        let table = pat.encode().unwrap();
        // 253 entries of 4 bytes fit in 1012 bytes
        assert_eq!(table.section_count(), 2);
        assert_eq!(table.section(0).map(|s| s.payload().len()), Some(1012));

        let mut back = Pat::default();
        assert!(back.decode(&table));
        assert_eq!(back, pat);
    }
}
