//! Decode laws starting from wire bytes rather than from typed records.

use proptest::prelude::*;
use tsdemux_core::record::{table_from_tree, table_to_tree};
use tsdemux_core::{
    table_id, BinaryTable, Element, PsiHeader, Record, Registry, Section, Standards, Table,
    TreeContext,
};

const STANDARDS: Standards = Standards::ISDB;

fn long_table(table_id: u8, private: bool, payloads: &[Vec<u8>]) -> BinaryTable {
    let last = (payloads.len() - 1) as u8;
    let sections = payloads.iter().enumerate().map(|(i, payload)| {
        let header = PsiHeader::long(table_id, private, 0x0101, 3, true, i as u8, last);
        Section::new_long(header, payload).unwrap()
    });
    BinaryTable::from_sections(sections).unwrap()
}

fn same_payloads(a: &BinaryTable, b: &BinaryTable) -> bool {
    a.section_count() == b.section_count()
        && a.sections()
            .zip(b.sections())
            .all(|(x, y)| x.payload() == y.payload())
}

/// Every accepted table encodes back to its payloads, directly and through
/// the text tree.
fn check_accepted(binary: &BinaryTable) -> Result<bool, TestCaseError> {
    let registry = Registry::with_default_catalog();
    let decoded = registry.decode_table(binary, STANDARDS);
    if !decoded.valid {
        return Ok(false);
    }
    let encoded = decoded.record.encode().unwrap();
    prop_assert!(
        same_payloads(&encoded, binary),
        "{} re-encoded differently",
        decoded.record.xml_name()
    );

    let ctx = TreeContext {
        registry: &registry,
        standards: STANDARDS,
    };
    let json = table_to_tree(&*decoded.record, &ctx).to_json().unwrap();
    let rebuilt = table_from_tree(&Element::from_json(&json).unwrap(), &ctx).unwrap();
    prop_assert!(same_payloads(&rebuilt.encode().unwrap(), binary));
    Ok(true)
}

fn pat_entry() -> impl Strategy<Value = (u16, u16, u8)> {
    (0u16..48, 0u16..0x2000, prop_oneof![3 => Just(7u8), 1 => 0u8..8])
}

proptest! {
    #[test]
    fn prop_arbitrary_payloads_obey_decode_law(
        table_id in prop::sample::select(vec![
            table_id::PAT, table_id::PMT, table_id::NIT_ACTUAL,
            table_id::SDT_ACTUAL, table_id::BIT, 0x90,
        ]),
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 1..4),
    ) {
        let private = table_id != table_id::PAT && table_id != table_id::PMT;
        check_accepted(&long_table(table_id, private, &payloads))?;
    }

    #[test]
    fn prop_raw_tables_are_always_accepted(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..5),
    ) {
        let binary = long_table(0x90, true, &payloads);
        prop_assert!(check_accepted(&binary)?);

        let registry = Registry::with_default_catalog();
        let decoded = registry.decode_table(&binary, STANDARDS);
        prop_assert_eq!(decoded.record.encode().unwrap(), binary);
    }

    #[test]
    fn prop_pat_accepted_only_when_canonical(
        entries in prop::collection::vec(pat_entry(), 0..40),
        split in 1usize..4,
    ) {
        let bytes: Vec<[u8; 4]> = entries
            .iter()
            .map(|&(program, pid, reserved)| {
                let [hi, lo] = program.to_be_bytes();
                let pid_field = ((reserved as u16) << 13) | pid;
                let [phi, plo] = pid_field.to_be_bytes();
                [hi, lo, phi, plo]
            })
            .collect();
        let chunk = bytes.len().div_ceil(split).max(1);
        let mut payloads: Vec<Vec<u8>> = bytes.chunks(chunk).map(|c| c.concat()).collect();
        if payloads.is_empty() {
            payloads.push(Vec::new());
        }

        let mut keys: Vec<u16> = entries.iter().map(|e| e.0).collect();
        keys.sort_unstable();
        keys.dedup();
        let canonical = payloads.len() == 1
            && entries.iter().all(|e| e.2 == 7)
            && keys.len() == entries.len();

        let accepted = check_accepted(&long_table(table_id::PAT, false, &payloads))?;
        prop_assert_eq!(accepted, canonical);
    }
}
