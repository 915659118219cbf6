use chrono::NaiveDate;
use tsdemux_core::descriptors::{
    AacDescriptor, CaDescriptor, NetworkNameDescriptor, SatelliteDeliveryDescriptor,
    ServiceDescriptor, ServiceListDescriptor, ServiceListEntry, StreamIdentifierDescriptor,
    TerrestrialDeliveryDescriptor, TransmissionType, TsInformationDescriptor,
};
use tsdemux_core::record::{descriptor_from_tree, descriptor_to_tree, table_from_tree, table_to_tree};
use tsdemux_core::tables::{stream_type, Broadcaster, NitTransport, PmtStream, SdtService, TransportStreamId};
use tsdemux_core::{
    table_id, BinaryTable, Bit, Descriptor, DescriptorList, Element, Nit, Pat, Pmt, Registry,
    Sdt, Standards, Table, Tdt, TreeContext,
};

const STANDARDS: Standards = Standards::ISDB;

/// Binary and text-tree round trips of a table. Returns the binary form.
fn check_table(table: &dyn Table) -> BinaryTable {
    let registry = Registry::with_default_catalog();
    let ctx = TreeContext {
        registry: &registry,
        standards: STANDARDS,
    };
    let binary = table.encode().unwrap();

    let decoded = registry.decode_table(&binary, STANDARDS);
    assert!(decoded.valid, "{} did not decode", table.xml_name());
    assert_eq!(decoded.record.xml_name(), table.xml_name());
    assert_eq!(decoded.record.encode().unwrap(), binary);

    let json = table_to_tree(table, &ctx).to_json().unwrap();
    let element = Element::from_json(&json).unwrap();
    let rebuilt = table_from_tree(&element, &ctx).unwrap();
    assert_eq!(rebuilt.encode().unwrap(), binary, "tree round trip of {}", table.xml_name());
    binary
}

fn check_descriptor(descriptor: &dyn Descriptor) {
    let registry = Registry::with_default_catalog();
    let ctx = TreeContext {
        registry: &registry,
        standards: STANDARDS,
    };
    let block = descriptor.encode().unwrap();

    let mut list = DescriptorList::new(table_id::NIT_ACTUAL);
    list.push(block.clone());
    let resolved = list.resolve(0, &registry, STANDARDS).unwrap();
    assert!(resolved.valid, "{} did not decode", descriptor.xml_name());
    assert_eq!(resolved.record.xml_name(), descriptor.xml_name());
    assert_eq!(resolved.record.encode().unwrap(), block);

    let element = descriptor_to_tree(descriptor, &ctx);
    let rebuilt = descriptor_from_tree(&element, &ctx).unwrap();
    assert_eq!(rebuilt.encode().unwrap(), block, "tree round trip of {}", descriptor.xml_name());
}

#[test]
fn pat_roundtrip() {
    let mut pat = Pat::default();
    pat.version = 7;
    pat.transport_stream_id = 0x7FE0;
    pat.programs.insert(0, 0x0010);
    for i in 0..300u16 {
        pat.programs.insert(0x0400 + i, 0x0100 + i);
    }
    let binary = check_table(&pat);
    // 301 entries of 4 bytes do not fit in one section.
    assert_eq!(binary.section_count(), 2);
}

#[test]
fn pmt_roundtrip() {
    let mut pmt = Pmt::default();
    pmt.version = 2;
    pmt.service_id = 0x0400;
    pmt.pcr_pid = 0x01FF;
    pmt.descs
        .add(&CaDescriptor {
            ca_system_id: 0x0005,
            ca_pid: 0x0901,
            private_data: vec![],
        })
        .unwrap();

    let mut video = PmtStream::new(stream_type::MPEG2_VIDEO);
    video.descs.add(&StreamIdentifierDescriptor { component_tag: 0x00 }).unwrap();
    pmt.streams.insert(0x0111, video);
    let mut audio = PmtStream::new(stream_type::AAC_AUDIO);
    audio.descs.add(&StreamIdentifierDescriptor { component_tag: 0x10 }).unwrap();
    pmt.streams.insert(0x0112, audio);

    check_table(&pmt);
    assert_eq!(pmt.video_pids(), vec![0x0111]);
    assert_eq!(pmt.audio_pids(), vec![0x0112]);
}

#[test]
fn nit_roundtrip() {
    let registry = Registry::with_default_catalog();
    let mut nit = Nit::default();
    nit.network_id = 0x7FE0;
    nit.descs
        .add(&NetworkNameDescriptor {
            name: "Tokyo".into(),
        })
        .unwrap();
    nit.descs
        .add(&TsInformationDescriptor {
            remote_control_key_id: 1,
            ts_name: "NHK".into(),
            transmission_types: vec![TransmissionType {
                transmission_type_info: 0x0F,
                service_ids: vec![0x0400],
            }],
        })
        .unwrap();

    let mut transport = NitTransport {
        descs: DescriptorList::new(table_id::NIT_ACTUAL),
    };
    transport
        .descs
        .add(&TerrestrialDeliveryDescriptor {
            area_code: 0x7E3,
            guard_interval: 2,
            transmission_mode: 3,
            frequencies: vec![3900],
        })
        .unwrap();
    transport
        .descs
        .add(&ServiceListDescriptor {
            entries: vec![ServiceListEntry {
                service_id: 0x0400,
                service_type: 0x01,
            }],
        })
        .unwrap();
    let id = TransportStreamId {
        transport_stream_id: 0x7FE0,
        original_network_id: 0x7FE0,
    };
    nit.transports.insert(id, transport);

    check_table(&nit);
    assert_eq!(nit.network_name(&registry, STANDARDS).as_deref(), Some("Tokyo"));
    assert_eq!(nit.transport_stream_ids(), vec![id]);
}

#[test]
fn sdt_roundtrip() {
    let registry = Registry::with_default_catalog();
    let mut sdt = Sdt::default();
    sdt.transport_stream_id = 0x7FE0;
    sdt.original_network_id = 0x7FE0;
    let mut service = SdtService::new(table_id::SDT_ACTUAL);
    service.eit_present_following = true;
    service.running_status = 4;
    service
        .descs
        .add(&ServiceDescriptor {
            service_type: 0x01,
            provider_name: "NHK".into(),
            service_name: "NHK G".into(),
        })
        .unwrap();
    sdt.services.insert(0x0400, service);

    check_table(&sdt);
    assert_eq!(sdt.service_name(0x0400, &registry, STANDARDS).as_deref(), Some("NHK G"));
}

#[test]
fn bit_roundtrip() {
    let mut bit = Bit::default();
    bit.original_network_id = 0x0004;
    bit.broadcast_view_propriety = true;
    bit.broadcasters.insert(1, Broadcaster::default());
    bit.broadcasters.insert(2, Broadcaster::default());
    check_table(&bit);
}

#[test]
fn tdt_roundtrip() {
    let tdt = Tdt {
        utc_time: NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(23, 59, 58))
            .unwrap(),
    };
    let binary = check_table(&tdt);
    assert!(binary.is_short());
}

#[test]
fn descriptor_roundtrips() {
    check_descriptor(&CaDescriptor {
        ca_system_id: 0x0005,
        ca_pid: 0x01F0,
        private_data: vec![1, 2, 3],
    });
    check_descriptor(&NetworkNameDescriptor { name: "net".into() });
    check_descriptor(&ServiceListDescriptor {
        entries: vec![
            ServiceListEntry { service_id: 1, service_type: 1 },
            ServiceListEntry { service_id: 2, service_type: 0xC0 },
        ],
    });
    check_descriptor(&SatelliteDeliveryDescriptor {
        frequency: 1_172_748,
        orbital_position: 1100,
        west_east_flag: true,
        polarization: 1,
        roll_off: 0,
        modulation_system: 1,
        modulation_type: 2,
        symbol_rate: 288_600,
        fec_inner: 3,
    });
    check_descriptor(&ServiceDescriptor {
        service_type: 0x01,
        provider_name: "p".into(),
        service_name: vec![0x0E, 0x4E, 0x48, 0x4B].into(),
    });
    check_descriptor(&StreamIdentifierDescriptor { component_tag: 0x30 });
    check_descriptor(&AacDescriptor {
        profile_and_level: 0x58,
        saoc_de: false,
        aac_type: Some(0x03),
        additional_info: vec![],
    });
    check_descriptor(&TsInformationDescriptor {
        remote_control_key_id: 3,
        ts_name: "TBS".into(),
        transmission_types: vec![],
    });
    check_descriptor(&TerrestrialDeliveryDescriptor {
        area_code: 0x123,
        guard_interval: 0,
        transmission_mode: 2,
        frequencies: vec![3600, 3614],
    });
}

#[test]
fn unknown_table_stays_raw() {
    use tsdemux_core::{PsiHeader, RawTable, Section};

    let section = Section::new_long(PsiHeader::long(0xA0, true, 3, 4, true, 0, 0), &[9, 8, 7]).unwrap();
    let binary = BinaryTable::from_sections([section]).unwrap();
    let registry = Registry::with_default_catalog();
    let decoded = registry.decode_table(&binary, STANDARDS);
    assert!(decoded.valid);
    let raw = decoded.downcast_ref::<RawTable>().unwrap();
    assert_eq!(raw.payloads, vec![vec![9, 8, 7]]);
    assert_eq!(decoded.record.encode().unwrap(), binary);
}
