//! Descriptor types.
//!
//! # Supported Descriptors
//! - CA_descriptor (0x09) - MPEG, any table
//! - network_name_descriptor (0x40) - DVB
//! - service_list_descriptor (0x41) - DVB
//! - satellite_delivery_system_descriptor (0x43) - DVB
//! - service_descriptor (0x48) - DVB
//! - stream_identifier_descriptor (0x52) - DVB
//! - AAC_descriptor (0x7C) - DVB
//! - TS_information_descriptor (0xCD) - ISDB
//! - ISDB_terrestrial_delivery_system_descriptor (0xFA) - ISDB

mod dvb;
mod isdb;
mod mpeg;

pub use dvb::{
    AacDescriptor, NetworkNameDescriptor, SatelliteDeliveryDescriptor, ServiceDescriptor,
    ServiceListDescriptor, ServiceListEntry, StreamIdentifierDescriptor,
};
pub use isdb::{TerrestrialDeliveryDescriptor, TransmissionType, TsInformationDescriptor};
pub use mpeg::CaDescriptor;

use crate::context::Standards;
use crate::descriptor_tag;
use crate::registry::RegistryBuilder;

/// Register every descriptor type of this module.
pub fn register_all(builder: &mut RegistryBuilder) {
    builder
        .descriptor::<CaDescriptor>("CA_descriptor", &[descriptor_tag::CA], Standards::MPEG, &[])
        .descriptor::<NetworkNameDescriptor>(
            "network_name_descriptor",
            &[descriptor_tag::NETWORK_NAME],
            Standards::DVB,
            &[],
        )
        .descriptor::<ServiceListDescriptor>(
            "service_list_descriptor",
            &[descriptor_tag::SERVICE_LIST],
            Standards::DVB,
            &[],
        )
        .descriptor::<SatelliteDeliveryDescriptor>(
            "satellite_delivery_system_descriptor",
            &[descriptor_tag::SATELLITE_DELIVERY],
            Standards::DVB,
            &[],
        )
        .descriptor::<ServiceDescriptor>(
            "service_descriptor",
            &[descriptor_tag::SERVICE],
            Standards::DVB,
            &[],
        )
        .descriptor::<StreamIdentifierDescriptor>(
            "stream_identifier_descriptor",
            &[descriptor_tag::STREAM_IDENTIFIER],
            Standards::DVB,
            &[],
        )
        .descriptor::<AacDescriptor>("AAC_descriptor", &[descriptor_tag::AAC], Standards::DVB, &[])
        .descriptor::<TsInformationDescriptor>(
            "TS_information_descriptor",
            &[descriptor_tag::TS_INFORMATION],
            Standards::ISDB,
            &[],
        )
        .descriptor::<TerrestrialDeliveryDescriptor>(
            "ISDB_terrestrial_delivery_system_descriptor",
            &[descriptor_tag::TERRESTRIAL_DELIVERY],
            Standards::ISDB,
            &[],
        );
}
