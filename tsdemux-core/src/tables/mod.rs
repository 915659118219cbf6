//! Table types.
//!
//! # Supported Tables
//! - PAT (Program Association Table) - table id 0x00, PID 0x0000
//! - PMT (Program Map Table) - table id 0x02, PIDs from the PAT
//! - NIT (Network Information Table) - table ids 0x40/0x41, PID 0x0010
//! - SDT (Service Description Table) - table ids 0x42/0x46, PID 0x0011
//! - BIT (Broadcaster Information Table, ISDB) - table id 0xC4, PID 0x0024
//! - TDT (Time and Date Table) - table id 0x70, PID 0x0014

mod bit;
mod nit;
mod pat;
mod pmt;
mod sdt;
mod tdt;

pub use bit::{Bit, Broadcaster};
pub use nit::{Nit, NitTransport, TransportStreamId};
pub use pat::Pat;
pub use pmt::{stream_type, Pmt, PmtStream};
pub use sdt::{Sdt, SdtService};
pub use tdt::Tdt;

use crate::context::Standards;
use crate::registry::RegistryBuilder;
use crate::table_id;

/// Register every table type of this module.
pub fn register_all(builder: &mut RegistryBuilder) {
    builder
        .table::<Pat>("PAT", &[table_id::PAT], Standards::MPEG)
        .table::<Pmt>("PMT", &[table_id::PMT], Standards::MPEG)
        .table::<Nit>("NIT", &[table_id::NIT_ACTUAL, table_id::NIT_OTHER], Standards::DVB)
        .table::<Sdt>("SDT", &[table_id::SDT_ACTUAL, table_id::SDT_OTHER], Standards::DVB)
        .table::<Bit>("BIT", &[table_id::BIT], Standards::ISDB)
        .table::<Tdt>("TDT", &[table_id::TDT], Standards::DVB);
}
