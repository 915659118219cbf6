//! TDT (Time and Date Table), a short-form table.
//!
//! The time is encoded on 40 bits: a 16-bit Modified Julian Date and six
//! BCD digits for hours, minutes and seconds.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::error::TreeError;
use crate::record::{Record, Table, TreeContext};
use crate::section::Section;
use crate::table_id;
use crate::tree::Element;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn mjd_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1858, 11, 17)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Read a 40-bit MJD/BCD time. Invalid BCD sets the reader error.
fn read_mjd_time(r: &mut PsiReader<'_>) -> NaiveDateTime {
    let mjd = r.read_u16();
    let hours = r.read_bcd(2);
    let minutes = r.read_bcd(2);
    let seconds = r.read_bcd(2);
    if hours > 23 || minutes > 59 || seconds > 59 {
        r.set_error();
        return mjd_epoch();
    }
    mjd_epoch()
        + Duration::days(mjd as i64)
        + Duration::seconds((hours * 3600 + minutes * 60 + seconds) as i64)
}

/// Write a 40-bit MJD/BCD time. Dates outside the MJD range are clamped.
fn write_mjd_time(w: &mut PsiWriter, time: &NaiveDateTime) {
    let days = time
        .date()
        .signed_duration_since(mjd_epoch().date())
        .num_days()
        .clamp(0, u16::MAX as i64);
    w.put_u16(days as u16);
    w.put_bcd(time.hour(), 2);
    w.put_bcd(time.minute(), 2);
    w.put_bcd(time.second(), 2);
}

/// Time and date table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tdt {
    /// UTC in DVB, JST in ISDB.
    pub utc_time: NaiveDateTime,
}

impl Default for Tdt {
    fn default() -> Self {
        Tdt {
            utc_time: mjd_epoch(),
        }
    }
}

impl Record for Tdt {
    fn xml_name(&self) -> &'static str {
        "TDT"
    }

    fn clear(&mut self) {
        *self = Tdt::default();
    }

    fn build_tree(&self, element: &mut Element, _ctx: &TreeContext<'_>) {
        element.set_attr("UTC_time", self.utc_time.format(TIME_FORMAT));
    }

    fn analyze_tree(&mut self, element: &Element, _ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        let value = element.attr("UTC_time").ok_or_else(|| TreeError::MissingAttribute {
            element: element.name.clone(),
            attribute: "UTC_time".to_string(),
        })?;
        self.utc_time = NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|_| {
            TreeError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "UTC_time".to_string(),
                value: value.to_string(),
            }
        })?;
        Ok(())
    }
}

impl Table for Tdt {
    fn table_id(&self) -> u8 {
        table_id::TDT
    }

    fn is_long(&self) -> bool {
        false
    }

    fn deserialize_payload(&mut self, r: &mut PsiReader<'_>, _section: &Section) {
        self.utc_time = read_mjd_time(r);
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        write_mjd_time(out.writer(), &self.utc_time);
    }
}
