//! PMT (Program Map Table).
//!
//! The PMT contains information about a specific program/service,
//! including the PIDs of its elementary streams (video, audio, etc.).

use crate::buffer::{PsiReader, PsiWriter, SectionsBuilder};
use crate::descriptor_list::DescriptorList;
use crate::entry_list::{Entry, EntryList};
use crate::error::TreeError;
use crate::pid;
use crate::record::{Record, Table, TreeContext};
use crate::section::Section;
use crate::table_id;
use crate::tree::Element;

/// Stream type constants.
pub mod stream_type {
    /// MPEG-1 Video.
    pub const MPEG1_VIDEO: u8 = 0x01;
    /// MPEG-2 Video.
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-1 Audio.
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 Audio.
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// MPEG-2 Private Sections.
    pub const PRIVATE_SECTIONS: u8 = 0x05;
    /// MPEG-2 PES Private Data.
    pub const PES_PRIVATE_DATA: u8 = 0x06;
    /// DSM-CC type D (data carousel).
    pub const DSMCC_D: u8 = 0x0D;
    /// AAC Audio (ADTS).
    pub const AAC_AUDIO: u8 = 0x0F;
    /// AAC Audio (LATM).
    pub const AAC_LATM: u8 = 0x11;
    /// MPEG-4 Video (H.264/AVC).
    pub const H264_VIDEO: u8 = 0x1B;
    /// HEVC Video (H.265).
    pub const H265_VIDEO: u8 = 0x24;
}

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// Stream type.
    pub stream_type: u8,
    /// ES info descriptors.
    pub descs: DescriptorList,
}

impl PmtStream {
    pub fn new(stream_type: u8) -> Self {
        PmtStream {
            stream_type,
            descs: DescriptorList::new(table_id::PMT),
        }
    }

    /// Check if this is a video stream.
    pub fn is_video(&self) -> bool {
        matches!(
            self.stream_type,
            stream_type::MPEG1_VIDEO
                | stream_type::MPEG2_VIDEO
                | stream_type::H264_VIDEO
                | stream_type::H265_VIDEO
        )
    }

    /// Check if this is an audio stream.
    pub fn is_audio(&self) -> bool {
        matches!(
            self.stream_type,
            stream_type::MPEG1_AUDIO
                | stream_type::MPEG2_AUDIO
                | stream_type::AAC_AUDIO
                | stream_type::AAC_LATM
        )
    }

    /// Get a human-readable stream type name.
    pub fn stream_type_name(&self) -> &'static str {
        match self.stream_type {
            stream_type::MPEG1_VIDEO => "MPEG-1 Video",
            stream_type::MPEG2_VIDEO => "MPEG-2 Video",
            stream_type::MPEG1_AUDIO => "MPEG-1 Audio",
            stream_type::MPEG2_AUDIO => "MPEG-2 Audio",
            stream_type::PRIVATE_SECTIONS => "Private Sections",
            stream_type::PES_PRIVATE_DATA => "PES Private Data",
            stream_type::DSMCC_D => "DSM-CC Data",
            stream_type::H264_VIDEO => "H.264/AVC Video",
            stream_type::H265_VIDEO => "H.265/HEVC Video",
            stream_type::AAC_AUDIO => "AAC Audio (ADTS)",
            stream_type::AAC_LATM => "AAC Audio (LATM)",
            _ => "Unknown",
        }
    }
}

impl Entry<u16> for PmtStream {
    fn write_entry(&self, elementary_pid: &u16, w: &mut PsiWriter) {
        w.put_u8(self.stream_type);
        w.put_reserved(3);
        w.put_bits(*elementary_pid as u64, 13);
        self.descs.write_with_length(w);
    }
}

/// Program map table, keyed by service id. Streams are keyed by
/// elementary PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    pub version: u8,
    pub is_current: bool,
    pub service_id: u16,
    pub pcr_pid: u16,
    pub descs: DescriptorList,
    pub streams: EntryList<u16, PmtStream>,
}

impl Default for Pmt {
    fn default() -> Self {
        Pmt {
            version: 0,
            is_current: true,
            service_id: 0,
            pcr_pid: pid::NULL,
            descs: DescriptorList::new(table_id::PMT),
            streams: EntryList::new(),
        }
    }
}

impl Pmt {
    /// PIDs of video streams, in table order.
    pub fn video_pids(&self) -> Vec<u16> {
        self.streams
            .iter()
            .filter(|(_, s)| s.is_video())
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// PIDs of audio streams, in table order.
    pub fn audio_pids(&self) -> Vec<u16> {
        self.streams
            .iter()
            .filter(|(_, s)| s.is_audio())
            .map(|(pid, _)| *pid)
            .collect()
    }
}

impl Record for Pmt {
    fn xml_name(&self) -> &'static str {
        "PMT"
    }

    fn clear(&mut self) {
        *self = Pmt::default();
    }

    fn build_tree(&self, element: &mut Element, ctx: &TreeContext<'_>) {
        element
            .set_hex("service_id", self.service_id, 4)
            .set_hex("PCR_PID", self.pcr_pid, 4);
        self.descs.build_tree(element, ctx);
        for (pid, stream) in self.streams.iter() {
            let child = element.add_element("component");
            child
                .set_hex("elementary_PID", *pid, 4)
                .set_hex("stream_type", stream.stream_type, 2);
            stream.descs.build_tree(child, ctx);
        }
    }

    fn analyze_tree(&mut self, element: &Element, ctx: &TreeContext<'_>) -> Result<(), TreeError> {
        self.service_id = element.get_int("service_id")?;
        self.pcr_pid = element.get_int_or("PCR_PID", pid::NULL)?;
        self.descs.analyze_tree(element, ctx, &["component"])?;
        for child in element.children_named("component") {
            let mut stream = PmtStream::new(child.get_int("stream_type")?);
            stream.descs.analyze_tree(child, ctx, &[])?;
            self.streams.insert(child.get_int("elementary_PID")?, stream);
        }
        Ok(())
    }
}

impl Table for Pmt {
    fn table_id(&self) -> u8 {
        table_id::PMT
    }

    fn is_private(&self) -> bool {
        false
    }

    fn table_id_extension(&self) -> u16 {
        self.service_id
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
        self.service_id = section.table_id_extension();
        r.skip_bits(3);
        self.pcr_pid = r.read_bits(13) as u16;
        self.descs.read_with_length(r);

        while r.can_read() {
            let mut stream = PmtStream::new(r.read_u8());
            r.skip_bits(3);
            let elementary_pid = r.read_bits(13) as u16;
            stream.descs.read_with_length(r);
            if !r.error() && !self.streams.insert_new(elementary_pid, stream) {
                r.set_error();
            }
        }
    }

    fn serialize_payload(&self, out: &mut SectionsBuilder) {
        self.streams.serialize_into(out, |w, first| {
            w.put_reserved(3);
            w.put_bits(self.pcr_pid as u64, 13);
            if first {
                self.descs.write_with_length(w);
            } else {
                DescriptorList::new(table_id::PMT).write_with_length(w);
            }
            None
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::PsiHeader;
    use crate::table::BinaryTable;

    #[test]
    fn test_parse_pmt() {
        let data = [
            // PCR PID 0x0100, no program info
            0xE1, 0x00, 0xF0, 0x00,
            // H.264 video on 0x0100 with stream_identifier descriptor
            0x1B, 0xE1, 0x00, 0xF0, 0x03, 0x52, 0x01, 0x00,
            // AAC audio on 0x0110
            0x0F, 0xE1, 0x10, 0xF0, 0x00,
        ];
        let header = PsiHeader::long(table_id::PMT, false, 0x0400, 2, true, 0, 0);
        let binary =
            BinaryTable::from_sections([Section::new_long(header, &data).unwrap()]).unwrap();

        let mut pmt = Pmt::default();
        assert!(pmt.decode(&binary));
        assert_eq!(pmt.service_id, 0x0400);
        assert_eq!(pmt.pcr_pid, 0x0100);
        assert_eq!(pmt.video_pids(), vec![0x0100]);
        assert_eq!(pmt.audio_pids(), vec![0x0110]);

        let video = pmt.streams.get(&0x0100).unwrap();
        assert_eq!(video.stream_type_name(), "H.264/AVC Video");
        assert_eq!(video.descs.len(), 1);

        assert_eq!(pmt.encode().unwrap(), binary);
    }

    #[test]
    fn test_stream_type_name() {
        assert_eq!(PmtStream::new(0x02).stream_type_name(), "MPEG-2 Video");
        assert_eq!(PmtStream::new(0xFE).stream_type_name(), "Unknown");
        assert!(PmtStream::new(0x11).is_audio());
        assert!(!PmtStream::new(0x06).is_video());
    }
}
