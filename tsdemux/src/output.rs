//! Table collection and rendering for the `tables` command.

use std::collections::HashSet;
use std::sync::Arc;

use colored::Colorize;
use serde::Deserialize;
use tracing::{debug, info, warn};
use tsdemux_core::{
    BinaryTable, DemuxHandler, DemuxedSection, DemuxedTable, Nit, Pat, Pmt, Registry, Sdt,
    Section, SectionError, SectionFile, Standards, Table, Tdt, TreeContext, Decoded,
};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One colored line per table.
    #[default]
    Summary,
    /// Text tree in JSON.
    Json,
    /// Text tree in XML.
    Xml,
}

/// Collects demuxed tables into a section file, printing a summary line
/// for each one when the format is [`OutputFormat::Summary`].
pub struct TableCollector {
    registry: Arc<Registry>,
    standards: Standards,
    format: OutputFormat,
    file: SectionFile,
    follow_pmt: bool,
    known_pmt_pids: HashSet<u16>,
    new_pids: Vec<u16>,
}

impl TableCollector {
    pub fn new(registry: Arc<Registry>, standards: Standards, format: OutputFormat) -> Self {
        TableCollector {
            registry,
            standards,
            format,
            file: SectionFile::new(),
            follow_pmt: false,
            known_pmt_pids: HashSet::new(),
            new_pids: Vec::new(),
        }
    }

    /// Report PMT PIDs found in PATs through [`TableCollector::take_new_pids`].
    pub fn follow_pmt(mut self, follow: bool) -> Self {
        self.follow_pmt = follow;
        self
    }

    /// PMT PIDs discovered since the last call.
    pub fn take_new_pids(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.new_pids)
    }

    pub fn file(&self) -> &SectionFile {
        &self.file
    }

    pub fn into_file(self) -> SectionFile {
        self.file
    }

    /// Render the collected tables as a text tree.
    pub fn render_tree(&self) -> Result<Option<String>, tsdemux_core::TreeError> {
        let ctx = TreeContext {
            registry: &self.registry,
            standards: self.standards,
        };
        match self.format {
            OutputFormat::Summary => Ok(None),
            OutputFormat::Json => self.file.to_json(&ctx).map(Some),
            OutputFormat::Xml => Ok(Some(self.file.to_xml(&ctx))),
        }
    }

    fn watch_pat(&mut self, pat: &Pat) {
        if !self.follow_pmt {
            return;
        }
        for program in pat.program_numbers() {
            if let Some(pid) = pat.pmt_pid(program) {
                if self.known_pmt_pids.insert(pid) {
                    debug!("PMT of service 0x{:04X} on PID 0x{:04X}", program, pid);
                    self.new_pids.push(pid);
                }
            }
        }
    }

    fn print_summary(&self, pid: u16, binary: &BinaryTable, table: &Decoded<dyn Table>) {
        if self.format != OutputFormat::Summary {
            return;
        }
        let name = if table.valid {
            table.record.xml_name().green().bold()
        } else {
            table.record.xml_name().red().bold()
        };
        let mut line = format!(
            "PID 0x{:04X}  {:<20} id 0x{:02X}",
            pid,
            name,
            binary.table_id()
        );
        if !binary.is_short() {
            line.push_str(&format!(
                "  ext 0x{:04X}  v{:<2}  {} section(s)",
                binary.table_id_extension(),
                binary.version(),
                binary.section_count()
            ));
        }
        if let Some(details) = self.details(table) {
            line.push_str(&format!("  {}", details.dimmed()));
        }
        println!("{}", line);
    }

    fn details(&self, table: &Decoded<dyn Table>) -> Option<String> {
        if let Some(pat) = table.valid_ref::<Pat>() {
            let programs: Vec<String> = pat
                .program_numbers()
                .iter()
                .filter_map(|&p| pat.pmt_pid(p).map(|pid| format!("0x{:04X}->0x{:04X}", p, pid)))
                .collect();
            return Some(format!("programs: {}", programs.join(", ")));
        }
        if let Some(pmt) = table.valid_ref::<Pmt>() {
            let streams: Vec<String> = pmt
                .streams
                .iter()
                .map(|(pid, s)| format!("0x{:04X} {}", pid, s.stream_type_name()))
                .collect();
            return Some(format!(
                "service 0x{:04X}, PCR 0x{:04X}: {}",
                pmt.service_id,
                pmt.pcr_pid,
                streams.join(", ")
            ));
        }
        if let Some(sdt) = table.valid_ref::<Sdt>() {
            let services: Vec<String> = sdt
                .services
                .iter()
                .map(|(id, _)| match sdt.service_name(*id, &self.registry, self.standards) {
                    Some(name) => format!("0x{:04X} \"{}\"", id, name),
                    None => format!("0x{:04X}", id),
                })
                .collect();
            return Some(format!("services: {}", services.join(", ")));
        }
        if let Some(nit) = table.valid_ref::<Nit>() {
            let name = nit
                .network_name(&self.registry, self.standards)
                .unwrap_or_default();
            return Some(format!(
                "network 0x{:04X} \"{}\", {} transport(s)",
                nit.network_id,
                name,
                nit.transports.len()
            ));
        }
        table
            .valid_ref::<Tdt>()
            .map(|tdt| tdt.utc_time.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl DemuxHandler for TableCollector {
    fn handle_table(&mut self, table: DemuxedTable) {
        let pid = table.pid();
        // Entries of a PAT that does not re-encode exactly are still usable.
        if let Some(pat) = table.table.downcast_ref::<Pat>() {
            self.watch_pat(pat);
        }
        self.print_summary(pid, &table.binary, &table.table);
        self.file.add_table(table.binary);
    }

    fn handle_short_section(&mut self, section: DemuxedSection) {
        let pid = section.section.source_pid();
        match BinaryTable::from_sections([section.section]) {
            Ok(binary) => {
                self.print_summary(pid, &binary, &section.table);
                self.file.add_table(binary);
            }
            Err(e) => warn!("PID 0x{:04X}: short section dropped: {}", pid, e),
        }
    }

    fn handle_invalid_section(&mut self, section: Section, error: SectionError) {
        warn!(
            "PID 0x{:04X}: invalid section (table id 0x{:02X}): {}",
            section.source_pid(),
            section.table_id(),
            error
        );
    }

    fn handle_discontinuity(&mut self, pid: u16) {
        info!("PID 0x{:04X}: discontinuity", pid);
    }
}
