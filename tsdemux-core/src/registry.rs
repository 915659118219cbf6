//! Record registry: from (kind, context) to a typed record.
//!
//! Registration happens once, through a [`RegistryBuilder`], before any
//! demux is created. The built [`Registry`] is immutable and shared.
//!
//! Lookup policy, for a table id or descriptor tag:
//!
//! 1. candidates are the registrations for that id whose standards are
//!    empty or intersect the active standards, where MPEG always applies
//!    and ISDB implies DVB;
//! 2. a descriptor registration restricted to enclosing tables ranks above
//!    an unrestricted one, but is only a candidate inside those tables;
//! 3. a standard-specific registration ranks above a generic one;
//! 4. the earliest registration wins remaining ties.
//!
//! Without any candidate the result is a [`RawTable`] or [`RawDescriptor`].

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use once_cell::sync::OnceCell;

use crate::context::Standards;
use crate::descriptor_list::DescriptorBlock;
use crate::error::RegistryError;
use crate::record::{
    Decoded, Descriptor, RawDescriptor, RawTable, Table, GENERIC_DESCRIPTOR, GENERIC_LONG_TABLE,
    GENERIC_SHORT_TABLE,
};
use crate::table::BinaryTable;

/// Creates an empty table.
pub type TableFactory = fn() -> Box<dyn Table>;
/// Creates an empty descriptor.
pub type DescriptorFactory = fn() -> Box<dyn Descriptor>;

fn boxed_table<T: Table + Default>() -> Box<dyn Table> {
    Box::<T>::default()
}

fn boxed_descriptor<T: Descriptor + Default>() -> Box<dyn Descriptor> {
    Box::<T>::default()
}

fn raw_long_table() -> Box<dyn Table> {
    Box::<RawTable>::default()
}

fn raw_short_table() -> Box<dyn Table> {
    Box::new(RawTable::short())
}

/// Context of a descriptor lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorContext {
    pub standards: Standards,
    /// Id of the enclosing table, if known.
    pub table_id: Option<u8>,
}

#[derive(Debug, Clone)]
struct TableRegistration {
    name: &'static str,
    table_ids: Vec<u8>,
    standards: Standards,
    factory: TableFactory,
}

#[derive(Debug, Clone)]
struct DescriptorRegistration {
    name: &'static str,
    tags: Vec<u8>,
    standards: Standards,
    /// Enclosing tables; empty for any table.
    tables: Vec<u8>,
    factory: DescriptorFactory,
}

fn standards_score(registered: Standards, active: Standards) -> Option<u8> {
    if registered.is_empty() {
        Some(0)
    } else if registered.intersects(active) {
        Some(1)
    } else {
        None
    }
}

/// Collects registrations.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tables: Vec<TableRegistration>,
    descriptors: Vec<DescriptorRegistration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table type for some table ids.
    pub fn table<T: Table + Default>(
        &mut self,
        name: &'static str,
        table_ids: &[u8],
        standards: Standards,
    ) -> &mut Self {
        self.table_with(name, table_ids, standards, boxed_table::<T>)
    }

    /// Register a table factory. Registering the same thing twice has no
    /// effect.
    pub fn table_with(
        &mut self,
        name: &'static str,
        table_ids: &[u8],
        standards: Standards,
        factory: TableFactory,
    ) -> &mut Self {
        let duplicate = self
            .tables
            .iter()
            .any(|r| r.name == name && r.table_ids == table_ids && r.standards == standards);
        if !duplicate {
            self.tables.push(TableRegistration {
                name,
                table_ids: table_ids.to_vec(),
                standards,
                factory,
            });
        }
        self
    }

    /// Register a descriptor type for some tags. An empty `tables` means
    /// any enclosing table.
    pub fn descriptor<T: Descriptor + Default>(
        &mut self,
        name: &'static str,
        tags: &[u8],
        standards: Standards,
        tables: &[u8],
    ) -> &mut Self {
        self.descriptor_with(name, tags, standards, tables, boxed_descriptor::<T>)
    }

    /// Register a descriptor factory. Registering the same thing twice has
    /// no effect.
    pub fn descriptor_with(
        &mut self,
        name: &'static str,
        tags: &[u8],
        standards: Standards,
        tables: &[u8],
        factory: DescriptorFactory,
    ) -> &mut Self {
        let duplicate = self.descriptors.iter().any(|r| {
            r.name == name && r.tags == tags && r.standards == standards && r.tables == tables
        });
        if !duplicate {
            self.descriptors.push(DescriptorRegistration {
                name,
                tags: tags.to_vec(),
                standards,
                tables: tables.to_vec(),
                factory,
            });
        }
        self
    }

    /// Freeze the registrations.
    pub fn build(self) -> Registry {
        let mut table_names = HashMap::new();
        table_names.insert(GENERIC_LONG_TABLE, raw_long_table as TableFactory);
        table_names.insert(GENERIC_SHORT_TABLE, raw_short_table as TableFactory);
        for r in &self.tables {
            table_names.entry(r.name).or_insert(r.factory);
        }

        let mut descriptor_names = HashMap::new();
        descriptor_names.insert(
            GENERIC_DESCRIPTOR,
            boxed_descriptor::<RawDescriptor> as DescriptorFactory,
        );
        for r in &self.descriptors {
            descriptor_names.entry(r.name).or_insert(r.factory);
        }

        debug!(
            "registry built: {} table types, {} descriptor types",
            self.tables.len(),
            self.descriptors.len()
        );

        Registry {
            tables: self.tables,
            descriptors: self.descriptors,
            table_names,
            descriptor_names,
        }
    }
}

/// Immutable set of registrations.
#[derive(Debug)]
pub struct Registry {
    tables: Vec<TableRegistration>,
    descriptors: Vec<DescriptorRegistration>,
    table_names: HashMap<&'static str, TableFactory>,
    descriptor_names: HashMap<&'static str, DescriptorFactory>,
}

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry with every table and descriptor type of this crate.
    pub fn with_default_catalog() -> Registry {
        let mut builder = RegistryBuilder::new();
        crate::tables::register_all(&mut builder);
        crate::descriptors::register_all(&mut builder);
        builder.build()
    }

    /// Install the process-wide registry. Must happen before the first
    /// call to [`Registry::global`].
    pub fn install(registry: Registry) -> Result<(), RegistryError> {
        GLOBAL
            .set(Arc::new(registry))
            .map_err(|_| RegistryError::AlreadyInstalled)
    }

    /// Process-wide registry, the default catalog unless one was installed.
    pub fn global() -> Arc<Registry> {
        GLOBAL
            .get_or_init(|| Arc::new(Registry::with_default_catalog()))
            .clone()
    }

    fn lookup_table(&self, table_id: u8, standards: Standards) -> Option<&TableRegistration> {
        let active = standards.with_implied();
        self.tables
            .iter()
            .enumerate()
            .filter(|(_, r)| r.table_ids.contains(&table_id))
            .filter_map(|(i, r)| standards_score(r.standards, active).map(|s| (s, i, r)))
            .max_by_key(|(s, i, _)| (*s, Reverse(*i)))
            .map(|(_, _, r)| r)
    }

    fn lookup_descriptor(&self, tag: u8, ctx: DescriptorContext) -> Option<&DescriptorRegistration> {
        let active = ctx.standards.with_implied();
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, r)| r.tags.contains(&tag))
            .filter_map(|(i, r)| {
                let table_score = if r.tables.is_empty() {
                    0
                } else if ctx.table_id.is_some_and(|t| r.tables.contains(&t)) {
                    1
                } else {
                    return None;
                };
                standards_score(r.standards, active).map(|s| ((table_score, s), i, r))
            })
            .max_by_key(|(s, i, _)| (*s, Reverse(*i)))
            .map(|(_, _, r)| r)
    }

    /// Name of the type a table id resolves to.
    pub fn table_name(&self, table_id: u8, standards: Standards) -> Option<&'static str> {
        self.lookup_table(table_id, standards).map(|r| r.name)
    }

    /// Name of the type a descriptor tag resolves to.
    pub fn descriptor_name(&self, tag: u8, ctx: DescriptorContext) -> Option<&'static str> {
        self.lookup_descriptor(tag, ctx).map(|r| r.name)
    }

    /// Empty table for a table id, raw when not registered.
    pub fn new_table(&self, table_id: u8, standards: Standards) -> Box<dyn Table> {
        match self.lookup_table(table_id, standards) {
            Some(r) => (r.factory)(),
            None => raw_long_table(),
        }
    }

    /// Empty descriptor for a tag, raw when not registered.
    pub fn new_descriptor(&self, tag: u8, ctx: DescriptorContext) -> Box<dyn Descriptor> {
        match self.lookup_descriptor(tag, ctx) {
            Some(r) => (r.factory)(),
            None => boxed_descriptor::<RawDescriptor>(),
        }
    }

    /// Empty table for an element name of the text tree.
    pub fn table_by_name(&self, name: &str) -> Option<Box<dyn Table>> {
        self.table_names.get(name).map(|f| f())
    }

    /// Empty descriptor for an element name of the text tree.
    pub fn descriptor_by_name(&self, name: &str) -> Option<Box<dyn Descriptor>> {
        self.descriptor_names.get(name).map(|f| f())
    }

    /// Decode a complete binary table into its typed record.
    pub fn decode_table(&self, table: &BinaryTable, standards: Standards) -> Decoded<dyn Table> {
        let mut record = self.new_table(table.table_id(), standards);
        let valid = record.decode(table);
        trace!(
            "table 0x{:02X} decoded as {}, valid={}",
            table.table_id(),
            record.xml_name(),
            valid
        );
        Decoded { record, valid }
    }

    /// Decode one descriptor block into its typed record.
    pub fn decode_descriptor(
        &self,
        block: &DescriptorBlock,
        ctx: DescriptorContext,
    ) -> Decoded<dyn Descriptor> {
        let mut record = self.new_descriptor(block.tag(), ctx);
        let valid = record.decode(block);
        Decoded { record, valid }
    }
}
