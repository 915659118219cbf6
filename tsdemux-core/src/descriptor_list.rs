//! Descriptor loops.
//!
//! A [`DescriptorList`] stores the raw (tag, payload) blocks of a loop.
//! Typed descriptors are only built when asked for, through the registry,
//! with the id of the enclosing table as lookup context.

use bytes::Bytes;
use log::trace;

use crate::buffer::{PsiReader, PsiWriter};
use crate::context::Standards;
use crate::error::{EncodeError, TreeError};
use crate::record::{
    descriptor_from_tree, descriptor_to_tree, Decoded, Descriptor, RawDescriptor, Record,
    TreeContext,
};
use crate::registry::{DescriptorContext, Registry};
use crate::tree::Element;

/// One descriptor as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorBlock {
    tag: u8,
    payload: Bytes,
}

/// Largest descriptor payload, bounded by the 8-bit length field.
pub const MAX_DESCRIPTOR_PAYLOAD_SIZE: usize = 255;

impl DescriptorBlock {
    /// Fails if the payload does not fit the 8-bit length field.
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Result<Self, EncodeError> {
        let payload = payload.into();
        if payload.len() > MAX_DESCRIPTOR_PAYLOAD_SIZE {
            return Err(EncodeError::DescriptorTooLarge(payload.len()));
        }
        Ok(DescriptorBlock { tag, payload })
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size on the wire, tag and length included.
    pub fn size(&self) -> usize {
        2 + self.payload.len()
    }
}

/// Ordered descriptor blocks of one loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorList {
    table_id: Option<u8>,
    blocks: Vec<DescriptorBlock>,
}

impl DescriptorList {
    /// Empty list inside a table with the given id.
    pub fn new(table_id: u8) -> Self {
        DescriptorList {
            table_id: Some(table_id),
            blocks: Vec::new(),
        }
    }

    /// Empty list outside of any table.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn table_id(&self) -> Option<u8> {
        self.table_id
    }

    pub fn set_table_id(&mut self, table_id: u8) {
        self.table_id = Some(table_id);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn get(&self, index: usize) -> Option<&DescriptorBlock> {
        self.blocks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DescriptorBlock> {
        self.blocks.iter()
    }

    pub fn push(&mut self, block: DescriptorBlock) {
        self.blocks.push(block);
    }

    /// Serialize a typed descriptor and append it.
    pub fn add(&mut self, descriptor: &dyn Descriptor) -> Result<(), EncodeError> {
        self.blocks.push(descriptor.encode()?);
        Ok(())
    }

    /// Size of the serialized loop, without any length field.
    pub fn binary_size(&self) -> usize {
        self.blocks.iter().map(DescriptorBlock::size).sum()
    }

    /// Index of the first descriptor with a tag, from `start`.
    pub fn search(&self, tag: u8, start: usize) -> Option<usize> {
        self.blocks
            .iter()
            .skip(start)
            .position(|b| b.tag == tag)
            .map(|i| i + start)
    }

    /// Lookup context of the descriptors of this list.
    pub fn context(&self, standards: Standards) -> DescriptorContext {
        DescriptorContext {
            standards,
            table_id: self.table_id,
        }
    }

    /// Decode the descriptor at an index.
    pub fn resolve(
        &self,
        index: usize,
        registry: &Registry,
        standards: Standards,
    ) -> Option<Decoded<dyn Descriptor>> {
        let block = self.blocks.get(index)?;
        Some(registry.decode_descriptor(block, self.context(standards)))
    }

    /// Decode every descriptor.
    pub fn resolve_all(&self, registry: &Registry, standards: Standards) -> Vec<Decoded<dyn Descriptor>> {
        let ctx = self.context(standards);
        self.blocks
            .iter()
            .map(|b| registry.decode_descriptor(b, ctx))
            .collect()
    }

    /// First valid descriptor of type `T`.
    pub fn find<T: Descriptor>(&self, registry: &Registry, standards: Standards) -> Option<T> {
        let ctx = self.context(standards);
        self.blocks.iter().find_map(|b| {
            let decoded = registry.decode_descriptor(b, ctx);
            if decoded.valid {
                decoded.into_inner::<T>().map(|d| *d)
            } else {
                None
            }
        })
    }

    /// Read blocks until the reader is exhausted. A truncated block sets
    /// the reader error.
    pub fn read(&mut self, r: &mut PsiReader<'_>) {
        while r.can_read() {
            let tag = r.read_u8();
            let length = r.read_u8() as usize;
            let payload = r.read_slice(length);
            if r.error() {
                trace!("truncated descriptor, tag 0x{:02X}", tag);
                break;
            }
            self.blocks.push(DescriptorBlock {
                tag,
                payload: Bytes::copy_from_slice(payload),
            });
        }
    }

    /// Read a loop preceded by 4 reserved bits and a 12-bit length.
    pub fn read_with_length(&mut self, r: &mut PsiReader<'_>) {
        let mut sub = r.read_length_prefixed(12);
        self.read(&mut sub);
        if sub.error() {
            r.set_error();
        }
    }

    pub fn write(&self, w: &mut PsiWriter) {
        for block in &self.blocks {
            w.put_u8(block.tag);
            w.put_u8(block.payload.len() as u8);
            w.put_bytes(&block.payload);
        }
    }

    /// Write a loop preceded by 4 reserved bits and a 12-bit length.
    pub fn write_with_length(&self, w: &mut PsiWriter) {
        let mark = w.start_length(12);
        self.write(w);
        w.end_length(mark);
    }

    /// Append one element per descriptor to `parent`. A descriptor whose
    /// typed form does not re-encode to the same bytes is written as a
    /// generic descriptor.
    pub fn build_tree(&self, parent: &mut Element, ctx: &TreeContext<'_>) {
        let lookup = self.context(ctx.standards);
        for block in &self.blocks {
            let decoded = ctx.registry.decode_descriptor(block, lookup);
            let exact = decoded.valid
                && decoded
                    .record
                    .encode()
                    .map(|b| b == *block)
                    .unwrap_or(false);
            let element = if exact {
                descriptor_to_tree(&*decoded.record, ctx)
            } else {
                let raw = RawDescriptor {
                    tag: block.tag,
                    payload: block.payload.to_vec(),
                };
                let mut element = Element::new(raw.xml_name());
                raw.build_tree(&mut element, ctx);
                element
            };
            parent.add_child(element);
        }
    }

    /// Load descriptors from the children of `parent`, skipping the
    /// children named in `skip` (the table's own entries).
    pub fn analyze_tree(
        &mut self,
        parent: &Element,
        ctx: &TreeContext<'_>,
        skip: &[&str],
    ) -> Result<(), TreeError> {
        for child in parent.children.iter().filter(|c| !skip.contains(&c.name.as_str())) {
            let descriptor = descriptor_from_tree(child, ctx)?;
            let block = descriptor
                .encode()
                .map_err(|_| TreeError::InvalidAttribute {
                    element: child.name.clone(),
                    attribute: "payload".to_string(),
                    value: "too large".to_string(),
                })?;
            self.blocks.push(block);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DescriptorList {
    type Item = &'a DescriptorBlock;
    type IntoIter = std::slice::Iter<'a, DescriptorBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
