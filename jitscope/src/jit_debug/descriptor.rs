//! Width-explicit decoding of remote descriptors and code entries
//!
//! Every decode names the target's address width at runtime, so one build
//! of jitscope serves 32-bit and 64-bit processes alike. Fields are pulled
//! from fixed little-endian offsets published by `jitscope-common`.

use jitscope_common::{
    DescriptorLayout, EntryLayout as RawEntryLayout, DESCRIPTOR_LAYOUT_32, DESCRIPTOR_LAYOUT_64,
    ENTRY_LAYOUT_32, ENTRY_LAYOUT_32_PAD, ENTRY_LAYOUT_64, JIT_DESCRIPTOR_MAGIC,
    JIT_DESCRIPTOR_VERSION,
};

use crate::domain::DecodeError;

/// Code entry layout a descriptor declared through its `sizeof_entry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryLayout {
    /// 32-bit target, `u64` aligned to 4 bytes
    Packed32,
    /// 32-bit target, `u64` aligned to 8 bytes
    Padded32,
    #[default]
    Wide64,
}

impl EntryLayout {
    fn raw(self) -> &'static RawEntryLayout {
        match self {
            EntryLayout::Packed32 => &ENTRY_LAYOUT_32,
            EntryLayout::Padded32 => &ENTRY_LAYOUT_32_PAD,
            EntryLayout::Wide64 => &ENTRY_LAYOUT_64,
        }
    }

    /// Bytes to read for one entry
    #[must_use]
    pub fn size(self) -> usize {
        self.raw().size
    }
}

/// Architecture-independent view of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor {
    /// Even when quiescent, odd while the runtime is changing the list
    pub action_seqlock: u32,
    /// Monotonic time of the last completed change
    pub action_timestamp: u64,
    /// Newest entry, 0 if the list is empty
    pub first_entry: u64,
    pub entry_layout: EntryLayout,
}

impl Descriptor {
    /// A writer was active when this snapshot was taken
    #[must_use]
    pub fn is_being_modified(&self) -> bool {
        self.action_seqlock & 1 == 1
    }
}

/// Architecture-independent view of a code entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    /// Remote address the entry was read from
    pub addr: u64,
    pub next: u64,
    pub prev: u64,
    pub symfile_addr: u64,
    pub symfile_size: u64,
    pub register_timestamp: u64,
}

impl CodeEntry {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.symfile_addr > 0 && self.symfile_size > 0
    }
}

/// Size of one descriptor for the given width
#[must_use]
pub fn descriptor_size(is_64bit: bool) -> usize {
    descriptor_layout(is_64bit).size
}

fn descriptor_layout(is_64bit: bool) -> &'static DescriptorLayout {
    if is_64bit {
        &DESCRIPTOR_LAYOUT_64
    } else {
        &DESCRIPTOR_LAYOUT_32
    }
}

/// Decode a descriptor
///
/// # Errors
/// Fails closed on a short buffer, wrong magic or version, or declared
/// struct sizes that don't match this width.
pub fn decode_descriptor(is_64bit: bool, bytes: &[u8]) -> Result<Descriptor, DecodeError> {
    let layout = descriptor_layout(is_64bit);
    if bytes.len() < layout.size {
        return Err(DecodeError::Truncated { need: layout.size, got: bytes.len() });
    }

    let mut magic = [0u8; 8];
    magic.copy_from_slice(&bytes[layout.magic..layout.magic + 8]);
    if magic != JIT_DESCRIPTOR_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let version = read_u32(bytes, layout.version);
    if version != JIT_DESCRIPTOR_VERSION {
        return Err(DecodeError::BadVersion(version));
    }

    let declared = read_u32(bytes, layout.sizeof_descriptor);
    if declared as usize != layout.size {
        return Err(DecodeError::DescriptorSize { declared, expected: layout.size });
    }

    let sizeof_entry = read_u32(bytes, layout.sizeof_entry);
    let entry_layout = entry_layout_for(is_64bit, sizeof_entry)?;

    Ok(Descriptor {
        action_seqlock: read_u32(bytes, layout.action_seqlock),
        action_timestamp: read_u64(bytes, layout.action_timestamp),
        first_entry: read_addr(bytes, layout.first_entry, layout.addr_size),
        entry_layout,
    })
}

fn entry_layout_for(is_64bit: bool, sizeof_entry: u32) -> Result<EntryLayout, DecodeError> {
    let candidates: &[EntryLayout] = if is_64bit {
        &[EntryLayout::Wide64]
    } else {
        &[EntryLayout::Packed32, EntryLayout::Padded32]
    };
    candidates
        .iter()
        .copied()
        .find(|layout| layout.size() == sizeof_entry as usize)
        .ok_or(DecodeError::EntrySize(sizeof_entry))
}

/// Decode the code entry read from remote address `addr`
///
/// # Errors
/// Returns [`DecodeError::Truncated`] if `bytes` is shorter than the layout.
pub fn decode_entry(layout: EntryLayout, addr: u64, bytes: &[u8]) -> Result<CodeEntry, DecodeError> {
    let raw = layout.raw();
    if bytes.len() < raw.size {
        return Err(DecodeError::Truncated { need: raw.size, got: bytes.len() });
    }

    Ok(CodeEntry {
        addr,
        next: read_addr(bytes, raw.next, raw.addr_size),
        prev: read_addr(bytes, raw.prev, raw.addr_size),
        symfile_addr: read_addr(bytes, raw.symfile_addr, raw.addr_size),
        symfile_size: read_u64(bytes, raw.symfile_size),
        register_timestamp: read_u64(bytes, raw.register_timestamp),
    })
}

// Callers check the buffer length against the layout first.

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn read_addr(bytes: &[u8], offset: usize, addr_size: usize) -> u64 {
    if addr_size == 8 {
        read_u64(bytes, offset)
    } else {
        u64::from(read_u32(bytes, offset))
    }
}
