//! # Shared Remote Layouts (ART runtime ↔ jitscope)
//!
//! Defines the memory layouts of the structures the ART runtime publishes
//! for debuggers and profilers. The runtime keeps two descriptors in
//! `libart.so` (`__jit_debug_descriptor` and `__dex_debug_descriptor`), each
//! heading a doubly linked list of code entries.
//!
//! The monitored process may be built for a different width than jitscope,
//! so nothing here is ever transmuted from remote bytes. The `#[repr(C)]`
//! structs document each layout and the `*_LAYOUT_*` constants expose the
//! byte offsets the decoder reads at.
//!
//! ## Key Types
//!
//! - [`JitDescriptor32`] / [`JitDescriptor64`] - list head plus sequence lock
//! - [`JitCodeEntry32`] / [`JitCodeEntry32Pad`] / [`JitCodeEntry64`] - list nodes
//! - [`DescriptorLayout`] / [`EntryLayout`] - field offsets per width

#![cfg_attr(not(test), no_std)]

use core::mem::{offset_of, size_of};

// ============================================================================
// Constants
// ============================================================================

/// Magic tag at the start of the descriptor's `magic` field.
pub const JIT_DESCRIPTOR_MAGIC: [u8; 8] = *b"Android1";

/// Only descriptor version understood by the decoder.
pub const JIT_DESCRIPTOR_VERSION: u32 = 1;

/// Symbol naming the JIT code descriptor in the runtime library.
pub const JIT_DEBUG_DESCRIPTOR_SYMBOL: &str = "__jit_debug_descriptor";

/// Symbol naming the dex file descriptor in the runtime library.
pub const DEX_DEBUG_DESCRIPTOR_SYMBOL: &str = "__dex_debug_descriptor";

// ============================================================================
// Descriptors
// ============================================================================

/// Descriptor published by a 32-bit runtime
///
/// `action_seqlock` is incremented before and after every list change, so an
/// odd value means a writer is active.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JitDescriptor32 {
    pub version: u32,
    pub action_flag: u32,
    pub relevant_entry: u32,
    pub first_entry: u32,
    pub magic: [u8; 8],
    pub flags: u32,
    pub sizeof_descriptor: u32,
    pub sizeof_entry: u32,
    pub action_seqlock: u32,
    /// `CLOCK_MONOTONIC` nanoseconds of the last completed change
    pub action_timestamp: u64,
}

/// Descriptor published by a 64-bit runtime
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JitDescriptor64 {
    pub version: u32,
    pub action_flag: u32,
    pub relevant_entry: u64,
    pub first_entry: u64,
    pub magic: [u8; 8],
    pub flags: u32,
    pub sizeof_descriptor: u32,
    pub sizeof_entry: u32,
    pub action_seqlock: u32,
    pub action_timestamp: u64,
}

// ============================================================================
// Code entries
// ============================================================================

/// Code entry of a 32-bit runtime where `u64` is 4-byte aligned (x86)
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct JitCodeEntry32 {
    pub next: u32,
    pub prev: u32,
    pub symfile_addr: u32,
    pub symfile_size: u64,
    pub register_timestamp: u64,
}

/// Code entry of a 32-bit runtime where `u64` is 8-byte aligned (ARM)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JitCodeEntry32Pad {
    pub next: u32,
    pub prev: u32,
    pub symfile_addr: u32,
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    pub symfile_size: u64,
    pub register_timestamp: u64,
}

/// Code entry of a 64-bit runtime
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JitCodeEntry64 {
    pub next: u64,
    pub prev: u64,
    pub symfile_addr: u64,
    pub symfile_size: u64,
    pub register_timestamp: u64,
}

// ============================================================================
// Offsets
// ============================================================================

/// Byte offsets of the descriptor fields the decoder needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub size: usize,
    /// Width of a remote pointer (4 or 8)
    pub addr_size: usize,
    pub version: usize,
    pub first_entry: usize,
    pub magic: usize,
    pub sizeof_descriptor: usize,
    pub sizeof_entry: usize,
    pub action_seqlock: usize,
    pub action_timestamp: usize,
}

/// Byte offsets of the code entry fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLayout {
    pub size: usize,
    pub addr_size: usize,
    pub next: usize,
    pub prev: usize,
    pub symfile_addr: usize,
    pub symfile_size: usize,
    pub register_timestamp: usize,
}

macro_rules! descriptor_layout {
    ($ty:ty, $addr:ty) => {
        DescriptorLayout {
            size: size_of::<$ty>(),
            addr_size: size_of::<$addr>(),
            version: offset_of!($ty, version),
            first_entry: offset_of!($ty, first_entry),
            magic: offset_of!($ty, magic),
            sizeof_descriptor: offset_of!($ty, sizeof_descriptor),
            sizeof_entry: offset_of!($ty, sizeof_entry),
            action_seqlock: offset_of!($ty, action_seqlock),
            action_timestamp: offset_of!($ty, action_timestamp),
        }
    };
}

macro_rules! entry_layout {
    ($ty:ty, $addr:ty) => {
        EntryLayout {
            size: size_of::<$ty>(),
            addr_size: size_of::<$addr>(),
            next: offset_of!($ty, next),
            prev: offset_of!($ty, prev),
            symfile_addr: offset_of!($ty, symfile_addr),
            symfile_size: offset_of!($ty, symfile_size),
            register_timestamp: offset_of!($ty, register_timestamp),
        }
    };
}

pub const DESCRIPTOR_LAYOUT_32: DescriptorLayout = descriptor_layout!(JitDescriptor32, u32);
pub const DESCRIPTOR_LAYOUT_64: DescriptorLayout = descriptor_layout!(JitDescriptor64, u64);

pub const ENTRY_LAYOUT_32: EntryLayout = entry_layout!(JitCodeEntry32, u32);
pub const ENTRY_LAYOUT_32_PAD: EntryLayout = entry_layout!(JitCodeEntry32Pad, u32);
pub const ENTRY_LAYOUT_64: EntryLayout = entry_layout!(JitCodeEntry64, u64);
