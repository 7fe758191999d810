//! Debug info export
//!
//! Writes delivered debug info as JSON lines for downstream symbolization.

pub mod debug_info_writer;

pub use debug_info_writer::DebugInfoWriter;
