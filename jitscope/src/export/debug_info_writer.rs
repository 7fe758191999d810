use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::jit_debug::DebugInfo;

/// One output line: the debug info plus the batch it arrived in
#[derive(Debug, Serialize)]
struct DebugInfoLine<'a> {
    #[serde(flatten)]
    info: &'a DebugInfo,
    /// Delivered by a periodic sweep rather than an on-demand read or flush
    periodic: bool,
}

/// Writes delivered debug info as JSON lines
///
/// ```text
/// {"kind":"jit_code","pid":42,"timestamp":..,"code_addr":..,"code_len":..,"file_path":"..","periodic":true}
/// {"kind":"dex_file","pid":42,"timestamp":..,"dex_file_offset":..,"file_path":"..","periodic":false}
/// ```
pub struct DebugInfoWriter<W: Write> {
    out: W,
    /// Lines written so far
    written: usize,
}

impl<W: Write> DebugInfoWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Write one delivered batch
    ///
    /// # Errors
    /// Returns an error if serialization or the underlying writer fails.
    pub fn write_batch(&mut self, infos: &[DebugInfo], periodic: bool) -> Result<()> {
        for info in infos {
            serde_json::to_writer(&mut self.out, &DebugInfoLine { info, periodic })
                .context("Failed to serialize debug info")?;
            self.out.write_all(b"\n").context("Failed to write debug info")?;
            self.written += 1;
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error if the underlying writer fails.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush debug info output")
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;
    use serde_json::Value as JsonValue;
    use std::path::PathBuf;

    #[test]
    fn test_write_batch_as_json_lines() {
        let mut writer = DebugInfoWriter::new(Vec::new());
        let infos = vec![
            DebugInfo::JitCode {
                pid: Pid(42),
                timestamp: 1000,
                code_addr: 0x7000,
                code_len: 0x80,
                file_path: PathBuf::from("/tmp/jit_symfile_abc"),
            },
            DebugInfo::DexFile {
                pid: Pid(42),
                timestamp: 1001,
                dex_file_offset: 0x1c0,
                file_path: PathBuf::from("/data/app/base.apk!/classes.dex"),
            },
        ];

        writer.write_batch(&infos, true).unwrap();
        writer.write_batch(&[], false).unwrap();
        assert_eq!(writer.written(), 2);

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<JsonValue> =
            output.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["kind"], "jit_code");
        assert_eq!(lines[0]["code_addr"], 0x7000);
        assert_eq!(lines[0]["periodic"], true);
        assert_eq!(lines[1]["kind"], "dex_file");
        assert_eq!(lines[1]["file_path"], "/data/app/base.apk!/classes.dex");
    }

    #[test]
    fn test_write_error_is_reported() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = DebugInfoWriter::new(Closed);
        let info = DebugInfo::DexFile {
            pid: Pid(1),
            timestamp: 1,
            dex_file_offset: 0,
            file_path: PathBuf::from("/a"),
        };
        assert!(writer.write_batch(&[info], false).is_err());
    }
}
