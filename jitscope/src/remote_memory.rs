//! Cross-process memory reads
//!
//! The monitored process is never stopped. Every read is one
//! `process_vm_readv` call that either copies the whole range or fails;
//! a failure usually means the process exited or unmapped the range, and
//! the caller marks the process dead. No retries happen here.

#![allow(unsafe_code)] // process_vm_readv requires unsafe

use libc::{c_void, iovec, pid_t, process_vm_readv};
use std::io;

use crate::domain::{Pid, RemoteReadError};

/// Source of remote process memory
pub trait RemoteMemory {
    /// Fill `buf` with the bytes at `addr` in `pid`.
    ///
    /// # Errors
    /// Returns an error unless every byte was copied.
    fn read(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> Result<(), RemoteReadError>;

    /// Convenience wrapper allocating the destination buffer.
    ///
    /// # Errors
    /// Same as [`RemoteMemory::read`].
    fn read_vec(&self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>, RemoteReadError> {
        let mut buf = vec![0u8; len];
        self.read(pid, addr, &mut buf)?;
        Ok(buf)
    }
}

/// Reads memory of live processes with `process_vm_readv`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessVmReader;

impl RemoteMemory for ProcessVmReader {
    fn read(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> Result<(), RemoteReadError> {
        if buf.is_empty() {
            return Ok(());
        }

        let len = buf.len();
        let local_iov = iovec { iov_base: buf.as_mut_ptr().cast::<c_void>(), iov_len: len };
        #[allow(clippy::cast_possible_truncation)]
        let remote_iov = iovec { iov_base: addr as usize as *mut c_void, iov_len: len };

        // SAFETY: local_iov describes `buf`, which is exclusively borrowed for
        // the duration of the call and exactly `len` bytes long. The kernel
        // validates the remote range and reports faults through the return
        // value instead of touching our address space.
        let copied = unsafe {
            process_vm_readv(
                pid.0 as pid_t,
                std::ptr::from_ref(&local_iov),
                1,
                std::ptr::from_ref(&remote_iov),
                1,
                0,
            )
        };

        if copied < 0 {
            return Err(RemoteReadError::Failed {
                pid,
                addr,
                len,
                source: io::Error::last_os_error(),
            });
        }

        #[allow(clippy::cast_sign_loss)]
        let copied = copied as usize;
        if copied != len {
            return Err(RemoteReadError::ShortRead { pid, addr, got: copied, len });
        }

        Ok(())
    }
}
