use portable_pty::{native_pty_system, PtyPair, PtySize};
use std::io;
use std::os::unix::io::RawFd;

use crate::config::PtyConfig;
use crate::error::EngineError;

/// Opens pseudo-terminal pairs with a fixed size and a non-blocking master.
#[derive(Debug, Clone)]
pub struct PtyAllocator {
    rows: u16,
    cols: u16,
}

impl PtyAllocator {
    pub fn new(config: &PtyConfig) -> Self {
        Self {
            rows: config.rows,
            cols: config.cols,
        }
    }

    pub fn size(&self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    /// Allocate a master/slave pair.
    ///
    /// The master is switched to `O_NONBLOCK`; readers cloned from it share
    /// the same open file description and therefore the same mode.
    pub fn allocate(&self) -> Result<PtyPair, EngineError> {
        let pair = native_pty_system()
            .openpty(self.size())
            .map_err(|e| EngineError::Allocation(e.to_string()))?;

        let fd = master_fd(&pair)?;
        set_nonblocking(fd).map_err(|e| {
            EngineError::Allocation(format!("failed to make master non-blocking: {}", e))
        })?;

        tracing::debug!(fd, rows = self.rows, cols = self.cols, "Allocated PTY pair");
        Ok(pair)
    }
}

fn master_fd(pair: &PtyPair) -> Result<RawFd, EngineError> {
    pair.master
        .as_raw_fd()
        .ok_or_else(|| EngineError::Allocation("PTY master has no file descriptor".to_string()))
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no memory is passed.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
