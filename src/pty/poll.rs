//! Readiness waits on raw descriptors.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Wait until `fd` is readable (or hung up) or `timeout` elapses.
///
/// Returns `Ok(true)` when a read will not block. A hang-up counts as
/// readable so the caller observes end-of-stream through `read`.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    wait_for(fd, libc::POLLIN, timeout)
}

/// Wait until `fd` accepts writes or `timeout` elapses.
pub fn wait_writable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    wait_for(fd, libc::POLLOUT, timeout)
}

fn wait_for(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: one valid pollfd on the stack.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    if rc == 0 {
        return Ok(false);
    }
    if pfd.revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    Ok(pfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn times_out_when_nothing_to_read() {
        let (r, w) = pipe();
        let start = Instant::now();
        assert!(!wait_readable(r, Duration::from_millis(50)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(40));
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn readable_after_write() {
        let (r, w) = pipe();
        assert_eq!(unsafe { libc::write(w, b"x".as_ptr().cast(), 1) }, 1);
        assert!(wait_readable(r, Duration::from_millis(500)).unwrap());
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn hangup_counts_as_readable() {
        let (r, w) = pipe();
        unsafe { libc::close(w) };
        assert!(wait_readable(r, Duration::from_millis(500)).unwrap());
        unsafe { libc::close(r) };
    }

    #[test]
    fn empty_pipe_is_writable() {
        let (r, w) = pipe();
        assert!(wait_writable(w, Duration::from_millis(50)).unwrap());
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }
}
