//! Terminal echo control.

use std::io;
use std::os::fd::{AsRawFd as _, BorrowedFd, RawFd};

/// Restores the original `termios` settings on the given fd when dropped.
///
/// Echo comes back even if the read in between fails or panics.
pub(crate) struct TermiosGuard {
    fd: RawFd,
    orig: libc::termios,
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        // Best-effort; nothing useful can be done if the terminal is gone.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.orig);
        }
    }
}

/// Turn off `ECHO` and `ECHONL` on `fd` until the returned guard is dropped.
///
/// `TCSAFLUSH` discards keypresses typed before the prompt appeared.
pub(crate) fn echo_off(fd: BorrowedFd<'_>) -> io::Result<TermiosGuard> {
    let fd = fd.as_raw_fd();

    // SAFETY: fd is borrowed for the duration of the call and term is only
    // read after tcgetattr succeeds.
    let guard = unsafe {
        let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
        if libc::tcgetattr(fd, term.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        TermiosGuard {
            fd,
            orig: term.assume_init(),
        }
    };

    let mut noecho = guard.orig;
    noecho.c_lflag &= !(libc::ECHO as libc::tcflag_t);
    noecho.c_lflag &= !(libc::ECHONL as libc::tcflag_t);

    unsafe {
        if libc::tcsetattr(fd, libc::TCSAFLUSH, &noecho) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd as _;

    use super::*;

    #[test]
    fn echo_off_rejects_non_terminals() {
        let file = tempfile::tempfile().unwrap();
        let err = echo_off(file.as_fd()).err().expect("regular file is not a tty");
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }
}
