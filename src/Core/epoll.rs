// Edge-triggered readiness notification over Linux epoll

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// What a registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn bits(self) -> u32 {
        let base = match self {
            Interest::Readable => libc::EPOLLIN | libc::EPOLLRDHUP,
            Interest::Writable => libc::EPOLLOUT,
        };
        (base | libc::EPOLLET) as u32
    }
}

/// One readiness event as reported by [`Epoll::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    /// `EPOLLERR`: the socket has a pending error.
    pub error: bool,
    /// `EPOLLHUP` or `EPOLLRDHUP`: the peer shut down at least one direction.
    pub hangup: bool,
}

impl Readiness {
    fn from_raw(event: libc::epoll_event) -> Self {
        let bits = event.events;
        let token = event.u64;
        Self {
            token,
            readable: bits & libc::EPOLLIN as u32 != 0,
            writable: bits & libc::EPOLLOUT as u32 != 0,
            error: bits & libc::EPOLLERR as u32 != 0,
            hangup: bits & (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32 != 0,
        }
    }
}

/// Reusable buffer that `Epoll::wait` fills.
pub struct Events {
    buf: Vec<libc::epoll_event>,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Readiness> {
        self.buf.get(index).copied().map(Readiness::from_raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.buf.iter().copied().map(Readiness::from_raw)
    }
}

/// An owned epoll instance. The descriptor is closed on drop.
#[derive(Debug)]
pub struct Epoll {
    fd: OwnedFd,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: `fd` is a fresh descriptor nobody else owns.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, interest: Option<Interest>, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.map_or(0, Interest::bits),
            u64: token,
        };
        let rc = unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Register `fd`. Readiness that already holds is reported by the next wait.
    pub fn add(&self, fd: RawFd, interest: Interest, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, Some(interest), token)
    }

    /// Switch the interest of a registered `fd`.
    pub fn modify(&self, fd: RawFd, interest: Interest, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, Some(interest), token)
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, None, 0)
    }

    /// Wait up to `timeout` for events. An interrupted wait returns `Ok(0)`.
    pub fn wait(&self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        events.buf.clear();
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let max = events.buf.capacity().min(libc::c_int::MAX as usize) as libc::c_int;

        let n = unsafe {
            libc::epoll_wait(self.fd.as_raw_fd(), events.buf.as_mut_ptr(), max, timeout_ms)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        // Safety: the kernel initialised the first `n` entries.
        unsafe { events.buf.set_len(n as usize) };
        Ok(n as usize)
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
