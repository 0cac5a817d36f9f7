//! The two external contracts the engine consumes (spec §6). Neither is
//! part of THE CORE: the host event loop owns concrete implementations
//! (a bound UDP socket, a pair of stdio streams) and hands them to a
//! [`crate::connection::ConnectionState`] as trait objects.

/// An opaque datagram channel to a single, already-addressable peer.
pub trait Substrate {
    /// Best-effort, non-blocking send. A short write is treated as success
    /// by the caller; the underlying datagram protocol preserves record
    /// boundaries so partial delivery of one segment cannot happen.
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<usize>;

    /// Releases substrate resources. Called at most once, from `destroy`.
    fn close(&mut self);
}

/// Return code of [`Application::input`], mirroring a POSIX `read`: `Eof`
/// once (-1 in the spec's C-flavored contract), `WouldBlock` for "no bytes
/// ready yet" (0), or `Ready(n)` for `n > 0` bytes copied into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Eof,
    WouldBlock,
    Ready(usize),
}

/// The application-layer sink/source a connection delivers bytes to and
/// reads bytes from (spec §6's "Application contract").
pub trait Application {
    /// Reads up to `buf.len()` bytes of outbound application data.
    fn input(&mut self, buf: &mut [u8]) -> InputStatus;

    /// Delivers `n` in-order bytes from `buf` to the downstream sink.
    fn output(&mut self, buf: &[u8]);

    /// Free capacity of the application's downstream sink, in bytes.
    fn free_space(&self) -> usize;
}

/// In-memory fakes used across the unit test suites for [`crate::sender`],
/// [`crate::receiver`], and [`crate::connection`]. Kept in the library (not
/// `tests/`) since every module's `#[cfg(test)]` block needs them.
#[cfg(test)]
pub mod test_support {
    use super::{Application, InputStatus, Substrate};
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct FakeSubstrate {
        pub sent: Vec<Vec<u8>>,
        pub closed: bool,
    }

    impl Substrate for FakeSubstrate {
        fn send(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.sent.push(bytes.to_vec());
            Ok(bytes.len())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    /// An application that yields a fixed chunk of input once, then EOFs
    /// (or blocks forever if `eof` is false), and records whatever is
    /// written to it.
    pub struct FakeApplication {
        pending: VecDeque<u8>,
        eof_after: bool,
        eof_delivered: bool,
        pub delivered: Vec<u8>,
        pub capacity: usize,
    }

    impl FakeApplication {
        pub fn with_input(data: Vec<u8>) -> Self {
            FakeApplication {
                pending: data.into(),
                eof_after: false,
                eof_delivered: false,
                delivered: Vec::new(),
                capacity: usize::MAX,
            }
        }

        pub fn eof() -> Self {
            FakeApplication {
                pending: VecDeque::new(),
                eof_after: true,
                eof_delivered: false,
                delivered: Vec::new(),
                capacity: usize::MAX,
            }
        }

        pub fn with_capacity(capacity: usize) -> Self {
            FakeApplication {
                pending: VecDeque::new(),
                eof_after: false,
                eof_delivered: false,
                delivered: Vec::new(),
                capacity,
            }
        }
    }

    impl Application for FakeApplication {
        fn input(&mut self, buf: &mut [u8]) -> InputStatus {
            if self.pending.is_empty() {
                if self.eof_after && !self.eof_delivered {
                    self.eof_delivered = true;
                    return InputStatus::Eof;
                }
                return InputStatus::WouldBlock;
            }
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap();
            }
            InputStatus::Ready(n)
        }

        fn output(&mut self, buf: &[u8]) {
            self.delivered.extend_from_slice(buf);
        }

        fn free_space(&self) -> usize {
            self.capacity.saturating_sub(self.delivered.len())
        }
    }
}
