//! Concrete hosts for the two contracts in [`crate::host`]: a UDP-backed
//! [`Substrate`] to a pre-bound peer, and a stdin/stdout-backed
//! [`Application`]. Neither is part of THE CORE (spec §1) — they exist so
//! the `server`/`client` binaries can drive the engine end to end over a
//! real socket.

use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::host::{Application, InputStatus, Substrate};

/// A UDP socket already `connect`ed to a single peer, satisfying the
/// "datagram substrate" contract of spec §6.
pub struct UdpSubstrate {
    socket: UdpSocket,
}

impl UdpSubstrate {
    pub fn connect(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        socket.set_nonblocking(true)?;
        Ok(UdpSubstrate { socket })
    }

    /// A second handle onto the same socket, for the event loop to poll
    /// and `recv` from directly while the original stays boxed inside the
    /// connection for `send`/`close`.
    pub fn try_clone_for_recv(&self) -> io::Result<UdpSocket> {
        self.socket.try_clone()
    }
}

impl Substrate for UdpSubstrate {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send(bytes)
    }

    fn close(&mut self) {
        // UdpSocket has no explicit close; dropping releases the fd. Held
        // here only to satisfy the contract's lifecycle expectations.
    }
}

/// Reads application bytes from stdin (via a background thread so the
/// non-blocking `input` contract can be satisfied without making stdin
/// itself non-blocking) and writes delivered bytes straight to stdout.
pub struct StdioApplication {
    incoming: Receiver<Vec<u8>>,
    pending: std::collections::VecDeque<u8>,
    eof: bool,
}

impl StdioApplication {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            use std::io::Read;
            let mut stdin = io::stdin();
            let mut buf = [0u8; 4096];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        StdioApplication {
            incoming: rx,
            pending: std::collections::VecDeque::new(),
            eof: false,
        }
    }
}

impl Application for StdioApplication {
    fn input(&mut self, buf: &mut [u8]) -> InputStatus {
        if self.pending.is_empty() {
            if self.eof {
                return InputStatus::Eof;
            }
            match self.incoming.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => return InputStatus::WouldBlock,
                Err(TryRecvError::Disconnected) => {
                    self.eof = true;
                    return InputStatus::Eof;
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        InputStatus::Ready(n)
    }

    fn output(&mut self, buf: &[u8]) {
        let _ = io::stdout().write_all(buf);
        let _ = io::stdout().flush();
    }

    fn free_space(&self) -> usize {
        // stdout is effectively unbounded for this example host.
        usize::MAX
    }
}
