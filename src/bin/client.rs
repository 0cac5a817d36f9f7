use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::process::ExitCode;
use std::time::Instant;

use ctcp::registry::Registry;
use ctcp::udp::{StdioApplication, UdpSubstrate};
use ctcp::{Config, ConnectionState, Error};

use nix::poll::{poll, PollFd, PollFlags};

const TICK_MILLIS: i32 = 100;

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Error> {
    let mut args = std::env::args().skip(1);
    let peer: SocketAddr = args
        .next()
        .ok_or_else(|| Error::InvalidAddress("usage: client <peer-addr> [local-addr]".into()))?
        .parse()
        .map_err(|_| Error::InvalidAddress("invalid peer address".into()))?;
    let local: SocketAddr = args
        .next()
        .unwrap_or_else(|| "0.0.0.0:0".to_string())
        .parse()
        .map_err(|_| Error::InvalidAddress("invalid local address".into()))?;

    let substrate = UdpSubstrate::connect(local, peer)?;
    let recv_socket = substrate.try_clone_for_recv()?;

    let config = Config::default();
    let conn = ConnectionState::new(
        config,
        1,
        Box::new(substrate),
        Box::new(StdioApplication::spawn()),
    );

    let mut registry = Registry::new();
    registry.insert(peer, conn)?;

    log::info!("connected to {peer}");
    run_event_loop(&mut registry, peer, &recv_socket, config.max_retransmits)
}

fn run_event_loop(
    registry: &mut Registry,
    peer: SocketAddr,
    recv_socket: &std::net::UdpSocket,
    max_retransmits: u32,
) -> Result<ExitCode, Error> {
    let mut buf = [0u8; 2048];
    let fd = recv_socket.as_raw_fd();

    loop {
        if registry.dispatch_readable(peer).is_some() {
            log::info!("connection to {peer} closed");
            return Ok(exit_code(registry));
        }

        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let ready = poll(&mut fds, TICK_MILLIS).unwrap_or(0);

        if ready > 0 {
            while let Some(n) = recv_nonblocking(recv_socket, &mut buf) {
                if registry.dispatch_segment(peer, &buf[..n]).is_some() {
                    log::info!("connection to {peer} closed");
                    return Ok(exit_code(registry));
                }
            }
        }

        if !registry.dispatch_tick(Instant::now()).is_empty() {
            return Err(Error::RetransmitCapExceeded(peer, max_retransmits));
        }

        if registry.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
    }
}

fn recv_nonblocking(socket: &std::net::UdpSocket, buf: &mut [u8]) -> Option<usize> {
    match socket.recv(buf) {
        Ok(n) => Some(n),
        Err(e) if e.kind() == ErrorKind::WouldBlock => None,
        Err(e) => {
            log::warn!("recv error: {e}");
            None
        }
    }
}

fn exit_code(registry: &Registry) -> ExitCode {
    if registry.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
