#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("connection {0:?} is already registered")]
    AlreadyRegistered(std::net::SocketAddr),

    #[error("connection {0:?} exceeded {1} retransmits and was destroyed")]
    RetransmitCapExceeded(std::net::SocketAddr, u32),
}
