//! The process-wide connection registry and dispatcher (spec §2, §5): a
//! doubly-linked list of live connections, indexed by peer address so the
//! host event loop can route an inbound datagram or a readable-input
//! notification to the right [`ConnectionState`] in O(1), with O(1)
//! removal when a connection is destroyed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::connection::{CloseReason, ConnectionState};
use crate::error::Error;
use crate::list::{List, NodeId};

#[derive(Default)]
pub struct Registry {
    connections: List<(SocketAddr, ConnectionState)>,
    index: HashMap<SocketAddr, NodeId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            connections: List::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, peer: SocketAddr) -> bool {
        self.index.contains_key(&peer)
    }

    /// Registers a new connection. Errs if `peer` is already registered —
    /// one engine instance per peer (spec §1 Non-goals).
    pub fn insert(&mut self, peer: SocketAddr, conn: ConnectionState) -> Result<(), Error> {
        if self.index.contains_key(&peer) {
            return Err(Error::AlreadyRegistered(peer));
        }
        let node = self.connections.push_back((peer, conn));
        self.index.insert(peer, node);
        Ok(())
    }

    pub fn get_mut(&mut self, peer: SocketAddr) -> Option<&mut ConnectionState> {
        let node = *self.index.get(&peer)?;
        Some(&mut self.connections.get_mut(node).1)
    }

    fn remove(&mut self, peer: SocketAddr) {
        if let Some(node) = self.index.remove(&peer) {
            self.connections.remove(node);
        }
    }

    /// Dispatches an inbound readable-input notification to `peer`'s
    /// connection, removing it from the registry if teardown completes or
    /// the retransmit cap is breached.
    pub fn dispatch_readable(&mut self, peer: SocketAddr) -> Option<CloseReason> {
        let conn = self.get_mut(peer)?;
        let result = conn.on_application_readable();
        self.finish(peer, result)
    }

    /// Dispatches an inbound segment to `peer`'s connection.
    pub fn dispatch_segment(&mut self, peer: SocketAddr, raw: &[u8]) -> Option<CloseReason> {
        let conn = self.get_mut(peer)?;
        let result = conn.on_segment(raw);
        self.finish(peer, result)
    }

    /// Drives every live connection's retransmission timer once. Returns
    /// the peers whose connection was destroyed this tick and why.
    pub fn dispatch_tick(&mut self, now: Instant) -> Vec<(SocketAddr, CloseReason)> {
        let peers: Vec<SocketAddr> = self.index.keys().copied().collect();
        let mut destroyed = Vec::new();

        for peer in peers {
            let Some(conn) = self.get_mut(peer) else {
                continue;
            };
            let result = conn.on_tick(now);
            if let Some(reason) = self.finish(peer, result) {
                destroyed.push((peer, reason));
            }
        }
        destroyed
    }

    fn finish(
        &mut self,
        peer: SocketAddr,
        result: Result<(), CloseReason>,
    ) -> Option<CloseReason> {
        match result {
            Ok(()) => None,
            Err(reason) => {
                self.remove(peer);
                Some(reason)
            }
        }
    }
}
