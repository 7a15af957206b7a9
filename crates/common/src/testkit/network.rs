use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::protocol::{DecodeError, Message, ProtocolConfig};
use crate::transport::DatagramTransport;

use super::clock::ManualClock;
use super::peer::TestPeer;

/// Peers in the simulated network are named by static strings
pub type SimAddress = &'static str;

/// A datagram in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: SimAddress,
    pub to: SimAddress,
    pub payload: Vec<u8>,
}

impl Datagram {
    /// The message type token, e.g. `"KEY"`
    pub fn kind(&self) -> &str {
        std::str::from_utf8(&self.payload)
            .ok()
            .and_then(|text| text.split_whitespace().next())
            .unwrap_or("")
    }

    pub fn message(&self) -> Result<Message, DecodeError> {
        Message::decode(&self.payload)
    }

    /// Whether this is a `kind` datagram from `from` to `to`
    pub fn is(&self, kind: &str, from: SimAddress, to: SimAddress) -> bool {
        self.kind() == kind && self.from == from && self.to == to
    }
}

#[derive(Debug, Default)]
struct NetworkInner {
    members: Vec<SimAddress>,
    in_flight: VecDeque<Datagram>,
}

/// In-memory datagram queue shared by all simulated transports
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `local` and return a transport sending on its behalf
    pub fn transport(&self, local: SimAddress) -> Arc<SimTransport> {
        let mut inner = self.inner.lock();
        if !inner.members.contains(&local) {
            inner.members.push(local);
        }
        Arc::new(SimTransport {
            local,
            network: self.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of everything in flight, oldest first
    pub fn pending(&self) -> Vec<Datagram> {
        self.inner.lock().in_flight.iter().cloned().collect()
    }

    /// Queue a datagram, e.g. to replay a duplicate
    pub fn push(&self, datagram: Datagram) {
        self.inner.lock().in_flight.push_back(datagram);
    }

    /// Remove and return the oldest datagram matching `pred`
    pub fn take_first(&self, pred: impl Fn(&Datagram) -> bool) -> Option<Datagram> {
        let mut inner = self.inner.lock();
        let position = inner.in_flight.iter().position(pred)?;
        inner.in_flight.remove(position)
    }

    pub fn take_all(&self) -> Vec<Datagram> {
        self.inner.lock().in_flight.drain(..).collect()
    }

    /// Lose every datagram matching `pred`; returns how many were dropped
    pub fn drop_where(&self, pred: impl Fn(&Datagram) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.in_flight.len();
        inner.in_flight.retain(|d| !pred(d));
        before - inner.in_flight.len()
    }
}

/// Transport handle for one simulated peer
#[derive(Debug)]
pub struct SimTransport {
    local: SimAddress,
    network: SimNetwork,
}

impl DatagramTransport<SimAddress> for SimTransport {
    fn send_to(&self, peer: &SimAddress, datagram: &[u8]) -> io::Result<()> {
        self.network.push(Datagram {
            from: self.local,
            to: peer,
            payload: datagram.to_vec(),
        });
        Ok(())
    }

    fn multicast(&self, datagram: &[u8]) -> io::Result<()> {
        let mut inner = self.network.inner.lock();
        let members = inner.members.clone();
        for to in members.into_iter().filter(|m| *m != self.local) {
            inner.in_flight.push_back(Datagram {
                from: self.local,
                to,
                payload: datagram.to_vec(),
            });
        }
        Ok(())
    }
}

/// A set of test peers sharing one simulated network and one clock
pub struct TestNetwork {
    sim: SimNetwork,
    clock: Arc<ManualClock>,
    peers: HashMap<SimAddress, TestPeer>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            sim: SimNetwork::new(),
            clock: Arc::new(ManualClock::new()),
            peers: HashMap::new(),
        }
    }

    /// Add a peer running its own protocol instance
    pub fn add_peer(&mut self, name: SimAddress, config: ProtocolConfig) -> Result<&TestPeer> {
        if self.peers.contains_key(name) {
            return Err(anyhow::anyhow!("Peer '{}' already exists", name));
        }
        let transport = self.sim.transport(name);
        let peer = TestPeer::new(name, config, transport, self.clock.clone())?;
        let peer = self.peers.entry(name).or_insert(peer);
        Ok(&*peer)
    }

    pub fn peer(&self, name: &str) -> Option<&TestPeer> {
        self.peers.get(name)
    }

    pub fn sim(&self) -> &SimNetwork {
        &self.sim
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Hand a datagram to its addressee; datagrams to unknown peers vanish
    pub fn deliver(&self, datagram: &Datagram) -> Result<()> {
        if let Some(peer) = self.peers.get(datagram.to) {
            peer.protocol()
                .handle_datagram(&datagram.from, &datagram.payload)?;
        }
        Ok(())
    }

    /// Deliver the oldest datagram matching `pred`; false if there was none
    pub fn deliver_first(&self, pred: impl Fn(&Datagram) -> bool) -> Result<bool> {
        match self.sim.take_first(pred) {
            Some(datagram) => {
                self.deliver(&datagram)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deliver datagrams in send order until none are left or `max_steps`
    /// have been delivered; returns the number delivered
    pub fn run_until_quiet(&self, max_steps: usize) -> Result<usize> {
        let mut steps = 0;
        while steps < max_steps && self.deliver_first(|_| true)? {
            steps += 1;
        }
        Ok(steps)
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
