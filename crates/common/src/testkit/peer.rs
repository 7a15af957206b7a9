use std::sync::Arc;

use anyhow::Result;

use crate::crypto::SharedKey;
use crate::engine::{CandidateKeyPartIdentifier, Clock};
use crate::protocol::{
    CandidateKeyProtocol, EventChannel, EventReceiver, ProtocolConfig, ProtocolEvent,
};

use super::network::{SimAddress, SimTransport};

/// One protocol instance plus the events it raised
pub struct TestPeer {
    /// The name of this peer, also its address
    pub name: SimAddress,
    protocol: CandidateKeyProtocol<SimAddress>,
    events: EventReceiver<SimAddress>,
    /// Events drained from the receiver so far
    seen: parking_lot::Mutex<Vec<ProtocolEvent<SimAddress>>>,
}

impl TestPeer {
    pub fn new(
        name: SimAddress,
        config: ProtocolConfig,
        transport: Arc<SimTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let protocol = CandidateKeyProtocol::with_clock(config, transport, clock)?;
        let (channel, events) = EventChannel::new();
        protocol.subscribe(Arc::new(channel));
        Ok(Self {
            name,
            protocol,
            events,
            seen: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn protocol(&self) -> &CandidateKeyProtocol<SimAddress> {
        &self.protocol
    }

    pub fn submit<P: AsRef<[u8]>>(
        &self,
        parts: &[P],
        entropy: f64,
    ) -> Result<Vec<CandidateKeyPartIdentifier>> {
        Ok(self.protocol.submit_candidates(parts, entropy)?)
    }

    /// All events raised so far, oldest first
    pub fn events(&self) -> Vec<ProtocolEvent<SimAddress>> {
        let mut seen = self.seen.lock();
        seen.extend(self.events.drain());
        seen.clone()
    }

    /// The key agreed with `peer`, if the session succeeded
    pub fn shared_key(&self, peer: SimAddress) -> Option<SharedKey> {
        self.events().into_iter().find_map(|event| match event {
            ProtocolEvent::Success {
                peer: p,
                shared_key,
                ..
            } if p == peer => Some(shared_key),
            _ => None,
        })
    }

    /// Failure events raised for `peer`
    pub fn failures(&self, peer: SimAddress) -> Vec<ProtocolEvent<SimAddress>> {
        self.events()
            .into_iter()
            .filter(|event| {
                matches!(event, ProtocolEvent::Failure { peer: p, .. } if *p == peer)
            })
            .collect()
    }
}
