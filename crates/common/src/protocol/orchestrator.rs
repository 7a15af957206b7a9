use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::engine::{CandidateKeyPartIdentifier, Clock, PeerStatistics, SystemClock};
use crate::transport::{DatagramTransport, PeerAddress};

use super::config::ProtocolConfig;
use super::error::ProtocolError;
use super::events::ProtocolEventHandler;
use super::state::{Effect, ProtocolState};
use super::stats::ProtocolStats;

/// Runs the candidate key protocol for one local host
///
/// Cheap to clone; clones share the same state. Local submissions and
/// received datagrams are serialized through one lock, so a submission and
/// the replay of buffered messages it triggers are atomic with respect to
/// message handling. Datagrams are handed to the transport and events to the
/// subscribers only after the lock has been released.
pub struct CandidateKeyProtocol<A: PeerAddress> {
    state: Arc<Mutex<ProtocolState<A>>>,
    transport: Arc<dyn DatagramTransport<A>>,
    handlers: Arc<RwLock<Vec<Arc<dyn ProtocolEventHandler<A>>>>>,
    span: tracing::Span,
}

impl<A: PeerAddress> Clone for CandidateKeyProtocol<A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            transport: self.transport.clone(),
            handlers: self.handlers.clone(),
            span: self.span.clone(),
        }
    }
}

impl<A: PeerAddress> CandidateKeyProtocol<A> {
    pub fn new(
        config: ProtocolConfig,
        transport: Arc<dyn DatagramTransport<A>>,
    ) -> Result<Self, ProtocolError> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ProtocolConfig,
        transport: Arc<dyn DatagramTransport<A>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProtocolError> {
        let span = match &config.instance_id {
            Some(id) => tracing::info_span!("ckp", instance = %id),
            None => tracing::Span::none(),
        };
        let state = ProtocolState::new(config, clock)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            transport,
            handlers: Arc::new(RwLock::new(Vec::new())),
            span,
        })
    }

    /// Register an event handler for this instance
    pub fn subscribe(&self, handler: Arc<dyn ProtocolEventHandler<A>>) {
        self.handlers.write().push(handler);
    }

    /// Feed one round of candidate key parts from the local producer
    ///
    /// # Errors
    ///
    /// Rejects empty batches, more than 127 parts, more parts than the local
    /// history holds and parts of unequal length, before any state changes.
    pub fn submit_candidates<P: AsRef<[u8]>>(
        &self,
        parts: &[P],
        entropy: f64,
    ) -> Result<Vec<CandidateKeyPartIdentifier>, ProtocolError> {
        let _guard = self.span.enter();
        let (result, effects) = {
            let mut state = self.state.lock();
            let result = state.submit(parts, entropy);
            (result, state.take_effects())
        };
        self.flush(effects);
        result
    }

    /// Process one datagram received from `sender`
    ///
    /// Malformed datagrams and protocol violations end that peer's session
    /// and are reported through the event handlers; only internal
    /// inconsistencies are returned as errors.
    pub fn handle_datagram(&self, sender: &A, datagram: &[u8]) -> Result<(), ProtocolError> {
        let _guard = self.span.enter();
        let (result, effects) = {
            let mut state = self.state.lock();
            let result = state.handle(sender, datagram);
            (result, state.take_effects())
        };
        self.flush(effects);
        if let Err(err) = &result {
            tracing::error!("handling datagram from {} failed: {}", sender, err);
        }
        result
    }

    /// Forget `peer` without notifying anyone; returns whether there was state
    pub fn wipe(&self, peer: &A) -> bool {
        let _guard = self.span.enter();
        self.state.lock().wipe(peer)
    }

    /// Forget all peers and the local candidate history
    pub fn wipe_all(&self) {
        let _guard = self.span.enter();
        self.state.lock().wipe_all();
    }

    pub fn statistics(&self, peer: &A) -> Option<PeerStatistics> {
        self.state.lock().engine().statistics(peer)
    }

    pub fn match_fraction(&self, peer: &A) -> f64 {
        self.state.lock().engine().match_fraction(peer)
    }

    pub fn has_session(&self, peer: &A) -> bool {
        self.state.lock().engine().has_session(peer)
    }

    pub fn stats(&self) -> ProtocolStats {
        self.state.lock().stats()
    }

    fn flush(&self, effects: Vec<Effect<A>>) {
        if effects.is_empty() {
            return;
        }
        let handlers: Vec<Arc<dyn ProtocolEventHandler<A>>> = self.handlers.read().clone();
        for effect in effects {
            match effect {
                Effect::Send { to, datagram } => {
                    if let Err(err) = self.transport.send_to(&to, &datagram) {
                        tracing::warn!("sending to {} failed: {}", to, err);
                    }
                }
                Effect::Multicast { datagram } => {
                    if let Err(err) = self.transport.multicast(&datagram) {
                        tracing::warn!("multicast failed: {}", err);
                    }
                }
                Effect::Event(event) => {
                    for handler in &handlers {
                        event.dispatch(handler.as_ref());
                    }
                }
            }
        }
    }
}
