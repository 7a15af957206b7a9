//! Outcome notifications raised by the orchestrator
//!
//! Subscribers either implement [`ProtocolEventHandler`] directly or take an
//! [`EventChannel`], which forwards every event over a flume channel so it
//! can be consumed from a task.

use crate::crypto::SharedKey;

use super::error::FailureCause;

/// Stages reported through [`ProtocolEventHandler::on_progress`]
pub const PROGRESS_STAGES: u32 = 3;
pub const STAGE_PART_MATCHED: u32 = 1;
pub const STAGE_KEY_PROPOSED: u32 = 2;
pub const STAGE_KEY_TENTATIVE: u32 = 3;

/// Observer for protocol outcomes
///
/// Handlers run on the caller's thread after the protocol lock has been
/// released, so they may call back into the protocol.
pub trait ProtocolEventHandler<A>: Send + Sync {
    fn on_success(&self, peer: &A, shared_key: &SharedKey, match_fraction: f64);

    fn on_failure(
        &self,
        peer: &A,
        match_fraction: f64,
        cause: Option<&FailureCause>,
        message: Option<&str>,
    );

    fn on_progress(&self, _peer: &A, _stage: u32, _total: u32, _message: &str) {}
}

#[derive(Debug, Clone)]
pub enum ProtocolEvent<A> {
    Success {
        peer: A,
        shared_key: SharedKey,
        match_fraction: f64,
    },
    Failure {
        peer: A,
        match_fraction: f64,
        cause: Option<FailureCause>,
        message: Option<String>,
    },
    Progress {
        peer: A,
        stage: u32,
        total: u32,
        message: String,
    },
}

impl<A> ProtocolEvent<A> {
    pub fn peer(&self) -> &A {
        match self {
            ProtocolEvent::Success { peer, .. }
            | ProtocolEvent::Failure { peer, .. }
            | ProtocolEvent::Progress { peer, .. } => peer,
        }
    }

    pub fn dispatch(&self, handler: &dyn ProtocolEventHandler<A>) {
        match self {
            ProtocolEvent::Success {
                peer,
                shared_key,
                match_fraction,
            } => handler.on_success(peer, shared_key, *match_fraction),
            ProtocolEvent::Failure {
                peer,
                match_fraction,
                cause,
                message,
            } => handler.on_failure(peer, *match_fraction, cause.as_ref(), message.as_deref()),
            ProtocolEvent::Progress {
                peer,
                stage,
                total,
                message,
            } => handler.on_progress(peer, *stage, *total, message),
        }
    }
}

/// Handler that forwards events into a channel
#[derive(Debug, Clone)]
pub struct EventChannel<A> {
    tx: flume::Sender<ProtocolEvent<A>>,
}

impl<A> EventChannel<A> {
    /// Create a channel handler and the receiver that drains it
    pub fn new() -> (Self, EventReceiver<A>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, EventReceiver { rx })
    }

    fn forward(&self, event: ProtocolEvent<A>) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped, discarding protocol event");
        }
    }
}

impl<A: Clone + Send + Sync> ProtocolEventHandler<A> for EventChannel<A> {
    fn on_success(&self, peer: &A, shared_key: &SharedKey, match_fraction: f64) {
        self.forward(ProtocolEvent::Success {
            peer: peer.clone(),
            shared_key: shared_key.clone(),
            match_fraction,
        });
    }

    fn on_failure(
        &self,
        peer: &A,
        match_fraction: f64,
        cause: Option<&FailureCause>,
        message: Option<&str>,
    ) {
        self.forward(ProtocolEvent::Failure {
            peer: peer.clone(),
            match_fraction,
            cause: cause.cloned(),
            message: message.map(str::to_string),
        });
    }

    fn on_progress(&self, peer: &A, stage: u32, total: u32, message: &str) {
        self.forward(ProtocolEvent::Progress {
            peer: peer.clone(),
            stage,
            total,
            message: message.to_string(),
        });
    }
}

/// Receiving end of an [`EventChannel`]
#[derive(Debug)]
pub struct EventReceiver<A> {
    rx: flume::Receiver<ProtocolEvent<A>>,
}

impl<A> EventReceiver<A> {
    pub async fn recv(&self) -> Option<ProtocolEvent<A>> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<ProtocolEvent<A>> {
        self.rx.try_recv().ok()
    }

    /// Everything received so far, without waiting
    pub fn drain(&self) -> Vec<ProtocolEvent<A>> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_forwards_events() {
        let (channel, receiver) = EventChannel::new();
        let key = SharedKey::from([1u8; 32]);
        channel.on_progress(&"peer", 1, PROGRESS_STAGES, "matched");
        channel.on_success(&"peer", &key, 0.75);
        channel.on_failure(&"other", 0.0, Some(&FailureCause::PeerTerminated), None);

        let events = receiver.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ProtocolEvent::Progress { stage: 1, .. }));
        match &events[1] {
            ProtocolEvent::Success {
                shared_key,
                match_fraction,
                ..
            } => {
                assert_eq!(shared_key, &key);
                assert_eq!(*match_fraction, 0.75);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[2].peer(), &"other");
        assert!(receiver.try_recv().is_none());
    }
}
