//! Protocol events as JSON lines

use std::net::SocketAddr;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use common::protocol::{EventReceiver, ProtocolEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    Success {
        peer: SocketAddr,
        /// Hex encoded shared key
        key: String,
        match_fraction: f64,
    },
    Failure {
        peer: SocketAddr,
        match_fraction: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Progress {
        peer: SocketAddr,
        stage: u32,
        total: u32,
        message: String,
    },
}

impl From<&ProtocolEvent<SocketAddr>> for EventRecord {
    fn from(event: &ProtocolEvent<SocketAddr>) -> Self {
        match event {
            ProtocolEvent::Success {
                peer,
                shared_key,
                match_fraction,
            } => EventRecord::Success {
                peer: *peer,
                key: shared_key.to_hex(),
                match_fraction: *match_fraction,
            },
            ProtocolEvent::Failure {
                peer,
                match_fraction,
                cause,
                message,
            } => EventRecord::Failure {
                peer: *peer,
                match_fraction: *match_fraction,
                cause: cause.as_ref().map(ToString::to_string),
                message: message.clone(),
            },
            ProtocolEvent::Progress {
                peer,
                stage,
                total,
                message,
            } => EventRecord::Progress {
                peer: *peer,
                stage: *stage,
                total: *total,
                message: message.clone(),
            },
        }
    }
}

impl EventRecord {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Write every received event to `out` until shutdown or until all senders
/// are gone
pub async fn print_events<W>(
    events: EventReceiver<SocketAddr>,
    mut out: W,
    mut shutdown_rx: watch::Receiver<()>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let record = EventRecord::from(&event);
        match record.to_json_line() {
            Ok(line) => {
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
            }
            Err(err) => tracing::error!("failed to encode event: {}", err),
        }
    }
    out.flush().await
}

#[cfg(test)]
mod test {
    use super::*;

    use common::crypto::SharedKey;
    use common::protocol::{EventChannel, FailureCause, ProtocolEventHandler};

    fn peer() -> SocketAddr {
        "10.0.0.7:54321".parse().unwrap()
    }

    #[test]
    fn test_success_record_carries_hex_key() {
        let event = ProtocolEvent::Success {
            peer: peer(),
            shared_key: SharedKey::from([0xab; 32]),
            match_fraction: 0.5,
        };
        let json: serde_json::Value =
            serde_json::from_str(&EventRecord::from(&event).to_json_line().unwrap()).unwrap();
        assert_eq!(json["event"], "success");
        assert_eq!(json["peer"], "10.0.0.7:54321");
        assert_eq!(json["key"], "ab".repeat(32));
        assert_eq!(json["match_fraction"], 0.5);
    }

    #[test]
    fn test_failure_record_describes_cause() {
        let event = ProtocolEvent::Failure {
            peer: peer(),
            match_fraction: 0.0,
            cause: Some(FailureCause::PeerTerminated),
            message: None,
        };
        let line = EventRecord::from(&event).to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line.contains("shared"));
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["event"], "failure");
        assert_eq!(json["cause"], "peer terminated the session");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn test_print_events_until_senders_drop() {
        let (channel, receiver) = EventChannel::new();
        let (_tx, rx) = watch::channel(());
        channel.on_progress(&peer(), 1, 3, "matched");
        channel.on_failure(&peer(), 0.25, None, Some("gone"));
        drop(channel);

        let mut out = Vec::new();
        print_events(receiver, &mut out, rx).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"progress\""));
        assert!(lines[1].contains("\"message\":\"gone\""));
    }
}
