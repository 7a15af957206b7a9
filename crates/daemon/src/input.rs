//! Candidate key parts from a line-oriented source
//!
//! Each line holds one round: an entropy estimate followed by the parts in
//! hex, separated by whitespace. Blank lines and lines starting with `#`
//! are skipped.
//!
//! ```text
//! 4.5 3f9a01c2 77b0e14d 0c1d2e3f
//! ```

use std::net::SocketAddr;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use common::protocol::CandidateKeyProtocol;

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBatch {
    pub entropy: f64,
    pub parts: Vec<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("empty line")]
    Empty,

    #[error("invalid entropy estimate '{0}'")]
    InvalidEntropy(String),

    #[error("no candidate key parts after the entropy estimate")]
    MissingParts,

    #[error("candidate key part {index} is not valid hex: {source}")]
    InvalidHex {
        index: usize,
        source: hex::FromHexError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FromStr for CandidateBatch {
    type Err = InputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        let entropy_field = fields.next().ok_or(InputError::Empty)?;
        let entropy = f64::from_str(entropy_field)
            .ok()
            .filter(|e| e.is_finite() && *e >= 0.0)
            .ok_or_else(|| InputError::InvalidEntropy(entropy_field.to_string()))?;

        let parts = fields
            .enumerate()
            .map(|(index, field)| {
                hex::decode(field).map_err(|source| InputError::InvalidHex { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if parts.is_empty() {
            return Err(InputError::MissingParts);
        }
        Ok(Self { entropy, parts })
    }
}

fn is_skipped(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// Submit one round per line of `reader` until EOF or shutdown
///
/// Malformed lines and rejected rounds are logged and skipped.
pub async fn read_batches<R>(
    reader: R,
    protocol: CandidateKeyProtocol<SocketAddr>,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), InputError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown_rx.changed() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("candidate input closed");
            return Ok(());
        };
        if is_skipped(&line) {
            continue;
        }
        let batch = match line.parse::<CandidateBatch>() {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!("skipping candidate line: {}", err);
                continue;
            }
        };
        match protocol.submit_candidates(&batch.parts, batch.entropy) {
            Ok(identifiers) => tracing::debug!(
                "submitted round {} with {} parts",
                identifiers.first().map_or(0, |id| id.round),
                identifiers.len()
            ),
            Err(err) => tracing::warn!("candidate round rejected: {}", err),
        }
    }
}
