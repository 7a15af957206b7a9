use crate::crypto::{Digest, SharedKey};

use super::part::IndexTuple;

/// A key assembled from the parts matched with one peer
///
/// `local_indices` name the parts in this host's numbering, in concatenation
/// order. `remote_indices` hold the peer's numbering of the same parts where
/// it is known.
#[derive(Debug, Clone)]
pub struct CandidateKey {
    pub(crate) key: SharedKey,
    pub(crate) digest: Digest,
    pub(crate) local_indices: Vec<IndexTuple>,
    pub(crate) remote_indices: Vec<Option<IndexTuple>>,
}

impl CandidateKey {
    pub fn num_parts(&self) -> usize {
        self.local_indices.len()
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn local_indices(&self) -> &[IndexTuple] {
        &self.local_indices
    }

    pub fn remote_indices(&self) -> &[Option<IndexTuple>] {
        &self.remote_indices
    }
}
