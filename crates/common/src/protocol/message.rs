//! Text wire format
//!
//! Every message is one datagram of space separated ASCII tokens, binary
//! fields hex encoded:
//!
//! ```text
//! CAND <round>[+<offset>] <digest>...
//! MATCH <round> <number>
//! KEY <numParts> <digest> <senderIndices> <receiverIndices>
//! ACK <digest>
//! NACK
//! ```
//!
//! A candidate's number is its position in the round, counted from
//! `offset` when a round is split across datagrams. Index lists are comma
//! separated `round.number` tuples, `_` marking an index the sender does not
//! know. The sender of a KEY writes its own indices first, so the receiver
//! reads them as its remote indices.

use std::fmt;
use std::str::{FromStr, SplitWhitespace};

use crate::crypto::{Digest, DIGEST_SIZE};
use crate::engine::{
    ArgumentError, CandidateKey, CandidateKeyPartIdentifier, IndexTuple, Round,
    MAX_CANDIDATES_PER_ROUND,
};

use super::error::DecodeError;

/// Largest payload of a single UDP datagram over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Smallest datagram that holds a CAND header for any round and offset
/// followed by one local digest
pub const MIN_DATAGRAM_SIZE: usize =
    CANDIDATES.len() + " 4294967295+126 ".len() + 2 * DIGEST_SIZE;

const CANDIDATES: &str = "CAND";
const MATCH: &str = "MATCH";
const KEY: &str = "KEY";
const ACK: &str = "ACK";
const NACK: &str = "NACK";
const UNKNOWN_INDEX: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Advertisement of candidate identifiers from one round
    Candidates {
        round: Round,
        identifiers: Vec<CandidateKeyPartIdentifier>,
    },
    /// One of the receiver's advertised identifiers matched on the sender
    Match { round: Round, number: u8 },
    /// Candidate key proposal
    Key(KeyProposal),
    /// Acknowledgment of a proposed key by its digest
    Ack { digest: Digest },
    /// Session termination
    Nack,
}

/// A key proposal as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProposal {
    pub digest: Digest,
    /// The proposing host's numbering of the parts, in concatenation order
    pub sender_indices: Vec<IndexTuple>,
    /// The receiving host's numbering of the same parts, where known
    pub receiver_indices: Vec<Option<IndexTuple>>,
}

impl KeyProposal {
    pub fn num_parts(&self) -> usize {
        self.sender_indices.len()
    }
}

impl From<&CandidateKey> for KeyProposal {
    fn from(key: &CandidateKey) -> Self {
        Self {
            digest: key.digest().clone(),
            sender_indices: key.local_indices().to_vec(),
            receiver_indices: key.remote_indices().to_vec(),
        }
    }
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Candidates { .. } => CANDIDATES,
            Message::Match { .. } => MATCH,
            Message::Key(_) => KEY,
            Message::Ack { .. } => ACK,
            Message::Nack => NACK,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(datagram).map_err(|_| DecodeError::NotUtf8)?;
        let mut fields = text.split_whitespace();
        let kind = fields.next().ok_or(DecodeError::Empty)?;

        let message = match kind {
            CANDIDATES => {
                let header = field(&mut fields, CANDIDATES, "round")?;
                let (round, offset) = match header.split_once('+') {
                    Some((round, offset)) => (number(round)?, number::<usize>(offset)?),
                    None => (number(header)?, 0),
                };
                let mut identifiers = Vec::new();
                for (position, hex) in fields.by_ref().enumerate() {
                    let candidate = offset + position;
                    if candidate >= MAX_CANDIDATES_PER_ROUND {
                        return Err(DecodeError::CandidateNumberOutOfRange(candidate));
                    }
                    identifiers.push(CandidateKeyPartIdentifier {
                        round,
                        number: candidate as u8,
                        digest: Digest::from_hex(hex)?,
                    });
                }
                Message::Candidates { round, identifiers }
            }
            MATCH => {
                let round = number(field(&mut fields, MATCH, "round")?)?;
                let candidate: usize = number(field(&mut fields, MATCH, "number")?)?;
                if candidate >= MAX_CANDIDATES_PER_ROUND {
                    return Err(DecodeError::CandidateNumberOutOfRange(candidate));
                }
                Message::Match {
                    round,
                    number: candidate as u8,
                }
            }
            KEY => {
                let num_parts: usize = number(field(&mut fields, KEY, "numParts")?)?;
                if num_parts == 0 {
                    return Err(DecodeError::NoParts);
                }
                let digest = Digest::from_hex(field(&mut fields, KEY, "digest")?)?;
                let sender_indices = index_list(field(&mut fields, KEY, "senderIndices")?)?
                    .into_iter()
                    .map(|index| index.ok_or(DecodeError::UnknownSenderIndex))
                    .collect::<Result<Vec<_>, _>>()?;
                let receiver_indices = index_list(field(&mut fields, KEY, "receiverIndices")?)?;
                for found in [sender_indices.len(), receiver_indices.len()] {
                    if found != num_parts {
                        return Err(DecodeError::IndexCount {
                            expected: num_parts,
                            found,
                        });
                    }
                }
                Message::Key(KeyProposal {
                    digest,
                    sender_indices,
                    receiver_indices,
                })
            }
            ACK => Message::Ack {
                digest: Digest::from_hex(field(&mut fields, ACK, "digest")?)?,
            },
            NACK => Message::Nack,
            other => return Err(DecodeError::UnknownKind(other.to_string())),
        };

        let trailing = fields.count();
        if trailing > 0 {
            return Err(DecodeError::TrailingFields {
                kind: message.kind(),
                count: trailing,
            });
        }
        Ok(message)
    }
}

fn field<'a>(
    fields: &mut SplitWhitespace<'a>,
    kind: &'static str,
    name: &'static str,
) -> Result<&'a str, DecodeError> {
    fields
        .next()
        .ok_or(DecodeError::MissingField { kind, field: name })
}

fn number<T: FromStr>(s: &str) -> Result<T, DecodeError> {
    s.parse()
        .map_err(|_| DecodeError::InvalidNumber(s.to_string()))
}

fn index_list(s: &str) -> Result<Vec<Option<IndexTuple>>, DecodeError> {
    s.split(',')
        .map(|entry| match entry {
            UNKNOWN_INDEX => Ok(None),
            entry => entry
                .parse()
                .map(Some)
                .map_err(|_| DecodeError::InvalidIndex(entry.to_string())),
        })
        .collect()
}

fn write_candidates_header(f: &mut impl fmt::Write, round: Round, offset: u8) -> fmt::Result {
    if offset == 0 {
        write!(f, "{} {}", CANDIDATES, round)
    } else {
        write!(f, "{} {}+{}", CANDIDATES, round, offset)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Candidates { round, identifiers } => {
                let offset = identifiers.first().map_or(0, |id| id.number);
                write_candidates_header(f, *round, offset)?;
                for id in identifiers {
                    write!(f, " {}", id.digest)?;
                }
                Ok(())
            }
            Message::Match { round, number } => write!(f, "{} {} {}", MATCH, round, number),
            Message::Key(proposal) => {
                let sender = proposal
                    .sender_indices
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let receiver = proposal
                    .receiver_indices
                    .iter()
                    .map(|index| match index {
                        Some(index) => index.to_string(),
                        None => UNKNOWN_INDEX.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                write!(
                    f,
                    "{} {} {} {} {}",
                    KEY,
                    proposal.num_parts(),
                    proposal.digest,
                    sender,
                    receiver
                )
            }
            Message::Ack { digest } => write!(f, "{} {}", ACK, digest),
            Message::Nack => f.write_str(NACK),
        }
    }
}

/// Pack one round of identifiers into as few CAND datagrams as fit
///
/// The identifiers must come from a single round and be numbered
/// consecutively, as returned by the engine.
pub fn encode_candidates(
    identifiers: &[CandidateKeyPartIdentifier],
    max_datagram_size: usize,
) -> Result<Vec<Vec<u8>>, ArgumentError> {
    let mut datagrams = Vec::new();
    let mut current = String::new();
    for id in identifiers {
        let hex = id.digest.to_hex();
        if !current.is_empty() && current.len() + 1 + hex.len() > max_datagram_size {
            datagrams.push(std::mem::take(&mut current).into_bytes());
        }
        if current.is_empty() {
            // writing into a String cannot fail
            let _ = write_candidates_header(&mut current, id.round, id.number);
            if current.len() + 1 + hex.len() > max_datagram_size {
                return Err(ArgumentError::DatagramTooSmall {
                    len: hex.len(),
                    max: max_datagram_size,
                });
            }
        }
        current.push(' ');
        current.push_str(&hex);
    }
    if !current.is_empty() {
        datagrams.push(current.into_bytes());
    }
    Ok(datagrams)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::part_digest;

    fn identifiers(round: Round, count: usize) -> Vec<CandidateKeyPartIdentifier> {
        (0..count)
            .map(|i| CandidateKeyPartIdentifier {
                round,
                number: i as u8,
                digest: part_digest(&[i as u8]),
            })
            .collect()
    }

    #[test]
    fn test_key_wire_form() {
        let digest = part_digest(b"k");
        let message = Message::Key(KeyProposal {
            digest: digest.clone(),
            sender_indices: vec![IndexTuple::new(3, 0), IndexTuple::new(5, 2)],
            receiver_indices: vec![Some(IndexTuple::new(8, 1)), None],
        });
        let text = message.to_string();
        assert_eq!(text, format!("KEY 2 {} 3.0,5.2 8.1,_", digest));
        assert_eq!(Message::decode(text.as_bytes()).unwrap(), message);
    }

    #[test]
    fn test_decode_simple_messages() {
        assert_eq!(Message::decode(b"NACK\n").unwrap(), Message::Nack);
        assert_eq!(
            Message::decode(b"MATCH 17 3").unwrap(),
            Message::Match {
                round: 17,
                number: 3
            }
        );
        let ack = Message::decode(b"ACK 00ff").unwrap();
        assert_eq!(
            ack,
            Message::Ack {
                digest: Digest::from(vec![0x00, 0xff])
            }
        );
    }

    #[test]
    fn test_decode_candidates_with_offset() {
        let digest = part_digest(b"x");
        let text = format!("CAND 9+4 {} {}", digest, digest);
        let Message::Candidates { round, identifiers } =
            Message::decode(text.as_bytes()).unwrap()
        else {
            panic!("expected candidates");
        };
        assert_eq!(round, 9);
        assert_eq!(identifiers[0].index(), IndexTuple::new(9, 4));
        assert_eq!(identifiers[1].index(), IndexTuple::new(9, 5));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Message::decode(b""), Err(DecodeError::Empty));
        assert_eq!(Message::decode(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
        assert_eq!(
            Message::decode(b"HELLO 1"),
            Err(DecodeError::UnknownKind("HELLO".to_string()))
        );
        assert_eq!(
            Message::decode(b"MATCH x 1"),
            Err(DecodeError::InvalidNumber("x".to_string()))
        );
        assert!(matches!(
            Message::decode(b"ACK zz"),
            Err(DecodeError::InvalidHex(_))
        ));
        assert_eq!(
            Message::decode(b"MATCH 1"),
            Err(DecodeError::MissingField {
                kind: "MATCH",
                field: "number"
            })
        );
        assert_eq!(
            Message::decode(b"NACK now"),
            Err(DecodeError::TrailingFields {
                kind: "NACK",
                count: 1
            })
        );
        assert_eq!(
            Message::decode(b"KEY 2 00 1.0 _"),
            Err(DecodeError::IndexCount {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            Message::decode(b"KEY 1 00 _ 1.0"),
            Err(DecodeError::UnknownSenderIndex)
        );
        assert_eq!(
            Message::decode(b"MATCH 1 127"),
            Err(DecodeError::CandidateNumberOutOfRange(127))
        );
    }

    #[test]
    fn test_encode_candidates_splits_at_limit() {
        let ids = identifiers(4, 5);
        // room for a "CAND 4+2" header and two digests of 65 bytes each
        let datagrams = encode_candidates(&ids, 8 + 2 * 65).unwrap();
        assert_eq!(datagrams.len(), 3);
        assert!(datagrams[1].starts_with(b"CAND 4+2 "));

        let decoded: Vec<CandidateKeyPartIdentifier> = datagrams
            .iter()
            .flat_map(|d| match Message::decode(d).unwrap() {
                Message::Candidates { identifiers, .. } => identifiers,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn test_encode_candidates_single_datagram() {
        let ids = identifiers(1, 3);
        let datagrams = encode_candidates(&ids, MAX_DATAGRAM_SIZE).unwrap();
        assert_eq!(datagrams.len(), 1);
        assert!(matches!(
            encode_candidates(&ids, 10),
            Err(ArgumentError::DatagramTooSmall { .. })
        ));
    }

    #[test]
    fn test_min_datagram_size_fits_any_header() {
        let ids = identifiers(u32::MAX, MAX_CANDIDATES_PER_ROUND);
        let datagrams = encode_candidates(&ids, MIN_DATAGRAM_SIZE).unwrap();
        assert_eq!(datagrams.len(), MAX_CANDIDATES_PER_ROUND);
        assert!(datagrams.iter().all(|d| d.len() <= MIN_DATAGRAM_SIZE));
        let last = String::from_utf8(datagrams[MAX_CANDIDATES_PER_ROUND - 1].clone()).unwrap();
        assert_eq!(last.len(), MIN_DATAGRAM_SIZE);
        assert!(last.starts_with("CAND 4294967295+126 "));
    }
}
