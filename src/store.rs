//! The ordered record collection and its replication to every worker.
//!
//! Rank 0 owns the authoritative [`SequenceSet`] after loading. Before any
//! counting starts, it sends the set to every other rank as a fixed sequence
//! of [`Message`]s:
//!
//! 1. [`Message::CapacityHint`]: total payload bytes, so the receiver can
//!    reserve one buffer for all records
//! 2. [`Message::RecordCount`]
//! 3. [`Message::Lengths`]: the byte length of every record, in order
//! 4. one [`Message::Payload`] per record, in order
//!
//! Receivers rebuild the set in a private buffer and fail if any message
//! arrives out of order, disagrees with the length table, or never arrives.

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::error::KmerShardError;

/// Ordered, immutable collection of sequence records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSet {
    records: Vec<Bytes>,
}

impl SequenceSet {
    pub const fn new(records: Vec<Bytes>) -> Self {
        Self { records }
    }

    /// Builds a set from anything byte-like, mostly useful in tests.
    pub fn from_records<I, B>(records: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::new(
            records
                .into_iter()
                .map(|r| Bytes::copy_from_slice(r.as_ref()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> {
        self.records.iter()
    }

    /// Total number of symbols across all records.
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.len() as u64).sum()
    }

    /// Byte length of every record, in order.
    pub fn lengths(&self) -> Vec<usize> {
        self.records.iter().map(Bytes::len).collect()
    }

    /// Joins every record, in order, into a single super-sequence.
    ///
    /// Windows then also span record boundaries. An empty set stays empty.
    #[must_use]
    pub fn concatenated(&self) -> Self {
        if self.records.is_empty() {
            return Self::default();
        }
        Self::new(vec![Bytes::from(self.records.concat())])
    }
}

impl<'a> IntoIterator for &'a SequenceSet {
    type Item = &'a Bytes;
    type IntoIter = std::slice::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One step of the replication protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    CapacityHint(u64),
    RecordCount(usize),
    Lengths(Vec<usize>),
    Payload(Bytes),
}

impl Message {
    const fn name(&self) -> &'static str {
        match self {
            Self::CapacityHint(_) => "capacity hint",
            Self::RecordCount(_) => "record count",
            Self::Lengths(_) => "length table",
            Self::Payload(_) => "record payload",
        }
    }
}

/// A peer endpoint on rank 0's side of the broadcast.
#[derive(Debug, Clone)]
pub struct Peer {
    pub rank: usize,
    pub sender: Sender<Message>,
}

/// The receiving end held by a non-zero rank.
#[derive(Debug)]
pub struct Inbox {
    pub rank: usize,
    pub receiver: Receiver<Message>,
}

/// Creates one channel for every rank in `1..workers`.
pub fn channels(workers: usize) -> (Vec<Peer>, Vec<Inbox>) {
    (1..workers)
        .map(|rank| {
            let (sender, receiver) = unbounded();
            (Peer { rank, sender }, Inbox { rank, receiver })
        })
        .unzip()
}

fn send_all(peers: &[Peer], message: &Message) -> Result<(), KmerShardError> {
    for peer in peers {
        peer.sender
            .send(message.clone())
            .map_err(|_| KmerShardError::Replication {
                rank: peer.rank,
                details: format!("peer hung up before the {} was sent", message.name()),
            })?;
    }
    Ok(())
}

/// Sends `set` to every peer, in protocol order.
///
/// # Errors
///
/// Returns [`KmerShardError::Replication`] if any peer has hung up.
pub fn broadcast(set: &SequenceSet, peers: &[Peer]) -> Result<(), KmerShardError> {
    debug!(
        peers = peers.len(),
        records = set.len(),
        bytes = set.total_bytes(),
        "Broadcasting sequences"
    );
    send_all(peers, &Message::CapacityHint(set.total_bytes()))?;
    send_all(peers, &Message::RecordCount(set.len()))?;
    send_all(peers, &Message::Lengths(set.lengths()))?;
    for record in set {
        send_all(peers, &Message::Payload(record.clone()))?;
    }
    Ok(())
}

impl Inbox {
    fn next(&self, expected: &str) -> Result<Message, KmerShardError> {
        self.receiver
            .recv()
            .map_err(|_| self.fail(format!("broadcast ended before the {expected}")))
    }

    fn fail(&self, details: String) -> KmerShardError {
        KmerShardError::Replication {
            rank: self.rank,
            details,
        }
    }

    fn unexpected(&self, expected: &str, got: &Message) -> KmerShardError {
        self.fail(format!("expected {expected}, received {}", got.name()))
    }

    /// Blocks until the complete set has arrived and rebuilds it.
    ///
    /// # Errors
    ///
    /// Returns [`KmerShardError::Replication`] if the broadcast is cut short
    /// or does not follow the protocol.
    pub fn receive(&self) -> Result<SequenceSet, KmerShardError> {
        let capacity = match self.next("capacity hint")? {
            Message::CapacityHint(bytes) => bytes,
            other => return Err(self.unexpected("capacity hint", &other)),
        };
        let count = match self.next("record count")? {
            Message::RecordCount(count) => count,
            other => return Err(self.unexpected("record count", &other)),
        };
        let lengths = match self.next("length table")? {
            Message::Lengths(lengths) => lengths,
            other => return Err(self.unexpected("length table", &other)),
        };
        if lengths.len() != count {
            return Err(self.fail(format!(
                "length table has {} entries for {count} records",
                lengths.len()
            )));
        }
        let total: u64 = lengths.iter().map(|&l| l as u64).sum();
        if total != capacity {
            return Err(self.fail(format!(
                "length table sums to {total} bytes, capacity hint is {capacity}"
            )));
        }
        let capacity =
            usize::try_from(capacity).map_err(|_| KmerShardError::Allocation { bytes: capacity })?;

        let mut buffer: Vec<u8> = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| KmerShardError::Allocation {
                bytes: capacity as u64,
            })?;
        for (index, &length) in lengths.iter().enumerate() {
            let payload = match self.next("record payload")? {
                Message::Payload(payload) => payload,
                other => return Err(self.unexpected("record payload", &other)),
            };
            if payload.len() != length {
                return Err(self.fail(format!(
                    "record {index} is {} bytes, length table says {length}",
                    payload.len()
                )));
            }
            trace!(rank = self.rank, record = index, length, "Received record");
            buffer.extend_from_slice(&payload);
        }

        let mut buffer = Bytes::from(buffer);
        let records = lengths
            .iter()
            .map(|&length| buffer.split_to(length))
            .collect();
        debug!(rank = self.rank, records = count, "Received sequences");
        Ok(SequenceSet::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SequenceSet {
        SequenceSet::from_records(["ACGTACGT", "", "GATTACA"])
    }

    #[test]
    fn set_accessors() {
        let set = sample();
        assert_eq!(set.len(), 3);
        assert_eq!(set.total_bytes(), 15);
        assert_eq!(set.lengths(), vec![8, 0, 7]);
        assert_eq!(set.get(2).unwrap().as_ref(), b"GATTACA");
        assert!(set.get(3).is_none());
    }

    #[test]
    fn concatenated_joins_records_in_order() {
        let joined = sample().concatenated();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.get(0).unwrap().as_ref(), b"ACGTACGTGATTACA");
        assert!(SequenceSet::default().concatenated().is_empty());
    }

    #[test]
    fn broadcast_replicates_to_every_peer() {
        let set = sample();
        let (peers, inboxes) = channels(4);
        assert_eq!(peers.len(), 3);

        broadcast(&set, &peers).unwrap();
        for inbox in &inboxes {
            assert_eq!(inbox.receive().unwrap(), set);
        }
    }

    #[test]
    fn single_worker_has_no_peers() {
        let (peers, inboxes) = channels(1);
        assert!(peers.is_empty());
        assert!(inboxes.is_empty());
        broadcast(&sample(), &peers).unwrap();
    }

    #[test]
    fn empty_set_round_trips() {
        let (peers, inboxes) = channels(2);
        broadcast(&SequenceSet::default(), &peers).unwrap();
        assert!(inboxes[0].receive().unwrap().is_empty());
    }

    #[test]
    fn receive_fails_when_sender_hangs_up() {
        let (peers, inboxes) = channels(2);
        peers[0].sender.send(Message::CapacityHint(4)).unwrap();
        drop(peers);

        let err = inboxes[0].receive().unwrap_err();
        assert!(matches!(err, KmerShardError::Replication { rank: 1, .. }));
        assert!(err.to_string().contains("record count"));
    }

    #[test]
    fn receive_rejects_out_of_order_messages() {
        let (peers, inboxes) = channels(2);
        peers[0].sender.send(Message::RecordCount(1)).unwrap();

        let err = inboxes[0].receive().unwrap_err();
        assert_eq!(
            err.to_string(),
            "worker 1 failed to receive sequences: expected capacity hint, received record count"
        );
    }

    #[test]
    fn receive_rejects_payload_length_mismatch() {
        let (peers, inboxes) = channels(2);
        let sender = &peers[0].sender;
        sender.send(Message::CapacityHint(4)).unwrap();
        sender.send(Message::RecordCount(1)).unwrap();
        sender.send(Message::Lengths(vec![4])).unwrap();
        sender
            .send(Message::Payload(Bytes::from_static(b"ACG")))
            .unwrap();

        let err = inboxes[0].receive().unwrap_err();
        assert!(err.to_string().contains("record 0 is 3 bytes"));
    }

    #[test]
    fn receive_rejects_inconsistent_length_table() {
        let (peers, inboxes) = channels(2);
        let sender = &peers[0].sender;
        sender.send(Message::CapacityHint(4)).unwrap();
        sender.send(Message::RecordCount(2)).unwrap();
        sender.send(Message::Lengths(vec![4])).unwrap();

        let err = inboxes[0].receive().unwrap_err();
        assert!(err.to_string().contains("1 entries for 2 records"));
    }

    #[test]
    fn broadcast_fails_when_peer_hung_up() {
        let (peers, inboxes) = channels(3);
        drop(inboxes);
        let err = broadcast(&sample(), &peers).unwrap_err();
        assert!(matches!(err, KmerShardError::Replication { rank: 1, .. }));
    }
}
