//! The shared call signaling record.
//!
//! The record is the only state the two parties share. Writers always
//! replace the whole document and bump `seq`; observers apply a write only
//! if it supersedes what they already know, so both sides converge on the
//! same terminal status no matter in which order racing writes are
//! delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aula_shared::{CallId, CallKind, ChannelRef, UserId};

/// Call status, tagged into the record document. Each variant carries
/// exactly the fields that are valid for that state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Accepted,
    Rejected,
    Ended { ended_at: DateTime<Utc> },
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Rejected | CallStatus::Ended { .. })
    }

    /// Monotonic ordering of statuses: a record may only ever move to an
    /// equal or higher rank.
    fn rank(&self) -> u8 {
        match self {
            CallStatus::Pending => 0,
            CallStatus::Accepted => 1,
            CallStatus::Rejected | CallStatus::Ended { .. } => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRecord {
    pub id: CallId,
    pub initiator: UserId,
    pub recipient: UserId,
    pub kind: CallKind,
    /// Media transport channel both parties join on acceptance.
    pub channel: ChannelRef,
    pub created_at: DateTime<Utc>,
    /// Bumped on every write; arbitration tiebreak within a status rank.
    pub seq: u64,
    #[serde(flatten)]
    pub status: CallStatus,
}

impl CallRecord {
    /// A fresh outgoing call record in `Pending` status.
    pub fn outgoing(initiator: UserId, recipient: UserId, kind: CallKind) -> Self {
        let id = CallId::new();
        let channel = ChannelRef::for_call(&id);
        Self {
            id,
            initiator,
            recipient,
            kind,
            channel,
            created_at: Utc::now(),
            seq: 0,
            status: CallStatus::Pending,
        }
    }

    /// The next revision of this record with a new status.
    pub fn advanced(&self, status: CallStatus) -> Self {
        Self {
            seq: self.seq + 1,
            status,
            ..self.clone()
        }
    }

    pub fn ended_now(&self) -> Self {
        self.advanced(CallStatus::Ended {
            ended_at: Utc::now(),
        })
    }

    /// Whether this revision should replace `current` at an observer.
    ///
    /// A higher status rank always supersedes; within the same rank the
    /// higher `seq` wins. Regressions (e.g. `Ended` back to `Pending`) and
    /// stale re-deliveries are never applied.
    pub fn supersedes(&self, current: &CallRecord) -> bool {
        match self.status.rank().cmp(&current.status.rank()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.seq > current.seq,
        }
    }

    /// The party on the other side of the call from `me`.
    pub fn peer_of(&self, me: &UserId) -> &UserId {
        if &self.initiator == me {
            &self.recipient
        } else {
            &self.initiator
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord::outgoing(UserId::new("maya"), UserId::new("leo"), CallKind::Video)
    }

    #[test]
    fn status_round_trips_as_tagged_document() {
        let pending = record();
        let doc = serde_json::to_value(&pending).unwrap();
        assert_eq!(doc["status"], "pending");
        assert!(doc.get("ended_at").is_none());

        let ended = pending.ended_now();
        let doc = serde_json::to_value(&ended).unwrap();
        assert_eq!(doc["status"], "ended");
        assert!(doc.get("ended_at").is_some());

        let back: CallRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back, ended);
    }

    #[test]
    fn advanced_bumps_seq_and_keeps_identity() {
        let pending = record();
        let accepted = pending.advanced(CallStatus::Accepted);
        assert_eq!(accepted.seq, pending.seq + 1);
        assert_eq!(accepted.id, pending.id);
        assert_eq!(accepted.channel, pending.channel);
    }

    #[test]
    fn higher_rank_supersedes_regardless_of_seq() {
        let pending = record();
        let accepted = pending.advanced(CallStatus::Accepted);
        let ended_early = pending.advanced(CallStatus::Ended {
            ended_at: Utc::now(),
        });

        // Both revisions have seq 1; the terminal one wins either way.
        assert!(ended_early.supersedes(&accepted));
        assert!(!accepted.supersedes(&ended_early));
    }

    #[test]
    fn regressions_are_ignored() {
        let pending = record();
        let accepted = pending.advanced(CallStatus::Accepted);

        assert!(!pending.supersedes(&accepted));
        assert!(!pending.supersedes(&pending));
        assert!(accepted.supersedes(&pending));
    }

    #[test]
    fn equal_rank_resolves_by_seq() {
        let pending = record();
        let again = CallRecord {
            seq: 3,
            ..pending.clone()
        };
        assert!(again.supersedes(&pending));
        assert!(!pending.supersedes(&again));
    }

    #[test]
    fn peer_of_points_at_the_other_party() {
        let rec = record();
        assert_eq!(rec.peer_of(&UserId::new("maya")), &UserId::new("leo"));
        assert_eq!(rec.peer_of(&UserId::new("leo")), &UserId::new("maya"));
    }
}
