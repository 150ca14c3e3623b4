//! Pairing records and the request/response shapes of the pairing RPCs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One party's pending intent to pair with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingInitiation {
    /// Identity that called `StartPair`.
    pub initiator: String,
    /// Identity the initiator wants to pair with.
    pub target: String,
    /// Out-of-band proof handed from initiator to target.
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

impl PairingInitiation {
    /// Whether this initiation is still usable given the freshness cutoff.
    pub fn is_live(&self, fresh_after: DateTime<Utc>) -> bool {
        self.created_at > fresh_after
    }
}

/// A confirmed pairing between two identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    /// Identity that completed the handshake with `FinishPair`.
    pub confirmer: String,
    /// The identity that started the handshake.
    pub peer: String,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
}

impl Pairing {
    /// Whether this pairing links `a` and `b`, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.confirmer == a && self.peer == b) || (self.confirmer == b && self.peer == a)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPairRequest {
    pub id: String,
    pub peer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPairResponse {
    pub peer_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishPairRequest {
    pub id: String,
    pub peer_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishPairResponse {
    /// Confirmation time, unix seconds.
    pub created: i64,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_initiation_liveness() {
        let now = Utc::now();
        let initiation = PairingInitiation {
            initiator: "alice".into(),
            target: "bob".into(),
            secret: "s".into(),
            created_at: now,
        };
        assert!(initiation.is_live(now - Duration::seconds(1)));
        assert!(!initiation.is_live(now));
        assert!(!initiation.is_live(now + Duration::seconds(1)));
    }

    #[test]
    fn test_pairing_is_symmetric() {
        let pairing = Pairing {
            confirmer: "bob".into(),
            peer: "alice".into(),
            created_at: Utc::now(),
            verified: true,
        };
        assert!(pairing.connects("alice", "bob"));
        assert!(pairing.connects("bob", "alice"));
        assert!(!pairing.connects("alice", "carol"));
    }

    #[test]
    fn test_request_wire_names() {
        let req: FinishPairRequest =
            serde_json::from_str(r#"{"id":"bob","peer_id":"alice","secret":"k3x9"}"#).unwrap();
        assert_eq!(req.peer_id, "alice");
        assert_eq!(req.secret, "k3x9");
    }
}
