//! Settlement records and failure reasons

use crate::negotiation::{Side, TradeSession};
use crate::types::{ActorId, Amount, Asset, Hash, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What one actor gave and received in a completed trade
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementLeg {
    pub actor: ActorId,
    pub currency_given: Amount,
    pub currency_received: Amount,
    pub assets_given: Vec<Asset>,
    pub assets_received: Vec<Asset>,
}

impl SettlementLeg {
    /// Net currency change for this actor
    pub fn currency_delta(&self) -> Amount {
        self.currency_received - self.currency_given
    }
}

/// Immutable account of a completed settlement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub session: SessionId,
    pub settled_at: DateTime<Utc>,
    pub legs: [SettlementLeg; 2],
    /// Blake2b digest over session, timestamp and legs
    pub digest: Hash,
}

#[derive(Serialize)]
struct DigestBody<'a> {
    session: &'a SessionId,
    settled_at: &'a DateTime<Utc>,
    legs: &'a [SettlementLeg; 2],
}

impl SettlementRecord {
    pub fn new(session: &TradeSession, settled_at: DateTime<Utc>) -> Self {
        let leg = |side: Side| {
            let own = session.offer(side);
            let other = session.offer(side.other());
            SettlementLeg {
                actor: session.participant(side),
                currency_given: own.currency,
                currency_received: other.currency,
                assets_given: own.asset_list(),
                assets_received: other.asset_list(),
            }
        };
        let legs = [leg(Side::A), leg(Side::B)];
        let digest = Self::digest_of(&session.id(), &settled_at, &legs);

        Self {
            session: session.id(),
            settled_at,
            legs,
            digest,
        }
    }

    fn digest_of(session: &SessionId, settled_at: &DateTime<Utc>, legs: &[SettlementLeg; 2]) -> Hash {
        let body = DigestBody {
            session,
            settled_at,
            legs,
        };
        // Serializing plain data into memory cannot fail
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        Hash::from_bytes(&bytes)
    }

    /// Check that the record has not been altered since it was produced
    pub fn verify_digest(&self) -> bool {
        Self::digest_of(&self.session, &self.settled_at, &self.legs) == self.digest
    }

    pub fn leg_of(&self, actor: &ActorId) -> Option<&SettlementLeg> {
        self.legs.iter().find(|leg| leg.actor == *actor)
    }
}

/// Why a settlement did not go through. Nothing moved in any of these cases.
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SettlementFailure {
    #[error("insufficient funds for {actor}: required {required}, available {available}")]
    InsufficientFunds {
        actor: ActorId,
        required: Amount,
        available: Amount,
    },

    #[error("{actor} no longer holds the offered assets")]
    MissingAssets { actor: ActorId },

    #[error("{actor} has no room for the incoming assets")]
    NoCapacity { actor: ActorId },

    #[error("backend unavailable: {detail}")]
    CollaboratorUnavailable { detail: String },

    #[error("step '{step}' failed and was compensated: {detail}")]
    ExecutionFailed { step: String, detail: String },
}
