//! Negotiation types and state machine

use crate::types::{ActorId, Amount, Asset, AssetRef, SessionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which side of a session an actor sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// Lifecycle of a trade session
///
/// `Active -> Settling -> {Completed | Active}`, `Active -> Cancelled`,
/// `Active -> Expired`. A settlement whose compensation fails leaves the
/// session `Faulted` until an operator releases it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Settling,
    Completed,
    Cancelled,
    Expired,
    Faulted,
}

impl SessionStatus {
    /// Check if the session has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Expired
        )
    }

    /// Whether the session still blocks its participants from opening another
    pub fn holds_participants(&self) -> bool {
        matches!(
            self,
            SessionStatus::Active | SessionStatus::Settling | SessionStatus::Faulted
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Settling => "SETTLING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Expired => "EXPIRED",
            SessionStatus::Faulted => "FAULTED",
        };
        f.write_str(name)
    }
}

/// One actor's side of the deal
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub assets: BTreeMap<u32, Asset>,
    pub currency: Amount,
    pub ready: bool,
    pub confirmed: bool,
}

impl Offer {
    /// No currency and no asset lines
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.currency == Decimal::ZERO
    }

    /// Assets in slot order
    pub fn asset_list(&self) -> Vec<Asset> {
        self.assets.values().cloned().collect()
    }

    pub fn asset_refs(&self) -> Vec<AssetRef> {
        self.assets
            .iter()
            .map(|(slot, asset)| AssetRef {
                slot: *slot,
                asset: asset.clone(),
            })
            .collect()
    }

    pub(crate) fn clear_flags(&mut self) {
        self.ready = false;
        self.confirmed = false;
    }
}

/// Mutation of the caller's own offer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OfferOp {
    AddAsset { slot: u32, asset: Asset },
    RemoveAsset { slot: u32 },
    SetCurrency(Amount),
    SetReady(bool),
}

/// Result of a confirm call
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SettlementOutcome {
    /// This side confirmed; the counterpart has not yet
    AwaitingCounterparty,
    Completed(crate::settlement::SettlementRecord),
    /// Settlement did not happen and nothing moved; negotiation resumes
    Aborted(crate::settlement::SettlementFailure),
}

/// Read-only snapshot of a session
#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub participants: [ActorId; 2],
    pub offers: [Offer; 2],
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionView {
    pub fn offer_of(&self, actor: &ActorId) -> Option<&Offer> {
        self.participants
            .iter()
            .position(|p| p == actor)
            .map(|index| &self.offers[index])
    }
}
