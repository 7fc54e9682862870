//! Trade session aggregate and its negotiation state machine

use crate::error::{Result, TradeError};
use crate::types::{ActorId, Amount, Asset, SessionId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::types::{Offer, OfferOp, SessionStatus, SessionView, Side};

/// A bilateral trade between two actors.
///
/// Every mutation of either offer clears the ready and confirmed flags on
/// both sides, so a confirmation can only ever bind the terms it was given on.
#[derive(Clone, Debug)]
pub struct TradeSession {
    id: SessionId,
    participants: [ActorId; 2],
    offers: [Offer; 2],
    status: SessionStatus,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TradeSession {
    /// Create a new session open for `window` from now.
    ///
    /// A window reaching past the representable range never expires.
    pub fn new(a: ActorId, b: ActorId, window: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: SessionId::generate(),
            participants: [a, b],
            offers: [Offer::default(), Offer::default()],
            status: SessionStatus::Active,
            created_at,
            expires_at,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn participants(&self) -> [ActorId; 2] {
        self.participants
    }

    pub fn participant(&self, side: Side) -> ActorId {
        self.participants[side.index()]
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn offer(&self, side: Side) -> &Offer {
        &self.offers[side.index()]
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Resolve which side `actor` is on
    pub fn side_of(&self, actor: &ActorId) -> Result<Side> {
        if self.participants[0] == *actor {
            Ok(Side::A)
        } else if self.participants[1] == *actor {
            Ok(Side::B)
        } else {
            Err(TradeError::NotParticipant {
                session: self.id,
                actor: *actor,
            })
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Neither side gives anything
    pub fn is_degenerate(&self) -> bool {
        self.offers.iter().all(Offer::is_empty)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(TradeError::InvalidSessionState(self.status));
        }
        Ok(())
    }

    fn clear_all_flags(&mut self) {
        for offer in &mut self.offers {
            offer.clear_flags();
        }
    }

    /// Apply one offer mutation on behalf of `side`
    pub fn apply(&mut self, side: Side, op: OfferOp, max_lines: usize) -> Result<()> {
        match op {
            OfferOp::AddAsset { slot, asset } => self.add_asset(side, slot, asset, max_lines),
            OfferOp::RemoveAsset { slot } => self.remove_asset(side, slot),
            OfferOp::SetCurrency(amount) => self.set_currency(side, amount),
            OfferOp::SetReady(ready) => self.set_ready(side, ready),
        }
    }

    pub fn set_currency(&mut self, side: Side, amount: Amount) -> Result<()> {
        self.ensure_active()?;
        if amount < Decimal::ZERO {
            return Err(TradeError::NegativeAmount(amount));
        }

        self.offers[side.index()].currency = amount;
        self.clear_all_flags();
        Ok(())
    }

    /// Place `asset` in `slot`, replacing whatever the slot held
    pub fn add_asset(&mut self, side: Side, slot: u32, asset: Asset, max_lines: usize) -> Result<()> {
        self.ensure_active()?;
        let offer = &mut self.offers[side.index()];
        if !offer.assets.contains_key(&slot) && offer.assets.len() >= max_lines {
            return Err(TradeError::OfferFull { max: max_lines });
        }

        offer.assets.insert(slot, asset);
        self.clear_all_flags();
        Ok(())
    }

    pub fn remove_asset(&mut self, side: Side, slot: u32) -> Result<()> {
        self.ensure_active()?;
        if self.offers[side.index()].assets.remove(&slot).is_none() {
            return Err(TradeError::SlotEmpty(slot));
        }

        self.clear_all_flags();
        Ok(())
    }

    /// Un-readying also withdraws this side's confirmation
    pub fn set_ready(&mut self, side: Side, ready: bool) -> Result<()> {
        self.ensure_active()?;
        let offer = &mut self.offers[side.index()];
        offer.ready = ready;
        if !ready {
            offer.confirmed = false;
        }
        Ok(())
    }

    /// Record `side`'s confirmation.
    ///
    /// Returns `true` when both sides have now confirmed, in which case the
    /// session has moved to `Settling` and must be handed to settlement.
    pub fn confirm(&mut self, side: Side) -> Result<bool> {
        self.ensure_active()?;
        if !(self.offers[0].ready && self.offers[1].ready) {
            return Err(TradeError::NotBothReady);
        }
        if self.offers[side.other().index()].confirmed && self.is_degenerate() {
            return Err(TradeError::DegenerateTrade);
        }

        self.offers[side.index()].confirmed = true;
        if self.offers.iter().all(|o| o.confirmed) {
            self.status = SessionStatus::Settling;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = SessionStatus::Cancelled;
        Ok(())
    }

    /// Move an overdue `Active` session to `Expired`. Other states are left alone.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == SessionStatus::Active && self.is_expired(now) {
            self.status = SessionStatus::Expired;
            return true;
        }
        false
    }

    /// Return a settling session to negotiation with both confirmations withdrawn
    pub(crate) fn reopen(&mut self) {
        self.status = SessionStatus::Active;
        for offer in &mut self.offers {
            offer.confirmed = false;
        }
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            participants: self.participants,
            offers: self.offers.clone(),
            status: self.status,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TradeSession {
        TradeSession::new(ActorId::generate(), ActorId::generate(), Duration::minutes(10))
    }

    fn ready_both(s: &mut TradeSession) {
        s.set_ready(Side::A, true).unwrap();
        s.set_ready(Side::B, true).unwrap();
    }

    #[test]
    fn test_session_creation() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.expires_at() - s.view().created_at, Duration::minutes(10));
        assert!(s.is_degenerate());
    }

    #[test]
    fn test_huge_window_saturates() {
        let window = Duration::try_days(100_000_000_000).unwrap();
        let s = TradeSession::new(ActorId::generate(), ActorId::generate(), window);
        assert_eq!(s.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!s.is_expired(Utc::now()));
    }

    #[test]
    fn test_side_of() {
        let s = session();
        let [a, b] = s.participants();
        assert_eq!(s.side_of(&a).unwrap(), Side::A);
        assert_eq!(s.side_of(&b).unwrap(), Side::B);
        assert!(matches!(
            s.side_of(&ActorId::generate()),
            Err(TradeError::NotParticipant { .. })
        ));
    }

    #[test]
    fn test_negative_currency_rejected() {
        let mut s = session();
        let result = s.set_currency(Side::A, Decimal::new(-1, 0));
        assert!(matches!(result, Err(TradeError::NegativeAmount(_))));
        assert_eq!(s.offer(Side::A).currency, Decimal::ZERO);
    }

    #[test]
    fn test_mutation_clears_both_sides() {
        let mut s = session();
        s.set_currency(Side::B, Decimal::from(50)).unwrap();
        ready_both(&mut s);
        assert!(!s.confirm(Side::A).unwrap());
        assert!(s.offer(Side::A).confirmed);

        s.add_asset(Side::B, 0, Asset::new("shield", 1), 12).unwrap();

        for side in [Side::A, Side::B] {
            assert!(!s.offer(side).ready);
            assert!(!s.offer(side).confirmed);
        }
        assert!(matches!(s.confirm(Side::A), Err(TradeError::NotBothReady)));
    }

    #[test]
    fn test_confirm_requires_both_ready() {
        let mut s = session();
        s.set_currency(Side::A, Decimal::from(5)).unwrap();
        s.set_ready(Side::A, true).unwrap();
        assert!(matches!(s.confirm(Side::A), Err(TradeError::NotBothReady)));
        assert!(!s.offer(Side::A).confirmed);
    }

    #[test]
    fn test_unready_withdraws_confirmation() {
        let mut s = session();
        s.set_currency(Side::A, Decimal::from(5)).unwrap();
        ready_both(&mut s);
        s.confirm(Side::B).unwrap();

        s.set_ready(Side::B, false).unwrap();
        assert!(!s.offer(Side::B).confirmed);
        assert!(!s.offer(Side::B).ready);
        assert!(s.offer(Side::A).ready);
    }

    #[test]
    fn test_both_confirm_moves_to_settling() {
        let mut s = session();
        s.add_asset(Side::A, 0, Asset::new("sword", 1), 12).unwrap();
        s.set_currency(Side::B, Decimal::from(50)).unwrap();
        ready_both(&mut s);

        assert!(!s.confirm(Side::A).unwrap());
        assert!(s.confirm(Side::B).unwrap());
        assert_eq!(s.status(), SessionStatus::Settling);

        let err = s.set_currency(Side::A, Decimal::ONE).unwrap_err();
        assert!(matches!(
            err,
            TradeError::InvalidSessionState(SessionStatus::Settling)
        ));
        assert!(s.cancel().is_err());
    }

    #[test]
    fn test_degenerate_trade_refused() {
        let mut s = session();
        ready_both(&mut s);
        assert!(!s.confirm(Side::A).unwrap());
        assert!(matches!(s.confirm(Side::B), Err(TradeError::DegenerateTrade)));
        assert_eq!(s.status(), SessionStatus::Active);
        assert!(!s.offer(Side::B).confirmed);
    }

    #[test]
    fn test_offer_line_limit() {
        let mut s = session();
        s.add_asset(Side::A, 0, Asset::new("gem", 1), 2).unwrap();
        s.add_asset(Side::A, 7, Asset::new("gem", 2), 2).unwrap();
        let full = s.add_asset(Side::A, 8, Asset::new("gem", 3), 2);
        assert!(matches!(full, Err(TradeError::OfferFull { max: 2 })));

        // Replacing an occupied slot is not a new line
        s.add_asset(Side::A, 7, Asset::new("ruby", 1), 2).unwrap();
        assert_eq!(s.offer(Side::A).assets[&7], Asset::new("ruby", 1));
    }

    #[test]
    fn test_remove_empty_slot_keeps_flags() {
        let mut s = session();
        s.set_currency(Side::A, Decimal::ONE).unwrap();
        ready_both(&mut s);
        assert!(matches!(s.remove_asset(Side::A, 4), Err(TradeError::SlotEmpty(4))));
        assert!(s.offer(Side::A).ready && s.offer(Side::B).ready);
    }

    #[test]
    fn test_expire_only_active() {
        let mut s = session();
        let later = s.expires_at() + Duration::seconds(1);
        assert!(!s.expire(Utc::now()));
        assert!(s.expire(later));
        assert_eq!(s.status(), SessionStatus::Expired);

        let mut settling = session();
        settling.set_status(SessionStatus::Settling);
        assert!(!settling.expire(later));
    }

    #[test]
    fn test_reopen_clears_confirmations() {
        let mut s = session();
        s.set_currency(Side::A, Decimal::ONE).unwrap();
        ready_both(&mut s);
        s.confirm(Side::A).unwrap();
        s.confirm(Side::B).unwrap();

        s.reopen();
        assert_eq!(s.status(), SessionStatus::Active);
        assert!(!s.offer(Side::A).confirmed && !s.offer(Side::B).confirmed);
        assert!(s.offer(Side::A).ready);
    }
}
