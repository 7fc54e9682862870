//! Settlement steps and the journal used to reverse them

use crate::negotiation::{Side, TradeSession};
use crate::types::{ActorId, Amount, Asset};
use rust_decimal::Decimal;
use std::fmt;

/// One atomic collaborator mutation of a settlement
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Move `amount` from `from` into the escrow account
    WithdrawCurrency { from: ActorId, amount: Amount },
    RemoveAssets { from: ActorId, assets: Vec<Asset> },
    AddAssets { to: ActorId, assets: Vec<Asset> },
    /// Move `amount` from the escrow account to `to`
    DepositCurrency { to: ActorId, amount: Amount },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::WithdrawCurrency { from, amount } => write!(f, "withdraw {} from {}", amount, from),
            Step::RemoveAssets { from, assets } => {
                write!(f, "remove {} asset(s) from {}", assets.len(), from)
            }
            Step::AddAssets { to, assets } => write!(f, "add {} asset(s) to {}", assets.len(), to),
            Step::DepositCurrency { to, amount } => write!(f, "deposit {} to {}", amount, to),
        }
    }
}

/// Build the execution order for a session.
///
/// Withdrawals first, then asset removals, asset additions and deposits, A
/// before B within each phase. Steps that would move nothing are skipped.
pub fn plan(session: &TradeSession) -> Vec<Step> {
    let actor = |side: Side| session.participant(side);
    let currency = |side: Side| session.offer(side).currency;
    let assets = |side: Side| session.offer(side).asset_list();
    let sides = [Side::A, Side::B];

    let mut steps = Vec::new();
    for side in sides {
        if currency(side) > Decimal::ZERO {
            steps.push(Step::WithdrawCurrency {
                from: actor(side),
                amount: currency(side),
            });
        }
    }
    for side in sides {
        if !assets(side).is_empty() {
            steps.push(Step::RemoveAssets {
                from: actor(side),
                assets: assets(side),
            });
        }
    }
    for side in sides {
        if !assets(side).is_empty() {
            steps.push(Step::AddAssets {
                to: actor(side.other()),
                assets: assets(side),
            });
        }
    }
    for side in sides {
        if currency(side) > Decimal::ZERO {
            steps.push(Step::DepositCurrency {
                to: actor(side.other()),
                amount: currency(side),
            });
        }
    }
    steps
}

#[derive(Debug)]
struct JournalEntry {
    step: Step,
    compensated: bool,
}

/// Steps applied so far, in order
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn record(&mut self, step: Step) {
        self.entries.push(JournalEntry {
            step,
            compensated: false,
        });
    }

    /// Applied steps not reversed yet, latest first
    pub fn pending(&self) -> Vec<(usize, Step)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, entry)| !entry.compensated)
            .map(|(index, entry)| (index, entry.step.clone()))
            .collect()
    }

    pub fn mark_compensated(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.compensated = true;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.entries.iter().filter(|e| !e.compensated).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_plan_order_full_trade() {
        let mut s = TradeSession::new(ActorId::generate(), ActorId::generate(), Duration::minutes(1));
        let [a, b] = s.participants();
        s.set_currency(Side::A, Decimal::from(10)).unwrap();
        s.set_currency(Side::B, Decimal::from(20)).unwrap();
        s.add_asset(Side::A, 0, Asset::new("sword", 1), 12).unwrap();
        s.add_asset(Side::B, 0, Asset::new("shield", 1), 12).unwrap();

        let steps = plan(&s);
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0], Step::WithdrawCurrency { from: a, amount: Decimal::from(10) });
        assert_eq!(steps[1], Step::WithdrawCurrency { from: b, amount: Decimal::from(20) });
        assert!(matches!(&steps[2], Step::RemoveAssets { from, .. } if *from == a));
        assert!(matches!(&steps[3], Step::RemoveAssets { from, .. } if *from == b));
        assert_eq!(steps[4], Step::AddAssets { to: b, assets: vec![Asset::new("sword", 1)] });
        assert_eq!(steps[5], Step::AddAssets { to: a, assets: vec![Asset::new("shield", 1)] });
        assert_eq!(steps[6], Step::DepositCurrency { to: b, amount: Decimal::from(10) });
        assert_eq!(steps[7], Step::DepositCurrency { to: a, amount: Decimal::from(20) });
    }

    #[test]
    fn test_plan_skips_empty_legs() {
        let mut s = TradeSession::new(ActorId::generate(), ActorId::generate(), Duration::minutes(1));
        s.add_asset(Side::A, 0, Asset::new("sword", 1), 12).unwrap();
        s.set_currency(Side::B, Decimal::from(50)).unwrap();

        let steps = plan(&s);
        assert_eq!(steps.len(), 4);
        assert!(matches!(steps[0], Step::WithdrawCurrency { .. }));
        assert!(matches!(steps[3], Step::DepositCurrency { .. }));
    }

    #[test]
    fn test_journal_compensates_in_reverse_once() {
        let a = ActorId::generate();
        let mut journal = Journal::default();
        journal.record(Step::WithdrawCurrency { from: a, amount: Decimal::ONE });
        journal.record(Step::RemoveAssets { from: a, assets: vec![] });
        journal.record(Step::AddAssets { to: a, assets: vec![] });

        let pending = journal.pending();
        assert_eq!(pending.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2, 1, 0]);
        assert!(matches!(pending[0].1, Step::AddAssets { .. }));

        // A step that could not be reversed stays pending; the others do not
        journal.mark_compensated(2);
        journal.mark_compensated(2);
        journal.mark_compensated(0);
        assert_eq!(journal.outstanding(), 1);
        assert_eq!(journal.pending().len(), 1);
        assert_eq!(journal.pending()[0].0, 1);

        journal.mark_compensated(1);
        assert!(journal.pending().is_empty());
        assert_eq!(journal.len(), 3);
    }
}
