use crate::domain::account::{Amount, Balance, CardAccount};
use crate::domain::tag::TagId;
use std::collections::HashMap;

/// In-memory balances for the current session.
///
/// The ledger is the only place balances live. It is owned by the event
/// loop's context and mutated from a single task, so it needs no locking.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<TagId, CardAccount>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance of `id`, opening the account at zero if unseen.
    pub fn get_or_create(&mut self, id: &TagId) -> Balance {
        self.entry(id).balance
    }

    /// Credits `amount`, opening the account first if needed.
    /// Repeated identical top-ups each add again.
    pub fn apply_topup(&mut self, id: &TagId, amount: Amount) -> Balance {
        self.entry(id).credit(amount)
    }

    /// Debits `amount` from an existing account without a funds check.
    ///
    /// Returns `None`, leaving the ledger untouched, when the account has
    /// never been seen.
    pub fn apply_payment(&mut self, id: &TagId, amount: Amount) -> Option<Balance> {
        self.accounts.get_mut(id).map(|account| account.debit(amount))
    }

    pub fn balance(&self, id: &TagId) -> Option<Balance> {
        self.accounts.get(id).map(|account| account.balance)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn entry(&mut self, id: &TagId) -> &mut CardAccount {
        self.accounts
            .entry(id.clone())
            .or_insert_with(|| CardAccount::new(id.clone()))
    }
}
