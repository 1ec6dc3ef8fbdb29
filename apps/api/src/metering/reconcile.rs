//! Client-side mirror of the caller's credit balance.
//!
//! Clients show a balance before the server answers by decrementing a local copy.
//! The local copy never wins: whenever the server reports a number, the local value
//! is moved onto it. The anonymous counter survives sign-out on the same device, so
//! signing in restores it to the full free allotment.

use serde::{Deserialize, Serialize};

use crate::metering::anonymous::ANONYMOUS_MAX_ANALYSES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditMode {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCreditCache {
    mode: CreditMode,
    anonymous_credits: i64,
    account_credits: i64,
    free_allotment: i64,
}

impl LocalCreditCache {
    pub fn anonymous() -> Self {
        Self::with_allotment(i64::from(ANONYMOUS_MAX_ANALYSES))
    }

    pub fn with_allotment(free_allotment: i64) -> Self {
        Self {
            mode: CreditMode::Anonymous,
            anonymous_credits: free_allotment,
            account_credits: 0,
            free_allotment,
        }
    }

    pub fn authenticated(balance: i64) -> Self {
        let mut cache = Self::anonymous();
        cache.sign_in(balance);
        cache
    }

    pub fn mode(&self) -> CreditMode {
        self.mode
    }

    /// The number to display right now.
    pub fn displayed(&self) -> i64 {
        match self.mode {
            CreditMode::Anonymous => self.anonymous_credits,
            CreditMode::Authenticated => self.account_credits,
        }
    }

    /// Instant feedback before the server answers. Never goes below zero.
    pub fn optimistic_decrement(&mut self) {
        let slot = self.active_mut();
        *slot = (*slot - 1).max(0);
    }

    /// Moves the local value onto the server's and returns the adjustment applied.
    pub fn reconcile(&mut self, server_remaining: i64) -> i64 {
        let slot = self.active_mut();
        let delta = server_remaining - *slot;
        *slot += delta;
        delta
    }

    pub fn sign_in(&mut self, server_balance: i64) {
        self.anonymous_credits = self.free_allotment;
        self.account_credits = server_balance;
        self.mode = CreditMode::Authenticated;
    }

    pub fn sign_out(&mut self) {
        self.account_credits = 0;
        self.mode = CreditMode::Anonymous;
    }

    fn active_mut(&mut self) -> &mut i64 {
        match self.mode {
            CreditMode::Anonymous => &mut self.anonymous_credits,
            CreditMode::Authenticated => &mut self.account_credits,
        }
    }
}

impl Default for LocalCreditCache {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_starts_at_free_allotment() {
        let cache = LocalCreditCache::anonymous();
        assert_eq!(cache.mode(), CreditMode::Anonymous);
        assert_eq!(cache.displayed(), 3);
    }

    #[test]
    fn test_optimistic_decrement_saturates() {
        let mut cache = LocalCreditCache::with_allotment(1);
        cache.optimistic_decrement();
        cache.optimistic_decrement();
        assert_eq!(cache.displayed(), 0);
    }

    #[test]
    fn test_server_value_overrides_optimistic_value() {
        let mut cache = LocalCreditCache::anonymous();
        cache.optimistic_decrement();
        // another tab already spent one, so the server is further ahead
        let delta = cache.reconcile(0);
        assert_eq!(delta, -2);
        assert_eq!(cache.displayed(), 0);
    }

    #[test]
    fn test_reconcile_catches_up_upwards() {
        let mut cache = LocalCreditCache::authenticated(5);
        cache.optimistic_decrement();
        cache.optimistic_decrement();
        // analysis failed server-side, nothing was charged
        assert_eq!(cache.reconcile(5), 2);
        assert_eq!(cache.displayed(), 5);
    }

    #[test]
    fn test_reconcile_when_already_in_sync() {
        let mut cache = LocalCreditCache::authenticated(4);
        cache.optimistic_decrement();
        assert_eq!(cache.reconcile(3), 0);
        assert_eq!(cache.displayed(), 3);
    }

    #[test]
    fn test_sign_in_restores_anonymous_allotment() {
        let mut cache = LocalCreditCache::anonymous();
        cache.optimistic_decrement();
        cache.reconcile(1);

        cache.sign_in(12);
        assert_eq!(cache.mode(), CreditMode::Authenticated);
        assert_eq!(cache.displayed(), 12);

        cache.sign_out();
        assert_eq!(cache.mode(), CreditMode::Anonymous);
        assert_eq!(cache.displayed(), 3);
    }

    #[test]
    fn test_authenticated_reconcile_leaves_anonymous_counter_alone() {
        let mut cache = LocalCreditCache::authenticated(8);
        cache.reconcile(2);
        cache.sign_out();
        assert_eq!(cache.displayed(), 3);
    }

    #[test]
    fn test_serde_round_trip_for_local_storage() {
        let mut cache = LocalCreditCache::anonymous();
        cache.reconcile(1);
        let stored = serde_json::to_string(&cache).unwrap();
        let restored: LocalCreditCache = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, cache);
        assert_eq!(restored.displayed(), 1);
    }
}
