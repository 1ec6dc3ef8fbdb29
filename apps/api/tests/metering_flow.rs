use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use analyzer_api::clock::ManualClock;
use analyzer_api::metering::anonymous::{AnonymousQuota, ANONYMOUS_RESET_PERIOD};
use analyzer_api::metering::credits::InMemoryCreditLedger;
use analyzer_api::metering::gate::MeteringGate;
use analyzer_api::metering::identity::Caller;
use analyzer_api::metering::reconcile::{CreditMode, LocalCreditCache};
use analyzer_api::metering::window::{FixedWindowLimiter, WindowConfig};

struct Harness {
    gate: MeteringGate,
    ledger: Arc<InMemoryCreditLedger>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let clock = ManualClock::shared(Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap());
    let ledger = Arc::new(InMemoryCreditLedger::new(5));
    let gate = MeteringGate::new(
        Arc::new(FixedWindowLimiter::new(WindowConfig::hourly(500), clock.clone())),
        10,
        Arc::new(AnonymousQuota::new(clock.clone())),
        ledger.clone(),
        clock.clone(),
    );
    Harness {
        gate,
        ledger,
        clock,
    }
}

#[tokio::test]
async fn test_client_mirror_follows_server_through_sign_in() {
    let h = harness();
    let mut local = LocalCreditCache::anonymous();
    let anonymous = Caller::Anonymous {
        ip: "1.2.3.4".to_string(),
    };

    // two anonymous analyses, each shown optimistically then reconciled
    for expected in [2, 1] {
        local.optimistic_decrement();
        let admission = h.gate.admit(&anonymous).await.unwrap();
        let receipt = h.gate.settle(admission).await.unwrap();
        assert_eq!(local.reconcile(receipt.credits_remaining), 0);
        assert_eq!(local.displayed(), expected);
    }

    let user_id = Uuid::new_v4();
    h.ledger.set_balance(user_id, 4);
    local.sign_in(4);
    assert_eq!(local.mode(), CreditMode::Authenticated);

    let signed_in = Caller::Authenticated { user_id };
    local.optimistic_decrement();
    local.optimistic_decrement();
    let admission = h.gate.admit(&signed_in).await.unwrap();
    let receipt = h.gate.settle(admission).await.unwrap();

    // the server charged once; the local double decrement is corrected
    assert_eq!(local.reconcile(receipt.credits_remaining), 1);
    assert_eq!(local.displayed(), 3);

    local.sign_out();
    assert_eq!(local.displayed(), 3);
}

#[tokio::test]
async fn test_anonymous_allotment_returns_after_reset_period() {
    let h = harness();
    let caller = Caller::Anonymous {
        ip: "5.6.7.8".to_string(),
    };

    for _ in 0..3 {
        let admission = h.gate.admit(&caller).await.unwrap();
        h.gate.settle(admission).await.unwrap();
    }
    assert!(h.gate.admit(&caller).await.is_err());

    h.clock.advance(ANONYMOUS_RESET_PERIOD + Duration::hours(1));
    let usage = h.gate.usage(&caller).await.unwrap();
    assert_eq!(usage.credits_remaining, 3);
    assert!(h.gate.admit(&caller).await.is_ok());
}
