// Property checks on order-state reconciliation.

use fairmm::account::state::AccountDataState;
use fairmm::engine::types::{OrderStatus, OrderUpdate};
use proptest::prelude::*;

fn status() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Submitted),
        Just(OrderStatus::Open),
        Just(OrderStatus::PartiallyFilled),
        Just(OrderStatus::Filled),
        Just(OrderStatus::Cancelled),
        Just(OrderStatus::Rejected),
    ]
}

proptest! {
    // whatever order updates arrive in, the applied sequence only moves forward
    // and a venue-confirmed terminal status is final
    #[test]
    fn sequence_is_monotonic_and_terminal_is_final(
        updates in prop::collection::vec((status(), 0u64..50), 1..40)
    ) {
        let state = AccountDataState::new();
        let mut last_seq: Option<u64> = None;
        let mut terminal: Option<OrderStatus> = None;

        for (status, seq) in updates {
            state.apply_update(&OrderUpdate::status("o1", status, seq), |_| None);
            let snap = state.snapshot();
            let order = snap.order("o1").unwrap();

            if let Some(final_status) = terminal {
                prop_assert_eq!(order.status, final_status);
            }
            if let (Some(prev), Some(now)) = (last_seq, order.last_seq) {
                prop_assert!(now >= prev);
            }
            last_seq = order.last_seq;
            if order.status.is_terminal() && !order.optimistic {
                terminal = Some(order.status);
            }
        }
    }

    // duplicates change nothing
    #[test]
    fn replaying_an_update_is_idempotent(status in status(), seq in 1u64..1000) {
        let state = AccountDataState::new();
        let update = OrderUpdate::status("o1", status, seq);
        state.apply_update(&update, |_| None);
        let before = state.snapshot().order("o1").cloned();
        let outcome = state.apply_update(&update, |_| None);
        prop_assert!(outcome.is_stale());
        prop_assert_eq!(state.snapshot().order("o1").cloned(), before);
    }
}
