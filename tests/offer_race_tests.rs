//! Concurrent resolution of sibling offers.
//!
//! Several threads accept different offers of the same order at the same
//! moment. Whatever the interleaving, exactly one offer ends up Accepted and
//! every other one is Rejected.
mod common;

use common::{clinic, crown_order, harness, laboratory};
use dental_marketplace::{Amount, ConflictReason, Decision, OfferStatus, OrderStatus};
use std::sync::Barrier;
use std::thread;

const CONTENDERS: usize = 6;

#[test]
fn concurrent_accepts_have_a_single_winner() -> anyhow::Result<()> {
    for _ in 0..5 {
        let h = harness()?;
        let service = &h.service;
        let c = clinic()?;
        let order_id = service.create_order(&c, crown_order())?.order.id;

        let mut offer_ids = vec![];
        for i in 0..CONTENDERS {
            let lab = laboratory()?;
            let price = Amount::from_major(400 + i as u64);
            offer_ids.push(service.submit_offer(&lab, &order_id, price, "3 gün")?.id);
        }

        let barrier = Barrier::new(CONTENDERS);
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = offer_ids
                .iter()
                .map(|offer_id| {
                    let (barrier, c) = (&barrier, &c);
                    scope.spawn(move || {
                        barrier.wait();
                        service.resolve_offer(c, offer_id, Decision::Accept)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("resolver thread panicked"))
                .collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one accept commits");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            let reason = err.conflict_reason();
            assert!(
                matches!(
                    reason,
                    Some(ConflictReason::AlreadyResolved | ConflictReason::NotAcceptingOffers)
                ),
                "losing accept failed with {err}"
            );
        }

        let offers = service.offers_for_order(&c, &order_id)?;
        let accepted = offers
            .iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count();
        let rejected = offers
            .iter()
            .filter(|o| o.status == OfferStatus::Rejected)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(rejected, CONTENDERS - 1);
        assert_eq!(service.get_order(&order_id)?.status, OrderStatus::OfferAccepted);
    }
    Ok(())
}

#[test]
fn concurrent_status_updates_apply_once() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);
    let order_id = service.create_order(&c, crown_order())?.order.id;
    let offer = service.submit_offer(&lab, &order_id, Amount::from_major(700), "1 hafta")?;
    service.resolve_offer(&c, &offer.id, Decision::Accept)?;

    let barrier = Barrier::new(4);
    let outcomes: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (barrier, lab, order_id) = (&barrier, &lab, &order_id);
                scope.spawn(move || {
                    barrier.wait();
                    service
                        .advance_order_status(lab, order_id, OrderStatus::InProduction)
                        .is_ok()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("status thread panicked"))
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(service.get_order(&order_id)?.status, OrderStatus::InProduction);
    Ok(())
}
