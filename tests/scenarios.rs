mod common;

use anyhow::Context;
use common::{clinic, crown_order, harness, laboratory};
use dental_marketplace::{
    Amount, ConflictReason, Decision, ErrorKind, Identity, MarketplaceError, NewMaterialLine,
    NewOrder, OfferStatus, OrderStatus,
};

#[test]
fn accepting_one_offer_rejects_its_siblings() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, l1, l2) = (clinic()?, laboratory()?, laboratory()?);

    let created = service.create_order(&c, crown_order())?;
    let order_id = created.order.id;
    assert_eq!(created.order.status, OrderStatus::OpenForOffers);
    assert_eq!(created.lines.len(), 1);
    assert_eq!(created.lines[0].quantity, 2);

    let o1 = service.submit_offer(&l1, &order_id, Amount::from_major(500), "3 gün")?;
    let o2 = service.submit_offer(&l2, &order_id, Amount::from_major(450), "5 gün")?;
    assert_eq!(o1.received_by, c.id);

    let accepted = service
        .resolve_offer(&c, &o2.id, Decision::Accept)
        .context("accepting the cheaper offer")?;
    assert_eq!(accepted.status, OfferStatus::Accepted);
    assert!(accepted.resolved_at.is_some());

    let offers = service.offers_for_order(&c, &order_id)?;
    let status_of = |id: &str| offers.iter().find(|o| o.id == id).map(|o| o.status);
    assert_eq!(status_of(o1.id.as_str()), Some(OfferStatus::Rejected));
    assert_eq!(status_of(o2.id.as_str()), Some(OfferStatus::Accepted));
    assert_eq!(service.get_order(&order_id)?.status, OrderStatus::OfferAccepted);
    Ok(())
}

#[test]
fn only_the_accepted_laboratory_advances_the_order() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, l1, l2) = (clinic()?, laboratory()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    service.submit_offer(&l1, &order_id, Amount::from_major(500), "3 gün")?;
    let winning = service.submit_offer(&l2, &order_id, Amount::from_major(450), "5 gün")?;
    service.resolve_offer(&c, &winning.id, Decision::Accept)?;
    service.advance_order_status(&l2, &order_id, OrderStatus::InProduction)?;

    let err = service
        .advance_order_status(&l1, &order_id, OrderStatus::ReadyToShip)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // the clinic cannot drive production either
    let err = service
        .advance_order_status(&c, &order_id, OrderStatus::ReadyToShip)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(service.get_order(&order_id)?.status, OrderStatus::InProduction);
    Ok(())
}

#[test]
fn full_lifecycle_stamps_completion() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    let offer = service.submit_offer(&lab, &order_id, Amount::parse("1250.50")?, "1 hafta")?;
    service.resolve_offer(&c, &offer.id, Decision::Accept)?;

    let mut order = service.get_order(&order_id)?;
    for next in [
        OrderStatus::InProduction,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
    ] {
        order = service.advance_order_status(&lab, &order_id, next)?;
        assert_eq!(order.status, next);
        assert!(order.completed_at.is_none());
    }

    let delivered = service.advance_order_status(&lab, &order_id, OrderStatus::Delivered)?;
    assert_eq!(delivered.completed_at, Some(delivered.updated_at));
    assert!(delivered.updated_at >= order.updated_at);

    // terminal: nothing further, not even cancellation
    let err = service
        .advance_order_status(&lab, &order_id, OrderStatus::Cancelled)
        .unwrap_err();
    assert!(matches!(
        err,
        MarketplaceError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled
        }
    ));
    Ok(())
}

#[test]
fn advancing_without_an_accepted_offer_is_a_conflict() -> anyhow::Result<()> {
    let h = harness()?;
    let (c, lab) = (clinic()?, laboratory()?);
    let order_id = h.service.create_order(&c, crown_order())?.order.id;

    let err = h
        .service
        .advance_order_status(&lab, &order_id, OrderStatus::InProduction)
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::NoAcceptedOffer));
    Ok(())
}

#[test]
fn transitions_follow_the_table_exactly() -> anyhow::Result<()> {
    for from in OrderStatus::ALL {
        for to in OrderStatus::ALL {
            let allowed = matches!(
                (from, to),
                (OrderStatus::OfferAccepted, OrderStatus::InProduction)
                    | (OrderStatus::InProduction, OrderStatus::ReadyToShip)
                    | (OrderStatus::ReadyToShip, OrderStatus::Shipped)
                    | (OrderStatus::Shipped, OrderStatus::Delivered)
                    | (OrderStatus::OfferAccepted, OrderStatus::Cancelled)
                    | (OrderStatus::InProduction, OrderStatus::Cancelled)
                    | (OrderStatus::ReadyToShip, OrderStatus::Cancelled)
                    | (OrderStatus::Shipped, OrderStatus::Cancelled)
            );
            assert_eq!(from.can_advance_to(to), allowed, "{from} -> {to}");
        }
    }
    Ok(())
}

#[test]
fn offers_on_an_assigned_order_are_refused() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, l1, l2) = (clinic()?, laboratory()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    let offer = service.submit_offer(&l1, &order_id, Amount::from_major(300), "2 gün")?;
    service.resolve_offer(&c, &offer.id, Decision::Accept)?;

    let err = service
        .submit_offer(&l2, &order_id, Amount::from_major(250), "1 gün")
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::NotAcceptingOffers));
    assert_eq!(err.code(), "ORDER_NOT_ACCEPTING_OFFERS");
    Ok(())
}

#[test]
fn rejecting_leaves_the_order_open() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    let offer = service.submit_offer(&lab, &order_id, Amount::from_major(900), "10 gün")?;
    let rejected = service.resolve_offer(&c, &offer.id, Decision::Reject)?;
    assert_eq!(rejected.status, OfferStatus::Rejected);
    assert_eq!(service.get_order(&order_id)?.status, OrderStatus::OpenForOffers);

    // resolved offers stay resolved
    let err = service
        .resolve_offer(&c, &offer.id, Decision::Accept)
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::AlreadyResolved));

    // a rejected offer frees the slot for a fresh one
    let again = service.submit_offer(&lab, &order_id, Amount::from_major(800), "8 gün")?;
    assert_eq!(again.status, OfferStatus::Pending);
    Ok(())
}

#[test]
fn duplicate_live_offers_are_refused() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    let first = service.submit_offer(&lab, &order_id, Amount::from_major(400), "4 gün")?;
    let err = service
        .submit_offer(&lab, &order_id, Amount::from_major(390), "4 gün")
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::DuplicateOffer));

    let withdrawn = service.withdraw_offer(&lab, &first.id)?;
    assert_eq!(withdrawn.status, OfferStatus::Cancelled);
    assert!(service.existing_offer(&lab, &order_id)?.is_none());

    let second = service.submit_offer(&lab, &order_id, Amount::from_major(390), "4 gün")?;
    assert_eq!(
        service.existing_offer(&lab, &order_id)?.map(|o| o.id),
        Some(second.id)
    );
    Ok(())
}

#[test]
fn only_the_receiver_resolves_and_only_the_sender_withdraws() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, other_clinic, lab) = (clinic()?, clinic()?, laboratory()?);

    let order_id = service.create_order(&c, crown_order())?.order.id;
    let offer = service.submit_offer(&lab, &order_id, Amount::from_major(400), "4 gün")?;

    for actor in [&other_clinic, &lab] {
        let err = service
            .resolve_offer(actor, &offer.id, Decision::Accept)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    let err = service.withdraw_offer(&c, &offer.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    Ok(())
}

#[test]
fn same_role_offers_are_forbidden() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, other_clinic) = (clinic()?, clinic()?);
    let order_id = service.create_order(&c, crown_order())?.order.id;

    let err = service
        .submit_offer(&other_clinic, &order_id, Amount::from_major(100), "1 gün")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let admin = Identity::admin("user_admin");
    let err = service
        .submit_offer(&admin, &order_id, Amount::from_major(100), "1 gün")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    Ok(())
}

#[test]
fn offer_inputs_are_validated() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);
    let order_id = service.create_order(&c, crown_order())?.order.id;

    let err = service
        .submit_offer(&lab, &order_id, Amount::from_minor(0), "1 gün")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .submit_offer(&lab, &order_id, Amount::from_major(10), "   ")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .submit_offer(&lab, "order_missing", Amount::from_major(10), "1 gün")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn order_creation_is_validated() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c, lab) = (clinic()?, laboratory()?);

    let err = service.create_order(&lab, crown_order()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let bad = [
        NewOrder::new("  ", "no title").add_material("M1", 1),
        NewOrder::new("No lines", ""),
        NewOrder::new("Zero", "").add_material("M1", 0),
        NewOrder::new("Unknown", "").add_material("M404", 1),
    ];
    for draft in bad {
        let err = service.create_order(&c, draft).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert!(service.list_orders_for(&c)?.is_empty());

    let created = service.create_order(
        &c,
        NewOrder::new("Implant", "lower right")
            .add_line(NewMaterialLine::new("M2", 1).with_notes("short neck"))
            .add_material("M1", 1),
    )?;
    assert_eq!(created.lines.len(), 2);
    assert_eq!(created.lines[0].notes, "short neck");
    assert_eq!(service.order_with_lines(&created.order.id)?.lines, created.lines);
    Ok(())
}

#[test]
fn listings_depend_on_role() -> anyhow::Result<()> {
    let h = harness()?;
    let service = &h.service;
    let (c1, c2, lab) = (clinic()?, clinic()?, laboratory()?);

    let first = service.create_order(&c1, crown_order())?.order.id;
    let second = service.create_order(&c1, crown_order())?.order.id;
    service.create_order(&c2, crown_order())?;

    let mine = service.list_orders_for(&c1)?;
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].order.id, second);

    let offer = service.submit_offer(&lab, &first, Amount::from_major(100), "1 gün")?;
    service.resolve_offer(&c1, &offer.id, Decision::Accept)?;

    let open = service.list_orders_for(&lab)?;
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|o| o.order.status == OrderStatus::OpenForOffers));

    let err = service
        .list_orders_for(&Identity::admin("user_admin"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    Ok(())
}
