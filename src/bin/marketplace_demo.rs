//! Walks one order through the marketplace: two laboratories bid, the clinic
//! accepts one and the winner delivers.
//!
//! ```text
//! marketplace-demo [config.toml]
//! ```
use anyhow::Context;
use dental_marketplace::catalog::{InMemoryCatalog, Material};
use dental_marketplace::config::ConfigLoader;
use dental_marketplace::identity::StaticIdentityProvider;
use dental_marketplace::{
    Amount, Decision, Identity, MarketplaceService, NewOrder, OrderStatus, logging, utils,
};
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = std::env::args().nth(1) {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("loading configuration")?;
    let db = config.open_database().context("opening database")?;

    let catalog = InMemoryCatalog::new(vec![
        Material::new("zirconia", "Zirconia block", "Crowns").with_description("monolithic"),
        Material::new("emax", "IPS e.max", "Crowns"),
        Material::new("titanium", "Titanium abutment", "Implants"),
    ]);

    let clinic = Identity::clinic(utils::new_uuid_to_bech32("user_")?);
    let lab_a = Identity::laboratory(utils::new_uuid_to_bech32("user_")?);
    let lab_b = Identity::laboratory(utils::new_uuid_to_bech32("user_")?);

    let identities = StaticIdentityProvider::new();
    identities.register("clinic-session", clinic.clone());

    let service = MarketplaceService::new(Arc::new(db), Arc::new(catalog))?
        .with_config(&config)
        .with_identity_provider(Arc::new(identities));

    let clinic = service.authenticate(Some("clinic-session"))?;

    let model_url = service.upload_model(&clinic, "upper-jaw.stl", vec![0u8; 128], "model/stl")?;
    let created = service.create_order(
        &clinic,
        NewOrder::new("Three unit bridge", "upper left, shade A2")
            .add_material("zirconia", 3)
            .add_material("titanium", 1)
            .set_model_url(model_url),
    )?;
    let order_id = created.order.id;

    let offer_a = service.submit_offer(&lab_a, &order_id, Amount::parse("450.00")?, "5 days")?;
    let offer_b = service.submit_offer(&lab_b, &order_id, Amount::parse("520.50")?, "3 days")?;

    service.resolve_offer(&clinic, &offer_a.id, Decision::Accept)?;
    let losing = service
        .offers_for_order(&clinic, &order_id)?
        .into_iter()
        .find(|offer| offer.id == offer_b.id)
        .context("second offer vanished")?;
    info!(status = %losing.status, "competing offer");

    service.send_message(&clinic, &order_id, "Please confirm the shade before milling.")?;
    service.send_message(&lab_a, &order_id, "Confirmed, A2.")?;

    for next in [
        OrderStatus::InProduction,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        service.advance_order_status(&lab_a, &order_id, next)?;
    }

    let details = service.order_details(&clinic, &order_id)?;
    info!(
        status = %details.order.status,
        laboratory = %details.offer.offered_by,
        price = %details.offer.price,
        completed_at = ?details.order.completed_at.map(|t| t.to_string()),
        "order finished"
    );

    service.store().flush()?;
    Ok(())
}
