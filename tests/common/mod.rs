#![allow(dead_code)]

use dental_marketplace::catalog::{InMemoryCatalog, Material};
use dental_marketplace::{Identity, MarketplaceService, NewOrder, logging, utils};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

pub struct Harness {
    // keeps the database directory alive for the test's duration
    pub _dir: TempDir,
    pub service: MarketplaceService,
}

pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(vec![
        Material::new("M1", "Zirconia block", "Crowns"),
        Material::new("M2", "Titanium abutment", "Implants").with_description("grade 5"),
    ])
}

pub fn harness() -> anyhow::Result<Harness> {
    harness_with(|service| service)
}

pub fn harness_with(
    configure: impl FnOnce(MarketplaceService) -> MarketplaceService,
) -> anyhow::Result<Harness> {
    logging::init_test();
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("marketplace.db"))?;
    let service = MarketplaceService::new(Arc::new(db), Arc::new(catalog()))?;
    Ok(Harness {
        _dir: temp_dir,
        service: configure(service),
    })
}

pub fn clinic() -> anyhow::Result<Identity> {
    Ok(Identity::clinic(utils::new_uuid_to_bech32("user_")?))
}

pub fn laboratory() -> anyhow::Result<Identity> {
    Ok(Identity::laboratory(utils::new_uuid_to_bech32("user_")?))
}

pub fn crown_order() -> NewOrder {
    NewOrder::new("Crowns 11-21", "two zirconia crowns").add_material("M1", 2)
}
