//! Laboratory price lists per catalog material
use crate::catalog::MaterialCatalog;
use crate::error::{MarketResult, MarketplaceError};
use crate::types::{Amount, TimeStamp};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    #[n(0)]
    pub material_id: String,
    #[n(1)]
    pub price: Amount,
}

impl InventoryItem {
    pub fn new(material_id: impl Into<String>, price: Amount) -> Self {
        Self {
            material_id: material_id.into(),
            price,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LabInventory {
    #[n(0)]
    pub lab_id: String,
    #[n(1)]
    pub items: Vec<InventoryItem>,
    #[n(2)]
    pub updated_at: TimeStamp,
}

impl LabInventory {
    pub fn empty(lab_id: &str) -> Self {
        Self {
            lab_id: lab_id.to_string(),
            items: vec![],
            updated_at: TimeStamp::new(),
        }
    }

    pub fn price_of(&self, material_id: &str) -> Option<Amount> {
        self.items
            .iter()
            .find(|item| item.material_id == material_id)
            .map(|item| item.price)
    }
}

pub fn validate_items(items: &[InventoryItem], catalog: &dyn MaterialCatalog) -> MarketResult<()> {
    for (idx, item) in items.iter().enumerate() {
        if catalog.get_material(&item.material_id).is_none() {
            return Err(MarketplaceError::validation(format!(
                "unknown material '{}'",
                item.material_id
            )));
        }
        if item.price.is_zero() {
            return Err(MarketplaceError::validation(format!(
                "price for material '{}' must be positive",
                item.material_id
            )));
        }
        if items[..idx]
            .iter()
            .any(|prev| prev.material_id == item.material_id)
        {
            return Err(MarketplaceError::validation(format!(
                "material '{}' listed twice",
                item.material_id
            )));
        }
    }
    Ok(())
}
