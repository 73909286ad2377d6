//! Read models returned by the query side of the service
use crate::catalog::MaterialCatalog;
use crate::identity::{LaboratoryProfile, Role};
use crate::inventory::{InventoryItem, LabInventory};
use crate::offer::Offer;
use crate::order::{MaterialLine, Order, OrderStatus};
use crate::types::{Amount, TimeStamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<MaterialLine>,
}

/// A material line joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub line: MaterialLine,
    pub name: String,
    pub category: String,
    pub description: String,
}

impl LineView {
    pub const UNKNOWN_NAME: &'static str = "Unknown material";
    pub const UNKNOWN_CATEGORY: &'static str = "Other";

    pub fn resolve(line: MaterialLine, catalog: &dyn MaterialCatalog) -> Self {
        match catalog.get_material(&line.material_id) {
            Some(material) => Self {
                line,
                name: material.name,
                category: material.category,
                description: material.description.unwrap_or_default(),
            },
            None => Self {
                line,
                name: Self::UNKNOWN_NAME.to_string(),
                category: Self::UNKNOWN_CATEGORY.to_string(),
                description: String::new(),
            },
        }
    }
}

/// One priced material of a laboratory, joined with the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLine {
    pub material_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: Amount,
}

impl PriceLine {
    pub fn resolve(item: InventoryItem, catalog: &dyn MaterialCatalog) -> Self {
        let (name, category, description) = match catalog.get_material(&item.material_id) {
            Some(material) => (
                material.name,
                material.category,
                material.description.unwrap_or_default(),
            ),
            None => (
                LineView::UNKNOWN_NAME.to_string(),
                LineView::UNKNOWN_CATEGORY.to_string(),
                String::new(),
            ),
        };
        Self {
            material_id: item.material_id,
            name,
            category,
            description,
            price: item.price,
        }
    }
}

/// A laboratory as a clinic browses it: profile plus price list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabListing {
    pub id: String,
    pub name: String,
    pub city: String,
    pub inventory: Vec<PriceLine>,
}

impl LabListing {
    pub const UNKNOWN_CITY: &'static str = "Unspecified";

    pub fn new(
        profile: LaboratoryProfile,
        inventory: LabInventory,
        catalog: &dyn MaterialCatalog,
    ) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            city: profile
                .city
                .unwrap_or_else(|| Self::UNKNOWN_CITY.to_string()),
            inventory: inventory
                .items
                .into_iter()
                .map(|item| PriceLine::resolve(item, catalog))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub order: Order,
    /// The accepted offer; `offered_by` is the assigned laboratory.
    pub offer: Offer,
    pub lines: Vec<LineView>,
    /// Lets the caller adapt what it shows to who is looking.
    pub viewer_role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferView {
    pub offer: Offer,
    // None when the order record is gone
    pub order_title: Option<String>,
    pub order_status: Option<OrderStatus>,
}

/// An order together with the offer that won it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedOrder {
    pub order: Order,
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenMessage {
    pub message_id: String,
    pub order_id: String,
    pub order_title: String,
    pub sender_id: String,
    pub preview: String,
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClinicStats {
    pub undelivered_orders: usize,
    pub pending_offers: usize,
    pub delivered_orders: usize,
}
