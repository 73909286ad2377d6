//! Orders, their material lines and the order status state machine
use crate::catalog::MaterialCatalog;
use crate::error::{MarketResult, MarketplaceError};
use crate::identity::Role;
use crate::types::TimeStamp;
use crate::utils::is_blank;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[n(0)]
    OpenForOffers,
    #[n(1)]
    OfferAccepted,
    #[n(2)]
    InProduction,
    #[n(3)]
    ReadyToShip,
    #[n(4)]
    Shipped,
    #[n(5)]
    Delivered,
    #[n(6)]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::OpenForOffers,
        OrderStatus::OfferAccepted,
        OrderStatus::InProduction,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::OpenForOffers => "open_for_offers",
            OrderStatus::OfferAccepted => "offer_accepted",
            OrderStatus::InProduction => "in_production",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn accepts_messages(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses the laboratory holding the accepted offer may move to from here.
    ///
    /// `OpenForOffers -> OfferAccepted` is absent: only offer acceptance performs it.
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            OfferAccepted => &[InProduction, Cancelled],
            InProduction => &[ReadyToShip, Cancelled],
            ReadyToShip => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            OpenForOffers | Delivered | Cancelled => &[],
        }
    }

    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    /// Accepted and not yet finished: the laboratory is working on it.
    pub fn is_assigned(&self) -> bool {
        matches!(
            self,
            OrderStatus::OfferAccepted
                | OrderStatus::InProduction
                | OrderStatus::ReadyToShip
                | OrderStatus::Shipped
        )
    }

    pub fn is_in_production(&self) -> bool {
        matches!(
            self,
            OrderStatus::InProduction | OrderStatus::ReadyToShip | OrderStatus::Shipped
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub clinic_id: String,
    #[n(2)]
    pub owner_role: Role,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub model_url: Option<String>, // object storage url of the uploaded model file
    #[n(6)]
    pub status: OrderStatus,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
    #[n(9)]
    pub completed_at: Option<TimeStamp>, // set iff status == Delivered
}

impl Order {
    pub fn open(
        id: String,
        clinic_id: String,
        owner_role: Role,
        draft: &NewOrder,
        now: TimeStamp,
    ) -> Self {
        Self {
            id,
            clinic_id,
            owner_role,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            model_url: draft.model_url.clone(),
            status: OrderStatus::OpenForOffers,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Writes the new status without checking the table; callers validate first.
    pub fn apply_status(&mut self, next: OrderStatus, now: TimeStamp) {
        self.status = next;
        self.updated_at = now;
        self.completed_at = match next {
            OrderStatus::Delivered => Some(now),
            _ => None,
        };
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct MaterialLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub order_id: String,
    #[n(2)]
    pub position: u32,
    #[n(3)]
    pub material_id: String,
    #[n(4)]
    pub quantity: u32,
    #[n(5)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterialLine {
    pub material_id: String,
    pub quantity: u32,
    pub notes: String,
}

impl NewMaterialLine {
    pub fn new(material_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            material_id: material_id.into(),
            quantity,
            notes: String::new(),
        }
    }
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

// Draft handed to `create_order`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewOrder {
    pub title: String,
    pub description: String,
    pub lines: Vec<NewMaterialLine>,
    pub model_url: Option<String>,
}

impl NewOrder {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }
    pub fn add_line(mut self, line: NewMaterialLine) -> Self {
        self.lines.push(line);
        self
    }
    pub fn add_material(self, material_id: impl Into<String>, quantity: u32) -> Self {
        self.add_line(NewMaterialLine::new(material_id, quantity))
    }
    pub fn set_model_url(mut self, url: impl Into<String>) -> Self {
        self.model_url = Some(url.into());
        self
    }

    pub fn validate(&self, catalog: &dyn MaterialCatalog) -> MarketResult<()> {
        if is_blank(&self.title) {
            return Err(MarketplaceError::validation("order title is required"));
        }
        if self.lines.is_empty() {
            return Err(MarketplaceError::validation(
                "an order needs at least one material line",
            ));
        }
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(MarketplaceError::validation(format!(
                    "quantity for material '{}' must be positive",
                    line.material_id
                )));
            }
            if catalog.get_material(&line.material_id).is_none() {
                return Err(MarketplaceError::validation(format!(
                    "unknown material '{}'",
                    line.material_id
                )));
            }
        }
        if self.model_url.as_deref().is_some_and(is_blank) {
            return Err(MarketplaceError::validation("model url must not be blank"));
        }
        Ok(())
    }

    pub(crate) fn materialize_lines(
        &self,
        order_id: &str,
        mut line_id: impl FnMut() -> MarketResult<String>,
    ) -> MarketResult<Vec<MaterialLine>> {
        self.lines
            .iter()
            .enumerate()
            .map(|(position, line)| {
                Ok(MaterialLine {
                    id: line_id()?,
                    order_id: order_id.to_string(),
                    position: position as u32,
                    material_id: line.material_id.clone(),
                    quantity: line.quantity,
                    notes: line.notes.trim().to_string(),
                })
            })
            .collect()
    }
}
