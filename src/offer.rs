//! Offers made against open orders
use crate::order::Order;
use crate::types::{Amount, TimeStamp};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
}

impl OfferStatus {
    /// Pending and Accepted offers occupy the party's single slot on an order.
    pub fn is_active(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The receiving party's answer to a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub order_id: String,
    #[n(2)]
    pub offered_by: String,
    #[n(3)]
    pub received_by: String,
    #[n(4)]
    pub price: Amount,
    #[n(5)]
    pub delivery_time: String, // free text, e.g. "3 gün"
    #[n(6)]
    pub status: OfferStatus,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub resolved_at: Option<TimeStamp>,
}

impl Offer {
    pub fn pending(
        id: String,
        order: &Order,
        offered_by: &str,
        price: Amount,
        delivery_time: String,
        now: TimeStamp,
    ) -> Self {
        Self {
            id,
            order_id: order.id.clone(),
            offered_by: offered_by.to_string(),
            received_by: order.clinic_id.clone(),
            price,
            delivery_time,
            status: OfferStatus::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }

    /// Moves a pending offer to its final status.
    pub fn resolve(&mut self, status: OfferStatus, now: TimeStamp) {
        self.status = status;
        self.resolved_at = Some(now);
    }
}
