//! Read side: order and offer projections, dashboards and laboratory price lists
use crate::error::{MarketResult, MarketplaceError};
use crate::identity::{Identity, Role};
use crate::inventory::{InventoryItem, LabInventory, validate_items};
use crate::offer::{Offer, OfferStatus};
use crate::order::{Order, OrderStatus};
use crate::projection::{
    AssignedOrder, ClinicStats, LabListing, LineView, OfferView, OrderDetails, OrderWithLines,
};
use crate::service::MarketplaceService;
use crate::types::TimeStamp;
use tracing::{info, instrument};

const RECENT_ORDERS_LIMIT: usize = 5;

fn newest_first(offers: &mut [OfferView]) {
    offers.sort_by(|a, b| b.offer.created_at.cmp(&a.offer.created_at));
}

impl MarketplaceService {
    /// Full picture of an assigned order: lines with catalog names and the
    /// accepted offer.
    pub fn order_details(&self, identity: &Identity, order_id: &str) -> MarketResult<OrderDetails> {
        let order = self.store.require_order(order_id)?;
        let offer = self
            .store
            .accepted_offer(order_id)?
            .ok_or_else(|| MarketplaceError::not_found("accepted offer", order_id))?;

        let allowed = match identity.role {
            Role::Admin => true,
            Role::Clinic => order.clinic_id == identity.id,
            Role::Laboratory => offer.offered_by == identity.id,
        };
        if !allowed {
            return Err(MarketplaceError::forbidden(
                "order details are limited to the clinic and assigned laboratory",
            ));
        }

        let lines = self
            .store
            .lines_for(order_id)?
            .into_iter()
            .map(|line| LineView::resolve(line, self.catalog.as_ref()))
            .collect();

        Ok(OrderDetails {
            order,
            offer,
            lines,
            viewer_role: identity.role,
        })
    }

    /// Admins and the owning clinic always; laboratories only while the order is
    /// still open for offers.
    pub fn view_order(&self, identity: &Identity, order_id: &str) -> MarketResult<OrderWithLines> {
        let found = self.order_with_lines(order_id)?;
        let allowed = match identity.role {
            Role::Admin => true,
            Role::Clinic => found.order.clinic_id == identity.id,
            Role::Laboratory => found.order.status == OrderStatus::OpenForOffers,
        };
        if !allowed {
            return Err(MarketplaceError::forbidden("order is not visible to this user"));
        }
        Ok(found)
    }

    fn offer_views(&self, matches: impl Fn(&Offer) -> bool) -> MarketResult<Vec<OfferView>> {
        let mut views = vec![];
        for offer in self.store.all_offers()? {
            if !matches(&offer) {
                continue;
            }
            let order = self.store.get_order(&offer.order_id)?;
            views.push(OfferView {
                order_title: order.as_ref().map(|o| o.title.clone()),
                order_status: order.map(|o| o.status),
                offer,
            });
        }
        newest_first(&mut views);
        Ok(views)
    }

    pub fn sent_offers(&self, identity: &Identity) -> MarketResult<Vec<OfferView>> {
        self.offer_views(|offer| offer.offered_by == identity.id)
    }

    pub fn received_offers(&self, identity: &Identity) -> MarketResult<Vec<OfferView>> {
        self.offer_views(|offer| offer.received_by == identity.id)
    }

    /// The caller's live (pending or accepted) offer on an order.
    pub fn existing_offer(&self, identity: &Identity, order_id: &str) -> MarketResult<Option<Offer>> {
        Ok(self
            .store
            .offers_for_order(order_id)?
            .into_iter()
            .find(|offer| offer.offered_by == identity.id && offer.status.is_active()))
    }

    pub fn offers_for_order(&self, identity: &Identity, order_id: &str) -> MarketResult<Vec<Offer>> {
        let order = self.store.require_order(order_id)?;
        if identity.role != Role::Admin && order.clinic_id != identity.id {
            return Err(MarketplaceError::forbidden(
                "only the owning clinic may list offers on this order",
            ));
        }
        let mut offers = self.store.offers_for_order(order_id)?;
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(offers)
    }

    fn owned_orders(&self, identity: &Identity) -> MarketResult<Vec<Order>> {
        identity.require_role(Role::Clinic, "view the clinic dashboard")?;
        Ok(self
            .store
            .all_orders()?
            .into_iter()
            .filter(|order| order.clinic_id == identity.id)
            .collect())
    }

    pub fn clinic_stats(&self, identity: &Identity) -> MarketResult<ClinicStats> {
        let orders = self.owned_orders(identity)?;
        let pending_offers = self
            .store
            .all_offers()?
            .iter()
            .filter(|offer| offer.received_by == identity.id && offer.is_pending())
            .count();
        let delivered_orders = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Delivered)
            .count();

        Ok(ClinicStats {
            undelivered_orders: orders.len() - delivered_orders,
            pending_offers,
            delivered_orders,
        })
    }

    /// Orders still collecting offers, newest first.
    pub fn clinic_awaiting_orders(&self, identity: &Identity) -> MarketResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .owned_orders(identity)?
            .into_iter()
            .filter(|order| order.status == OrderStatus::OpenForOffers)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// The latest moving orders for the dashboard feed: open or being worked
    /// on, most recently updated first. Accepted-but-not-started and
    /// delivered orders are left out.
    pub fn clinic_recent_orders(&self, identity: &Identity) -> MarketResult<Vec<OrderWithLines>> {
        let mut orders: Vec<Order> = self
            .owned_orders(identity)?
            .into_iter()
            .filter(|order| {
                order.status == OrderStatus::OpenForOffers || order.status.is_in_production()
            })
            .collect();
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        orders.truncate(RECENT_ORDERS_LIMIT);

        orders
            .into_iter()
            .map(|order| -> MarketResult<OrderWithLines> {
                let lines = self.store.lines_for(&order.id)?;
                Ok(OrderWithLines { order, lines })
            })
            .collect()
    }

    // Orders joined with their accepted offer, most recently updated first
    fn assigned_orders(
        &self,
        holds: impl Fn(&Offer) -> bool,
        status: impl Fn(OrderStatus) -> bool,
    ) -> MarketResult<Vec<AssignedOrder>> {
        let mut assigned = vec![];
        for offer in self.store.all_offers()? {
            if offer.status != OfferStatus::Accepted || !holds(&offer) {
                continue;
            }
            if let Some(order) = self.store.get_order(&offer.order_id)? {
                if status(order.status) {
                    assigned.push(AssignedOrder { order, offer });
                }
            }
        }
        assigned.sort_by(|a, b| b.order.updated_at.cmp(&a.order.updated_at));
        Ok(assigned)
    }

    pub fn clinic_accepted_orders(&self, identity: &Identity) -> MarketResult<Vec<AssignedOrder>> {
        identity.require_role(Role::Clinic, "view the clinic dashboard")?;
        self.assigned_orders(|offer| offer.received_by == identity.id, |s| s.is_assigned())
    }

    pub fn clinic_completed_orders(&self, identity: &Identity) -> MarketResult<Vec<AssignedOrder>> {
        identity.require_role(Role::Clinic, "view the clinic dashboard")?;
        self.assigned_orders(
            |offer| offer.received_by == identity.id,
            |s| s == OrderStatus::Delivered,
        )
    }

    pub fn lab_production_orders(&self, identity: &Identity) -> MarketResult<Vec<AssignedOrder>> {
        identity.require_role(Role::Laboratory, "view the production board")?;
        self.assigned_orders(|offer| offer.offered_by == identity.id, |s| {
            s.is_in_production()
        })
    }

    pub fn lab_completed_orders(&self, identity: &Identity) -> MarketResult<Vec<AssignedOrder>> {
        identity.require_role(Role::Laboratory, "view the production board")?;
        self.assigned_orders(
            |offer| offer.offered_by == identity.id,
            |s| s == OrderStatus::Delivered,
        )
    }

    /// Replaces the caller's whole price list.
    #[instrument(skip_all, fields(actor = %identity.id, items = items.len()))]
    pub fn set_lab_inventory(
        &self,
        identity: &Identity,
        items: Vec<InventoryItem>,
    ) -> MarketResult<LabInventory> {
        identity.require_role(Role::Laboratory, "manage inventory")?;
        validate_items(&items, self.catalog.as_ref())?;

        let inventory = LabInventory {
            lab_id: identity.id.clone(),
            items,
            updated_at: TimeStamp::new(),
        };
        self.store.put_lab_inventory(&inventory)?;

        info!("inventory replaced");
        Ok(inventory)
    }

    /// Laboratories a clinic can browse, by name, optionally narrowed to one
    /// city. Each comes with its price list resolved against the catalog.
    pub fn laboratories(
        &self,
        identity: &Identity,
        city: Option<&str>,
    ) -> MarketResult<Vec<LabListing>> {
        identity.require_role(Role::Clinic, "browse laboratories")?;

        let mut profiles = self.laboratories.laboratories();
        if let Some(city) = city {
            profiles.retain(|profile| profile.city.as_deref() == Some(city));
        }
        profiles.sort_by(|a, b| a.name.cmp(&b.name));

        profiles
            .into_iter()
            .map(|profile| -> MarketResult<LabListing> {
                let inventory = self.lab_inventory(&profile.id)?;
                Ok(LabListing::new(profile, inventory, self.catalog.as_ref()))
            })
            .collect()
    }

    /// A laboratory's price list; empty when it never set one.
    pub fn lab_inventory(&self, lab_id: &str) -> MarketResult<LabInventory> {
        Ok(self
            .store
            .lab_inventory(lab_id)?
            .unwrap_or_else(|| LabInventory::empty(lab_id)))
    }
}
