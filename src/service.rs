//! Service layer API for the order and offer workflow
use crate::catalog::MaterialCatalog;
use crate::config::{MarketplaceConfig, MessagingConfig, UploadConfig};
use crate::error::{ConflictReason, MarketResult, MarketplaceError};
use crate::identity::{
    Identity, IdentityProvider, LaboratoryDirectory, Role, StaticIdentityProvider,
    StaticLaboratoryDirectory,
};
use crate::notify::{
    self, CLINIC_OFFERS_VIEW, CLINIC_VIEW, InMemoryObjectStorage, LABORATORY_OFFERS_VIEW,
    LABORATORY_VIEW, NullTransport, NullViewCache, ObjectStorage, RealtimeTransport, ViewCache,
};
use crate::offer::{Decision, Offer, OfferStatus};
use crate::order::{NewOrder, Order, OrderStatus};
use crate::projection::OrderWithLines;
use crate::store::MarketplaceStore;
use crate::types::{Amount, TimeStamp};
use crate::utils::{is_blank, new_uuid_to_bech32};
use sled::transaction::abort;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct MarketplaceService {
    pub(crate) store: MarketplaceStore,
    pub(crate) catalog: Arc<dyn MaterialCatalog>,
    pub(crate) identities: Arc<dyn IdentityProvider>,
    pub(crate) laboratories: Arc<dyn LaboratoryDirectory>,
    pub(crate) realtime: Arc<dyn RealtimeTransport>,
    pub(crate) views: Arc<dyn ViewCache>,
    pub(crate) objects: Arc<dyn ObjectStorage>,
    pub(crate) messaging: MessagingConfig,
    pub(crate) uploads: UploadConfig,
}

impl MarketplaceService {
    /// Builds a service over an already opened database.
    ///
    /// Collaborators default to no-op / in-memory versions; swap them with the
    /// `with_*` methods.
    pub fn new(instance: Arc<sled::Db>, catalog: Arc<dyn MaterialCatalog>) -> MarketResult<Self> {
        let defaults = MarketplaceConfig::default();
        Ok(Self {
            store: MarketplaceStore::open(instance)?,
            catalog,
            identities: Arc::new(StaticIdentityProvider::new()),
            laboratories: Arc::new(StaticLaboratoryDirectory::default()),
            realtime: Arc::new(NullTransport),
            views: Arc::new(NullViewCache),
            objects: Arc::new(InMemoryObjectStorage::default()),
            messaging: defaults.messaging,
            uploads: defaults.uploads,
        })
    }

    pub fn with_config(mut self, config: &MarketplaceConfig) -> Self {
        self.messaging = config.messaging.clone();
        self.uploads = config.uploads.clone();
        self
    }
    pub fn with_identity_provider(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = identities;
        self
    }
    pub fn with_laboratory_directory(mut self, laboratories: Arc<dyn LaboratoryDirectory>) -> Self {
        self.laboratories = laboratories;
        self
    }
    pub fn with_realtime(mut self, realtime: Arc<dyn RealtimeTransport>) -> Self {
        self.realtime = realtime;
        self
    }
    pub fn with_view_cache(mut self, views: Arc<dyn ViewCache>) -> Self {
        self.views = views;
        self
    }
    pub fn with_object_storage(mut self, objects: Arc<dyn ObjectStorage>) -> Self {
        self.objects = objects;
        self
    }

    pub fn store(&self) -> &MarketplaceStore {
        &self.store
    }
    pub fn catalog(&self) -> &dyn MaterialCatalog {
        self.catalog.as_ref()
    }

    /// Resolves a session credential into a verified identity.
    pub fn authenticate(&self, credential: Option<&str>) -> MarketResult<Identity> {
        credential
            .and_then(|credential| self.identities.authenticate(credential))
            .ok_or(MarketplaceError::Unauthorized)
    }

    pub(crate) fn invalidate(&self, keys: &[&str]) {
        for key in keys {
            self.views.invalidate(key);
        }
    }

    /// Create an order in `OpenForOffers` together with its material lines
    #[instrument(skip_all, fields(actor = %identity.id))]
    pub fn create_order(&self, identity: &Identity, draft: NewOrder) -> MarketResult<OrderWithLines> {
        identity.require_role(Role::Clinic, "create orders")?;
        draft.validate(self.catalog.as_ref())?;

        let order_id = new_uuid_to_bech32("order_")?;
        let order = Order::open(
            order_id.clone(),
            identity.id.clone(),
            identity.role,
            &draft,
            TimeStamp::new(),
        );
        let lines = draft.materialize_lines(&order_id, || new_uuid_to_bech32("line_"))?;

        self.store.insert_order(&order, &lines)?;

        info!(order_id = %order.id, lines = lines.len(), "order created");
        self.invalidate(&[CLINIC_VIEW, LABORATORY_VIEW]);

        Ok(OrderWithLines { order, lines })
    }

    pub fn get_order(&self, order_id: &str) -> MarketResult<Order> {
        self.store.require_order(order_id)
    }

    pub fn order_with_lines(&self, order_id: &str) -> MarketResult<OrderWithLines> {
        let order = self.store.require_order(order_id)?;
        let lines = self.store.lines_for(order_id)?;
        Ok(OrderWithLines { order, lines })
    }

    /// Clinics see their own orders, laboratories see the open marketplace.
    /// Newest first.
    pub fn list_orders_for(&self, identity: &Identity) -> MarketResult<Vec<OrderWithLines>> {
        let mut orders: Vec<Order> = match identity.role {
            Role::Clinic => self
                .store
                .all_orders()?
                .into_iter()
                .filter(|order| order.clinic_id == identity.id)
                .collect(),
            Role::Laboratory => self
                .store
                .all_orders()?
                .into_iter()
                .filter(|order| order.status == OrderStatus::OpenForOffers)
                .collect(),
            Role::Admin => {
                return Err(MarketplaceError::forbidden(
                    "order listing is only available to clinics and laboratories",
                ));
            }
        };
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        orders
            .into_iter()
            .map(|order| {
                let lines = self.store.lines_for(&order.id)?;
                Ok(OrderWithLines { order, lines })
            })
            .collect()
    }

    /// Offer a price and delivery time on an open order
    #[instrument(skip_all, fields(actor = %identity.id, order_id = %order_id))]
    pub fn submit_offer(
        &self,
        identity: &Identity,
        order_id: &str,
        price: Amount,
        delivery_time: &str,
    ) -> MarketResult<Offer> {
        let offer_id = new_uuid_to_bech32("offer_")?;
        let now = TimeStamp::new();
        let delivery_time = delivery_time.trim();

        let offer = self.store.transaction(|tx| {
            let order = tx.require_order(order_id)?;

            if order.status != OrderStatus::OpenForOffers {
                return abort(MarketplaceError::Conflict(ConflictReason::NotAcceptingOffers));
            }

            let existing = tx.offers_for_order(order_id)?;
            if existing
                .iter()
                .any(|offer| offer.offered_by == identity.id && offer.status.is_active())
            {
                return abort(MarketplaceError::Conflict(ConflictReason::DuplicateOffer));
            }

            if !identity.role.is_counterpart_of(order.owner_role) {
                return abort(MarketplaceError::forbidden(format!(
                    "a {} cannot make offers on an order owned by a {}",
                    identity.role, order.owner_role
                )));
            }

            if price.is_zero() {
                return abort(MarketplaceError::validation("price must be positive"));
            }
            if is_blank(delivery_time) {
                return abort(MarketplaceError::validation("delivery time is required"));
            }

            let offer = Offer::pending(
                offer_id.clone(),
                &order,
                &identity.id,
                price,
                delivery_time.to_string(),
                now,
            );
            tx.insert_offer(&offer)?;
            Ok(offer)
        })?;

        info!(offer_id = %offer.id, price = %offer.price, "offer submitted");
        self.invalidate(&[LABORATORY_OFFERS_VIEW, CLINIC_OFFERS_VIEW]);

        Ok(offer)
    }

    /// Accept or reject a pending offer as its receiving party.
    ///
    /// Accepting moves the order to `OfferAccepted` and rejects every other
    /// pending offer on it, all in one transaction. Of two concurrent accepts on
    /// the same order exactly one commits; the other sees the order already
    /// taken (or its offer already rejected) and fails with a conflict.
    #[instrument(skip_all, fields(actor = %identity.id, offer_id = %offer_id, decision = ?decision))]
    pub fn resolve_offer(
        &self,
        identity: &Identity,
        offer_id: &str,
        decision: Decision,
    ) -> MarketResult<Offer> {
        let now = TimeStamp::new();

        let (offer, rejected_siblings) = self.store.transaction(|tx| {
            let mut offer = tx.require_offer(offer_id)?;

            if offer.received_by != identity.id {
                return abort(MarketplaceError::forbidden(
                    "only the receiving party may resolve this offer",
                ));
            }
            if !offer.is_pending() {
                return abort(MarketplaceError::Conflict(ConflictReason::AlreadyResolved));
            }

            match decision {
                Decision::Reject => {
                    offer.resolve(OfferStatus::Rejected, now);
                    tx.put_offer(&offer)?;
                    Ok((offer, 0))
                }
                Decision::Accept => {
                    let mut order = tx.require_order(&offer.order_id)?;
                    if order.status != OrderStatus::OpenForOffers {
                        return abort(MarketplaceError::Conflict(
                            ConflictReason::NotAcceptingOffers,
                        ));
                    }

                    offer.resolve(OfferStatus::Accepted, now);
                    tx.put_offer(&offer)?;

                    order.apply_status(OrderStatus::OfferAccepted, now);
                    tx.put_order(&order)?;

                    let mut rejected = 0;
                    for mut sibling in tx.offers_for_order(&order.id)? {
                        if sibling.id == offer.id || !sibling.is_pending() {
                            continue;
                        }
                        sibling.resolve(OfferStatus::Rejected, now);
                        tx.put_offer(&sibling)?;
                        rejected += 1;
                    }
                    Ok((offer, rejected))
                }
            }
        })?;

        match decision {
            Decision::Accept => info!(
                order_id = %offer.order_id,
                rejected_siblings,
                "offer accepted"
            ),
            Decision::Reject => info!(order_id = %offer.order_id, "offer rejected"),
        }
        self.invalidate(&[
            notify::order_view(&offer.order_id).as_str(),
            LABORATORY_OFFERS_VIEW,
            CLINIC_OFFERS_VIEW,
        ]);

        Ok(offer)
    }

    /// Withdraw one's own pending offer, freeing the slot for a new one
    #[instrument(skip_all, fields(actor = %identity.id, offer_id = %offer_id))]
    pub fn withdraw_offer(&self, identity: &Identity, offer_id: &str) -> MarketResult<Offer> {
        let now = TimeStamp::new();

        let offer = self.store.transaction(|tx| {
            let mut offer = tx.require_offer(offer_id)?;
            if offer.offered_by != identity.id {
                return abort(MarketplaceError::forbidden(
                    "only the offering party may withdraw this offer",
                ));
            }
            if !offer.is_pending() {
                return abort(MarketplaceError::Conflict(ConflictReason::AlreadyResolved));
            }
            offer.resolve(OfferStatus::Cancelled, now);
            tx.put_offer(&offer)?;
            Ok(offer)
        })?;

        info!(order_id = %offer.order_id, "offer withdrawn");
        self.invalidate(&[LABORATORY_OFFERS_VIEW, CLINIC_OFFERS_VIEW]);

        Ok(offer)
    }

    /// Move an accepted order one step along production, or cancel it
    #[instrument(skip_all, fields(actor = %identity.id, order_id = %order_id, next = %next))]
    pub fn advance_order_status(
        &self,
        identity: &Identity,
        order_id: &str,
        next: OrderStatus,
    ) -> MarketResult<Order> {
        let now = TimeStamp::new();

        let (previous, order) = self.store.transaction(|tx| {
            let mut order = tx.require_order(order_id)?;

            let Some(accepted) = tx.accepted_offer(order_id)? else {
                return abort(MarketplaceError::Conflict(ConflictReason::NoAcceptedOffer));
            };

            if identity.role != Role::Laboratory || identity.id != accepted.offered_by {
                return abort(MarketplaceError::forbidden(
                    "only the laboratory holding the accepted offer may update this order",
                ));
            }

            if !order.status.can_advance_to(next) {
                debug!(current = %order.status, "transition refused");
                return abort(MarketplaceError::InvalidTransition {
                    from: order.status,
                    to: next,
                });
            }

            let previous = order.status;
            order.apply_status(next, now);
            tx.put_order(&order)?;
            Ok((previous, order))
        })?;

        info!(from = %previous, to = %order.status, "order status changed");
        self.invalidate(&[
            notify::order_view(&order.id).as_str(),
            LABORATORY_VIEW,
            CLINIC_VIEW,
        ]);

        Ok(order)
    }

    /// Store a model file for a future order and return its url
    #[instrument(skip_all, fields(actor = %identity.id, file_name = %file_name))]
    pub fn upload_model(
        &self,
        identity: &Identity,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> MarketResult<String> {
        identity.require_role(Role::Clinic, "upload model files")?;

        let base_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        if base_name.is_empty() {
            return Err(MarketplaceError::validation("file name is required"));
        }
        if bytes.is_empty() {
            return Err(MarketplaceError::validation("file is empty"));
        }

        let key = format!(
            "{}/{}-{}",
            self.uploads.key_prefix.trim_end_matches('/'),
            identity.id,
            base_name
        );
        let size = bytes.len();
        let url = self
            .objects
            .put(&key, bytes, content_type)
            .map_err(|e| MarketplaceError::Unavailable(format!("object storage: {e:#}")))?;

        info!(%key, size, "model uploaded");
        Ok(url)
    }
}
