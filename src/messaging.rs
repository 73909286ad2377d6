//! Per-order message threads between the owning clinic and the assigned
//! laboratory.
//!
//! A thread is writable until its order reaches a terminal status. New
//! messages are pushed on the order's realtime channel after the write commits;
//! a failed push is logged and the message stays stored.
use crate::error::{ConflictReason, MarketResult, MarketplaceError};
use crate::identity::{Identity, Role};
use crate::message::Message;
use crate::notify;
use crate::offer::{Offer, OfferStatus};
use crate::order::Order;
use crate::projection::UnseenMessage;
use crate::service::MarketplaceService;
use crate::store;
use crate::types::TimeStamp;
use crate::utils::{is_blank, new_uuid_to_bech32, preview};
use sled::transaction::abort;
use tracing::{debug, info, instrument, warn};

/// The owning clinic, or the laboratory whose offer was accepted.
fn is_participant(identity: &Identity, order: &Order, accepted: Option<&Offer>) -> bool {
    match identity.role {
        Role::Clinic => order.clinic_id == identity.id,
        Role::Laboratory => accepted.is_some_and(|offer| offer.offered_by == identity.id),
        Role::Admin => false,
    }
}

impl MarketplaceService {
    #[instrument(skip_all, fields(actor = %identity.id, order_id = %order_id))]
    pub fn send_message(
        &self,
        identity: &Identity,
        order_id: &str,
        content: &str,
    ) -> MarketResult<Message> {
        let message_id = new_uuid_to_bech32("msg_")?;
        let now = TimeStamp::new();
        let content = content.trim();

        let message = self.store.transaction(|tx| {
            let order = tx.require_order(order_id)?;
            if !order.status.accepts_messages() {
                return abort(MarketplaceError::Conflict(ConflictReason::MessagingClosed));
            }
            let accepted = tx.accepted_offer(order_id)?;
            if !is_participant(identity, &order, accepted.as_ref()) {
                return abort(MarketplaceError::forbidden(
                    "only the order's clinic and assigned laboratory may write here",
                ));
            }
            if is_blank(content) {
                return abort(MarketplaceError::validation("message content is required"));
            }

            let message = Message::new(message_id.clone(), order_id, &identity.id, content, now);
            tx.insert_message(&message)?;
            Ok(message)
        })?;

        info!(message_id = %message.id, "message stored");
        self.publish(&message);

        Ok(message)
    }

    fn publish(&self, message: &Message) {
        let payload = match store::encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "could not encode realtime payload");
                return;
            }
        };
        let channel = notify::order_channel(&message.order_id);
        match self
            .realtime
            .publish(&channel, &self.messaging.event_name, payload)
        {
            Ok(()) => debug!(%channel, "message published"),
            Err(e) => warn!(%channel, error = %e, "realtime publish failed"),
        }
    }

    /// Flags a message as read. Calling it again is a no-op.
    #[instrument(skip_all, fields(actor = %identity.id, message_id = %message_id))]
    pub fn mark_seen(&self, identity: &Identity, message_id: &str) -> MarketResult<Message> {
        let (message, changed) = self.store.transaction(|tx| {
            let mut message = tx.require_message(message_id)?;
            if identity.role != Role::Admin {
                let order = tx.require_order(&message.order_id)?;
                let accepted = tx.accepted_offer(&order.id)?;
                if !is_participant(identity, &order, accepted.as_ref()) {
                    return abort(MarketplaceError::forbidden(
                        "not a participant of this conversation",
                    ));
                }
            }
            let changed = message.mark_read();
            if changed {
                tx.put_message(&message)?;
            }
            Ok((message, changed))
        })?;

        if changed {
            debug!("message marked as read");
        }
        Ok(message)
    }

    /// The thread of one order, oldest first.
    pub fn list_messages(&self, identity: &Identity, order_id: &str) -> MarketResult<Vec<Message>> {
        let order = self.store.require_order(order_id)?;
        if identity.role != Role::Admin {
            let accepted = self.store.accepted_offer(order_id)?;
            if !is_participant(identity, &order, accepted.as_ref()) {
                return Err(MarketplaceError::forbidden(
                    "not a participant of this conversation",
                ));
            }
        }
        self.store.messages_for_order(order_id)
    }

    /// Unread messages addressed to the caller across all of their orders,
    /// newest first, each with a shortened preview of its content.
    pub fn unseen_messages(&self, identity: &Identity) -> MarketResult<Vec<UnseenMessage>> {
        let orders: Vec<Order> = match identity.role {
            Role::Clinic => self
                .store
                .all_orders()?
                .into_iter()
                .filter(|order| order.clinic_id == identity.id)
                .collect(),
            Role::Laboratory => {
                let mut orders = vec![];
                for offer in self.store.all_offers()? {
                    if offer.offered_by == identity.id && offer.status == OfferStatus::Accepted {
                        if let Some(order) = self.store.get_order(&offer.order_id)? {
                            orders.push(order);
                        }
                    }
                }
                orders
            }
            Role::Admin => return Ok(vec![]),
        };

        let mut unseen = vec![];
        for order in orders {
            for message in self.store.messages_for_order(&order.id)? {
                if message.read || message.sender_id == identity.id {
                    continue;
                }
                unseen.push(UnseenMessage {
                    preview: preview(&message.content, self.messaging.preview_length),
                    message_id: message.id,
                    order_id: order.id.clone(),
                    order_title: order.title.clone(),
                    sender_id: message.sender_id,
                    created_at: message.created_at,
                });
            }
        }
        unseen.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(unseen)
    }
}
