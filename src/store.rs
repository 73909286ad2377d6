//! sled-backed persistence for orders, lines, offers, messages and inventories.
//!
//! Every record is CBOR-encoded with minicbor and keyed by its id. Two index
//! trees map an order to its offers (`order_offers`, a CBOR list of offer ids
//! read and written inside transactions) and to its messages (`order_messages`,
//! `{order_id}/{message_id}` keys scanned by prefix).
//!
//! Multi-record writes go through [`MarketplaceStore::transaction`], a sled
//! multi-tree transaction. sled re-runs the closure when a concurrent
//! transaction touched the same keys, so any check performed inside the closure
//! holds at commit time.
use crate::error::{MarketResult, MarketplaceError};
use crate::inventory::LabInventory;
use crate::message::Message;
use crate::offer::{Offer, OfferStatus};
use crate::order::{MaterialLine, Order};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree, abort,
};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;

pub type TxResult<T> = ConflictableTransactionResult<T, MarketplaceError>;

const ORDERS_TREE: &str = "orders";
const LINES_TREE: &str = "order_lines";
const OFFERS_TREE: &str = "offers";
const ORDER_OFFERS_TREE: &str = "order_offers";
const MESSAGES_TREE: &str = "messages";
const ORDER_MESSAGES_TREE: &str = "order_messages";
const INVENTORY_TREE: &str = "lab_inventory";

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> MarketResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> MarketResult<T> {
    Ok(minicbor::decode(bytes)?)
}

fn tx_encode<T: minicbor::Encode<()>>(value: &T) -> TxResult<Vec<u8>> {
    encode(value).map_err(ConflictableTransactionError::Abort)
}

fn tx_decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> TxResult<T> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

fn line_key(order_id: &str, position: u32) -> String {
    format!("{order_id}/{position:05}")
}

fn message_index_key(order_id: &str, message_id: &str) -> String {
    format!("{order_id}/{message_id}")
}

fn order_prefix(order_id: &str) -> String {
    format!("{order_id}/")
}

pub struct MarketplaceStore {
    instance: Arc<Db>,
    orders: Tree,
    lines: Tree,
    offers: Tree,
    order_offers: Tree,
    messages: Tree,
    order_messages: Tree,
    inventory: Tree,
}

impl MarketplaceStore {
    pub fn open(instance: Arc<Db>) -> MarketResult<Self> {
        Ok(Self {
            orders: instance.open_tree(ORDERS_TREE)?,
            lines: instance.open_tree(LINES_TREE)?,
            offers: instance.open_tree(OFFERS_TREE)?,
            order_offers: instance.open_tree(ORDER_OFFERS_TREE)?,
            messages: instance.open_tree(MESSAGES_TREE)?,
            order_messages: instance.open_tree(ORDER_MESSAGES_TREE)?,
            inventory: instance.open_tree(INVENTORY_TREE)?,
            instance,
        })
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Runs `f` as one atomic unit over every workflow tree.
    ///
    /// `f` may run more than once under contention and must not have side
    /// effects outside the transaction.
    pub fn transaction<T, F>(&self, f: F) -> MarketResult<T>
    where
        F: Fn(&WorkflowTx<'_>) -> TxResult<T>,
    {
        let result = (
            &self.orders,
            &self.lines,
            &self.offers,
            &self.order_offers,
            &self.messages,
            &self.order_messages,
        )
            .transaction(
                |(orders, lines, offers, order_offers, messages, order_messages)| {
                    let tx = WorkflowTx {
                        orders,
                        lines,
                        offers,
                        order_offers,
                        messages,
                        order_messages,
                    };
                    f(&tx)
                },
            );
        Ok(result?)
    }

    /// Persists an order and all of its lines, or nothing.
    pub fn insert_order(&self, order: &Order, lines: &[MaterialLine]) -> MarketResult<()> {
        self.insert_order_failing_at(order, lines, None)
    }

    // `fail_before_line` simulates a storage failure part-way through the lines
    fn insert_order_failing_at(
        &self,
        order: &Order,
        lines: &[MaterialLine],
        fail_before_line: Option<usize>,
    ) -> MarketResult<()> {
        self.transaction(|tx| {
            tx.put_order(order)?;
            for (idx, line) in lines.iter().enumerate() {
                if fail_before_line == Some(idx) {
                    return abort(MarketplaceError::Unavailable(format!(
                        "write of line {idx} failed"
                    )));
                }
                tx.put_line(line)?;
            }
            Ok(())
        })
    }

    pub fn get_order(&self, id: &str) -> MarketResult<Option<Order>> {
        self.orders
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn require_order(&self, id: &str) -> MarketResult<Order> {
        self.get_order(id)?
            .ok_or_else(|| MarketplaceError::not_found("order", id))
    }

    pub fn all_orders(&self) -> MarketResult<Vec<Order>> {
        self.orders
            .iter()
            .values()
            .map(|raw| decode(&raw?))
            .collect()
    }

    /// Lines of one order in position order.
    pub fn lines_for(&self, order_id: &str) -> MarketResult<Vec<MaterialLine>> {
        let mut lines = self
            .lines
            .scan_prefix(order_prefix(order_id).as_bytes())
            .values()
            .map(|raw| decode(&raw?))
            .collect::<MarketResult<Vec<MaterialLine>>>()?;
        lines.sort_by_key(|line| line.position);
        Ok(lines)
    }

    pub fn get_offer(&self, id: &str) -> MarketResult<Option<Offer>> {
        self.offers
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn all_offers(&self) -> MarketResult<Vec<Offer>> {
        self.offers
            .iter()
            .values()
            .map(|raw| decode(&raw?))
            .collect()
    }

    pub fn offers_for_order(&self, order_id: &str) -> MarketResult<Vec<Offer>> {
        let ids: Vec<String> = match self.order_offers.get(order_id.as_bytes())? {
            Some(raw) => decode(&raw)?,
            None => return Ok(vec![]),
        };
        let mut offers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(offer) = self.get_offer(&id)? {
                offers.push(offer);
            }
        }
        Ok(offers)
    }

    pub fn accepted_offer(&self, order_id: &str) -> MarketResult<Option<Offer>> {
        Ok(self
            .offers_for_order(order_id)?
            .into_iter()
            .find(|offer| offer.status == OfferStatus::Accepted))
    }

    pub fn get_message(&self, id: &str) -> MarketResult<Option<Message>> {
        self.messages
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    /// Messages of one order, oldest first.
    pub fn messages_for_order(&self, order_id: &str) -> MarketResult<Vec<Message>> {
        let prefix = order_prefix(order_id);
        let mut messages = vec![];
        for key in self.order_messages.scan_prefix(prefix.as_bytes()).keys() {
            let key = key?;
            let message_id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            if let Some(message) = self.get_message(&message_id)? {
                messages.push(message);
            }
        }
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    pub fn lab_inventory(&self, lab_id: &str) -> MarketResult<Option<LabInventory>> {
        self.inventory
            .get(lab_id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    /// Replaces the whole price list of a laboratory in one write.
    pub fn put_lab_inventory(&self, inventory: &LabInventory) -> MarketResult<()> {
        self.inventory
            .insert(inventory.lab_id.as_bytes(), encode(inventory)?)?;
        Ok(())
    }
}

/// Typed view of the workflow trees inside one transaction.
pub struct WorkflowTx<'a> {
    orders: &'a TransactionalTree,
    lines: &'a TransactionalTree,
    offers: &'a TransactionalTree,
    order_offers: &'a TransactionalTree,
    messages: &'a TransactionalTree,
    order_messages: &'a TransactionalTree,
}

impl WorkflowTx<'_> {
    pub fn get_order(&self, id: &str) -> TxResult<Option<Order>> {
        match self.orders.get(id.as_bytes())? {
            Some(raw) => Ok(Some(tx_decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_order(&self, id: &str) -> TxResult<Order> {
        match self.get_order(id)? {
            Some(order) => Ok(order),
            None => abort(MarketplaceError::not_found("order", id)),
        }
    }

    pub fn put_order(&self, order: &Order) -> TxResult<()> {
        self.orders.insert(order.id.as_bytes(), tx_encode(order)?)?;
        Ok(())
    }

    pub fn put_line(&self, line: &MaterialLine) -> TxResult<()> {
        let key = line_key(&line.order_id, line.position);
        self.lines.insert(key.as_bytes(), tx_encode(line)?)?;
        Ok(())
    }

    pub fn get_offer(&self, id: &str) -> TxResult<Option<Offer>> {
        match self.offers.get(id.as_bytes())? {
            Some(raw) => Ok(Some(tx_decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_offer(&self, id: &str) -> TxResult<Offer> {
        match self.get_offer(id)? {
            Some(offer) => Ok(offer),
            None => abort(MarketplaceError::not_found("offer", id)),
        }
    }

    /// Overwrites an existing offer record.
    pub fn put_offer(&self, offer: &Offer) -> TxResult<()> {
        self.offers.insert(offer.id.as_bytes(), tx_encode(offer)?)?;
        Ok(())
    }

    /// Stores a new offer and links it to its order.
    pub fn insert_offer(&self, offer: &Offer) -> TxResult<()> {
        let mut ids = self.offer_ids(&offer.order_id)?;
        ids.push(offer.id.clone());
        self.order_offers
            .insert(offer.order_id.as_bytes(), tx_encode(&ids)?)?;
        self.put_offer(offer)
    }

    pub fn offer_ids(&self, order_id: &str) -> TxResult<Vec<String>> {
        match self.order_offers.get(order_id.as_bytes())? {
            Some(raw) => tx_decode(&raw),
            None => Ok(vec![]),
        }
    }

    pub fn offers_for_order(&self, order_id: &str) -> TxResult<Vec<Offer>> {
        let mut offers = vec![];
        for id in self.offer_ids(order_id)? {
            if let Some(offer) = self.get_offer(&id)? {
                offers.push(offer);
            }
        }
        Ok(offers)
    }

    pub fn accepted_offer(&self, order_id: &str) -> TxResult<Option<Offer>> {
        Ok(self
            .offers_for_order(order_id)?
            .into_iter()
            .find(|offer| offer.status == OfferStatus::Accepted))
    }

    pub fn require_message(&self, id: &str) -> TxResult<Message> {
        match self.messages.get(id.as_bytes())? {
            Some(raw) => tx_decode(&raw),
            None => abort(MarketplaceError::not_found("message", id)),
        }
    }

    pub fn put_message(&self, message: &Message) -> TxResult<()> {
        self.messages
            .insert(message.id.as_bytes(), tx_encode(message)?)?;
        Ok(())
    }

    /// Stores a new message and links it to its order thread.
    pub fn insert_message(&self, message: &Message) -> TxResult<()> {
        let key = message_index_key(&message.order_id, &message.id);
        self.order_messages.insert(key.as_bytes(), &[] as &[u8])?;
        self.put_message(message)
    }
}
