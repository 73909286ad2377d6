//! Workflow core for a two-sided dental marketplace.
//!
//! Clinics post orders, laboratories compete with offers, exactly one offer is
//! accepted per order and the winning laboratory drives the order through
//! production to delivery. Messaging stays open on an order until it reaches a
//! terminal status.
//!
//! [`service::MarketplaceService`] is the entry point. It owns a
//! [`store::MarketplaceStore`] (sled trees, multi-tree transactions) and the
//! injected collaborators from [`catalog`], [`identity`] and [`notify`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod logging;
pub mod message;
pub mod messaging;
pub mod notify;
pub mod offer;
pub mod order;
pub mod projection;
pub mod queries;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{ConflictReason, ErrorKind, MarketResult, MarketplaceError};
pub use identity::{Identity, Role};
pub use offer::{Decision, Offer, OfferStatus};
pub use order::{MaterialLine, NewMaterialLine, NewOrder, Order, OrderStatus};
pub use service::MarketplaceService;
pub use types::{Amount, TimeStamp};
