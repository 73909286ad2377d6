//! Error taxonomy shared by every workflow operation
use crate::order::OrderStatus;
use sled::transaction::TransactionError;
use std::convert::Infallible;

pub type MarketResult<T> = Result<T, MarketplaceError>;

/// Coarse error category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

/// Why a state-machine or uniqueness check refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    NotAcceptingOffers,
    DuplicateOffer,
    AlreadyResolved,
    NoAcceptedOffer,
    MessagingClosed,
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAcceptingOffers => "ORDER_NOT_ACCEPTING_OFFERS",
            Self::DuplicateOffer => "OFFER_DUPLICATE_PENDING",
            Self::AlreadyResolved => "OFFER_ALREADY_RESOLVED",
            Self::NoAcceptedOffer => "ORDER_NO_ACCEPTED_OFFER",
            Self::MessagingClosed => "MESSAGING_CLOSED",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotAcceptingOffers => "order is not accepting offers",
            Self::DuplicateOffer => "a pending or accepted offer already exists for this party",
            Self::AlreadyResolved => "offer has already been resolved",
            Self::NoAcceptedOffer => "order has no accepted offer",
            Self::MessagingClosed => "messaging is closed for this order",
        };
        f.write_str(text)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MarketplaceError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Stored record could not be decoded: {0}")]
    Corrupt(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketplaceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Corrupt(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code. Never changes once published.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(reason) => reason.code(),
            Self::InvalidTransition { .. } => "ORDER_INVALID_TRANSITION",
            Self::Unavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Corrupt(_) => "RECORD_CORRUPT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<sled::Error> for MarketplaceError {
    fn from(value: sled::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<TransactionError<MarketplaceError>> for MarketplaceError {
    fn from(value: TransactionError<MarketplaceError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::decode::Error> for MarketplaceError {
    fn from(value: minicbor::decode::Error) -> Self {
        Self::Corrupt(value.to_string())
    }
}

impl From<minicbor::encode::Error<Infallible>> for MarketplaceError {
    fn from(value: minicbor::encode::Error<Infallible>) -> Self {
        Self::Internal(value.to_string())
    }
}
