use crate::gateway::GatewayError;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Order,
    Product,
    User,
    Address,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Order => write!(f, "order"),
            Resource::Product => write!(f, "product"),
            Resource::User => write!(f, "user"),
            Resource::Address => write!(f, "address"),
        }
    }
}

/// Why a request collided with the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The buyer already has an order waiting for payment.
    UnsettledOrderExists,
    /// A product is sold or held by another order.
    ProductUnavailable,
    /// The order is not in a status that allows the requested step.
    InvalidTransition { status: String },
    /// A card charge for the order has not been resolved yet.
    PaymentInFlight,
    /// Tracking was already recorded.
    TrackingAlreadySet,
    /// Delivery was confirmed before any tracking number was supplied.
    TrackingMissing,
    /// The seller has no verified payout recipient.
    RecipientMissing,
    /// The seller already registered a payout recipient.
    RecipientExists,
    /// The bank account is registered to another seller.
    AccountInUse,
    /// The seller has already been paid for this order.
    AlreadySettled,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::UnsettledOrderExists => {
                write!(f, "buyer already has an order awaiting payment")
            }
            ConflictReason::ProductUnavailable => write!(f, "product is no longer available"),
            ConflictReason::InvalidTransition { status } => {
                write!(f, "operation not allowed while order is {status}")
            }
            ConflictReason::PaymentInFlight => write!(f, "a card payment is still in progress"),
            ConflictReason::TrackingAlreadySet => write!(f, "tracking number already recorded"),
            ConflictReason::TrackingMissing => write!(f, "order has no tracking number"),
            ConflictReason::RecipientMissing => {
                write!(f, "seller has no verified payout recipient")
            }
            ConflictReason::RecipientExists => write!(f, "payout recipient already registered"),
            ConflictReason::AccountInUse => write!(f, "bank account already registered"),
            ConflictReason::AlreadySettled => write!(f, "order has already been paid out"),
        }
    }
}

/// Errors returned by order engine operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    /// The payment window closed before payment was confirmed.
    #[error("order payment window has expired")]
    Expired,

    #[error("caller is not allowed to act on this order")]
    Unauthorized,

    #[error("payment gateway error: {0}")]
    Gateway(GatewayError),

    /// The gateway may have taken the payment. Retrying the same operation
    /// reuses its idempotency key and reveals the outcome.
    #[error("payment outcome for order {order_id} is unknown, retry to reconcile")]
    PaymentOutcomeUnknown { order_id: Uuid },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Gateway,
    Internal,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::NotFound(_) => ErrorKind::NotFound,
            OrderError::Conflict(_) | OrderError::Expired => ErrorKind::Conflict,
            OrderError::Unauthorized => ErrorKind::Authorization,
            OrderError::Gateway(_) | OrderError::PaymentOutcomeUnknown { .. } => {
                ErrorKind::Gateway
            }
            OrderError::Store(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        OrderError::Validation(message.into())
    }

    pub(crate) fn invalid_transition(status: impl std::fmt::Display) -> Self {
        OrderError::Conflict(ConflictReason::InvalidTransition {
            status: status.to_string(),
        })
    }
}
