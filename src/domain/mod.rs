//! Framework-agnostic domain model: transactions, payment methods, and the
//! group state engine.

pub mod group_state;
pub mod payment_method;
pub mod transaction;

pub use group_state::{compute_state, Anomaly, GroupState, RootStatus};
pub use payment_method::PaymentMethod;
pub use transaction::{
    DeclineCategory, PaymentType, Transaction, TransactionStatus, TransactionType,
};
