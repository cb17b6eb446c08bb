pub mod adapters;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod ports;
pub mod startup;
pub mod use_cases;
pub mod utils;
pub mod validation;

pub use error::{ErrorKind, PaymentError};
pub use use_cases::PaymentOrchestrator;
