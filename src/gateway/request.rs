//! Wire request construction.
//!
//! Every operation is flattened into an ordered list of form fields. Which
//! token field a request carries is decided once, by [`Addressing::resolve`],
//! from the operation kind.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

use super::GatewayError;
use crate::credentials::MerchantCredentials;
use crate::utils::sanitize::mask_fields;

type HmacSha256 = Hmac<Sha256>;

/// Field carrying a token the gateway should act on now.
pub const FIELD_ACT_TOKEN: &str = "BRIC";
/// Field referencing the token of a prior transaction.
pub const FIELD_REFERENCE_TOKEN: &str = "ORIG_AUTH_GUID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Sale,
    Authorize,
    Capture,
    Void,
    Refund,
    AchDebit,
    AchCredit,
    AchVoid,
    AchPreNote,
    Tokenize,
}

impl OperationKind {
    /// Gateway operation code.
    pub fn tran_type(&self) -> &'static str {
        match self {
            OperationKind::Sale => "CCE1",
            OperationKind::Authorize => "CCE2",
            OperationKind::Capture => "CCE4",
            OperationKind::Refund => "CCE9",
            OperationKind::Void => "CCEX",
            OperationKind::Tokenize => "CCE8",
            OperationKind::AchDebit => "CKC2",
            OperationKind::AchCredit => "CKC3",
            OperationKind::AchVoid => "CKCX",
            OperationKind::AchPreNote => "CKC0",
        }
    }

    fn references_prior(&self) -> bool {
        matches!(
            self,
            OperationKind::Capture
                | OperationKind::Void
                | OperationKind::Refund
                | OperationKind::AchDebit
                | OperationKind::AchCredit
                | OperationKind::AchVoid
        )
    }

    fn is_ach(&self) -> bool {
        matches!(
            self,
            OperationKind::AchDebit
                | OperationKind::AchCredit
                | OperationKind::AchVoid
                | OperationKind::AchPreNote
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.tran_type())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub account_number: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvv: Option<String>,
    pub postal_code: Option<String>,
}

impl CardDetails {
    pub fn last_four(&self) -> String {
        last_four(&self.account_number)
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("account_number", &format!("****{}", self.last_four()))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvv", &self.cvv.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankAccountType {
    Checking,
    Savings,
}

#[derive(Clone, PartialEq, Eq)]
pub struct BankAccountDetails {
    pub routing_number: String,
    pub account_number: String,
    pub account_type: BankAccountType,
}

impl BankAccountDetails {
    pub fn last_four(&self) -> String {
        last_four(&self.account_number)
    }
}

impl fmt::Debug for BankAccountDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankAccountDetails")
            .field("routing_number", &self.routing_number)
            .field("account_number", &format!("****{}", self.last_four()))
            .field("account_type", &self.account_type)
            .finish()
    }
}

fn last_four(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    digits[digits.len().saturating_sub(4)..].iter().collect()
}

/// What the gateway should charge, verify or reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewaySource {
    Card(CardDetails),
    BankAccount(BankAccountDetails),
    /// Short-lived token: hosted capture output or a prior transaction's token.
    Token(String),
    /// Durable token of a payment method on file.
    StoredToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOperation {
    pub kind: OperationKind,
    pub merchant_id: Uuid,
    pub amount_cents: i64,
    pub tran_nbr: String,
    pub source: GatewaySource,
}

/// How the request addresses the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing<'a> {
    Card(&'a CardDetails),
    BankAccount(&'a BankAccountDetails),
    Act { token: &'a str, recurring: bool },
    Reference { token: &'a str },
}

impl<'a> Addressing<'a> {
    pub fn resolve(kind: OperationKind, source: &'a GatewaySource) -> Result<Self, GatewayError> {
        if kind.references_prior() {
            return match source {
                GatewaySource::Token(token) | GatewaySource::StoredToken(token) => {
                    Ok(Addressing::Reference { token })
                }
                _ => Err(GatewayError::InvalidRequest(format!(
                    "{} must reference a prior token, not a raw payload",
                    kind
                ))),
            };
        }

        match source {
            GatewaySource::Card(card) if !kind.is_ach() => Ok(Addressing::Card(card)),
            GatewaySource::BankAccount(account) if kind == OperationKind::AchPreNote => {
                Ok(Addressing::BankAccount(account))
            }
            GatewaySource::Token(token) => Ok(Addressing::Act {
                token,
                recurring: false,
            }),
            GatewaySource::StoredToken(token) => Ok(Addressing::Act {
                token,
                recurring: true,
            }),
            _ => Err(GatewayError::InvalidRequest(format!(
                "{} cannot carry this payload type",
                kind
            ))),
        }
    }
}

/// Flat, ordered field set ready for form encoding.
#[derive(Clone)]
pub struct GatewayRequest {
    pub fields: Vec<(&'static str, String)>,
}

impl GatewayRequest {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Field dump with sensitive values masked, for logs.
    pub fn masked(&self) -> String {
        mask_fields(&self.fields)
    }
}

impl fmt::Debug for GatewayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Amount in cents as a decimal string with exactly two fraction digits.
pub fn format_amount(amount_cents: i64) -> Result<String, GatewayError> {
    if amount_cents < 0 {
        return Err(GatewayError::InvalidRequest(format!(
            "amount must be non-negative, got {} cents",
            amount_cents
        )));
    }
    Ok(format!("{}.{:02}", amount_cents / 100, amount_cents % 100))
}

/// 10-digit sequence number derived from the transaction id, so every
/// attempt of one operation carries the same number.
pub fn tran_nbr_for(transaction_id: Uuid) -> String {
    let n = transaction_id.as_u128() % 9_000_000_000 + 1_000_000_000;
    n.to_string()
}

/// HMAC-SHA256 over the identity quadruple, operation code, amount and
/// sequence number, `|`-joined, hex encoded.
pub fn compute_mac(
    credentials: &MerchantCredentials,
    tran_type: &str,
    amount: &str,
    tran_nbr: &str,
) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(credentials.mac_secret.as_bytes())
        .map_err(|e| GatewayError::InvalidRequest(format!("unusable signing secret: {}", e)))?;
    let message = [
        credentials.cust_nbr.as_str(),
        credentials.merch_nbr.as_str(),
        credentials.dba_nbr.as_str(),
        credentials.terminal_nbr.as_str(),
        tran_type,
        amount,
        tran_nbr,
    ]
    .join("|");
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn build_request(
    op: &GatewayOperation,
    credentials: &MerchantCredentials,
) -> Result<GatewayRequest, GatewayError> {
    let addressing = Addressing::resolve(op.kind, &op.source)?;

    let tran_nbr_len = op.tran_nbr.len();
    if !(5..=10).contains(&tran_nbr_len) || !op.tran_nbr.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidRequest(format!(
            "TRAN_NBR must be 5-10 digits, got {:?}",
            op.tran_nbr
        )));
    }

    let tran_type = op.kind.tran_type();
    let amount = format_amount(op.amount_cents)?;

    let mut fields: Vec<(&'static str, String)> = vec![
        ("CUST_NBR", credentials.cust_nbr.clone()),
        ("MERCH_NBR", credentials.merch_nbr.clone()),
        ("DBA_NBR", credentials.dba_nbr.clone()),
        ("TERMINAL_NBR", credentials.terminal_nbr.clone()),
        ("TRAN_TYPE", tran_type.to_string()),
        ("AMOUNT", amount.clone()),
        ("TRAN_NBR", op.tran_nbr.clone()),
    ];

    match addressing {
        Addressing::Card(card) => {
            fields.push(("ACCOUNT_NBR", card.account_number.clone()));
            fields.push((
                "EXP_DATE",
                format!("{:02}{:02}", card.exp_year % 100, card.exp_month),
            ));
            if let Some(cvv) = &card.cvv {
                fields.push(("CVV2", cvv.clone()));
            }
            if let Some(zip) = &card.postal_code {
                fields.push(("ZIP_CODE", zip.clone()));
            }
            fields.push(("CARD_ENT_METH", "E".to_string()));
        }
        Addressing::BankAccount(account) => {
            fields.push(("ACCOUNT_NBR", account.account_number.clone()));
            fields.push(("ROUTING_NBR", account.routing_number.clone()));
            let account_type = match account.account_type {
                BankAccountType::Checking => "C",
                BankAccountType::Savings => "S",
            };
            fields.push(("ACCOUNT_TYPE", account_type.to_string()));
        }
        Addressing::Act { token, recurring } => {
            fields.push((FIELD_ACT_TOKEN, token.to_string()));
            if recurring {
                fields.push(("RECURRING", "Y".to_string()));
                fields.push(("CARD_ENT_METH", "Z".to_string()));
            }
        }
        Addressing::Reference { token } => {
            fields.push((FIELD_REFERENCE_TOKEN, token.to_string()));
        }
    }

    let mac = compute_mac(credentials, tran_type, &amount, &op.tran_nbr)?;
    fields.push(("MAC", mac));

    Ok(GatewayRequest { fields })
}
