use chrono::{DateTime, Datelike, Utc};
use std::fmt;

use crate::gateway::{BankAccountDetails, CardDetails};

pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;
pub const TOKEN_MAX_LEN: usize = 128;
pub const ALLOWED_CURRENCIES: &[&str] = &["USD"];
/// Largest amount the gateway's `D.DD` field is allowed to carry.
pub const MAX_AMOUNT_CENTS: i64 = 9_999_999_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

fn validate_digits(
    field: &'static str,
    value: &str,
    min_len: usize,
    max_len: usize,
) -> ValidationResult {
    if !value.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(field, "must contain only digits"));
    }

    if !(min_len..=max_len).contains(&value.len()) {
        let message = if min_len == max_len {
            format!("must be exactly {} digits", min_len)
        } else {
            format!("must be {}-{} digits", min_len, max_len)
        };
        return Err(ValidationError::new(field, message));
    }

    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    validate_required("idempotency_key", key)?;
    validate_max_len("idempotency_key", key, IDEMPOTENCY_KEY_MAX_LEN)?;

    if key.chars().any(|ch| ch.is_control()) {
        return Err(ValidationError::new(
            "idempotency_key",
            "must not contain control characters",
        ));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    validate_required("currency", currency)?;
    validate_enum("currency", currency, ALLOWED_CURRENCIES)
}

pub fn validate_positive_amount(amount_cents: i64) -> ValidationResult {
    if amount_cents <= 0 {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::new("amount", "exceeds the gateway maximum"));
    }

    Ok(())
}

pub fn validate_token(field: &'static str, token: &str) -> ValidationResult {
    validate_required(field, token)?;
    validate_max_len(field, token, TOKEN_MAX_LEN)?;

    if !token.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return Err(ValidationError::new(field, "contains invalid characters"));
    }

    Ok(())
}

fn luhn_valid(number: &str) -> bool {
    let mut sum = 0;
    for (i, ch) in number.chars().rev().enumerate() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Card payload checks. `now` decides expiry: a card is valid through the
/// last day of its expiry month.
pub fn validate_card(card: &CardDetails, now: DateTime<Utc>) -> ValidationResult {
    validate_digits("card.account_number", &card.account_number, 12, 19)?;
    if !luhn_valid(&card.account_number) {
        return Err(ValidationError::new(
            "card.account_number",
            "fails the check digit",
        ));
    }

    if !(1..=12).contains(&card.exp_month) {
        return Err(ValidationError::new("card.exp_month", "must be 1-12"));
    }

    let current = (now.year() as u32, now.month());
    if (card.exp_year, card.exp_month) < current {
        return Err(ValidationError::new("card.exp_year", "card has expired"));
    }

    if let Some(cvv) = &card.cvv {
        validate_digits("card.cvv", cvv, 3, 4)?;
    }

    if let Some(postal_code) = &card.postal_code {
        validate_required("card.postal_code", postal_code)?;
        validate_max_len("card.postal_code", postal_code, 10)?;
    }

    Ok(())
}

/// ABA routing number checksum: 3-7-1 weights over the nine digits.
fn routing_checksum_valid(routing: &str) -> bool {
    const WEIGHTS: [u32; 9] = [3, 7, 1, 3, 7, 1, 3, 7, 1];
    let digits: Option<Vec<u32>> = routing.chars().map(|ch| ch.to_digit(10)).collect();
    match digits {
        Some(digits) if digits.len() == 9 => {
            digits.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum::<u32>() % 10 == 0
        }
        _ => false,
    }
}

pub fn validate_bank_account(account: &BankAccountDetails) -> ValidationResult {
    validate_digits("bank_account.routing_number", &account.routing_number, 9, 9)?;
    if !routing_checksum_valid(&account.routing_number) {
        return Err(ValidationError::new(
            "bank_account.routing_number",
            "fails the ABA checksum",
        ));
    }

    validate_digits("bank_account.account_number", &account.account_number, 4, 17)
}
