//! Recipient rows and the validated disperse intent built from them

use crate::amount::{is_decimal, minimum_amount, parse_units};
use alloy::primitives::{Address, U256};
use std::fmt;

/// Check the `^0x[a-fA-F0-9]{40}$` account pattern
pub fn is_valid_address(text: &str) -> bool {
    text.strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// A single row of the recipient form, exactly as the user typed it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    /// Decimal amount in display units (e.g. "1.5")
    pub amount: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// Which input of a row failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Address,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Left empty (or the form has no rows at all)
    Required,
    /// Address does not match the account pattern
    Pattern,
    /// Amount is not a decimal number representable at the asset's decimals
    InvalidAmount,
    /// Amount is below the minimum
    BelowMinimum,
}

/// A validation failure pinned to one input, so the caller can highlight it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub row: usize,
    pub field: Field,
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match (self.field, self.kind) {
            (Field::Address, FieldErrorKind::Required) => "Address Required",
            (Field::Address, _) => "Invalid Ethereum Address",
            (Field::Amount, FieldErrorKind::Required) => "Amount Required",
            (Field::Amount, FieldErrorKind::BelowMinimum) => "Amount below minimum",
            (Field::Amount, _) => "Invalid Amount",
        };
        write!(f, "row {}: {}", self.row, message)
    }
}

/// Validated, ready-to-encode form of a recipient list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisperseIntent {
    pub addresses: Vec<Address>,
    /// Amounts in base units, index-aligned with `addresses`
    pub amounts: Vec<U256>,
    pub total: U256,
}

/// Check one address exactly as typed; surrounding whitespace fails the pattern
fn check_address(row: usize, text: &str) -> Result<Address, FieldError> {
    let fail = |kind| FieldError { row, field: Field::Address, kind };
    if text.trim().is_empty() {
        return Err(fail(FieldErrorKind::Required));
    }
    if !is_valid_address(text) {
        return Err(fail(FieldErrorKind::Pattern));
    }
    text.parse::<Address>().map_err(|_| fail(FieldErrorKind::Pattern))
}

fn empty_list() -> Vec<FieldError> {
    vec![FieldError {
        row: 0,
        field: Field::Address,
        kind: FieldErrorKind::Required,
    }]
}

impl DisperseIntent {
    /// Check the shape of every row without knowing the asset's decimals.
    ///
    /// Catches empty fields, malformed addresses and amounts that are not
    /// decimal numbers. Precision and the minimum need the decimals and are
    /// left to [`DisperseIntent::from_recipients`].
    pub fn check_rows(recipients: &[Recipient]) -> Result<(), Vec<FieldError>> {
        if recipients.is_empty() {
            return Err(empty_list());
        }

        let mut errors = Vec::new();
        for (row, recipient) in recipients.iter().enumerate() {
            if let Err(e) = check_address(row, &recipient.address) {
                errors.push(e);
            }
            let amount = recipient.amount.trim();
            if amount.is_empty() {
                errors.push(FieldError { row, field: Field::Amount, kind: FieldErrorKind::Required });
            } else if !is_decimal(amount) {
                errors.push(FieldError { row, field: Field::Amount, kind: FieldErrorKind::InvalidAmount });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate every row at `decimals` and build the intent.
    ///
    /// All rows are checked; every offending field is reported, not just the
    /// first one.
    pub fn from_recipients(recipients: &[Recipient], decimals: u8) -> Result<Self, Vec<FieldError>> {
        if recipients.is_empty() {
            return Err(empty_list());
        }

        let minimum = minimum_amount(decimals);
        let mut errors = Vec::new();
        let mut addresses = Vec::with_capacity(recipients.len());
        let mut amounts = Vec::with_capacity(recipients.len());

        for (row, recipient) in recipients.iter().enumerate() {
            match check_address(row, &recipient.address) {
                Ok(address) => addresses.push(address),
                Err(e) => errors.push(e),
            }

            let amount = recipient.amount.trim();
            if amount.is_empty() {
                errors.push(FieldError { row, field: Field::Amount, kind: FieldErrorKind::Required });
                continue;
            }
            match parse_units(amount, decimals) {
                Ok(value) if value < minimum => errors.push(FieldError {
                    row,
                    field: Field::Amount,
                    kind: FieldErrorKind::BelowMinimum,
                }),
                Ok(value) => amounts.push(value),
                Err(_) => errors.push(FieldError {
                    row,
                    field: Field::Amount,
                    kind: FieldErrorKind::InvalidAmount,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut total = U256::ZERO;
        for amount in &amounts {
            total = total.checked_add(*amount).ok_or_else(|| {
                vec![FieldError {
                    row: recipients.len() - 1,
                    field: Field::Amount,
                    kind: FieldErrorKind::InvalidAmount,
                }]
            })?;
        }

        Ok(Self {
            addresses,
            amounts,
            total,
        })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
