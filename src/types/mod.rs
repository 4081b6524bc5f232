//! Types for the user-facing API

pub mod permit;
pub mod recipient;
pub mod token;

pub use permit::{
    Permit, PermitMessage, PermitRelayRejection, PermitRelayRequest, PermitRelayResponse,
    SplitSignature,
};
pub use recipient::{is_valid_address, DisperseIntent, Field, FieldError, FieldErrorKind, Recipient};
pub use token::{
    Allowances, Asset, ReadStatus, SpenderMode, Spenders, TokenRef, TokenState,
};
