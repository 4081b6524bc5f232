//! Contract bindings for the token and disperse contracts

pub mod disperse;
pub mod erc20;

pub use disperse::*;
pub use erc20::*;
