//! Token snapshots and spender selection

use crate::constants::DEFAULT_DECIMALS;
use alloy::primitives::{Address, U256};

/// Which disperse contract will pull the tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpenderMode {
    /// Regular disperse contract, called from the user's wallet
    Direct,
    /// Gasless disperse contract, called through the relay
    Gasless,
}

impl SpenderMode {
    pub fn from_gasless(gasless: bool) -> Self {
        if gasless {
            SpenderMode::Gasless
        } else {
            SpenderMode::Direct
        }
    }
}

/// The two spender contracts whose allowances are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spenders {
    pub direct: Address,
    pub gasless: Address,
}

impl Spenders {
    pub fn get(&self, mode: SpenderMode) -> Address {
        match mode {
            SpenderMode::Direct => self.direct,
            SpenderMode::Gasless => self.gasless,
        }
    }
}

/// Allowance per spender contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Allowances {
    pub direct: U256,
    pub gasless: U256,
}

impl Allowances {
    pub fn get(&self, mode: SpenderMode) -> U256 {
        match mode {
            SpenderMode::Direct => self.direct,
            SpenderMode::Gasless => self.gasless,
        }
    }
}

/// Whether a snapshot came from the chain or is the safe fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Fresh,
    /// At least one read failed; all values are defaults
    Defaulted,
}

/// A consistent snapshot of one account's position in one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub token: Address,
    pub account: Address,
    pub balance: U256,
    pub decimals: u8,
    pub allowance: Allowances,
    pub status: ReadStatus,
}

impl TokenState {
    /// Zero balance, 18 decimals, zero allowances
    pub fn default_for(token: Address, account: Address) -> Self {
        Self {
            token,
            account,
            balance: U256::ZERO,
            decimals: DEFAULT_DECIMALS,
            allowance: Allowances::default(),
            status: ReadStatus::Defaulted,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.status == ReadStatus::Fresh
    }
}

/// A token the user has entered, with whatever is known about it so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub address: Address,
    pub state: Option<TokenState>,
}

impl TokenRef {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: None,
        }
    }

    /// Decimals default to 18 until fetched
    pub fn decimals(&self) -> u8 {
        self.state
            .as_ref()
            .map(|s| s.decimals)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    pub fn cached_balance(&self) -> U256 {
        self.state.as_ref().map(|s| s.balance).unwrap_or_default()
    }

    pub fn allowance(&self, mode: SpenderMode) -> U256 {
        self.state
            .as_ref()
            .map(|s| s.allowance.get(mode))
            .unwrap_or_default()
    }

    /// Attach a snapshot, ignoring ones taken for a different token
    pub fn update(&mut self, state: TokenState) -> bool {
        if state.token != self.address {
            return false;
        }
        self.state = Some(state);
        true
    }
}

/// What is being dispersed
///
/// Token decimals are not part of the request: amounts are parsed at the
/// decimals of the snapshot read just before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// Native currency (ETH), sent as call value
    Native,
    /// An ERC-20 token
    Token { address: Address },
}

impl Asset {
    pub fn erc20(address: Address) -> Self {
        Asset::Token { address }
    }

    pub fn token(&self) -> Option<Address> {
        match self {
            Asset::Native => None,
            Asset::Token { address } => Some(*address),
        }
    }
}
