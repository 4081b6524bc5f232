//! Multi-recipient transfer submission

use crate::contracts::IDisperse;
use crate::error::DisperseError;
use crate::signer::{TransactionSigner, TxHandle, TxRequest};
use crate::types::{Asset, DisperseIntent, Recipient, Spenders};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;

/// A request to send `asset` to every recipient in one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisperseRequest {
    pub asset: Asset,
    /// Route through the gasless contract and the meta-transaction relay
    pub gasless: bool,
    pub recipients: Vec<Recipient>,
}

impl DisperseRequest {
    pub fn native(recipients: Vec<Recipient>) -> Self {
        Self {
            asset: Asset::Native,
            gasless: false,
            recipients,
        }
    }

    pub fn token(asset: Asset, gasless: bool, recipients: Vec<Recipient>) -> Self {
        Self {
            asset,
            gasless,
            recipients,
        }
    }
}

fn check_route(request: &DisperseRequest) -> Result<(), DisperseError> {
    if request.gasless && request.asset == Asset::Native {
        return Err(DisperseError::Unsupported("native currency cannot be dispersed through the relay"));
    }
    Ok(())
}

/// A validated request with its populated transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDisperse {
    pub intent: DisperseIntent,
    pub tx: TxRequest,
}

/// Validates requests and populates the disperse call
#[derive(Debug, Clone, Copy)]
pub struct Disperser {
    contracts: Spenders,
}

impl Disperser {
    pub fn new(contracts: Spenders) -> Self {
        Self { contracts }
    }

    /// Checks that need neither the chain nor the asset's decimals.
    ///
    /// Refuses unsupported routes and rows that are malformed at any
    /// precision, so these never cost a read.
    pub fn precheck(&self, request: &DisperseRequest) -> Result<(), DisperseError> {
        check_route(request)?;
        DisperseIntent::check_rows(&request.recipients).map_err(DisperseError::Validation)
    }

    /// Validate `request` at `decimals` against `sender_balance` and build
    /// the transaction.
    ///
    /// Nothing touches the network here: malformed rows, a total that is not
    /// strictly below the balance and unsupported routes all fail first.
    pub fn prepare(
        &self,
        request: &DisperseRequest,
        decimals: u8,
        sender: Address,
        sender_balance: U256,
    ) -> Result<PreparedDisperse, DisperseError> {
        check_route(request)?;

        let intent = DisperseIntent::from_recipients(&request.recipients, decimals)
            .map_err(DisperseError::Validation)?;

        if intent.total >= sender_balance {
            return Err(DisperseError::InsufficientBalance {
                total: intent.total,
                balance: sender_balance,
            });
        }

        let contract = if request.gasless {
            self.contracts.gasless
        } else {
            self.contracts.direct
        };

        let tx = match request.asset {
            Asset::Native => {
                let call = IDisperse::disperseEtherCall {
                    recipients: intent.addresses.clone(),
                    values: intent.amounts.clone(),
                };
                TxRequest::new(contract, call.abi_encode()).with_value(intent.total)
            }
            Asset::Token { address } => {
                let call = IDisperse::disperseTokenSimpleCall {
                    token: address,
                    recipients: intent.addresses.clone(),
                    values: intent.amounts.clone(),
                };
                TxRequest::new(contract, call.abi_encode())
            }
        };

        Ok(PreparedDisperse {
            intent,
            tx: tx.with_from(sender),
        })
    }

    /// Send an already prepared disperse through `channel`.
    ///
    /// The channel is either the wallet itself or a relay session scoped to
    /// the gasless contract; both yield the same [`TxHandle`].
    pub async fn send<C: TransactionSigner>(
        &self,
        channel: &C,
        prepared: PreparedDisperse,
    ) -> Result<TxHandle, DisperseError> {
        let PreparedDisperse { intent, tx } = prepared;
        tracing::info!(
            "Dispersing {} to {} recipients via {}",
            intent.total,
            intent.len(),
            tx.to
        );

        let handle = channel.submit(tx).await.map_err(|err| {
            tracing::error!("Disperse to {} recipients failed: {:#}", intent.len(), err);
            DisperseError::DisperseFailed(err)
        })?;

        tracing::info!("Disperse sent: {} ({:?})", handle.hash, handle.channel);
        Ok(handle)
    }

    /// Validate, populate and send through `channel`
    pub async fn submit<C: TransactionSigner>(
        &self,
        channel: &C,
        request: &DisperseRequest,
        decimals: u8,
        sender_balance: U256,
    ) -> Result<TxHandle, DisperseError> {
        let prepared = self.prepare(request, decimals, channel.address(), sender_balance)?;
        self.send(channel, prepared).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::testing::FakeSigner;
    use crate::signer::Channel;
    use crate::types::{Field, FieldErrorKind};
    use crate::constants::NATIVE_DECIMALS;
    use alloy::primitives::address;

    const TOKEN: Address = address!("0x1111111111111111111111111111111111111111");
    const ME: Address = address!("0x2222222222222222222222222222222222222222");
    const DIRECT: Address = address!("0x3333333333333333333333333333333333333333");
    const GASLESS: Address = address!("0x4444444444444444444444444444444444444444");
    const ALICE: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1111";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2222";

    fn disperser() -> Disperser {
        Disperser::new(Spenders {
            direct: DIRECT,
            gasless: GASLESS,
        })
    }

    fn usdc(gasless: bool) -> DisperseRequest {
        DisperseRequest::token(
            Asset::erc20(TOKEN),
            gasless,
            vec![Recipient::new(ALICE, "1.5"), Recipient::new(BOB, "2.5")],
        )
    }

    #[tokio::test]
    async fn test_total_must_be_below_balance() {
        let signer = FakeSigner::new(ME);

        let err = disperser()
            .submit(&signer, &usdc(false), 6, U256::from(4_000_000u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DisperseError::InsufficientBalance { total, .. } if total == U256::from(4_000_000u64)
        ));
        assert!(signer.sent().is_empty());

        disperser()
            .submit(&signer, &usdc(false), 6, U256::from(4_000_001u64))
            .await
            .unwrap();
        assert_eq!(signer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_token_call_encoding() {
        let signer = FakeSigner::new(ME);
        let handle = disperser()
            .submit(&signer, &usdc(false), 6, U256::from(10_000_000u64))
            .await
            .unwrap();
        assert_eq!(handle.channel, Channel::Direct);

        let sent = signer.sent();
        let tx = &sent[0];
        assert_eq!(tx.to, DIRECT);
        assert_eq!(tx.from, Some(ME));
        assert_eq!(tx.value, U256::ZERO);

        let call = IDisperse::disperseTokenSimpleCall::abi_decode(&tx.data).unwrap();
        assert_eq!(call.token, TOKEN);
        assert_eq!(call.recipients[0], ALICE.parse::<Address>().unwrap());
        assert_eq!(call.values, vec![U256::from(1_500_000u64), U256::from(2_500_000u64)]);
    }

    #[tokio::test]
    async fn test_native_sends_total_as_value() {
        let signer = FakeSigner::new(ME);
        let request = DisperseRequest::native(vec![Recipient::new(ALICE, "0.25"), Recipient::new(BOB, "0.5")]);
        let balance = U256::from(10u64).pow(U256::from(18u64));

        disperser().submit(&signer, &request, NATIVE_DECIMALS, balance).await.unwrap();

        let sent = signer.sent();
        let tx = &sent[0];
        let expected = U256::from(750_000_000_000_000_000u64);
        assert_eq!(tx.value, expected);
        let call = IDisperse::disperseEtherCall::abi_decode(&tx.data).unwrap();
        assert_eq!(call.values.iter().fold(U256::ZERO, |acc, v| acc + *v), expected);
    }

    #[tokio::test]
    async fn test_gasless_targets_gasless_contract() {
        let session = FakeSigner::new(ME).relayed();
        let handle = disperser()
            .submit(&session, &usdc(true), 6, U256::from(10_000_000u64))
            .await
            .unwrap();

        assert_eq!(handle.channel, Channel::Relay);
        assert_eq!(session.sent()[0].to, GASLESS);
    }

    #[tokio::test]
    async fn test_invalid_rows_never_reach_the_channel() {
        let signer = FakeSigner::new(ME);
        let request = DisperseRequest::native(vec![
            Recipient::new("0x123", "1"),
            Recipient::new(BOB, "0.00001"),
            Recipient::new(ALICE, ""),
        ]);

        let err = disperser().submit(&signer, &request, NATIVE_DECIMALS, U256::MAX).await.unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| (e.row, e.field, e.kind)).collect();
        assert_eq!(
            fields,
            vec![
                (0, Field::Address, FieldErrorKind::Pattern),
                (1, Field::Amount, FieldErrorKind::BelowMinimum),
                (2, Field::Amount, FieldErrorKind::Required),
            ]
        );
        assert!(signer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_gasless_native_is_refused() {
        let signer = FakeSigner::new(ME).relayed();
        let mut request = DisperseRequest::native(vec![Recipient::new(ALICE, "1")]);
        request.gasless = true;

        let err = disperser().submit(&signer, &request, NATIVE_DECIMALS, U256::MAX).await.unwrap_err();
        assert!(matches!(err, DisperseError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_channel_failure_is_typed() {
        let signer = FakeSigner::new(ME).failing("execution reverted");
        let err = disperser()
            .submit(&signer, &usdc(false), 6, U256::from(10_000_000u64))
            .await
            .unwrap_err();

        assert!(matches!(err, DisperseError::DisperseFailed(_)));
        assert!(err.to_string().contains("execution reverted"));
    }

    #[test]
    fn test_amounts_follow_given_decimals() {
        let prepared = disperser()
            .prepare(&usdc(false), 2, ME, U256::MAX)
            .unwrap();
        let call = IDisperse::disperseTokenSimpleCall::abi_decode(&prepared.tx.data).unwrap();
        assert_eq!(call.values, vec![U256::from(150u64), U256::from(250u64)]);
    }

    #[test]
    fn test_precheck_needs_no_decimals() {
        let request = DisperseRequest::token(
            Asset::erc20(TOKEN),
            true,
            vec![Recipient::new("0x123", "1"), Recipient::new(ALICE, "1.0000000001")],
        );
        let err = disperser().precheck(&request).unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
        assert_eq!(err.field_errors()[0].kind, FieldErrorKind::Pattern);
    }
}
