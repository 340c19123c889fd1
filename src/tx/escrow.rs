//! Escrow multi-sig collaborator
//!
//! Escrow sends deposit funds into a contract-held wallet keyed by a
//! `walletId`. Releasing them needs the client's signature over a digest of
//! the release parameters, which the escrow driver produces.

use super::EvmTxObject;
use crate::tokens::{ChainFamily, TokenInfo, TokenRegistry};
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IEscrowWallet {
        function depositEther(bytes32 walletId, address to) external payable;
        function depositERC20(bytes32 walletId, address to, address token, uint256 amount) external;
    }
}

/// Escrow contract operations used by the drivers
pub trait MultiSig: Send + Sync {
    /// Unsigned deposit of `value` from `from` into escrow for `to`
    fn send_to_escrow_tx(
        &self,
        from: Address,
        to: Address,
        value: U256,
        crypto_type: &str,
    ) -> Result<EvmTxObject>;

    /// Digest the client signs to authorize releasing escrowed funds to `to`
    fn release_digest(&self, to: Address, value: U256, crypto_type: &str) -> Result<B256>;
}

/// [`MultiSig`] backed by the escrow wallet contract
#[derive(Debug, Clone)]
pub struct ContractEscrow {
    contract: Address,
    wallet_id: B256,
    tokens: TokenRegistry,
}

impl ContractEscrow {
    pub fn new(contract: Address, wallet_id: B256, tokens: TokenRegistry) -> Self {
        Self {
            contract,
            wallet_id,
            tokens,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn wallet_id(&self) -> B256 {
        self.wallet_id
    }

    fn evm_token(&self, crypto_type: &str) -> Result<&TokenInfo> {
        let info = self.tokens.lookup(crypto_type)?;
        if info.family != ChainFamily::Evm {
            return Err(Error::UnsupportedOperation(format!(
                "escrow does not hold {}",
                crypto_type
            )));
        }
        Ok(info)
    }
}

impl MultiSig for ContractEscrow {
    fn send_to_escrow_tx(
        &self,
        from: Address,
        to: Address,
        value: U256,
        crypto_type: &str,
    ) -> Result<EvmTxObject> {
        let info = self.evm_token(crypto_type)?;
        let tx = match info.contract {
            None => EvmTxObject::new(
                from,
                self.contract,
                value,
                IEscrowWallet::depositEtherCall {
                    walletId: self.wallet_id,
                    to,
                }
                .abi_encode()
                .into(),
            ),
            Some(token) => EvmTxObject::new(
                from,
                self.contract,
                U256::ZERO,
                IEscrowWallet::depositERC20Call {
                    walletId: self.wallet_id,
                    to,
                    token,
                    amount: value,
                }
                .abi_encode()
                .into(),
            ),
        };
        Ok(tx)
    }

    fn release_digest(&self, to: Address, value: U256, crypto_type: &str) -> Result<B256> {
        let info = self.evm_token(crypto_type)?;
        let token = info.contract.unwrap_or(Address::ZERO);

        // walletId ++ to ++ token ++ value, tightly packed
        let mut packed = Vec::with_capacity(32 + 20 + 20 + 32);
        packed.extend_from_slice(self.wallet_id.as_slice());
        packed.extend_from_slice(to.as_slice());
        packed.extend_from_slice(token.as_slice());
        packed.extend_from_slice(&value.to_be_bytes::<32>());
        Ok(keccak256(packed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{addresses, crypto_types};
    use alloy::primitives::{address, b256};

    const ESCROW: Address = address!("1111111111111111111111111111111111111111");
    const FROM: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const TO: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
    const WALLET_ID: B256 =
        b256!("00000000000000000000000000000000000000000000000000000000000000aa");

    fn escrow() -> ContractEscrow {
        ContractEscrow::new(ESCROW, WALLET_ID, TokenRegistry::new())
    }

    #[test]
    fn ether_deposit_is_payable() {
        let tx = escrow()
            .send_to_escrow_tx(FROM, TO, U256::from(7u64), crypto_types::ETHEREUM)
            .unwrap();
        assert_eq!(tx.to, ESCROW);
        assert_eq!(tx.value, U256::from(7u64));

        let call = IEscrowWallet::depositEtherCall::abi_decode(&tx.data).unwrap();
        assert_eq!(call.walletId, WALLET_ID);
        assert_eq!(call.to, TO);
    }

    #[test]
    fn token_deposit_moves_no_ether() {
        let tx = escrow()
            .send_to_escrow_tx(FROM, TO, U256::from(9u64), crypto_types::DAI)
            .unwrap();
        assert_eq!(tx.value, U256::ZERO);

        let call = IEscrowWallet::depositERC20Call::abi_decode(&tx.data).unwrap();
        assert_eq!(call.token, addresses::DAI);
        assert_eq!(call.amount, U256::from(9u64));
    }

    #[test]
    fn release_digest_binds_parameters() {
        let escrow = escrow();
        let eth = escrow
            .release_digest(TO, U256::from(1u64), crypto_types::ETHEREUM)
            .unwrap();
        assert_eq!(
            eth,
            escrow
                .release_digest(TO, U256::from(1u64), crypto_types::ETHEREUM)
                .unwrap()
        );
        assert_ne!(
            eth,
            escrow
                .release_digest(TO, U256::from(2u64), crypto_types::ETHEREUM)
                .unwrap()
        );
        assert_ne!(
            eth,
            escrow
                .release_digest(TO, U256::from(1u64), crypto_types::DAI)
                .unwrap()
        );
        assert!(escrow
            .release_digest(TO, U256::from(1u64), crypto_types::BITCOIN)
            .is_err());
        assert!(escrow
            .send_to_escrow_tx(FROM, TO, U256::from(1u64), crypto_types::BITCOIN)
            .is_err());
    }
}
