use crate::events::{IERC721, IERC1155};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, U256};

/// An unsigned contract call, ready for the app to sign and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl TransactionData {
    pub fn into_request(self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .from(from)
            .to(self.to)
            .value(self.value)
            .input(self.input.into())
    }
}

/// `safeTransferFrom(owner, to, tokenId, "")` on an ERC-721 contract.
pub fn eip721_transfer(
    owner: Address,
    contract_address: Address,
    to: Address,
    token_id: U256,
) -> TransactionData {
    let input = IERC721::safeTransferFromCall {
        from: owner,
        to,
        tokenId: token_id,
        data: Bytes::new(),
    }
    .abi_encode();

    TransactionData {
        to: contract_address,
        value: U256::ZERO,
        input: Bytes::from(input),
    }
}

/// `safeTransferFrom(owner, to, id, value, "")` on an ERC-1155 contract.
pub fn eip1155_transfer(
    owner: Address,
    contract_address: Address,
    to: Address,
    token_id: U256,
    value: U256,
) -> TransactionData {
    let input = IERC1155::safeTransferFromCall {
        from: owner,
        to,
        id: token_id,
        value,
        data: Bytes::new(),
    }
    .abi_encode();

    TransactionData {
        to: contract_address,
        value: U256::ZERO,
        input: Bytes::from(input),
    }
}
