use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    // ERC-721
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

    function ownerOf(uint256 tokenId) external view returns (address owner);

    // ERC-1155
    event TransferSingle(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256 id,
        uint256 value
    );

    event TransferBatch(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256[] ids,
        uint256[] values
    );

    function balanceOf(address account, uint256 id) external view returns (uint256 balance);

    // Optional metadata
    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
}

sol! {
    // Both standards name their transfer `safeTransferFrom`, so each lives in
    // its own interface.
    interface IERC721 {
        function safeTransferFrom(address from, address to, uint256 tokenId, bytes data) external;
    }

    interface IERC1155 {
        function safeTransferFrom(
            address from,
            address to,
            uint256 id,
            uint256 value,
            bytes data
        ) external;
    }
}

/// ERC-20 `Transfer` shares the topic hash with ERC-721 but carries the value
/// in data, so it fails here and is skipped by the caller.
pub fn decode_transfer_event(log: &Log) -> anyhow::Result<Transfer> {
    let log_data = log.data();
    let decoded = Transfer::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(decoded)
}

pub fn decode_transfer_single_event(log: &Log) -> anyhow::Result<TransferSingle> {
    let log_data = log.data();
    let decoded = TransferSingle::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(decoded)
}

pub fn decode_transfer_batch_event(log: &Log) -> anyhow::Result<TransferBatch> {
    let log_data = log.data();
    let decoded = TransferBatch::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(decoded)
}
