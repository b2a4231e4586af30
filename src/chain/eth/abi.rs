//! Contract interfaces of the erc20 token and the mapping (mint/burn) contract

use alloy_primitives::{Address as AlloyAddress, B256, U256 as AlloyU256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use ethers::types::{Address, H256, U256};

sol! {
    function Swapin(bytes32 txhash, address account, uint256 amount) external returns (bool);
    function Swapout(uint256 amount, string bindaddr) external returns (bool);

    event LogSwapin(bytes32 indexed txhash, address indexed account, uint256 amount);
    event LogSwapout(address indexed account, uint256 amount, string bindaddr);

    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
    function totalSupply() external view returns (uint256);
    function balanceOf(address owner) external view returns (uint256);
    function transfer(address to, uint256 value) external returns (bool);
    function transferFrom(address from, address to, uint256 value) external returns (bool);
    function approve(address spender, uint256 value) external returns (bool);
    function allowance(address owner, address spender) external view returns (uint256);

    event Transfer(address indexed from, address indexed to, uint256 value);
    event Approval(address indexed owner, address indexed spender, uint256 value);
}

/// Byte length of an encoded `transfer(address,uint256)` call
pub const TRANSFER_CALL_LENGTH: usize = 4 + 32 + 32;

pub fn to_alloy_address(address: Address) -> AlloyAddress {
    AlloyAddress::from(address.0)
}

pub fn from_alloy_address(address: AlloyAddress) -> Address {
    Address::from_slice(address.as_slice())
}

pub fn to_alloy_u256(value: U256) -> AlloyU256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    AlloyU256::from_be_bytes(bytes)
}

pub fn from_alloy_u256(value: AlloyU256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn to_b256(hash: H256) -> B256 {
    B256::from(hash.0)
}

/// Fragments an erc20 contract's bytecode must contain
pub fn erc20_code_parts() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("name", nameCall::SELECTOR.to_vec()),
        ("symbol", symbolCall::SELECTOR.to_vec()),
        ("decimals", decimalsCall::SELECTOR.to_vec()),
        ("totalSupply", totalSupplyCall::SELECTOR.to_vec()),
        ("balanceOf", balanceOfCall::SELECTOR.to_vec()),
        ("transfer", transferCall::SELECTOR.to_vec()),
        ("transferFrom", transferFromCall::SELECTOR.to_vec()),
        ("approve", approveCall::SELECTOR.to_vec()),
        ("allowance", allowanceCall::SELECTOR.to_vec()),
        ("LogTransfer", Transfer::SIGNATURE_HASH.to_vec()),
        ("LogApproval", Approval::SIGNATURE_HASH.to_vec()),
    ]
}

/// Fragments the mapping contract adds on top of erc20
pub fn mapping_code_parts() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("SwapinFuncHash", SwapinCall::SELECTOR.to_vec()),
        ("LogSwapinTopic", LogSwapin::SIGNATURE_HASH.to_vec()),
        ("SwapoutFuncHash", SwapoutCall::SELECTOR.to_vec()),
        ("LogSwapoutTopic", LogSwapout::SIGNATURE_HASH.to_vec()),
    ]
}
