//! ERC-20 + EIP-2612 permit contract bindings

use alloy::sol;

sol! {
    /// ERC-20 interface with the EIP-2612 `permit` extension
    #[sol(rpc)]
    interface IERC20Permit {
        /// Returns the name of the token (EIP-712 domain name)
        function name() external view returns (string memory);

        /// Returns the decimals of the token
        function decimals() external view returns (uint8);

        /// Returns the balance of an account
        function balanceOf(address account) external view returns (uint256);

        /// Returns the allowance of a spender
        function allowance(address owner, address spender) external view returns (uint256);

        /// Approves a spender to spend tokens
        function approve(address spender, uint256 amount) external returns (bool);

        /// Current permit nonce of `owner`; bumps on every accepted permit
        function nonces(address owner) external view returns (uint256);

        /// Sets `value` as the allowance of `spender` over `owner`'s tokens
        /// given `owner`'s signed approval
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        /// Emitted when allowance is set
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}
