//! Disperse contract bindings
//!
//! The direct and gasless deployments expose the same entry points; the
//! gasless one additionally trusts the relay's forwarder.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IDisperse {
        /// Send native currency; `msg.value` must equal the sum of `values`
        function disperseEther(address[] recipients, uint256[] values) external payable;

        /// Pull `sum(values)` of `token` from the caller and send it out
        function disperseTokenSimple(
            address token,
            address[] recipients,
            uint256[] values
        ) external;
    }
}
