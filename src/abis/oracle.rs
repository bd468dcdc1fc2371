use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ITwapOracle {
        error NotInitialized();
        error StalePrice();
        error InvalidPeriod();
        error InsufficientData();
        error InvalidPair();
        error InvalidToken();

        function isPairInitialized(address pair) external view returns (bool);
        function consult(address pair, address token, uint256 amountIn, uint32 period) external view returns (uint256 amountOut);
    }
}
