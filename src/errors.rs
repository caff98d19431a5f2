//! Error definitions for the CDP contracts
use odra::prelude::*;

/// Errors raised by the trove manager, the stability pool and their helpers
#[odra::odra_error]
#[derive(Debug)]
pub enum CdpError {
    /// No trove in the batch or sequence qualified for liquidation
    NothingToLiquidate = 1,

    /// Trove id was never opened
    TroveNotFound = 2,

    /// Trove is already closed
    AlreadyClosed = 3,

    /// Batch liquidation called with an empty id list
    EmptyBatch = 4,

    /// Offset asked for more debt than the stability pool holds
    InsufficientPoolBalance = 5,

    /// Redemptions are disabled while TCR is below MCR
    SystemBelowMinimumRatio = 6,

    /// Zero amount not allowed
    AmountMustBePositive = 7,

    /// Redemption fee is above the caller's ceiling
    FeeExceedsMax = 8,

    /// Redemption fee would eat all of the drawn collateral
    FeeConsumesAllCollateral = 9,

    /// Caller does not hold enough stablecoin or deposit
    InsufficientBalance = 10,

    /// The last open trove cannot be closed or redistributed onto
    OnlyOneTroveLeft = 20,

    /// Redemption walk cancelled nothing
    UnableToRedeem = 21,

    /// Max fee percentage outside [fee floor, 100%]
    InvalidMaxFeePercentage = 22,

    /// Net debt under the configured minimum
    NetDebtBelowMinimum = 23,

    /// Trove ratio under MCR
    IcrBelowMinimum = 24,

    /// Trove ratio under CCR while in recovery mode
    IcrBelowCritical = 25,

    /// Operation would push TCR under CCR
    TcrBelowCritical = 26,

    /// Operation not allowed in recovery mode
    RecoveryModeActive = 27,

    /// Stability pool withdrawals are locked while a trove is under MCR
    UndercollateralizedTroves = 28,

    /// Caller does not own the trove
    NotTroveOwner = 29,

    /// Nothing to claim from the surplus pool
    NoCollSurplus = 30,

    /// Attached native value does not match the declared collateral amount
    InvalidCollateralAmount = 31,

    /// Price is zero or stale
    InvalidPrice = 40,

    /// Price feed never set
    PriceFeedNotAvailable = 41,

    /// Invalid configuration parameter
    InvalidConfiguration = 42,

    /// Unauthorized access
    Unauthorized = 43,

    /// Overflow error
    Overflow = 50,

    /// Underflow error
    Underflow = 51,

    /// Division by zero
    DivisionByZero = 52,
}

/// Custom errors for the CEP-18 token contract
#[odra::odra_error]
#[derive(Debug)]
pub enum TokenError {
    /// Insufficient allowance for transfer
    InsufficientAllowance = 100,

    /// Insufficient balance for operation
    InsufficientBalance = 101,

    /// Caller is not the minter
    NotMinter = 102,
}
