//! Engine error taxonomy.

use alloy::primitives::U256;
use cdp_chain::PositionId;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Every engine failure leaves ledger state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("value {value} exceeds maximum {max}")]
    ExceedsMax { value: u32, max: u32 },

    #[error("only one position in system")]
    OnlyOnePositionInSystem,

    #[error("position {0} is not active")]
    PositionNotActive(PositionId),

    #[error("position list is empty")]
    EmptyPositionList,

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("debt {debt} below minimum {min}")]
    DebtBelowMinimum { debt: U256, min: U256 },

    #[error("ICR below MCR")]
    IcrBelowMcr,

    #[error("ICR below CCR")]
    IcrBelowCcr,

    #[error("TCR would fall below CCR")]
    TcrBelowCcr,

    #[error("operation not allowed in recovery mode")]
    NotAllowedInRecoveryMode,

    #[error("insufficient collateral: requested {requested}, available {available}")]
    InsufficientCollateral { requested: U256, available: U256 },

    #[error("repayment must be below outstanding debt")]
    RepayExceedsDebt,

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("split update too frequent: {elapsed}s elapsed, {required}s required")]
    UpdateTooFrequent { elapsed: u64, required: u64 },

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("buffer error: {0}")]
    Buffer(String),

    #[error("invalid price")]
    InvalidPrice,

    #[error("ledger service stopped")]
    ServiceStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = EngineError::PositionNotActive(PositionId(7));
        assert_eq!(err.to_string(), "position cdp#7 is not active");

        let err = EngineError::UpdateTooFrequent {
            elapsed: 10,
            required: 43200,
        };
        assert!(err.to_string().contains("43200"));
    }
}
