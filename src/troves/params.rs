//! Protocol parameters
use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::one;

/// Risk and fee parameters of the trove manager, all decimals scaled by 1e18
#[odra::odra_type]
pub struct ProtocolParams {
    /// Minimum collateral ratio of a single trove
    /// Example: 110% = 1.1 * 1e18
    pub mcr: U256,
    /// System ratio under which recovery mode starts
    /// Example: 150% = 1.5 * 1e18
    pub ccr: U256,
    /// Stablecoin reserve added to every trove's debt
    pub gas_compensation: U256,
    /// Smallest debt a trove may carry on top of the reserve
    pub min_net_debt: U256,
    /// Collateral share paid to the liquidator is `coll / coll_gas_comp_divisor`
    pub coll_gas_comp_divisor: U256,
    /// Floor of the redemption fee rate
    pub redemption_fee_floor: U256,
    /// Divisor applied to the redeemed fraction when raising the base rate
    pub beta: U256,
    /// Per-minute decay of the base rate
    pub minute_decay_factor: U256,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: U256::from(1_100_000_000_000_000_000u128),
            ccr: U256::from(1_500_000_000_000_000_000u128),
            gas_compensation: U256::from(200u64) * one(),
            min_net_debt: U256::from(1_800u64) * one(),
            coll_gas_comp_divisor: U256::from(200u64),
            redemption_fee_floor: U256::from(5_000_000_000_000_000u128),
            beta: U256::from(2u64),
            minute_decay_factor: U256::from(999_037_758_833_783_000u128),
        }
    }
}

impl ProtocolParams {
    pub fn validate(&self) -> Result<(), CdpError> {
        if self.mcr <= one() || self.ccr < self.mcr {
            return Err(CdpError::InvalidConfiguration);
        }
        if self.coll_gas_comp_divisor.is_zero() || self.beta.is_zero() {
            return Err(CdpError::InvalidConfiguration);
        }
        if self.redemption_fee_floor > one() {
            return Err(CdpError::InvalidConfiguration);
        }
        if self.minute_decay_factor.is_zero() || self.minute_decay_factor >= one() {
            return Err(CdpError::InvalidConfiguration);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProtocolParams::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_ratios() {
        let params = ProtocolParams {
            ccr: U256::from(1_050_000_000_000_000_000u128),
            ..ProtocolParams::default()
        };
        assert!(matches!(params.validate(), Err(CdpError::InvalidConfiguration)));

        let params = ProtocolParams { mcr: one(), ..ProtocolParams::default() };
        assert!(matches!(params.validate(), Err(CdpError::InvalidConfiguration)));
    }

    #[test]
    fn test_rejects_zero_divisors() {
        let params = ProtocolParams { coll_gas_comp_divisor: U256::zero(), ..ProtocolParams::default() };
        assert!(params.validate().is_err());
        let params = ProtocolParams { beta: U256::zero(), ..ProtocolParams::default() };
        assert!(params.validate().is_err());
    }
}
