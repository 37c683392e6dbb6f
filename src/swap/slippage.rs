use alloy::primitives::U256;
use bigdecimal::{BigDecimal, ToPrimitive};
use std::str::FromStr;

/// Fixed-point precision of the stored tolerance.
const SCALE: i64 = 18;

/// Fractional slippage tolerance held as an exact ratio `parts / 10^18`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlippageBound {
    tolerance: BigDecimal,
    parts: U256,
}

impl SlippageBound {
    /// `fraction` must lie in `[0, 1)`; `0.005` is half a percent.
    pub fn from_fraction(fraction: f64) -> eyre::Result<Self> {
        if !fraction.is_finite() {
            return Err(eyre::eyre!("slippage tolerance must be a finite number"));
        }
        // f64's Display is the shortest exact round-trip form, so 0.005 stays 0.005.
        let tolerance = BigDecimal::from_str(&fraction.to_string())
            .map_err(|e| eyre::eyre!("Invalid slippage tolerance {}: {}", fraction, e))?;
        Self::from_decimal(tolerance)
    }

    pub fn from_decimal(tolerance: BigDecimal) -> eyre::Result<Self> {
        if tolerance < BigDecimal::from(0) || tolerance >= BigDecimal::from(1) {
            return Err(eyre::eyre!(
                "slippage tolerance must be in [0, 1), got {}",
                tolerance
            ));
        }
        let (scaled, _) = tolerance.with_scale(SCALE).into_bigint_and_exponent();
        let parts = scaled
            .to_u128()
            .map(U256::from)
            .ok_or_else(|| eyre::eyre!("slippage tolerance {} out of range", tolerance))?;
        Ok(Self { tolerance, parts })
    }

    pub fn tolerance(&self) -> &BigDecimal {
        &self.tolerance
    }

    /// `floor(expected × (1 − tolerance))`, computed without overflow.
    pub fn minimum_output(&self, expected: U256) -> U256 {
        let denom = U256::from(10u64).pow(U256::from(SCALE as u64));
        let keep = denom - self.parts;
        let whole = expected / denom;
        let rem = expected % denom;
        whole * keep + rem * keep / denom
    }
}
