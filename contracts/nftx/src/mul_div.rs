//! # Safe Multiplication and Division
//!
//! Provides overflow-safe multiplication and division using 256-bit
//! intermediate arithmetic. Bounty curves multiply yoctoNEAR amounts by
//! batch positions, so the intermediate product can exceed `u128`.
//!
//! ## Rounding Modes
//!
//! - `Down`: Round towards zero (floor)
//! - `Up`: Round away from zero (ceiling)

use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

/// Rounding direction for division operations.
#[derive(Clone, Copy, Debug)]
pub enum Rounding {
    /// Round towards zero (floor division).
    Down,
    /// Round away from zero (ceiling division).
    Up,
}

/// Performs `(x * y) / denominator` with configurable rounding.
///
/// Uses 256-bit intermediate arithmetic to prevent overflow during
/// the multiplication step.
///
/// # Panics
///
/// Panics if `denominator` is zero.
pub fn mul_div(x: u128, y: u128, denominator: u128, rounding: Rounding) -> u128 {
    let numerator = U256::from(x) * U256::from(y);
    let denominator = U256::from(denominator);
    let result = numerator / denominator;
    let remainder = numerator % denominator;

    match rounding {
        Rounding::Down => result.as_u128(),
        Rounding::Up => {
            if remainder > U256::zero() {
                result.as_u128() + 1
            } else {
                result.as_u128()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_down_by_default() {
        assert_eq!(mul_div(10, 10, 3, Rounding::Down), 33);
    }

    #[test]
    fn rounds_up_on_remainder() {
        assert_eq!(mul_div(10, 10, 3, Rounding::Up), 34);
        assert_eq!(mul_div(10, 9, 3, Rounding::Up), 30);
    }

    #[test]
    fn survives_u128_overflowing_product() {
        let big = u128::MAX / 2;
        assert_eq!(mul_div(big, 4, 4, Rounding::Down), big);
    }
}
