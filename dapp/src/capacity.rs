//! Reserve snapshot and mintable-capacity derivation

use alloy_primitives::U256;

use crate::units::{pow10, FEED_DECIMALS, TOKEN_DECIMALS};

// ============================================================================
// CONSTANTS
// ============================================================================

/// 1 BTC of reserve backs 100,000,000 SATSTD
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Usage resolution for the floating display value (parts per million)
const USAGE_PPM: u64 = 1_000_000;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One batched read of the contract and feed. Replaced wholesale on refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReserveSnapshot {
    /// Feed answer in the feed's smallest unit
    pub reserve: U256,
    pub total_supply: U256,
    /// Balance of the connected address
    pub balance: U256,
    pub paused: bool,
}

/// Decimal places on both sides of the reserve-to-token conversion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitScale {
    pub feed_decimals: u8,
    pub token_decimals: u8,
}

impl Default for UnitScale {
    fn default() -> Self {
        Self {
            feed_decimals: FEED_DECIMALS,
            token_decimals: TOKEN_DECIMALS,
        }
    }
}

impl UnitScale {
    /// Converts a raw feed value into raw token units.
    ///
    /// Multiplies before dividing so no precision is lost when the token has at
    /// least as many decimals as the feed.
    pub fn reserve_capacity(&self, reserve: U256) -> U256 {
        let scaled = reserve
            .saturating_mul(U256::from(SATS_PER_BTC))
            .saturating_mul(pow10(self.token_decimals));
        scaled / pow10(self.feed_decimals)
    }
}

// ============================================================================
// DERIVED CAPACITY
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedCapacity {
    /// Reserve expressed in raw token units
    pub reserve_capacity: U256,
    /// Largest amount that can still be minted, never negative
    pub mintable_max: U256,
    /// `total_supply / reserve_capacity`, clamped to `[0, 1]`. Display only.
    pub usage_fraction: f64,
    pub low_reserve_warning: bool,
}

impl DerivedCapacity {
    /// Progress-bar value in percent, capped at 100
    pub fn usage_percent(&self) -> f64 {
        (self.usage_fraction * 100.0).min(100.0)
    }
}

/// Pure derivation from a snapshot.
pub fn derive_capacity(snapshot: &ReserveSnapshot, scale: &UnitScale) -> DerivedCapacity {
    let reserve_capacity = scale.reserve_capacity(snapshot.reserve);
    let supply = snapshot.total_supply;

    let mintable_max = reserve_capacity.saturating_sub(supply);

    if reserve_capacity.is_zero() {
        return DerivedCapacity {
            reserve_capacity,
            mintable_max,
            usage_fraction: 0.0,
            low_reserve_warning: false,
        };
    }

    // supply / capacity > 9 / 10, compared exactly
    let ten = U256::from(10u8);
    let nine = U256::from(9u8);
    let low_reserve_warning = supply.saturating_mul(ten) > reserve_capacity.saturating_mul(nine);

    DerivedCapacity {
        reserve_capacity,
        mintable_max,
        usage_fraction: usage_fraction(supply, reserve_capacity),
        low_reserve_warning,
    }
}

fn usage_fraction(supply: U256, capacity: U256) -> f64 {
    let used = supply.min(capacity);
    // `used <= capacity`, so the quotient is at most USAGE_PPM. The fallback
    // covers a saturated product on absurdly large supplies.
    let ppm = used
        .checked_mul(U256::from(USAGE_PPM))
        .map(|scaled| scaled / capacity)
        .unwrap_or_else(|| used / (capacity / U256::from(USAGE_PPM)).max(U256::from(1u8)));
    let ppm = u64::try_from(ppm).unwrap_or(USAGE_PPM).min(USAGE_PPM);
    ppm as f64 / USAGE_PPM as f64
}

// ============================================================================
// TESTS
// ============================================================================
