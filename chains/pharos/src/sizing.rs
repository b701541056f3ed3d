//! Randomized swap amounts.

use crate::assets::AssetClass;
use rand::Rng;

/// Amount formula of the input asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    Stable,
    /// Native, wrapped, or any 18-decimal token.
    NativeLike,
    Other,
}

/// Sizing bucket of the input asset. `fine` marks native and 18-decimal
/// inputs, which get 6-place precision and the lower floor and threshold
/// whatever their formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    pub formula: Formula,
    pub fine: bool,
}

impl SizeClass {
    pub fn of(class: AssetClass, decimals: u8) -> Self {
        let formula = match class {
            AssetClass::Stable => Formula::Stable,
            AssetClass::Native | AssetClass::Wrapped => Formula::NativeLike,
            AssetClass::Other if decimals == 18 => Formula::NativeLike,
            AssetClass::Other => Formula::Other,
        };
        Self {
            formula,
            fine: class == AssetClass::Native || decimals == 18,
        }
    }

    /// Balance a candidate's input asset must exceed.
    pub fn min_balance(self) -> f64 {
        if self.fine {
            0.0005
        } else {
            0.005
        }
    }

    fn precision(self) -> i32 {
        if self.fine {
            6
        } else {
            4
        }
    }
}

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub rand_min: f64,
    pub rand_max: f64,
    pub stable_min: f64,
    pub stable_max: f64,
    pub stable_frac_min: f64,
    pub stable_frac_max: f64,
    pub swap_cap_pct: f64,
    pub abs_cap_enabled: bool,
    pub abs_cap_native: f64,
    pub abs_cap_stable: f64,
    pub abs_cap_other: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            rand_min: 0.0008,
            rand_max: 0.004,
            stable_min: 0.02,
            stable_max: 0.20,
            stable_frac_min: 0.08,
            stable_frac_max: 0.25,
            swap_cap_pct: 0.30,
            abs_cap_enabled: false,
            abs_cap_native: 0.01,
            abs_cap_stable: 1.0,
            abs_cap_other: 0.05,
        }
    }
}

impl SizingConfig {
    pub fn floor(&self, class: SizeClass) -> f64 {
        if class.fine {
            self.rand_min * 0.5
        } else {
            0.005
        }
    }

    fn abs_cap(&self, class: SizeClass) -> f64 {
        match class.formula {
            Formula::Stable => self.abs_cap_stable,
            Formula::NativeLike => self.abs_cap_native,
            Formula::Other => self.abs_cap_other,
        }
    }
}

/// Amount to swap out of `balance` (human units), or `None` when the capped
/// amount falls below the class floor.
pub fn pick_swap_amount<R: Rng + ?Sized>(
    config: &SizingConfig,
    class: SizeClass,
    balance: f64,
    rng: &mut R,
) -> Option<f64> {
    if balance.is_nan() || balance <= 0.0 {
        return None;
    }

    let desired = match class.formula {
        Formula::Stable => {
            let base = uniform(rng, config.stable_min, config.stable_max);
            let frac = uniform(rng, config.stable_frac_min, config.stable_frac_max);
            base.max(balance * frac)
        }
        Formula::NativeLike => {
            let base = uniform(rng, config.rand_min, config.rand_max);
            let frac = uniform(rng, 0.02, 0.08);
            base.max(balance * frac)
        }
        Formula::Other => {
            let base = uniform(rng, config.rand_min * 2.0, config.rand_max * 2.0);
            base.max(balance * 0.05)
        }
    };

    let mut amount = desired.min(balance * config.swap_cap_pct);
    if config.abs_cap_enabled {
        amount = amount.min(config.abs_cap(class));
    }

    let amount = truncate(amount, class.precision());
    if amount <= 0.0 || amount < config.floor(class) {
        return None;
    }
    Some(amount)
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// Drop digits past `places` without ever rounding up.
pub fn truncate(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    let units = (value * scale).floor();
    let truncated = units / scale;
    // the product can round up onto the next integer
    if truncated > value {
        (units - 1.0) / scale
    } else {
        truncated
    }
}
