//! Fee rate and sweep size estimation
//!
//! Size estimation is a fixed per-input heuristic, not a weight
//! calculator:
//!
//! ```text
//! vsize = inputs * 150 + 34 + 10
//!         ^ P2WSH 1-of-2 input   ^ one output  ^ tx overhead
//! ```
//!
//! A real 1-of-2 P2WSH input is closer to 105 vB, so the heuristic
//! overpays slightly for standard destinations. The output term is not
//! measured from the destination script, so non-standard destination
//! types may be underestimated.

use std::fmt;

use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Estimated vbytes per 1-of-2 P2WSH input.
pub const INPUT_VBYTES: u64 = 150;
/// Estimated vbytes for the single sweep output.
pub const OUTPUT_VBYTES: u64 = 34;
/// Estimated fixed transaction overhead.
pub const OVERHEAD_VBYTES: u64 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("Fee rate must be at least 1 sat/vB")]
    InvalidFeeRate,
}

/// Fee rate in whole satoshis per virtual byte. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FeeRate(u32);

impl FeeRate {
    /// Used when no recommendation can be fetched.
    pub const FALLBACK: FeeRate = FeeRate(50);

    /// Lowest accepted rate.
    pub const MIN: FeeRate = FeeRate(1);

    pub fn from_sat_per_vb(rate: u32) -> Result<Self, FeeError> {
        if rate == 0 {
            return Err(FeeError::InvalidFeeRate);
        }
        Ok(Self(rate))
    }

    pub fn sat_per_vb(self) -> u32 {
        self.0
    }

    /// Fee for `vsize` virtual bytes. Saturates instead of overflowing, so an
    /// absurd rate can only ever fail the funds check.
    pub fn fee_for_vsize(self, vsize: u64) -> Amount {
        Amount::from_sat(vsize.saturating_mul(self.0 as u64))
    }
}

impl TryFrom<u32> for FeeRate {
    type Error = FeeError;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        Self::from_sat_per_vb(rate)
    }
}

impl From<FeeRate> for u32 {
    fn from(rate: FeeRate) -> Self {
        rate.0
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/vB", self.0)
    }
}

/// Estimated virtual size of a sweep spending `num_inputs` outputs.
pub fn estimate_sweep_vsize(num_inputs: usize) -> u64 {
    (num_inputs as u64)
        .saturating_mul(INPUT_VBYTES)
        .saturating_add(OUTPUT_VBYTES + OVERHEAD_VBYTES)
}

/// Tiered fee recommendations (sat/vB), as served by mempool.space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTiers {
    pub fastest_fee: u32,
    pub half_hour_fee: u32,
    pub hour_fee: u32,
    pub economy_fee: u32,
    pub minimum_fee: u32,
}

impl FeeTiers {
    /// The medium-priority tier (`hourFee`). `None` when the source reports 0.
    pub fn medium(&self) -> Option<FeeRate> {
        FeeRate::from_sat_per_vb(self.hour_fee).ok()
    }
}

/// Where the fee rate for an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeSource {
    /// Entered explicitly by the user
    User,
    /// Medium tier of the fee estimator
    Recommended,
    /// [`FeeRate::FALLBACK`] after the estimator failed
    Fallback,
}

/// The fee rate to use, plus a warning to surface when it is a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeResolution {
    pub rate: FeeRate,
    pub source: FeeSource,
    pub warning: Option<String>,
}

/// Pick the fee rate for an attempt.
///
/// An explicit user rate wins, then the recommendation, then the fallback.
/// The fallback never blocks recovery; it only carries a warning.
pub fn resolve_fee_rate(user: Option<FeeRate>, recommended: Option<FeeRate>) -> FeeResolution {
    if let Some(rate) = user {
        return FeeResolution {
            rate,
            source: FeeSource::User,
            warning: None,
        };
    }
    match recommended {
        Some(rate) => FeeResolution {
            rate,
            source: FeeSource::Recommended,
            warning: None,
        },
        None => {
            log::warn!(
                "No fee recommendation available, using default {}",
                FeeRate::FALLBACK
            );
            FeeResolution {
                rate: FeeRate::FALLBACK,
                source: FeeSource::Fallback,
                warning: Some(format!(
                    "Failed to fetch fee rates. Using default value ({}).",
                    FeeRate::FALLBACK
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_rejected() {
        assert_eq!(FeeRate::from_sat_per_vb(0), Err(FeeError::InvalidFeeRate));
        assert_eq!(FeeRate::from_sat_per_vb(1).unwrap(), FeeRate::MIN);
    }

    #[test]
    fn test_vsize_heuristic() {
        assert_eq!(estimate_sweep_vsize(1), 194);
        assert_eq!(estimate_sweep_vsize(2), 344);
        assert_eq!(estimate_sweep_vsize(0), 44);
    }

    #[test]
    fn test_fee_for_vsize() {
        let rate = FeeRate::from_sat_per_vb(10).unwrap();
        assert_eq!(rate.fee_for_vsize(344), Amount::from_sat(3_440));

        let absurd = FeeRate::from_sat_per_vb(u32::MAX).unwrap();
        assert_eq!(absurd.fee_for_vsize(u64::MAX), Amount::from_sat(u64::MAX));
    }

    #[test]
    fn test_medium_tier() {
        let tiers: FeeTiers = serde_json::from_str(
            r#"{"fastestFee":30,"halfHourFee":20,"hourFee":12,"economyFee":4,"minimumFee":1}"#,
        )
        .unwrap();
        assert_eq!(tiers.medium(), Some(FeeRate::from_sat_per_vb(12).unwrap()));

        let empty = FeeTiers {
            hour_fee: 0,
            ..tiers
        };
        assert_eq!(empty.medium(), None);
    }

    #[test]
    fn test_resolve_prefers_user_rate() {
        let user = FeeRate::from_sat_per_vb(7).unwrap();
        let recommended = FeeRate::from_sat_per_vb(20).unwrap();
        let res = resolve_fee_rate(Some(user), Some(recommended));
        assert_eq!(res.rate, user);
        assert_eq!(res.source, FeeSource::User);
        assert!(res.warning.is_none());
    }

    #[test]
    fn test_resolve_uses_recommendation() {
        let recommended = FeeRate::from_sat_per_vb(20).unwrap();
        let res = resolve_fee_rate(None, Some(recommended));
        assert_eq!(res.rate, recommended);
        assert_eq!(res.source, FeeSource::Recommended);
    }

    #[test]
    fn test_resolve_falls_back_with_warning() {
        let res = resolve_fee_rate(None, None);
        assert_eq!(res.rate, FeeRate::FALLBACK);
        assert_eq!(res.rate.sat_per_vb(), 50);
        assert_eq!(res.source, FeeSource::Fallback);
        assert!(res.warning.unwrap().contains("default"));
    }

    #[test]
    fn test_fee_rate_serde_rejects_zero() {
        assert!(serde_json::from_str::<FeeRate>("0").is_err());
        let rate: FeeRate = serde_json::from_str("25").unwrap();
        assert_eq!(rate.sat_per_vb(), 25);
        assert_eq!(serde_json::to_string(&rate).unwrap(), "25");
    }
}
