//! Tier schedule and progressive payout calculator.
//!
//! A schedule is an ordered list of cumulative-count ranges covering
//! [0, ∞) with no gaps or overlaps. Each range carries a unit rate in
//! thousandths of a currency unit. The amount for an increment is the
//! sum over tiers of (units landing in the tier × rate), truncated to
//! whole units once, after summing.
//!
//! Pure: no I/O, no clock, no store.

use crate::{
    error::{PipelineError, PipelineResult},
    types::Amount,
};
use serde::{Deserialize, Serialize};

/// Rates are expressed per unit in thousandths of a currency unit.
pub const RATE_SCALE: i64 = 1_000;

/// Lifetime thresholds shared by the standard view and ad schedules.
pub const STANDARD_BOUNDS: [i64; 3] = [100_000, 500_000, 1_000_000];

/// Organic view rates: 1.0 / 1.1 / 1.3 / 1.5 per view.
pub const VIEW_RATES_MILLI: [i64; 4] = [1_000, 1_100, 1_300, 1_500];

/// Ad view rates: 10 / 12 / 15 / 20 per ad view.
pub const AD_RATES_MILLI: [i64; 4] = [10_000, 12_000, 15_000, 20_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub lower:      i64,
    /// Exclusive upper bound; `None` is unbounded.
    #[serde(default)]
    pub upper:      Option<i64>,
    pub rate_milli: i64,
}

impl Tier {
    /// Units of the range (previous_total, current_total] that fall in this tier.
    fn units_between(&self, previous_total: i64, current_total: i64) -> i64 {
        if let Some(upper) = self.upper {
            if previous_total >= upper {
                return 0;
            }
        }
        if current_total <= self.lower {
            return 0;
        }
        let start = previous_total.max(self.lower);
        let end = match self.upper {
            Some(upper) => current_total.min(upper),
            None => current_total,
        };
        (end - start).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierSchedule {
    tiers: Vec<Tier>,
}

impl TierSchedule {
    /// Build a schedule, rejecting gaps, overlaps, a bounded last tier,
    /// and negative rates.
    pub fn new(tiers: Vec<Tier>) -> PipelineResult<Self> {
        let invalid = |reason: String| PipelineError::InvalidTierSchedule { reason };

        let first = tiers.first().ok_or_else(|| invalid("no tiers".into()))?;
        if first.lower != 0 {
            return Err(invalid(format!("first tier starts at {}, not 0", first.lower)));
        }

        for (i, tier) in tiers.iter().enumerate() {
            if tier.rate_milli < 0 {
                return Err(invalid(format!("tier {i} has negative rate {}", tier.rate_milli)));
            }
            let is_last = i + 1 == tiers.len();
            match (tier.upper, is_last) {
                (None, true) => {}
                (None, false) => {
                    return Err(invalid(format!("tier {i} is unbounded but not last")));
                }
                (Some(upper), true) => {
                    return Err(invalid(format!("last tier ends at {upper}; must be unbounded")));
                }
                (Some(upper), false) => {
                    if upper <= tier.lower {
                        return Err(invalid(format!(
                            "tier {i} is empty: [{}, {upper})", tier.lower
                        )));
                    }
                    let next_lower = tiers[i + 1].lower;
                    if next_lower != upper {
                        return Err(invalid(format!(
                            "tier {i} ends at {upper} but tier {} starts at {next_lower}",
                            i + 1
                        )));
                    }
                }
            }
        }

        Ok(Self { tiers })
    }

    /// The standard organic-view schedule.
    pub fn views() -> Self {
        Self::standard(VIEW_RATES_MILLI)
    }

    /// The standard ad-view schedule.
    pub fn ads() -> Self {
        Self::standard(AD_RATES_MILLI)
    }

    fn standard(rates: [i64; 4]) -> Self {
        let [b1, b2, b3] = STANDARD_BOUNDS;
        Self {
            tiers: vec![
                Tier { lower: 0,  upper: Some(b1), rate_milli: rates[0] },
                Tier { lower: b1, upper: Some(b2), rate_milli: rates[1] },
                Tier { lower: b2, upper: Some(b3), rate_milli: rates[2] },
                Tier { lower: b3, upper: None,     rate_milli: rates[3] },
            ],
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Exact earnings for `increment` new units on top of `previous_total`,
    /// in thousandths of a currency unit. Additive across split increments.
    pub fn calculate_milli(&self, previous_total: i64, increment: i64) -> i128 {
        if increment <= 0 {
            return 0;
        }
        let previous_total = previous_total.max(0);
        let current_total = previous_total.saturating_add(increment);

        self.tiers
            .iter()
            .map(|tier| {
                tier.units_between(previous_total, current_total) as i128
                    * tier.rate_milli as i128
            })
            .sum()
    }

    /// Earnings in whole currency units, truncated toward zero.
    /// A non-positive increment earns nothing.
    pub fn calculate(&self, previous_total: i64, increment: i64) -> Amount {
        let milli = self.calculate_milli(previous_total, increment);
        (milli / RATE_SCALE as i128) as Amount
    }
}

impl TryFrom<Vec<Tier>> for TierSchedule {
    type Error = PipelineError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<TierSchedule> for Vec<Tier> {
    fn from(schedule: TierSchedule) -> Self {
        schedule.tiers
    }
}
