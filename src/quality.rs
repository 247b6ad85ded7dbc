//! Audio quality levels and fallback ordering
//!
//! Sources advertise a subset of the known quality levels per track. When the
//! requested level is unavailable or fails to resolve, a fallback strategy
//! produces the ordered list of alternatives to try.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Audio quality level, totally ordered from lowest to highest fidelity.
///
/// The declaration order is the quality order; `Ord` relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "128k")]
    Q128k,
    #[serde(rename = "192k")]
    Q192k,
    #[serde(rename = "320k")]
    Q320k,
    #[serde(rename = "flac")]
    Flac,
    #[serde(rename = "hires")]
    Hires,
    #[serde(rename = "atmos")]
    Atmos,
    #[serde(rename = "atmos_plus")]
    AtmosPlus,
    #[serde(rename = "master")]
    Master,
}

/// All quality levels, lowest fidelity first.
pub const QUALITY_ORDER: [Quality; 8] = [
    Quality::Q128k,
    Quality::Q192k,
    Quality::Q320k,
    Quality::Flac,
    Quality::Hires,
    Quality::Atmos,
    Quality::AtmosPlus,
    Quality::Master,
];

impl Quality {
    /// Wire/config name of this level (`"320k"`, `"atmos_plus"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Q128k => "128k",
            Quality::Q192k => "192k",
            Quality::Q320k => "320k",
            Quality::Flac => "flac",
            Quality::Hires => "hires",
            Quality::Atmos => "atmos",
            Quality::AtmosPlus => "atmos_plus",
            Quality::Master => "master",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "128k" => Ok(Quality::Q128k),
            "192k" => Ok(Quality::Q192k),
            "320k" => Ok(Quality::Q320k),
            "flac" => Ok(Quality::Flac),
            "hires" => Ok(Quality::Hires),
            "atmos" => Ok(Quality::Atmos),
            "atmos_plus" => Ok(Quality::AtmosPlus),
            "master" => Ok(Quality::Master),
            other => Err(Error::Config(format!("Unknown quality level: {}", other))),
        }
    }
}

/// Strategy selecting which alternatives to try, and in what order, when the
/// requested quality is not playable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Nearest level below the request first, then downward.
    Downgrade,
    /// Nearest level above the request first, then upward.
    Upgrade,
    /// Best available first, descending. Excludes the requested level.
    Max,
    /// Worst available first, ascending. Excludes the requested level.
    Min,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackStrategy::Downgrade => "downgrade",
            FallbackStrategy::Upgrade => "upgrade",
            FallbackStrategy::Max => "max",
            FallbackStrategy::Min => "min",
        };
        f.write_str(s)
    }
}

impl FromStr for FallbackStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downgrade" => Ok(FallbackStrategy::Downgrade),
            "upgrade" => Ok(FallbackStrategy::Upgrade),
            "max" => Ok(FallbackStrategy::Max),
            "min" => Ok(FallbackStrategy::Min),
            other => Err(Error::Config(format!(
                "Unknown fallback strategy: {}",
                other
            ))),
        }
    }
}

/// Ordered fallback candidates for `requested` out of `available`.
///
/// The requested level itself never appears in the result. Deterministic,
/// no side effects; an empty `available` set yields an empty list.
pub fn fallback(
    requested: Quality,
    available: &BTreeSet<Quality>,
    strategy: FallbackStrategy,
) -> Vec<Quality> {
    match strategy {
        FallbackStrategy::Downgrade => QUALITY_ORDER
            .iter()
            .copied()
            .filter(|q| *q < requested && available.contains(q))
            .rev()
            .collect(),
        FallbackStrategy::Upgrade => QUALITY_ORDER
            .iter()
            .copied()
            .filter(|q| *q > requested && available.contains(q))
            .collect(),
        FallbackStrategy::Max => QUALITY_ORDER
            .iter()
            .rev()
            .copied()
            .filter(|q| *q != requested && available.contains(q))
            .collect(),
        FallbackStrategy::Min => QUALITY_ORDER
            .iter()
            .copied()
            .filter(|q| *q != requested && available.contains(q))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avail(qualities: &[Quality]) -> BTreeSet<Quality> {
        qualities.iter().copied().collect()
    }

    #[test]
    fn test_quality_total_order() {
        assert!(Quality::Q128k < Quality::Q192k);
        assert!(Quality::Q320k < Quality::Flac);
        assert!(Quality::Hires < Quality::Atmos);
        assert!(Quality::AtmosPlus < Quality::Master);

        // Order array is sorted ascending
        for pair in QUALITY_ORDER.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_downgrade_nearest_below_first() {
        let available = avail(&[
            Quality::Q128k,
            Quality::Q192k,
            Quality::Q320k,
            Quality::Flac,
            Quality::Hires,
        ]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Downgrade);
        assert_eq!(order, vec![Quality::Q192k, Quality::Q128k]);
    }

    #[test]
    fn test_upgrade_nearest_above_first() {
        let available = avail(&[
            Quality::Q128k,
            Quality::Q192k,
            Quality::Q320k,
            Quality::Flac,
            Quality::Hires,
        ]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Upgrade);
        assert_eq!(order, vec![Quality::Flac, Quality::Hires]);
    }

    #[test]
    fn test_max_excludes_requested() {
        let available = avail(&[Quality::Q128k, Quality::Q320k, Quality::Flac]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Max);
        assert_eq!(order, vec![Quality::Flac, Quality::Q128k]);
    }

    #[test]
    fn test_min_excludes_requested() {
        let available = avail(&[Quality::Q128k, Quality::Q320k, Quality::Flac]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Min);
        assert_eq!(order, vec![Quality::Q128k, Quality::Flac]);
    }

    #[test]
    fn test_requested_never_included() {
        let available = avail(&QUALITY_ORDER);
        for requested in QUALITY_ORDER {
            for strategy in [
                FallbackStrategy::Downgrade,
                FallbackStrategy::Upgrade,
                FallbackStrategy::Max,
                FallbackStrategy::Min,
            ] {
                let order = fallback(requested, &available, strategy);
                assert!(
                    !order.contains(&requested),
                    "{} appeared in its own {} fallback",
                    requested,
                    strategy
                );
            }
        }
    }

    #[test]
    fn test_empty_available_yields_empty() {
        let available = BTreeSet::new();
        for strategy in [
            FallbackStrategy::Downgrade,
            FallbackStrategy::Upgrade,
            FallbackStrategy::Max,
            FallbackStrategy::Min,
        ] {
            assert!(fallback(Quality::Flac, &available, strategy).is_empty());
        }
    }

    #[test]
    fn test_downgrade_at_bottom_is_empty() {
        let available = avail(&QUALITY_ORDER);
        let order = fallback(Quality::Q128k, &available, FallbackStrategy::Downgrade);
        assert!(order.is_empty());
    }

    #[test]
    fn test_upgrade_at_top_is_empty() {
        let available = avail(&QUALITY_ORDER);
        let order = fallback(Quality::Master, &available, FallbackStrategy::Upgrade);
        assert!(order.is_empty());
    }

    #[test]
    fn test_requested_absent_from_available() {
        // The request anchors the ordering even when the source never
        // offered that level.
        let available = avail(&[Quality::Q128k, Quality::Hires]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Downgrade);
        assert_eq!(order, vec![Quality::Q128k]);
        let order = fallback(Quality::Q320k, &available, FallbackStrategy::Upgrade);
        assert_eq!(order, vec![Quality::Hires]);
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&Quality::AtmosPlus).unwrap();
        assert_eq!(json, "\"atmos_plus\"");
        let q: Quality = serde_json::from_str("\"320k\"").unwrap();
        assert_eq!(q, Quality::Q320k);

        let s = serde_json::to_string(&FallbackStrategy::Downgrade).unwrap();
        assert_eq!(s, "\"downgrade\"");
    }

    #[test]
    fn test_from_str_round_trip() {
        for q in QUALITY_ORDER {
            assert_eq!(q.as_str().parse::<Quality>().unwrap(), q);
        }
        assert!("ultra".parse::<Quality>().is_err());
    }
}
