//! Bandwidth-delay product calculator
// (c) 2024 NetTune contributors
//!
//! A TCP connection can only keep a link full if it is allowed to have a
//! bandwidth-delay product's worth of data in flight. That sets the minimum
//! useful maximum for the socket buffers at each end.

use std::fmt::Display;

use tracing::warn;

use crate::guideline::MIB;
use crate::os::RttProbe;

/// Bandwidth assumed when the user does not give one, in Gbit/s
pub const DEFAULT_BANDWIDTH_GBPS: f64 = 10.0;

/// RTT assumed when a live probe fails, in milliseconds
pub const FALLBACK_RTT_MS: f64 = 100.0;

/// Result of a BDP computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BdpResult {
    /// Bandwidth the computation used, Gbit/s
    pub bandwidth_gbps: f64,
    /// RTT the computation used, ms
    pub rtt_ms: f64,
    /// The bandwidth-delay product, bytes
    pub bdp_bytes: u64,
    /// The bandwidth-delay product, MiB
    pub bdp_mb: f64,
}

/// Computes the bandwidth-delay product.
///
/// `bdp_bytes = floor(bandwidth_gbps × 10⁹ × rtt_ms / 1000 / 8)`.
///
/// Inputs should be validated by the caller (see [`parse_bandwidth`]);
/// negative or non-finite figures are treated as zero.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn compute(bandwidth_gbps: f64, rtt_ms: f64) -> BdpResult {
    let sanitise = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    let (bw, rtt) = (sanitise(bandwidth_gbps), sanitise(rtt_ms));
    // float to int `as` saturates, and the value is non-negative
    let bdp_bytes = (bw * 1e9 * rtt / 1000.0 / 8.0).floor() as u64;
    BdpResult {
        bandwidth_gbps: bw,
        rtt_ms: rtt,
        bdp_bytes,
        bdp_mb: bdp_bytes as f64 / MIB as f64,
    }
}

impl Display for BdpResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Gbps × {} ms → {:.2} MB ({} bytes)",
            self.bandwidth_gbps, self.rtt_ms, self.bdp_mb, self.bdp_bytes
        )
    }
}

/// Typical round-trip times from the reference location to well-known regions
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    clap::ValueEnum,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Region {
    /// Domestic, ~10 ms
    Domestic,
    /// US west coast, ~140 ms
    UsWest,
    /// US east coast, ~200 ms
    UsEast,
    /// Europe, ~260 ms
    Europe,
}

impl Region {
    /// The typical RTT to this region, in milliseconds
    #[must_use]
    pub fn rtt_ms(self) -> f64 {
        match self {
            Region::Domestic => 10.0,
            Region::UsWest => 140.0,
            Region::UsEast => 200.0,
            Region::Europe => 260.0,
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn describe(self) -> String {
        let name = match self {
            Region::Domestic => "Domestic",
            Region::UsWest => "US west",
            Region::UsEast => "US east",
            Region::Europe => "Europe",
        };
        format!("{name}: ~{} ms", self.rtt_ms())
    }
}

/// Where an RTT figure came from
#[derive(Debug, Clone, PartialEq)]
pub enum RttSource {
    /// Measured live against this target
    Probed(String),
    /// The probe against this target failed; [`FALLBACK_RTT_MS`] was used
    Fallback(String),
    /// Taken from the regional table
    Region(Region),
    /// Given directly by the user
    Given,
}

/// An RTT figure and its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct RttMeasurement {
    /// Round-trip time, ms
    pub rtt_ms: f64,
    /// Where it came from
    pub source: RttSource,
}

impl RttMeasurement {
    /// Probes `target`; falls back to [`FALLBACK_RTT_MS`] if that fails.
    ///
    /// Any retrying is the probe's business.
    #[must_use]
    pub fn probe<P: RttProbe + ?Sized>(probe: &P, target: &str) -> Self {
        match probe.probe(target) {
            Ok(rtt_ms) => Self {
                rtt_ms,
                source: RttSource::Probed(target.into()),
            },
            Err(e) => {
                warn!("RTT probe to {target} failed ({e:#}); assuming {FALLBACK_RTT_MS} ms");
                Self {
                    rtt_ms: FALLBACK_RTT_MS,
                    source: RttSource::Fallback(target.into()),
                }
            }
        }
    }

    /// Uses the typical RTT for a region
    #[must_use]
    pub fn region(region: Region) -> Self {
        Self {
            rtt_ms: region.rtt_ms(),
            source: RttSource::Region(region),
        }
    }

    /// Uses a figure the user supplied
    #[must_use]
    pub fn given(rtt_ms: f64) -> Self {
        Self {
            rtt_ms,
            source: RttSource::Given,
        }
    }
}

/// Invalid user input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Not a number
    #[error("please enter a number (got \"{0}\")")]
    NotANumber(String),
    /// A number, but not an acceptable one
    #[error("{0} is out of range; please enter a number greater than zero")]
    OutOfRange(String),
}

/// Parses a bandwidth figure in Gbit/s as typed by a user.
///
/// Blank input means [`DEFAULT_BANDWIDTH_GBPS`].
/// Non-numeric, non-finite and non-positive input is rejected.
pub fn parse_bandwidth(input: &str) -> Result<f64, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(DEFAULT_BANDWIDTH_GBPS);
    }
    let v: f64 = input
        .parse()
        .map_err(|_| InputError::NotANumber(input.into()))?;
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(InputError::OutOfRange(input.into()))
    }
}

/// Parses an RTT figure in milliseconds. Zero is allowed.
pub fn parse_rtt(input: &str) -> Result<f64, InputError> {
    let input = input.trim();
    let v: f64 = input
        .parse()
        .map_err(|_| InputError::NotANumber(input.into()))?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(InputError::OutOfRange(input.into()))
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use assertables::assert_le;
    use rand::Rng as _;
    use strum::IntoEnumIterator as _;

    use super::{
        compute, parse_bandwidth, parse_rtt, InputError, Region, RttMeasurement, RttSource,
        DEFAULT_BANDWIDTH_GBPS, FALLBACK_RTT_MS,
    };
    use crate::os::RttProbe;

    struct FixedProbe(Option<f64>);
    impl RttProbe for FixedProbe {
        fn probe(&self, _target: &str) -> Result<f64> {
            self.0.ok_or_else(|| anyhow::anyhow!("100% packet loss"))
        }
    }

    #[test]
    fn ten_gig_hundred_ms() {
        let r = compute(10.0, 100.0);
        assert_eq!(r.bdp_bytes, 125_000_000);
        assert!((r.bdp_mb - 119.209).abs() < 0.001);
    }

    #[test]
    fn one_gig_ten_ms() {
        assert_eq!(compute(1.0, 10.0).bdp_bytes, 1_250_000);
    }

    #[test]
    fn zero_rtt() {
        assert_eq!(compute(10.0, 0.0).bdp_bytes, 0);
    }

    #[test]
    fn invalid_inputs_are_zeroed() {
        assert_eq!(compute(-1.0, 100.0).bdp_bytes, 0);
        assert_eq!(compute(f64::NAN, 100.0).bdp_bytes, 0);
        assert_eq!(compute(1.0, f64::INFINITY).bdp_bytes, 0);
    }

    #[test]
    fn matches_closed_form() {
        // integer-valued inputs keep the float arithmetic exact
        for bw in 1..=100u32 {
            for rtt in (0..=400u32).step_by(20) {
                let expected = u64::from(bw) * 125_000 * u64::from(rtt);
                assert_eq!(
                    compute(f64::from(bw), f64::from(rtt)).bdp_bytes,
                    expected,
                    "bw {bw} rtt {rtt}"
                );
            }
        }
    }

    #[test]
    fn monotonic() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let bw: f64 = rng.gen_range(0.001..400.0);
            let rtt: f64 = rng.gen_range(0.0..1000.0);
            let base = compute(bw, rtt).bdp_bytes;
            assert_le!(base, compute(bw * 1.5, rtt).bdp_bytes);
            assert_le!(base, compute(bw, rtt + 1.0).bdp_bytes);
        }
    }

    #[test]
    fn regions() {
        let rtts: Vec<f64> = Region::iter().map(Region::rtt_ms).collect();
        assert_eq!(rtts, vec![10.0, 140.0, 200.0, 260.0]);
        assert_eq!(Region::UsWest.to_string(), "us-west");
        assert_eq!("europe".parse::<Region>().unwrap(), Region::Europe);
    }

    #[test]
    fn probe_success() {
        let m = RttMeasurement::probe(&FixedProbe(Some(12.5)), "8.8.8.8");
        assert!((m.rtt_ms - 12.5).abs() < f64::EPSILON);
        assert_eq!(m.source, RttSource::Probed("8.8.8.8".into()));
    }

    #[test]
    fn probe_failure_falls_back() {
        let m = RttMeasurement::probe(&FixedProbe(None), "8.8.8.8");
        assert!((m.rtt_ms - FALLBACK_RTT_MS).abs() < f64::EPSILON);
        assert_eq!(m.source, RttSource::Fallback("8.8.8.8".into()));
    }

    #[test]
    fn bandwidth_input() {
        assert_eq!(parse_bandwidth(""), Ok(DEFAULT_BANDWIDTH_GBPS));
        assert_eq!(parse_bandwidth("  "), Ok(DEFAULT_BANDWIDTH_GBPS));
        assert_eq!(parse_bandwidth("2.5"), Ok(2.5));
        assert_eq!(
            parse_bandwidth("fast"),
            Err(InputError::NotANumber("fast".into()))
        );
        assert_eq!(parse_bandwidth("0"), Err(InputError::OutOfRange("0".into())));
        assert_eq!(parse_bandwidth("-3"), Err(InputError::OutOfRange("-3".into())));
        assert!(parse_bandwidth("inf").is_err());
    }

    #[test]
    fn rtt_input() {
        assert_eq!(parse_rtt("0"), Ok(0.0));
        assert_eq!(parse_rtt("140"), Ok(140.0));
        assert!(parse_rtt("").is_err());
        assert!(parse_rtt("-1").is_err());
    }
}
