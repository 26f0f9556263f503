//! Memory-based socket buffer guideline
// (c) 2024 NetTune contributors

use human_repr::HumanCount as _;

/// One mebibyte
pub const MIB: u64 = 1 << 20;
/// One gibibyte
pub const GIB: u64 = 1 << 30;

/// Recommended maximum socket buffer size for a host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferGuideline {
    /// Total memory the recommendation was computed for
    pub total_memory_bytes: u64,
    /// Recommended maximum buffer, bytes
    pub bytes: u64,
    /// Recommended maximum buffer, MiB
    pub mb: f64,
    /// Whether the tiered suggestion was reduced to 5% of memory
    pub capped: bool,
}

/// Recommends a maximum socket buffer size for a host with the given amount of memory.
///
/// The recommendation is tiered by memory size and never exceeds 5% of total memory:
///
/// | Total memory | Suggestion |
/// |--------------|------------|
/// | < 16 GiB     | 64 MiB     |
/// | < 64 GiB     | 128 MiB    |
/// | otherwise    | 512 MiB    |
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recommend(total_memory_bytes: u64) -> BufferGuideline {
    let tier_mb: u64 = if total_memory_bytes < 16 * GIB {
        64
    } else if total_memory_bytes < 64 * GIB {
        128
    } else {
        512
    };
    // Integer division rounds down, so the cap is never above 5%
    let cap = total_memory_bytes / 20;
    let suggested = tier_mb * MIB;
    let bytes = suggested.min(cap);
    BufferGuideline {
        total_memory_bytes,
        bytes,
        mb: bytes as f64 / MIB as f64,
        capped: suggested > cap,
    }
}

impl BufferGuideline {
    /// Total memory in GiB, for display
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_memory_gb(&self) -> f64 {
        self.total_memory_bytes as f64 / GIB as f64
    }
}

impl std::fmt::Display for BufferGuideline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} MB ({} bytes) for {} of memory",
            self.mb,
            self.bytes,
            self.total_memory_bytes.human_count_bytes()
        )
    }
}

#[cfg(test)]
mod test {
    use assertables::assert_le;
    use rand::Rng as _;

    use super::{recommend, GIB, MIB};

    #[test]
    fn tiers() {
        assert_eq!(recommend(8 * GIB).bytes, 64 * MIB);
        assert_eq!(recommend(32 * GIB).bytes, 128 * MIB);
        assert_eq!(recommend(128 * GIB).bytes, 512 * MIB);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(recommend(16 * GIB - 1).bytes, 64 * MIB);
        assert_eq!(recommend(16 * GIB).bytes, 128 * MIB);
        assert_eq!(recommend(64 * GIB).bytes, 512 * MIB);
    }

    #[test]
    fn eight_gib_is_uncapped() {
        let g = recommend(8 * GIB);
        assert_eq!(g.bytes, 67_108_864);
        assert!((g.mb - 64.0).abs() < f64::EPSILON);
        assert!(!g.capped);
    }

    #[test]
    fn one_gib_is_capped() {
        let g = recommend(GIB);
        assert_eq!(g.bytes, 53_687_091);
        assert!(g.capped);
        assert!((g.mb - 51.2).abs() < 0.001);
    }

    #[test]
    fn zero_memory() {
        assert_eq!(recommend(0).bytes, 0);
    }

    #[test]
    fn never_above_five_percent() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let m: u64 = rng.gen_range(0..1 << 40);
            #[allow(clippy::cast_precision_loss)]
            let limit = m as f64 * 0.05;
            #[allow(clippy::cast_precision_loss)]
            let got = recommend(m).bytes as f64;
            assert_le!(got, limit);
        }
    }

    #[test]
    fn monotonic_in_memory() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let a: u64 = rng.gen_range(0..1 << 40);
            let b: u64 = rng.gen_range(a..=1 << 40);
            assert_le!(recommend(a).bytes, recommend(b).bytes);
        }
    }
}
