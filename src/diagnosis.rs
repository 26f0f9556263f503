//! Host network diagnosis
// (c) 2024 NetTune contributors

use std::fmt::Display;

use tracing::debug;

use crate::guideline::{self, BufferGuideline};
use crate::os::{NetworkFacts, OsFamily};

/// Everything the diagnosis found out about the host
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    /// OS family
    pub family: OsFamily,
    /// The interface examined; `None` if there was no default route and none was chosen
    pub interface: Option<String>,
    /// Link speed as the OS reports it
    pub link_speed: Option<String>,
    /// Interface MTU
    pub mtu: Option<String>,
    /// TCP buffer parameters, label and value, in table order
    pub buffers: Vec<(String, Option<String>)>,
    /// Congestion control algorithm
    pub congestion: Option<String>,
    /// Memory-based buffer guideline, if memory size is known
    pub guideline: Option<BufferGuideline>,
    /// CPU frequency governor(s)
    pub governor: Option<String>,
}

/// Advice arising from a [`Diagnosis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tip {
    /// The MTU is the Ethernet default
    JumboFrames,
    /// Linux is using cubic
    TryBbr,
    /// A CPU is in power-saving mode
    PowersaveGovernor,
}

impl Tip {
    /// A command that addresses the tip, if there is a well-known one
    #[must_use]
    pub fn remedy(self, family: OsFamily) -> Option<&'static str> {
        match (self, family) {
            (Tip::PowersaveGovernor, OsFamily::Linux) => {
                Some("sudo cpupower frequency-set -g performance")
            }
            (Tip::TryBbr, OsFamily::Linux) => {
                Some("sudo sysctl -w net.ipv4.tcp_congestion_control=bbr")
            }
            _ => None,
        }
    }

    /// Whether this is a warning rather than a suggestion
    #[must_use]
    pub fn is_warning(self) -> bool {
        matches!(self, Tip::PowersaveGovernor)
    }
}

impl Display for Tip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tip::JumboFrames => "On high-speed links, jumbo frames (MTU 9000) are recommended",
            Tip::TryBbr => "For long-distance, high-speed transfers, consider 'bbr'",
            Tip::PowersaveGovernor => "The 'powersave' governor can limit network performance",
        })
    }
}

impl Diagnosis {
    /// Advice for this host, most important last
    #[must_use]
    pub fn tips(&self) -> Vec<Tip> {
        let mut tips = Vec::new();
        if self.mtu.as_deref() == Some("1500") {
            tips.push(Tip::JumboFrames);
        }
        if self.family == OsFamily::Linux
            && self
                .congestion
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains("cubic"))
        {
            tips.push(Tip::TryBbr);
        }
        if self
            .governor
            .as_deref()
            .is_some_and(|g| g.to_lowercase().contains("powersave"))
        {
            tips.push(Tip::PowersaveGovernor);
        }
        tips
    }

    /// Whether the MTU is already jumbo-sized
    #[must_use]
    pub fn has_jumbo_frames(&self) -> bool {
        self.mtu
            .as_deref()
            .and_then(|m| m.parse::<u32>().ok())
            .is_some_and(|m| m >= 9000)
    }
}

/// Examines the host.
///
/// If `interface` is not given, the default-route interface is used.
#[must_use]
pub fn diagnose<F: NetworkFacts + ?Sized>(facts: &F, interface: Option<&str>) -> Diagnosis {
    let interface = interface
        .map(str::to_string)
        .or_else(|| facts.default_interface());
    debug!("diagnosing interface {interface:?}");
    let (link_speed, mtu) = match &interface {
        Some(i) => (facts.link_speed(i), facts.mtu(i)),
        None => (None, None),
    };
    Diagnosis {
        family: facts.family(),
        interface,
        link_speed,
        mtu,
        buffers: facts.tcp_buffers(),
        congestion: facts.congestion_control(),
        guideline: facts.total_memory().map(guideline::recommend),
        governor: facts.cpu_governor(),
    }
}

/// A topic in the built-in tuning guide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Explanation {
    /// Heading
    pub title: &'static str,
    /// Text, one line per element
    pub body: &'static [&'static str],
}

/// The built-in tuning guide
pub const EXPLANATIONS: &[Explanation] = &[
    Explanation {
        title: "Link speed",
        body: &[
            "The physical speed the OS has negotiated with the network.",
            "If a gigabit port shows 100Mb/s, suspect the cable (Cat 5e or better is needed) or the switch port.",
        ],
    },
    Explanation {
        title: "MTU (Maximum Transmission Unit)",
        body: &[
            "The largest frame the interface will send; 1500 bytes by default.",
            "On 10G and faster networks, jumbo frames (9000) cut per-packet overhead and CPU load.",
            "Every device on the path must support the larger MTU.",
        ],
    },
    Explanation {
        title: "TCP buffers (window size and BDP)",
        body: &[
            "Memory that holds data in flight.",
            "A connection needs a bandwidth-delay product's worth of buffer to keep the link full.",
            "macOS: sendspace/recvspace are initial sizes; maxsockbuf and the auto*bufmax values are limits.",
            "Linux: tcp_rmem/tcp_wmem hold min, default and max; the max must grow with bandwidth.",
        ],
    },
    Explanation {
        title: "Congestion control",
        body: &[
            "How the sender reacts to congestion.",
            "Cubic is the classic loss-based default on most systems.",
            "BBR models bandwidth and RTT, and does much better on lossy long-distance links.",
        ],
    },
    Explanation {
        title: "Buffer guideline",
        body: &[
            "A maximum buffer size suggested from this host's memory.",
            "Too small limits throughput; too large risks exhausting memory under many connections.",
            "The suggestion never exceeds 5% of total memory.",
        ],
    },
    Explanation {
        title: "CPU governor",
        body: &[
            "The CPU frequency scaling policy.",
            "performance minimises packet-processing latency.",
            "powersave can become a bottleneck at high packet rates.",
        ],
    },
];

#[cfg(test)]
mod test {
    use super::{diagnose, Tip};
    use crate::os::OsFamily;
    use crate::snapshot::test::FakeFacts;

    #[test]
    fn default_interface_is_used() {
        let d = diagnose(&FakeFacts::default(), None);
        assert_eq!(d.interface.as_deref(), Some("eth0"));
        assert_eq!(d.mtu.as_deref(), Some("1500"));
        assert_eq!(d.guideline.map(|g| g.bytes), Some(64 << 20));
        assert_eq!(d.buffers.len(), 3);
    }

    #[test]
    fn chosen_interface() {
        let d = diagnose(&FakeFacts::default(), Some("eth1"));
        assert_eq!(d.interface.as_deref(), Some("eth1"));
    }

    #[test]
    fn no_interface() {
        let facts = FakeFacts {
            interface: None,
            ..Default::default()
        };
        let d = diagnose(&facts, None);
        assert!(d.interface.is_none());
        assert!(d.mtu.is_none());
        assert!(d.link_speed.is_none());
    }

    #[test]
    fn tips() {
        let mut d = diagnose(&FakeFacts::default(), None);
        assert_eq!(d.tips(), vec![Tip::JumboFrames, Tip::TryBbr]);

        d.family = OsFamily::MacOs;
        d.mtu = Some("9000".into());
        d.governor = Some("performance, powersave".into());
        assert!(d.has_jumbo_frames());
        assert_eq!(d.tips(), vec![Tip::PowersaveGovernor]);
        assert!(Tip::PowersaveGovernor.is_warning());
        assert_eq!(Tip::PowersaveGovernor.remedy(OsFamily::MacOs), None);
        assert!(Tip::PowersaveGovernor
            .remedy(OsFamily::Linux)
            .is_some_and(|r| r.contains("cpupower")));
    }

    #[test]
    fn bbr_tip_is_linux_only() {
        let facts = FakeFacts {
            family: OsFamily::MacOs,
            ..Default::default()
        };
        assert!(!diagnose(&facts, None).tips().contains(&Tip::TryBbr));
    }
}
