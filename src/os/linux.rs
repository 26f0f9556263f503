// OS abstraction layer - Linux implementation
// (c) 2024 NetTune contributors

use std::{collections::BTreeSet, path::Path};

use super::{CommandLine, CommandRunner, Interface, OsFamily, Platform, Tunable};
use crate::apply::Mutation;

const BUFFER_PARAMETERS: &[Tunable] = &[
    Tunable {
        label: "tcp_rmem (min default max)",
        oid: "net.ipv4.tcp_rmem",
    },
    Tunable {
        label: "tcp_wmem (min default max)",
        oid: "net.ipv4.tcp_wmem",
    },
    Tunable {
        label: "core_rmem_max",
        oid: "net.core.rmem_max",
    },
    Tunable {
        label: "core_wmem_max",
        oid: "net.core.wmem_max",
    },
    Tunable {
        label: "tcp_mtu_probing",
        oid: "net.ipv4.tcp_mtu_probing",
    },
    Tunable {
        label: "default_qdisc",
        oid: "net.core.default_qdisc",
    },
    Tunable {
        label: "optmem_max",
        oid: "net.core.optmem_max",
    },
    Tunable {
        label: "tcp_no_metrics_save",
        oid: "net.ipv4.tcp_no_metrics_save",
    },
];

const CPU_SYSFS: &str = "/sys/devices/system/cpu";

/// OS abstraction layer for Linux
#[derive(Debug, Clone, Copy)]
pub struct Linux;

/// `ip route show default` → the word after `dev`
fn parse_default_route(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    let _ = words.by_ref().find(|w| *w == "dev")?;
    words.next().map(str::to_string)
}

/// `ip link show <if>` → the word after `mtu`
fn parse_link_mtu(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    let _ = words.by_ref().find(|w| *w == "mtu")?;
    words.next().map(str::to_string)
}

/// `ethtool <if>` → the `Speed:` value
fn parse_ethtool_speed(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("Speed:"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `/proc/meminfo` → `MemTotal` in bytes
fn parse_meminfo(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    kib.checked_mul(1024)
}

/// `ip -o link show` → (name, up) pairs
fn parse_link_list(output: &str) -> Vec<(String, bool)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.nth(1)?.trim_end_matches(':');
            // veth pairs show up as `veth1@if5`
            let name = name.split('@').next().unwrap_or(name);
            let flags = fields.next().unwrap_or_default();
            let up = flags
                .trim_matches(|c| c == '<' || c == '>')
                .split(',')
                .any(|f| f == "UP");
            Some((name.to_string(), up))
        })
        .collect()
}

/// `ip -o -4 addr show` → (name, address) pairs
fn parse_addr_list(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.nth(1)?;
            let _ = fields.by_ref().find(|w| *w == "inet")?;
            let addr = fields.next()?.split('/').next()?;
            Some((name.to_string(), addr.to_string()))
        })
        .collect()
}

fn summarise_governors<I: IntoIterator<Item = String>>(governors: I) -> Option<String> {
    let set: BTreeSet<String> = governors
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    if set.is_empty() {
        None
    } else {
        Some(set.into_iter().collect::<Vec<_>>().join(", "))
    }
}

impl Platform for Linux {
    fn family(&self) -> OsFamily {
        OsFamily::Linux
    }

    fn buffer_parameters(&self) -> &'static [Tunable] {
        BUFFER_PARAMETERS
    }

    fn default_interface(&self, runner: &dyn CommandRunner) -> Option<String> {
        let out = runner.run("ip", &["route", "show", "default"]).ok()?;
        parse_default_route(&out)
    }

    fn interfaces(&self, runner: &dyn CommandRunner) -> Vec<Interface> {
        let Ok(links) = runner.run("ip", &["-o", "link", "show"]) else {
            return Vec::new();
        };
        let addrs = runner
            .run("ip", &["-o", "-4", "addr", "show"])
            .map(|o| parse_addr_list(&o))
            .unwrap_or_default();
        parse_link_list(&links)
            .into_iter()
            .filter(|(name, _)| name != "lo")
            .map(|(name, up)| Interface {
                ipv4: addrs
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, a)| a.clone()),
                name,
                up,
            })
            .collect()
    }

    fn mtu(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String> {
        let out = runner.run("ip", &["link", "show", interface]).ok()?;
        parse_link_mtu(&out)
    }

    fn link_speed(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String> {
        let out = runner.run("ethtool", &[interface]).ok()?;
        parse_ethtool_speed(&out)
    }

    fn congestion_control(&self, runner: &dyn CommandRunner) -> Option<String> {
        self.read_sysctl(runner, "net.ipv4.tcp_congestion_control")
    }

    fn cpu_governor(&self) -> Option<String> {
        let entries = std::fs::read_dir(CPU_SYSFS).ok()?;
        let governors = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.strip_prefix("cpu")
                    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            })
            .filter_map(|e| {
                std::fs::read_to_string(e.path().join("cpufreq/scaling_governor")).ok()
            });
        summarise_governors(governors)
    }

    fn total_memory(&self, _runner: &dyn CommandRunner) -> Option<u64> {
        let text = std::fs::read_to_string(Path::new("/proc/meminfo")).ok()?;
        parse_meminfo(&text)
    }

    fn ping_command(&self, target: &str, count: u16) -> CommandLine {
        CommandLine::new("ping", ["-c", count.to_string().as_str(), "-W", "2", target])
    }

    fn set_mtu_command(&self, interface: &str, mtu: &str) -> CommandLine {
        CommandLine::new("ip", ["link", "set", "dev", interface, "mtu", mtu])
    }

    fn highspeed_preset(&self, max_buffer: u64, congestion: Option<&str>) -> Vec<Mutation> {
        let mut v = vec![
            Mutation::sysctl("net.core.rmem_max", max_buffer),
            Mutation::sysctl("net.core.wmem_max", max_buffer),
            Mutation::sysctl("net.ipv4.tcp_rmem", format!("4096 131072 {max_buffer}")),
            Mutation::sysctl("net.ipv4.tcp_wmem", format!("4096 16384 {max_buffer}")),
            Mutation::sysctl("net.ipv4.tcp_mtu_probing", 1),
        ];
        if let Some(alg) = congestion {
            v.push(Mutation::sysctl("net.ipv4.tcp_congestion_control", alg));
        }
        v
    }

    fn stock_defaults(&self) -> Vec<Mutation> {
        vec![
            Mutation::sysctl("net.core.rmem_max", 212_992),
            Mutation::sysctl("net.core.wmem_max", 212_992),
            Mutation::sysctl("net.ipv4.tcp_rmem", "4096 131072 6291456"),
            Mutation::sysctl("net.ipv4.tcp_wmem", "4096 16384 4194304"),
            Mutation::sysctl("net.ipv4.tcp_mtu_probing", 0),
            Mutation::sysctl("net.ipv4.tcp_congestion_control", "cubic"),
        ]
    }

    fn persistence_hint(&self) -> &'static str {
        "To keep settings across reboots, add them to a file in /etc/sysctl.d/ (e.g. /etc/sysctl.d/60-nettune.conf)."
    }
}

#[cfg(test)]
mod test {
    use super::{
        parse_addr_list, parse_default_route, parse_ethtool_speed, parse_link_list,
        parse_link_mtu, parse_meminfo, summarise_governors, Linux,
    };
    use crate::os::{test::FakeRunner, Platform as _};

    #[test]
    fn default_route() {
        let out = "default via 192.168.1.1 dev wlp2s0 proto dhcp metric 600";
        assert_eq!(parse_default_route(out).as_deref(), Some("wlp2s0"));
        assert_eq!(parse_default_route(""), None);
    }

    #[test]
    fn link_mtu() {
        let out = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc fq_codel state UP mode DEFAULT group default qlen 1000\n    link/ether 00:11:22:33:44:55 brd ff:ff:ff:ff:ff:ff";
        assert_eq!(parse_link_mtu(out).as_deref(), Some("9000"));
    }

    #[test]
    fn ethtool_speed() {
        let out = "Settings for eth0:\n\tSupported ports: [ TP ]\n\tSpeed: 10000Mb/s\n\tDuplex: Full";
        assert_eq!(parse_ethtool_speed(out).as_deref(), Some("10000Mb/s"));
        assert_eq!(parse_ethtool_speed("Settings for lo:"), None);
    }

    #[test]
    fn meminfo() {
        let text = "MemTotal:       16303264 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_meminfo(text), Some(16_303_264 * 1024));
        assert_eq!(parse_meminfo("garbage"), None);
    }

    #[test]
    fn link_list() {
        let out = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
                   2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP\n\
                   3: veth1@if5: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN";
        let links = parse_link_list(out);
        assert_eq!(
            links,
            vec![
                ("lo".to_string(), true),
                ("eth0".to_string(), true),
                ("veth1".to_string(), false)
            ]
        );
    }

    #[test]
    fn addr_list() {
        let out = "1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever\n\
                   2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0\\       valid_lft forever";
        let addrs = parse_addr_list(out);
        assert_eq!(addrs[1], ("eth0".to_string(), "10.0.0.5".to_string()));
    }

    #[test]
    fn governors() {
        let g = summarise_governors(vec![
            "powersave\n".to_string(),
            "performance\n".to_string(),
            "powersave\n".to_string(),
        ]);
        assert_eq!(g.as_deref(), Some("performance, powersave"));
        assert_eq!(summarise_governors(Vec::new()), None);
    }

    #[test]
    fn interfaces_skip_loopback() {
        let runner = FakeRunner::with(&[
            (
                "ip -o link show",
                "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536\n2: eth0: <BROADCAST,UP,LOWER_UP> mtu 1500",
            ),
            ("ip -o -4 addr show", "2: eth0    inet 10.1.2.3/16 brd 10.1.255.255"),
        ]);
        let ifs = Linux.interfaces(&runner);
        assert_eq!(ifs.len(), 1);
        assert_eq!(ifs[0].name, "eth0");
        assert_eq!(ifs[0].ipv4.as_deref(), Some("10.1.2.3"));
        assert!(ifs[0].up);
    }

    #[test]
    fn sysctl_read_via_runner() {
        let runner = FakeRunner::with(&[("sysctl -n net.ipv4.tcp_congestion_control", "bbr")]);
        assert_eq!(Linux.congestion_control(&runner).as_deref(), Some("bbr"));
        assert_eq!(Linux.congestion_control(&FakeRunner::default()), None);
    }

    #[test]
    fn preset_includes_congestion_only_when_asked() {
        assert_eq!(Linux.highspeed_preset(1 << 25, None).len(), 5);
        let with = Linux.highspeed_preset(1 << 25, Some("bbr"));
        assert_eq!(with.len(), 6);
        assert_eq!(with[2].value(), "4096 131072 33554432");
    }

    #[test]
    fn commands() {
        assert_eq!(
            Linux.set_mtu_command("eth0", "9000").to_string(),
            "ip link set dev eth0 mtu 9000"
        );
        assert_eq!(
            Linux.ping_command("8.8.8.8", 4).to_string(),
            "ping -c 4 -W 2 8.8.8.8"
        );
    }
}
