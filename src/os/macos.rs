// OS abstraction layer - macOS implementation
// (c) 2024 NetTune contributors

use super::{CommandLine, CommandRunner, Interface, OsFamily, Platform, Tunable};
use crate::apply::Mutation;

const BUFFER_PARAMETERS: &[Tunable] = &[
    Tunable {
        label: "tcp_sendspace",
        oid: "net.inet.tcp.sendspace",
    },
    Tunable {
        label: "tcp_recvspace",
        oid: "net.inet.tcp.recvspace",
    },
    Tunable {
        label: "maxsockbuf",
        oid: "kern.ipc.maxsockbuf",
    },
    Tunable {
        label: "autorcvbufmax",
        oid: "net.inet.tcp.autorcvbufmax",
    },
    Tunable {
        label: "autosndbufmax",
        oid: "net.inet.tcp.autosndbufmax",
    },
    Tunable {
        label: "win_scale_factor",
        oid: "net.inet.tcp.win_scale_factor",
    },
];

/// Not every macOS release exposes the congestion algorithm, so try these in turn
const CONGESTION_OIDS: &[&str] = &[
    "net.inet.tcp.cc_algo",
    "net.inet.tcp.available_congestion_control",
];
const CONGESTION_FALLBACK: &str = "Default (Cubic/NewReno)";

/// OS abstraction layer for macOS
#[derive(Debug, Clone, Copy)]
pub struct MacOs;

/// `route -n get default` → the `interface:` value
fn parse_route_get(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("interface:"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `ifconfig <if>` → the word after `mtu` on the first line that has one
fn parse_ifconfig_mtu(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains("mtu"))?;
    let (_, rest) = line.split_once("mtu")?;
    rest.split_whitespace().next().map(str::to_string)
}

/// `ifconfig <if>` → the bracketed part of the `media:` line, e.g. `1000baseT <full-duplex>`
fn parse_ifconfig_media(output: &str) -> Option<String> {
    let media = output
        .lines()
        .find_map(|l| l.split_once("media:").map(|(_, m)| m.trim()))?;
    let speed = match (media.find('('), media.rfind(')')) {
        (Some(open), Some(close)) if open < close => &media[open + 1..close],
        _ => media,
    };
    Some(speed.to_string()).filter(|s| !s.is_empty())
}

/// Full `ifconfig` output → interfaces, loopback excluded
fn parse_ifconfig_list(output: &str) -> Vec<Interface> {
    let mut result: Vec<Interface> = Vec::new();
    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            let up = rest
                .split_once('<')
                .and_then(|(_, f)| f.split_once('>'))
                .is_some_and(|(flags, _)| flags.split(',').any(|f| f == "UP"));
            result.push(Interface {
                name: name.to_string(),
                ipv4: None,
                up,
            });
        } else if let Some(current) = result.last_mut() {
            let mut words = line.split_whitespace();
            if words.next() == Some("inet") && current.ipv4.is_none() {
                current.ipv4 = words.next().map(str::to_string);
            }
        }
    }
    result.retain(|i| !i.name.starts_with("lo"));
    result
}

impl Platform for MacOs {
    fn family(&self) -> OsFamily {
        OsFamily::MacOs
    }

    fn buffer_parameters(&self) -> &'static [Tunable] {
        BUFFER_PARAMETERS
    }

    fn default_interface(&self, runner: &dyn CommandRunner) -> Option<String> {
        let out = runner.run("route", &["-n", "get", "default"]).ok()?;
        parse_route_get(&out)
    }

    fn interfaces(&self, runner: &dyn CommandRunner) -> Vec<Interface> {
        runner
            .run("ifconfig", &[])
            .map(|o| parse_ifconfig_list(&o))
            .unwrap_or_default()
    }

    fn mtu(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String> {
        let out = runner.run("ifconfig", &[interface]).ok()?;
        parse_ifconfig_mtu(&out)
    }

    fn link_speed(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String> {
        let out = runner.run("ifconfig", &[interface]).ok()?;
        parse_ifconfig_media(&out)
    }

    fn congestion_control(&self, runner: &dyn CommandRunner) -> Option<String> {
        CONGESTION_OIDS
            .iter()
            .find_map(|oid| self.read_sysctl(runner, oid))
            .or_else(|| Some(CONGESTION_FALLBACK.to_string()))
    }

    fn cpu_governor(&self) -> Option<String> {
        // macOS manages CPU power states itself
        None
    }

    fn total_memory(&self, runner: &dyn CommandRunner) -> Option<u64> {
        self.read_sysctl(runner, "hw.memsize")?.parse().ok()
    }

    fn ping_command(&self, target: &str, count: u16) -> CommandLine {
        CommandLine::new("ping", ["-c", count.to_string().as_str(), "-t", "2", target])
    }

    fn set_mtu_command(&self, interface: &str, mtu: &str) -> CommandLine {
        CommandLine::new("ifconfig", [interface, "mtu", mtu])
    }

    fn highspeed_preset(&self, max_buffer: u64, _congestion: Option<&str>) -> Vec<Mutation> {
        vec![
            Mutation::sysctl("net.inet.tcp.win_scale_factor", 8),
            Mutation::sysctl("net.inet.tcp.autorcvbufmax", max_buffer),
            Mutation::sysctl("net.inet.tcp.autosndbufmax", max_buffer),
        ]
    }

    fn stock_defaults(&self) -> Vec<Mutation> {
        vec![
            Mutation::sysctl("net.inet.tcp.autorcvbufmax", 1_048_576),
            Mutation::sysctl("net.inet.tcp.autosndbufmax", 1_048_576),
            Mutation::sysctl("net.inet.tcp.sendspace", 131_072),
            Mutation::sysctl("net.inet.tcp.recvspace", 131_072),
            Mutation::sysctl("net.inet.tcp.win_scale_factor", 3),
            Mutation::sysctl("kern.ipc.maxsockbuf", 4_194_304),
        ]
    }

    fn persistence_hint(&self) -> &'static str {
        "macOS discards runtime sysctl changes at reboot; to reapply them, use a launchd job that runs sysctl -w at boot."
    }
}
