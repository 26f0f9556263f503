// Interactive menu
// (c) 2024 NetTune contributors

use anstream::eprintln;
use anyhow::Result;
use dialoguer::{Input, Select};
use strum::IntoEnumIterator as _;
use tracing::error;

use super::session::Session;
use crate::bdp::{parse_bandwidth, parse_rtt, InputError, Region, RttMeasurement};
use crate::os::Interface;
use crate::styles::WARNING;
use crate::tuning::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
enum MainItem {
    #[strum(to_string = "Diagnose this host")]
    Diagnose,
    #[strum(to_string = "List network interfaces")]
    Interfaces,
    #[strum(to_string = "BDP calculator")]
    Bdp,
    #[strum(to_string = "Throughput test (iperf3)")]
    Iperf,
    #[strum(to_string = "Snapshots: back up, inspect, restore, delete")]
    Snapshots,
    #[strum(to_string = "Apply high-speed tuning")]
    Tune,
    #[strum(to_string = "Reset to stock settings")]
    Reset,
    #[strum(to_string = "Explain the settings")]
    Explain,
    #[strum(to_string = "Quit")]
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
enum SnapshotItem {
    #[strum(to_string = "Back up current settings")]
    Save,
    #[strum(to_string = "Show a snapshot")]
    Show,
    #[strum(to_string = "Restore a snapshot")]
    Restore,
    #[strum(to_string = "Delete a snapshot")]
    Delete,
    #[strum(to_string = "Back")]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
enum RttItem {
    #[strum(to_string = "Measure it (ping)")]
    Measure,
    #[strum(to_string = "Typical value for a region")]
    Region,
    #[strum(to_string = "Enter it myself")]
    Manual,
}

fn choose<T: Copy + ToString>(prompt: &str, items: &[T]) -> Result<T> {
    let i = Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()?;
    Ok(items[i])
}

/// Prompts until `parse` accepts the answer
fn ask<T>(prompt: &str, parse: impl Fn(&str) -> Result<T, InputError>) -> Result<T> {
    loop {
        let answer: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        match parse(&answer) {
            Ok(v) => return Ok(v),
            Err(e) => eprintln!("{WARNING}{e}{WARNING:#}"),
        }
    }
}

/// Runs the interactive menu until the user quits
pub(crate) fn run(session: &Session) -> Result<()> {
    let items: Vec<_> = MainItem::iter().collect();
    loop {
        let item = choose("nettune", &items)?;
        let result = match item {
            MainItem::Diagnose => diagnose(session),
            MainItem::Interfaces => {
                session.list_interfaces();
                Ok(())
            }
            MainItem::Bdp => bdp(session),
            MainItem::Iperf => iperf(session),
            MainItem::Snapshots => snapshots(session),
            MainItem::Tune => tune(session),
            MainItem::Reset => session.reset().map(|_| ()),
            MainItem::Explain => {
                session.explain();
                Ok(())
            }
            MainItem::Quit => return Ok(()),
        };
        // A failed action returns to the menu
        if let Err(e) = result {
            if e.is::<dialoguer::Error>() {
                return Err(e);
            }
            error!("{e:#}");
        }
    }
}

/// Menu entries for the interfaces, and the position of the default one
fn interface_items(interfaces: &[Interface], default: Option<&str>) -> (Vec<String>, usize) {
    let items = interfaces
        .iter()
        .map(|i| {
            let mut item = match &i.ipv4 {
                Some(addr) => format!("{} ({addr})", i.name),
                None => i.name.clone(),
            };
            if !i.up {
                item.push_str(" [down]");
            }
            if default == Some(i.name.as_str()) {
                item.push_str(" [default]");
            }
            item
        })
        .collect();
    let position = interfaces
        .iter()
        .position(|i| default == Some(i.name.as_str()))
        .unwrap_or(0);
    (items, position)
}

fn diagnose(session: &Session) -> Result<()> {
    let (interfaces, default) = session.interfaces();
    if interfaces.is_empty() {
        session.diagnose(None);
        return Ok(());
    }
    let (items, position) = interface_items(&interfaces, default.as_deref());
    let i = Select::new()
        .with_prompt("Interface to diagnose")
        .items(&items)
        .default(position)
        .interact()?;
    session.diagnose(Some(&interfaces[i].name));
    Ok(())
}

fn iperf(session: &Session) -> Result<()> {
    let server: String = Input::new()
        .with_prompt("iperf3 server")
        .default(session.config().iperf_server.clone())
        .interact_text()?;
    let _ = session.iperf(Some(server.trim()));
    Ok(())
}

fn bdp(session: &Session) -> Result<()> {
    let sources: Vec<_> = RttItem::iter().collect();
    let rtt = match choose("Round-trip time", &sources)? {
        RttItem::Measure => {
            let target: String = Input::new()
                .with_prompt("Host to measure")
                .default(session.config().probe_target.clone())
                .interact_text()?;
            session.probe_rtt(Some(target.trim()))
        }
        RttItem::Region => {
            let regions: Vec<_> = Region::iter().collect();
            let names: Vec<_> = regions.iter().map(|r| r.describe()).collect();
            let i = Select::new()
                .with_prompt("Region")
                .items(&names)
                .default(0)
                .interact()?;
            RttMeasurement::region(regions[i])
        }
        RttItem::Manual => RttMeasurement::given(ask("RTT in ms", parse_rtt)?),
    };
    let default_bandwidth = session.config().bandwidth_gbps;
    let bandwidth = ask(
        &format!("Bandwidth in Gbps (blank for {default_bandwidth})"),
        |s| {
            if s.trim().is_empty() {
                Ok(default_bandwidth)
            } else {
                parse_bandwidth(s)
            }
        },
    )?;
    session.bdp(&rtt, bandwidth);
    Ok(())
}

fn snapshots(session: &Session) -> Result<()> {
    let items: Vec<_> = SnapshotItem::iter().collect();
    loop {
        let item = choose("Snapshots", &items)?;
        if item == SnapshotItem::Back {
            return Ok(());
        }
        if item == SnapshotItem::Save {
            let label: String = Input::new()
                .with_prompt("Label (optional)")
                .allow_empty(true)
                .interact_text()?;
            let label = label.trim();
            session.snapshot_save((!label.is_empty()).then_some(label))?;
            continue;
        }

        let ids = session.store().list()?;
        if ids.is_empty() {
            crate::message::Message::NoSnapshots.show();
            continue;
        }
        let i = Select::new()
            .with_prompt("Which snapshot?")
            .items(&ids)
            .default(0)
            .interact()?;
        let id = &ids[i];
        match item {
            SnapshotItem::Show => session.snapshot_show(id)?,
            SnapshotItem::Restore => {
                session.snapshot_show(id)?;
                let _ = session.snapshot_restore(id)?;
            }
            SnapshotItem::Delete => {
                let _ = session.snapshot_delete(id)?;
            }
            SnapshotItem::Save | SnapshotItem::Back => (),
        }
    }
}

fn tune(session: &Session) -> Result<()> {
    let presets: Vec<_> = Preset::iter().collect();
    let names: Vec<_> = presets
        .iter()
        .map(|p| match p {
            Preset::Esnet => "ESnet fasterdata recommendation (32 MiB)",
            Preset::Memory => "Based on this host's memory",
        })
        .collect();
    let i = Select::new()
        .with_prompt("Maximum buffer size")
        .items(&names)
        .default(0)
        .interact()?;
    let _ = session.tune(presets[i])?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::interface_items;
    use crate::os::Interface;

    fn iface(name: &str, ipv4: Option<&str>, up: bool) -> Interface {
        Interface {
            name: name.into(),
            ipv4: ipv4.map(Into::into),
            up,
        }
    }

    #[test]
    fn default_interface_is_marked_and_preselected() {
        let list = [
            iface("lo", Some("127.0.0.1"), true),
            iface("eth0", Some("192.0.2.10"), true),
            iface("eth1", None, false),
        ];
        let (items, position) = interface_items(&list, Some("eth0"));
        assert_eq!(position, 1);
        assert_eq!(
            items,
            [
                "lo (127.0.0.1)",
                "eth0 (192.0.2.10) [default]",
                "eth1 [down]",
            ]
        );
    }

    #[test]
    fn unknown_default_selects_first() {
        let list = [iface("en0", None, true)];
        let (items, position) = interface_items(&list, Some("utun3"));
        assert_eq!(position, 0);
        assert_eq!(items, ["en0"]);
        assert_eq!(interface_items(&list, None).1, 0);
    }
}
