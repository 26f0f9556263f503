// Main CLI entrypoint
// (c) 2024 NetTune contributors

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use super::{
    args::{CliArgs, Command, SnapshotCommand},
    menu,
    session::Session,
};
use crate::bdp::RttMeasurement;
use crate::config::{Configuration, Manager};
use crate::util::setup_tracing;

/// Main CLI entrypoint
pub fn cli() -> Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        for f in Manager::config_files() {
            println!("{f}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let trace_level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else if args.is_interactive() {
        // keep the log out of the way of the prompts
        "warn"
    } else {
        "info"
    };
    setup_tracing(trace_level, args.log_file.as_deref()).inspect_err(|e| eprintln!("{e:?}"))?;

    let mut manager = Manager::new();
    if let Some(f) = &args.config_file {
        manager.merge_toml_file(f);
    }
    manager.merge_provider(args.all_overrides());
    if args.show_config {
        println!("{manager}");
        return Ok(ExitCode::SUCCESS);
    }
    let config = manager
        .get::<Configuration>()
        .inspect_err(|e| tracing::error!("{e}"))?;
    config.validate().inspect_err(|e| tracing::error!("{e}"))?;

    let session = Session::new(config, args.yes)?;
    run(&args, &session)
        .inspect_err(|e| tracing::error!("{e:#}"))
        .or_else(|_| Ok(false))
        .map(|success| {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        })
}

/// Dispatches a command. Returns whether it fully succeeded.
fn run(args: &CliArgs, session: &Session) -> Result<bool> {
    let Some(command) = &args.command else {
        menu::run(session)?;
        return Ok(true);
    };
    match command {
        Command::Menu => menu::run(session)?,
        Command::Diagnose { list: true, .. } => session.list_interfaces(),
        Command::Diagnose { interface, .. } => session.diagnose(interface.as_deref()),
        Command::Bdp(bdp) => {
            let rtt = if let Some(region) = bdp.region {
                RttMeasurement::region(region)
            } else if let Some(rtt) = bdp.rtt {
                RttMeasurement::given(rtt)
            } else {
                // the target, if given, has been merged into the configuration
                session.probe_rtt(None)
            };
            session.bdp(&rtt, session.config().bandwidth_gbps);
        }
        Command::Guideline { memory } => session.guideline(*memory)?,
        Command::Snapshot { action } => return snapshot(action, session),
        Command::Tune { preset } => return session.tune(*preset),
        Command::Reset => return session.reset(),
        // the server, if given, has been merged into the configuration
        Command::Iperf { .. } => return Ok(session.iperf(None)),
        Command::Explain => session.explain(),
    }
    Ok(true)
}

fn snapshot(action: &SnapshotCommand, session: &Session) -> Result<bool> {
    match action {
        SnapshotCommand::Save { label } => session.snapshot_save(label.as_deref())?,
        SnapshotCommand::List => {
            let _ = session.snapshot_list()?;
        }
        SnapshotCommand::Show { id } => session.snapshot_show(id)?,
        SnapshotCommand::Restore { id } => return session.snapshot_restore(id),
        SnapshotCommand::Delete { id } => return session.snapshot_delete(id),
    }
    Ok(true)
}
