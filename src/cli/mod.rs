/// Command Line Interface for nettune
/// (c) 2024 NetTune contributors
mod args;
mod cli_main;
mod menu;
mod session;
pub use cli_main::cli;
