//! Native host for the bridge: command line, configuration and the built-in
//! services it serves over stdio.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;
