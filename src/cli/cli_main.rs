// Main CLI entrypoints
// (c) 2024 Ross Younger

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use figment::providers::Serialized;
use indicatif::MultiProgress;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, error_span, info, Instrument as _};

use super::args::{ClientArgs, CommonArgs, ServerArgs};
use crate::{
    client::client_main,
    config::{Configuration, Manager},
    os::{AbstractPlatform as _, Platform},
    server::server_main,
    util::setup_tracing,
};

/// Merges the configuration sources in priority order: defaults, system and user files,
/// `--config`, then the command line.
fn build_manager<T: Serialize>(common: &CommonArgs, overrides: T) -> Manager {
    let mut manager = Manager::new();
    if let Some(path) = &common.config {
        manager.merge_toml_file(path);
    }
    manager.merge_provider(Serialized::defaults(overrides));
    manager
}

fn extract_config(manager: &Manager) -> anyhow::Result<Configuration> {
    let config = manager
        .get::<Configuration>()
        .context("failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

/// Handles the options which print something and exit. Returns true if one did.
fn informational(common: &CommonArgs, manager: &Manager) -> anyhow::Result<bool> {
    if common.help_buffers {
        let config = extract_config(manager)?;
        Platform::print_udp_buffer_size_help_message(
            Configuration::recv_buffer(),
            Configuration::send_buffer(),
        );
        // mention the window sizes too, as they're the other half of the tuning story
        println!("Transport configuration: {}", config.format_transport_config());
        return Ok(true);
    }
    if common.show_config {
        println!("Configuration files read: {:?}", Manager::config_files());
        println!("{manager}");
        return Ok(true);
    }
    Ok(false)
}

/// Cancels the token when the user interrupts us
fn cancel_on_interrupt(token: &CancellationToken) {
    let token = token.clone();
    let _ = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted; shutting down");
                token.cancel();
            }
            Err(e) => error!("unable to listen for interrupts: {e}"),
        }
    });
}

/// Results go to stdout whatever the log level
fn results_text(body: &impl std::fmt::Display) -> String {
    let style = super::styles::HEADING;
    format!("{style}Results{style:#}\n{body}")
}

fn report_error(e: &anyhow::Error) {
    let style = super::styles::ERROR;
    anstream::eprintln!("{style}Error:{style:#} {e:#}");
}

/// Main entrypoint for `qbench-client`
pub fn client_cli() -> anyhow::Result<ExitCode> {
    let args = ClientArgs::parse();
    let manager = build_manager(&args.common, &args.overrides);
    match informational(&args.common, &manager) {
        Ok(true) => return Ok(ExitCode::SUCCESS),
        Ok(false) => (),
        Err(e) => {
            report_error(&e);
            return Ok(ExitCode::FAILURE);
        }
    }
    run_client(&args, &manager)
}

#[tokio::main(flavor = "current_thread")]
async fn run_client(args: &ClientArgs, manager: &Manager) -> anyhow::Result<ExitCode> {
    let progress = MultiProgress::new(); // This writes to stderr
    setup_tracing(
        args.common.trace_level(),
        Some(&progress),
        args.common.log_file.as_deref(),
    )
    .inspect_err(report_error)?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);
    let result = async {
        let config = extract_config(manager)?;
        let job = args.job()?;
        client_main(&job, &config, &progress, &cancel, args.common.quiet).await
    }
    .await;

    match result {
        Ok(report) => {
            progress.clear()?;
            anstream::println!("{}", results_text(&report));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Main entrypoint for `qbench-server`
pub fn server_cli() -> anyhow::Result<ExitCode> {
    let args = ServerArgs::parse();
    let mut manager = build_manager(&args.common, &args.overrides);
    if let Some(interval) = args.report_interval {
        manager.merge_provider(Serialized::default("report_interval", interval));
    }
    match informational(&args.common, &manager) {
        Ok(true) => return Ok(ExitCode::SUCCESS),
        Ok(false) => (),
        Err(e) => {
            report_error(&e);
            return Ok(ExitCode::FAILURE);
        }
    }
    run_server(&args, &manager)
}

#[tokio::main]
async fn run_server(args: &ServerArgs, manager: &Manager) -> anyhow::Result<ExitCode> {
    setup_tracing(
        args.common.trace_level(),
        None,
        args.common.log_file.as_deref(),
    )
    .inspect_err(report_error)?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);
    let result = async {
        let config = extract_config(manager)?;
        server_main(&args.job(), &config, cancel).await
    }
    .instrument(error_span!("SERVER"))
    .await;

    match result {
        Ok(totals) => {
            anstream::println!("{}", results_text(&totals));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}
