//! netbackup - main entry point

use anyhow::Context;
use clap::Parser;
use netbackup::cli::{format_schedule_list, format_server_list, Args, Command};
use netbackup::config::{Config, RunOptions};
use netbackup::executor::{SessionSettings, TransferSession};
use netbackup::models::ServerRegistry;
use netbackup::remote::SshShell;
use netbackup::services::{NetworkProbe, ScheduleRegistry, ServerResolver, WakeOrchestrator};
use netbackup::tools::{Crontab, Gpg, Rsync, WakeTool};
use netbackup::transfer::progress::format_bytes;
use netbackup::utils;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not errors
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let options = args.run_options(&config);
    if let Err(e) = utils::logger::init(utils::logger::level_for(options.debug), options.use_colors) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args, config, options)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config, options: RunOptions) -> anyhow::Result<()> {
    let registry = ServerRegistry::from_config(&config)?;

    tracing::debug!(
        "Starting netbackup v{} ({} servers configured)",
        env!("CARGO_PKG_VERSION"),
        registry.len()
    );

    match args.into_command(&config, &options)? {
        Command::ListServers => {
            print!("{}", format_server_list(&registry));
        }
        Command::ListSchedules => {
            let schedules = schedule_registry()?;
            print!("{}", format_schedule_list(&schedules.list().await?));
        }
        Command::RemoveSchedule(job_id) => {
            schedule_registry()?.remove(job_id).await?;
            println!("Removed scheduled backup {job_id}");
        }
        Command::Schedule {
            source,
            cron,
            options: flags,
        } => {
            let job_id = schedule_registry()?.add(&source, &cron, &flags).await?;
            println!("Scheduled backup {job_id}: '{cron}' {source}");
        }
        Command::Transfer { request, spec } => {
            let shell = SshShell::from_config(&config);

            let waker = WakeOrchestrator::new(WakeTool::detect(), config.boot_wait())
                .with_progress(options.show_progress, options.progress_width);
            let probe = NetworkProbe::new(shell.clone(), config.ping_timeout(), config.ssh_timeout());
            let resolver = ServerResolver::new(&registry, probe, waker);
            let endpoint = resolver.resolve(&request).await?;

            let rsync = Rsync::new(&shell, config.ssh_timeout());
            let settings = SessionSettings::from_config(&config, options.show_progress);
            let session = TransferSession::new(&shell, &rsync, &Gpg, settings);
            let report = session.run(&endpoint, &spec).await?;

            for warning in &report.warnings {
                tracing::warn!("{}", warning);
            }
            tracing::info!(
                "{} {} -> {} ({})",
                report.strategy,
                report.source,
                report.destination,
                format_bytes(report.size_bytes)
            );
        }
    }

    Ok(())
}

fn schedule_registry() -> anyhow::Result<ScheduleRegistry<Crontab>> {
    let program = std::env::current_exe().context("Cannot locate the netbackup executable")?;
    Ok(ScheduleRegistry::new(Crontab, program))
}
