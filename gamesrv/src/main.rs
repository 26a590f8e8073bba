use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use clap::{ArgGroup, Parser};
use colored::Colorize;
use gamesrv::{
    ctx::{ALL, AppContext},
    manager::ManagerConfig,
    utils::require_root,
};
use log::LevelFilter;
use signal_hook::{consts::SIGINT, flag};

/// Manage game server services, their configuration and lifecycle.
#[derive(Parser, Debug)]
#[command(version, about)]
#[command(group(ArgGroup::new("action").required(true).multiple(false)))]
struct Cli {
    /// Manager configuration file
    #[arg(long, default_value = "gamesrv.toml")]
    config: PathBuf,

    /// Service to act on, or ALL
    #[arg(long, default_value = ALL)]
    service: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Start the service(s); with ALL only enabled services start
    #[arg(long, group = "action")]
    start: bool,

    /// Warn players, save and stop the service(s)
    #[arg(long, group = "action")]
    stop: bool,

    /// Stop then start running service(s)
    #[arg(long, group = "action")]
    restart: bool,

    /// Warn players and save without stopping (for ExecStop)
    #[arg(long, group = "action")]
    pre_stop: bool,

    /// Wait for the remote console to answer (for ExecStartPost)
    #[arg(long, group = "action")]
    post_start: bool,

    /// Enable the service(s) at boot
    #[arg(long, group = "action")]
    enable: bool,

    /// Disable the service(s) at boot
    #[arg(long, group = "action")]
    disable: bool,

    /// Print recent log lines of the service
    #[arg(long, group = "action")]
    logs: bool,

    /// Print live status every 5 seconds until Ctrl-C
    #[arg(long, group = "action")]
    monitor: bool,

    /// Print status of all services as JSON
    #[arg(long, group = "action")]
    get_services: bool,

    /// Print options as JSON; with --service, that service's launch options
    #[arg(long, group = "action")]
    get_configs: bool,

    /// Set an option value
    #[arg(long, group = "action", num_args = 2, value_names = ["OPTION", "VALUE"])]
    set_config: Option<Vec<String>>,

    /// Print port options as JSON
    #[arg(long, group = "action")]
    get_ports: bool,

    /// Exit 0 when the service(s) are running, 1 otherwise
    #[arg(long, group = "action")]
    is_running: bool,

    /// Exit 0 when players are connected, 1 otherwise
    #[arg(long, group = "action")]
    has_players: bool,

    /// Print the JSON schema of the manager configuration file
    #[arg(long, group = "action")]
    config_schema: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", format!("{e:#}").red());
            ExitCode::FAILURE
        }
    }
}

fn register_interrupt(interrupt: &Arc<AtomicBool>) -> anyhow::Result<()> {
    // a second Ctrl-C terminates immediately
    flag::register_conditional_shutdown(SIGINT, 1, interrupt.clone())?;
    flag::register(SIGINT, interrupt.clone())?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(true)
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    if cli.config_schema {
        println!("{}", ManagerConfig::json_schema()?);
        return Ok(true);
    }

    let mut ctx = AppContext::load(&cli.config)?;
    register_interrupt(&ctx.interrupt_flag())?;
    let target = cli.service.as_str();
    let scoped = (target != ALL).then_some(target);

    if cli.start {
        require_root("starting a service")?;
        ctx.start(target)?;
    } else if cli.stop {
        require_root("stopping a service")?;
        ctx.stop(target)?;
    } else if cli.restart {
        require_root("restarting a service")?;
        ctx.restart(target)?;
    } else if cli.pre_stop {
        return ctx.pre_stop(target);
    } else if cli.post_start {
        return ctx.post_start(target);
    } else if cli.enable {
        require_root("enabling a service")?;
        ctx.enable(target)?;
    } else if cli.disable {
        require_root("disabling a service")?;
        ctx.disable(target)?;
    } else if cli.logs {
        println!("{}", ctx.logs(target)?);
    } else if cli.monitor {
        ctx.monitor(target, Duration::from_secs(5))?;
    } else if cli.get_services {
        return print_json(&ctx.services_status()?);
    } else if cli.get_configs {
        return print_json(&ctx.configs(scoped)?);
    } else if let Some([option, value]) = cli.set_config.as_deref() {
        if ctx.set_option(scoped, option, value)? {
            println!("{}", format!("{option} updated").green());
        }
    } else if cli.get_ports {
        return print_json(&ctx.ports());
    } else if cli.is_running {
        return ctx.is_running(target);
    } else if cli.has_players {
        return ctx.has_players(target);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exactly_one_action() {
        assert!(Cli::try_parse_from(["gamesrv"]).is_err());
        assert!(Cli::try_parse_from(["gamesrv", "--start", "--stop"]).is_err());

        let cli = Cli::try_parse_from(["gamesrv", "--service", "ark-island", "--stop"]).unwrap();
        assert!(cli.stop);
        assert_eq!(cli.service, "ark-island");
        assert_eq!(cli.config, PathBuf::from("gamesrv.toml"));
    }

    #[test]
    fn set_config_takes_two_values() {
        let cli =
            Cli::try_parse_from(["gamesrv", "--set-config", "RCON Port", "27021"]).unwrap();
        assert_eq!(
            cli.set_config.as_deref(),
            Some(&["RCON Port".to_string(), "27021".to_string()][..])
        );
        assert!(Cli::try_parse_from(["gamesrv", "--set-config", "RCON Port"]).is_err());
    }
}
