use clap::{Parser, ValueEnum};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use terminus::{
    halt, topics, Completion, Dispatcher, Event, Exception, Installed, Mediator, Raised,
};

/// Demo program body to run under the termination handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Return normally.
    Clean,
    /// Panic out of the body.
    Panic,
    /// Stop purposefully from the body.
    Halt,
    /// Panic; the exception listener renders a response and halts.
    ListenerHalt,
    /// Panic; the exception listener itself fails.
    ListenerFail,
    /// Send SIGTERM to ourselves and wind down.
    Signal,
}

/// Runs a small program under the termination handler so each way a process
/// can end (clean exit, panic, purposeful halt, fatal signal) can be observed.
#[derive(Parser, Debug)]
#[command(name = "terminus", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "terminus.toml")]
    config: PathBuf,

    /// Program body to run
    #[arg(short, long, value_enum, default_value_t = Scenario::Clean)]
    scenario: Scenario,

    /// Emit fallback diagnostics (overrides config)
    #[arg(long, conflicts_with = "quiet")]
    debug: bool,

    /// Suppress fallback diagnostics (overrides config)
    #[arg(short, long)]
    quiet: bool,

    /// Run without a mediator, forcing the fallback path
    #[arg(long)]
    no_listeners: bool,
}

fn build_mediator(scenario: Scenario) -> Dispatcher {
    let dispatcher = Dispatcher::new();

    dispatcher.push(topics::EXCEPTION, move |event| {
        if let Event::Exception { fault, fatal } = event {
            println!("exception listener: {fault} (fatal: {fatal})");
        }
        match scenario {
            Scenario::ListenerHalt => {
                println!("exception listener: error page rendered, halting");
                Err(Raised::Halt)
            }
            Scenario::ListenerFail => {
                Err(Exception::new("ListenerError", "renderer unavailable").into())
            }
            _ => Ok(()),
        }
    });
    dispatcher.push(topics::SHUTDOWN, |_| {
        println!("shutdown listener: goodbye");
        Ok(())
    });

    dispatcher
}

fn run_scenario(scenario: Scenario) {
    match scenario {
        Scenario::Clean => println!("working... done"),
        Scenario::Panic | Scenario::ListenerHalt | Scenario::ListenerFail => {
            panic!("demo panic in program body")
        }
        Scenario::Halt => {
            println!("halting purposefully");
            halt()
        }
        Scenario::Signal => {
            if let Err(e) = signal::kill(Pid::this(), Signal::SIGTERM) {
                tracing::warn!(error = %e, "failed to send SIGTERM to self");
                return;
            }
            while terminus::signals::pending().is_none() {
                std::thread::sleep(Duration::from_millis(10));
            }
            println!("signal received, winding down");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match terminus::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };
    if cli.debug {
        config.debug = true;
    }
    if cli.quiet {
        config.debug = false;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(?cli, "parsed CLI arguments");

    let mediator: Option<Arc<dyn Mediator>> = if cli.no_listeners {
        None
    } else {
        Some(Arc::new(build_mediator(cli.scenario)))
    };

    let Installed {
        registration,
        signals,
    } = match terminus::install(&config, mediator) {
        Ok(installed) => installed,
        Err(e) => {
            tracing::error!(error = %e, "failed to install termination handler");
            return ExitCode::from(2);
        }
    };

    let completion = registration.run(|| run_scenario(cli.scenario));
    let received = terminus::signals::pending();
    signals.restore();

    match (completion, received) {
        (_, Some(sig)) => ExitCode::from(128u8.saturating_add(sig as u8)),
        (Completion::Returned(()) | Completion::Halted, None) => ExitCode::SUCCESS,
        (Completion::Faulted, None) => ExitCode::FAILURE,
    }
}
