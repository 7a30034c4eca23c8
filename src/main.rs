//! fleetlaunch CLI

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use fleetlaunch::{
    BringupLayout, Env, Launcher, Outcome, Resolver, Roster, WorldArtifact, assemble,
    Shutdown, declare_arguments, runner,
};

#[derive(Parser)]
#[command(name = "fleetlaunch")]
#[command(about = "Shared simulation with one navigation stack per robot", long_about = None)]
#[command(version)]
struct Cli {
    /// Launch arguments (key:=value)
    #[arg(value_parser = parse_launch_arg)]
    args: Vec<(String, String)>,

    /// JSON roster of robots (default: the two-robot sandbox roster)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Print the declared launch arguments and exit
    #[arg(long)]
    show_args: bool,

    /// Resolve the launch and print the plan as JSON without starting anything
    #[arg(long)]
    print: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn parse_launch_arg(s: &str) -> Result<(String, String), String> {
    fleetlaunch::args::parse_override(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let roster = match &cli.roster {
        Some(path) => Roster::from_json_file(path)
            .with_context(|| format!("Failed to load roster {}", path.display()))?,
        None => Roster::sandbox_pair(),
    };

    let env = Env::from_env()?;
    let layout = BringupLayout::from_env(&env)?;

    if cli.show_args {
        let declared = declare_arguments(&roster, &layout)?;
        println!("Arguments (pass arguments as '<name>:=<value>'):\n");
        for arg in declared.registry.arguments() {
            println!("    '{}':", arg.name);
            if let Some(description) = &arg.description {
                println!("        {}", description);
            }
            println!("        (default: '{}')\n", arg.default_value);
        }
        return Ok(());
    }

    // Handlers go in before the world file exists; an interrupt must not skip its removal.
    let mut shutdown = Shutdown::install().context("Failed to install signal handlers")?;
    let artifact = WorldArtifact::acquire().context("Failed to create world file")?;
    let description = assemble(&roster, &layout, &artifact)?;
    let plan = Resolver::new(cli.args).resolve(&description)?;

    if shutdown.is_received().await {
        log::info!("Interrupted before launch");
        artifact.release();
        return Ok(());
    }

    if cli.print {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    log::info!("Launching {} robots", roster.len());
    let mut launcher = Launcher::new();
    let outcome = runner::execute(&plan, &mut launcher, &mut shutdown).await;
    artifact.release();

    match outcome? {
        Outcome::Interrupted => log::info!("Interrupted, all processes stopped"),
        Outcome::Exited => log::info!("All processes exited"),
    }
    Ok(())
}
