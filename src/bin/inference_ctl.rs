//! inference_ctl - Query a device or start/stop its inference upload.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aitrios_monitor::session::control::{self, ControlOutcome};
use aitrios_monitor::{AitriosClient, DeviceService, MonitorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Control inference on an AITRIOS device")]
struct Args {
    /// JSON or TOML config file; environment variables override its values.
    #[arg(long, env = "AITRIOS_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print connection and operation state.
    Status,
    /// Start inference (device must be connected and idle).
    Start,
    /// Stop inference (device must be connected and busy).
    Stop,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load()?,
    };
    let client = AitriosClient::from_config(&config)?;

    let outcome = match args.command {
        Command::Status => {
            let (connection, operation) = client.device_state()?;
            println!("{} {} {}", client.device_id(), connection, operation);
            return Ok(());
        }
        Command::Start => control::start_inference(&client)?,
        Command::Stop => control::stop_inference(&client)?,
    };

    println!("{}", outcome);
    match outcome {
        ControlOutcome::Done(_) => Ok(()),
        other => Err(anyhow!("command not applied: {}", other)),
    }
}
