// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, path::PathBuf};

use clap::{crate_version, Parser, Subcommand};
use synthrecord::{
    capture, config, midi,
    playsync::CancelHandle,
    recorder::Outcome,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Records per-note samples from MIDI instruments."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays every configured note and records each one to its own file.
    Record {
        /// The path to the recorder configuration.
        config: PathBuf,
        /// Start without asking for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Shows what a recording would do without touching any devices.
    Plan {
        /// The path to the recorder configuration.
        config: PathBuf,
    },
    /// Lists the available audio input devices.
    Devices {},
    /// Lists the available MIDI output devices.
    MidiDevices {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record { config, yes } => {
            let cancel_handle = CancelHandle::new();
            let mut recorder = config::init_recorder(&config, yes, cancel_handle.clone())?;

            // Ctrl-C is left alone until the operator confirms, so it still ends the prompt.
            let (mut recorder, confirmed) = tokio::task::spawn_blocking(move || {
                let confirmed = recorder.prepare();
                (recorder, confirmed)
            })
            .await?;
            if !confirmed? {
                println!("Recording cancelled.");
                return Ok(());
            }

            let record = tokio::task::spawn_blocking(move || recorder.record());
            tokio::pin!(record);

            let result = tokio::select! {
                result = &mut record => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, stopping the recording.");
                    cancel_handle.cancel();
                    record.await
                }
            }?;

            match result? {
                Outcome::Exported {
                    frames,
                    clips,
                    files,
                    ..
                } => {
                    println!(
                        "Recorded {} frames, {} clips, {} files written.",
                        frames, clips, files
                    );
                }
                Outcome::Cancelled { frames } => {
                    println!("Recording cancelled after {} frames.", frames);
                }
            }
        }
        Commands::Plan { config } => {
            let planner = config::init_planner(&config)?;
            let plan = planner.plan()?;
            print!("{}", serde_yml::to_string(&plan)?);
        }
        Commands::Devices {} => {
            let devices = capture::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
    }

    info!("Done.");
    Ok(())
}
