mod console;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keylight_domain::{OperatingMode, Settings};
use keylight_strip::{KeyLayout, MemorySurface, SharedSurface};
use keylight_tutor::{
    ControlCommand, ControlState, Controller, CsvProgressLog, InputDispatcher, MidiManager, ProgressLog, SessionSlot,
    SongLibrary, Synchronizer, DEFAULT_HISTORY_LEN,
};

use crate::console::{ConsoleLine, HELP};

#[derive(Parser, Debug)]
#[command(author, version, about = "Light the keys of a MIDI keyboard and tutor songs note by note")]
struct Cli {
    /// Directory holding the `.mid` song library
    #[arg(long, default_value = "midis")]
    songs: PathBuf,
    /// Directory receiving per-profile progress logs
    #[arg(long, default_value = "progress")]
    progress: PathBuf,
    /// Live input port, by index or name
    #[arg(long)]
    input: Option<String>,
    /// Port that receives forwarded guide notes, by index or name
    #[arg(long)]
    output: Option<String>,
    /// Print the available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
    /// Start tutoring this song right away
    #[arg(long)]
    song: Option<String>,
    #[arg(long, default_value_t = 144)]
    led_count: usize,
    /// Key code lit by the first pixel pair
    #[arg(long, default_value_t = 24)]
    key_offset: u8,
    /// Settings file; defaults to the user configuration directory
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.list_ports {
        return print_ports();
    }

    let settings_path = match cli.settings.clone() {
        Some(path) => path,
        None => default_settings_path().context("no configuration directory, pass --settings")?,
    };
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("load settings from {settings_path:?}"))?;
    info!(path = ?settings_path, "settings loaded");

    let layout = KeyLayout {
        key_offset: cli.key_offset,
        led_count: cli.led_count,
    };
    let surface = SharedSurface::new(MemorySurface::new(cli.led_count), layout);
    surface.set_brightness(settings.brightness)?;
    surface.fill(settings.palette.base)?;

    let state = Arc::new(ControlState::new(settings));
    let session = Arc::new(SessionSlot::new());
    let library = Arc::new(SongLibrary::new(&cli.songs));
    let progress = Arc::new(CsvProgressLog::new(&cli.progress));

    let mut synchronizer = Synchronizer::new(
        Arc::clone(&state),
        Arc::clone(&session),
        surface.clone(),
        library.clone(),
        progress.clone(),
    );
    if let Some(selector) = &cli.output {
        synchronizer = synchronizer.with_output(Box::new(MidiManager::open_output(selector)?));
    }

    let runtime = Runtime::new()?;
    let sync_task = runtime.spawn(async move {
        if let Err(err) = synchronizer.run().await {
            error!(?err, "synchronizer stopped");
        }
    });

    // The connection delivers input only while it is alive.
    let _input = match &cli.input {
        Some(selector) => {
            let (connection, events) = MidiManager::open_input(selector)?;
            let dispatcher = InputDispatcher::new(Arc::clone(&state), Arc::clone(&session), surface.clone());
            thread::Builder::new()
                .name("keylight-input".into())
                .spawn(move || {
                    if let Err(err) = dispatcher.run(events) {
                        error!(?err, "input dispatcher stopped");
                    }
                })
                .context("spawn input thread")?;
            Some(connection)
        }
        None => {
            warn!("no --input port given, live input disabled");
            None
        }
    };

    let controller = Controller::new(Arc::clone(&state), surface.clone());
    if let Some(song) = cli.song {
        runtime.block_on(controller.apply(ControlCommand::SelectSong(song)))?;
    }

    println!("{HELP}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read console")?;
        let parsed = match ConsoleLine::parse(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        match parsed {
            ConsoleLine::Blank => {}
            ConsoleLine::Quit => break,
            ConsoleLine::Status => {
                println!("mode: {}", state.mode());
                println!("{}", serde_json::to_string_pretty(&state.status())?);
            }
            ConsoleLine::Songs => match library.list() {
                Ok(songs) if songs.is_empty() => println!("no songs in {:?}", library.dir()),
                Ok(songs) => songs.iter().for_each(|song| println!("{song}")),
                Err(err) => eprintln!("{err:#}"),
            },
            ConsoleLine::History(song) => {
                let settings = state.settings();
                let Some(song) = song.or(settings.song) else {
                    eprintln!("no song selected");
                    continue;
                };
                match progress.recent(settings.profile, &song, DEFAULT_HISTORY_LEN) {
                    Ok(records) if records.is_empty() => println!("no progress for {song}"),
                    Ok(records) => {
                        for record in records {
                            println!("{}  {}%", record.timestamp, record.accuracy);
                        }
                    }
                    Err(err) => eprintln!("{err:#}"),
                }
            }
            ConsoleLine::Set(command) => {
                if let Err(err) = runtime.block_on(controller.apply(command)) {
                    eprintln!("{err:#}");
                }
            }
        }
    }

    state.set_mode(OperatingMode::FreePlay);
    state
        .settings()
        .save(&settings_path)
        .with_context(|| format!("save settings to {settings_path:?}"))?;
    info!(path = ?settings_path, "settings saved");
    sync_task.abort();
    Ok(())
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keylight").join("settings.json"))
}

fn print_ports() -> Result<()> {
    println!("inputs:");
    for device in MidiManager::list_inputs()? {
        println!("  {}: {}", device.index, device.name);
    }
    println!("outputs:");
    for device in MidiManager::list_outputs()? {
        println!("  {}: {}", device.index, device.name);
    }
    Ok(())
}
