use std::{path::PathBuf, sync::Arc};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use snafu::prelude::*;
use tempo_controls::{
    Coordinator, Player,
    database::{Configuration, Database},
    engine::SimulatedEngine,
    library::MemoryLibrary,
    persistence::{self, Store},
    queue_view::QueueView,
    session::{SecondaryActionMode, SessionMirror, SessionSink},
};
use tokio::runtime::Handle;
use tracing::info;

use crate::{
    repl,
    session::{FileArtwork, LogSink},
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long)]
    /// Log level
    verbosity: Option<tracing::Level>,

    #[clap(short, long, env = "TEMPO_LIBRARY")]
    /// JSON listing of the music library.
    library: Option<PathBuf>,

    #[cfg(target_os = "linux")]
    #[clap(long, default_value_t = false)]
    /// Disable the mpris interface.
    disable_mpris: bool,

    #[clap(long)]
    /// Milliseconds into an item after which previous restarts it. (overrides any database value)
    rewind_threshold_ms: Option<u64>,

    #[clap(long)]
    /// Shuffle new playback unless asked otherwise. (overrides any database value)
    shuffle_by_default: Option<bool>,

    #[clap(long, value_enum)]
    /// Extra action offered by the media session. (overrides any database value)
    secondary_action: Option<SecondaryAction>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the player
    Open,
    /// Set configuration options
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set the previous-track threshold.
    RewindThreshold { milliseconds: u64 },
    /// Shuffle new playback by default.
    ShuffleByDefault {
        #[clap(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Set the secondary session action.
    SecondaryAction {
        #[clap(value_enum)]
        action: SecondaryAction,
    },
    /// Print the stored configuration.
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecondaryAction {
    Shuffle,
    Repeat,
}

impl From<SecondaryAction> for SecondaryActionMode {
    fn from(value: SecondaryAction) -> Self {
        match value {
            SecondaryAction::Shuffle => SecondaryActionMode::Shuffle,
            SecondaryAction::Repeat => SecondaryActionMode::Repeat,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{error}"))]
    PlayerError { error: String },
    #[snafu(display("Unable to read library {}: {error}", path.display()))]
    LibraryError { path: PathBuf, error: String },
    #[snafu(display("{error}"))]
    TerminalError { error: String },
}

impl From<tempo_controls::Error> for Error {
    fn from(error: tempo_controls::Error) -> Self {
        Error::PlayerError {
            error: error.to_string(),
        }
    }
}

pub async fn load_library(path: Option<&PathBuf>) -> Result<MemoryLibrary, Error> {
    let Some(path) = path else {
        return Ok(MemoryLibrary::default());
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|error| Error::LibraryError {
            path: path.clone(),
            error: error.to_string(),
        })?;

    MemoryLibrary::from_json(&bytes).map_err(|error| Error::LibraryError {
        path: path.clone(),
        error: error.to_string(),
    })
}

pub async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_target(false)
        .compact()
        .init();

    let database = Arc::new(Database::new().await?);

    match cli.command {
        Commands::Open => {
            let stored = database.get_configuration().await?;
            let configuration = Configuration {
                rewind_threshold_ms: cli
                    .rewind_threshold_ms
                    .unwrap_or(stored.rewind_threshold_ms),
                shuffle_by_default: cli.shuffle_by_default.unwrap_or(stored.shuffle_by_default),
                secondary_action: cli
                    .secondary_action
                    .map(Into::into)
                    .unwrap_or(stored.secondary_action),
            };

            let library = Arc::new(load_library(cli.library.as_ref()).await?);
            info!(items = library.items().len(), "library loaded");

            let mut player = Player::new(
                Box::new(SimulatedEngine::new()),
                configuration.player_settings(),
            );

            #[cfg(target_os = "linux")]
            let mpris = if cli.disable_mpris {
                None
            } else {
                Some(tempo_mpris::MprisSink::new())
            };
            #[cfg(not(target_os = "linux"))]
            let mpris: Option<(tempo_mpris::MprisSink, tempo_mpris::SessionReceiver)> = None;

            let (sink, session_receiver) = match mpris {
                Some((sink, receiver)) => (Arc::new(sink) as Arc<dyn SessionSink>, Some(receiver)),
                None => (Arc::new(LogSink) as Arc<dyn SessionSink>, None),
            };

            let mirror = SessionMirror::new(
                Handle::current(),
                Arc::new(FileArtwork),
                sink,
                configuration.session_settings(),
            );
            player.listeners().add(Arc::new(mirror));

            if let Some(restored) = persistence::load(database.as_ref(), library.as_ref()).await {
                player.restore(restored);
            }

            let (coordinator, controls) = Coordinator::new(player);

            let queue_view = Arc::new(QueueView::with_queue(
                controls.clone(),
                &coordinator.player().queue().snapshot(),
            ));
            coordinator.player().listeners().add(queue_view.clone());

            if let Some(session_receiver) = session_receiver {
                let controls = controls.clone();
                let state_receiver = coordinator.state_receiver();
                tokio::spawn(async move {
                    if let Err(error) =
                        tempo_mpris::init(controls, session_receiver, state_receiver).await
                    {
                        tracing::warn!(%error, "mpris stopped");
                    }
                });
            }

            let store: Arc<dyn Store> = database.clone();
            let snapshot_receiver = coordinator.snapshot_receiver();
            let store_handle = tokio::spawn(persistence::store_state_loop(store, snapshot_receiver));

            let queue_receiver = coordinator.queue_receiver();
            let state_receiver = coordinator.state_receiver();
            let library_path = cli.library.clone();
            tokio::spawn(repl::run(
                controls,
                queue_view,
                library,
                library_path,
                queue_receiver,
                state_receiver,
            ));

            coordinator.run().await?;

            store_handle.await.map_err(|error| Error::TerminalError {
                error: error.to_string(),
            })?;
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::RewindThreshold { milliseconds } => {
                database.set_rewind_threshold(milliseconds).await?;

                println!("Rewind threshold saved.");
                Ok(())
            }
            ConfigCommands::ShuffleByDefault { enabled } => {
                database.set_shuffle_by_default(enabled).await?;

                println!("Shuffle default saved.");
                Ok(())
            }
            ConfigCommands::SecondaryAction { action } => {
                database.set_secondary_action(action.into()).await?;

                println!("Secondary action saved.");
                Ok(())
            }
            ConfigCommands::Show => {
                let configuration = database.get_configuration().await?;

                println!("rewind threshold: {} ms", configuration.rewind_threshold_ms);
                println!("shuffle by default: {}", configuration.shuffle_by_default);
                println!(
                    "secondary action: {}",
                    configuration.secondary_action.as_str()
                );
                Ok(())
            }
        },
    }
}
