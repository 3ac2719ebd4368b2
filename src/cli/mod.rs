use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, ConfigPaths};
use crate::remote::{HttpRemote, RemoteStore};
use crate::session::SessionStore;

pub mod commands;

use self::commands::{
    DeleteArgs, EditArgs, ListArgs, LoginArgs, MoveArgs, NewArgs, NoteRef, RegisterArgs, Workspace,
};

#[derive(Parser, Debug)]
#[command(
    name = "notedeck",
    version,
    about = "Keyboard-first terminal client for your notes service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTEDECK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTEDECK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Sign in and remember the session
    Login(LoginArgs),
    /// Create an account
    Register(RegisterArgs),
    /// Forget the stored session
    Logout,
    /// Print notes grouped into Pinned, Notes and Archived
    List(ListArgs),
    /// Print a single note
    Show(NoteRef),
    /// Create a new note
    New(NewArgs),
    /// Change an existing note
    Edit(EditArgs),
    /// Delete a note (asks first)
    Delete(DeleteArgs),
    /// Toggle a note's pinned flag
    Pin(NoteRef),
    /// Toggle a note's archived flag
    Archive(NoteRef),
    /// Move a note within the Notes section
    Move(MoveArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let paths = ConfigPaths::resolve(cli.config.clone(), cli.data_dir.clone())?;
    let loader = ConfigLoader::with_paths(paths.clone());
    let config = Arc::new(loader.load_or_init()?);

    let session = SessionStore::open(paths.session_file.clone())
        .context("opening session store")?
        .into_handle();
    let http = HttpRemote::new(&config.remote, session.clone())?;
    tracing::debug!(base_url = http.base_url(), "remote configured");
    let remote: Arc<dyn RemoteStore> = Arc::new(http);
    let ws = Workspace {
        config,
        session,
        remote,
    };

    let command = cli.command.unwrap_or(Commands::Tui);
    let output = match command {
        Commands::Tui => {
            let mut app = App::new(ws)?;
            return commands::run_tui(&mut app);
        }
        Commands::Login(args) => commands::login(&ws, args)?,
        Commands::Register(args) => commands::register(&ws, args)?,
        Commands::Logout => commands::logout(&ws)?,
        Commands::List(args) => commands::list(&ws, args)?,
        Commands::Show(args) => commands::show(&ws, args)?,
        Commands::New(args) => commands::new_note(&ws, args)?,
        Commands::Edit(args) => commands::edit_note(&ws, args)?,
        Commands::Delete(args) => {
            commands::delete_note(&ws, args, commands::confirm_delete_prompt)?
        }
        Commands::Pin(args) => commands::toggle_pin(&ws, args)?,
        Commands::Archive(args) => commands::toggle_archive(&ws, args)?,
        Commands::Move(args) => commands::move_note(&ws, args)?,
    };
    if output.ends_with('\n') {
        print!("{output}");
    } else {
        println!("{output}");
    }
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err))
    })
    .map(|_| ())
}
