mod action;
mod app;
mod auth;
mod config;
mod error;
mod event;
mod list_view;
mod rest;
mod router;
mod source;
mod tui;
mod types;
mod ui;

use std::fs::File;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::App;
use crate::config::Config;
use crate::error::GerritError;
use crate::event::Event;
use crate::rest::{FetchCache, GerritClient};
use crate::router::Route;
use crate::source::ListSource;
use crate::tui::{Events, Screen};

/// Browse a Gerrit server's repositories, groups, plugins and documentation.
#[derive(Debug, Parser)]
#[command(name = "gerrit-lists", version, about)]
struct Cli {
    /// List to open, e.g. `/admin/groups` or `/admin/repos/q/filter:plugins,25`
    #[arg(default_value = "/admin/repos")]
    path: String,

    /// Configured server to connect to
    #[arg(short, long)]
    server: Option<String>,

    /// Config file (default: <config dir>/gerrit-lists/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rows per page, overriding the config file
    #[arg(short = 'n', long)]
    items_per_page: Option<u32>,

    /// Write logs here instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let mut config = Config::load(cli.config.as_deref());
    if let Some(n) = cli.items_per_page.filter(|n| *n > 0) {
        config.general.items_per_page = n;
    }

    let route = Route::parse(&cli.path)
        .ok_or_else(|| GerritError::Config(format!("not a list path: {}", cli.path)))?;

    let server = config
        .select_server(cli.server.as_deref())
        .cloned()
        .ok_or_else(|| {
            GerritError::Config(format!(
                "unknown server '{}'",
                cli.server.as_deref().unwrap_or_default()
            ))
        })?;
    tracing::info!(server = %server.name, url = %server.url, "connecting");
    let client = GerritClient::connect(&server, Arc::new(FetchCache::new()))?;

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    run(Arc::new(client), config, route).await
}

async fn run(
    source: Arc<dyn ListSource>,
    config: Config,
    route: Route,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut screen = Screen::enter()?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let mut app = App::new(
        source,
        config.servers,
        &config.general,
        route,
        action_tx.clone(),
    );

    let tick_rate = Duration::from_millis(250);
    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = Events::spawn(tick_rate, render_rate);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_quit() {
                    break;
                }

                match event {
                    Event::Render | Event::Resize => {
                        screen.terminal().draw(|frame| ui::render(frame, &app))?;
                    }
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
