use anyhow::Result;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod api;
mod app;
mod config;
mod handler;
mod session;
mod stream;
mod tui;
mod ui;

use api::ApiClient;
use app::{App, NetEvent};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load().unwrap_or_default();
    let api = ApiClient::new(&config.api_url());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let (mut app, mut net_rx) = App::new(api, &config);
    app.fetch_organizations();

    let mut events = tui::EventHandler::new();
    let result = run(&mut terminal, &mut app, &mut events, &mut net_rx).await;

    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
    net_rx: &mut mpsc::UnboundedReceiver<NetEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event)?,
            Some(event) = net_rx.recv() => app.apply_net_event(event),
            else => break,
        }
    }
    Ok(())
}

/// The TUI owns stderr, so logs go to a file under the cache dir.
/// Filter with `RAGDESK_LOG`, e.g. `RAGDESK_LOG=ragdesk=debug`.
fn init_logging() {
    let Some(cache_dir) = dirs::cache_dir() else {
        return;
    };
    let dir = cache_dir.join("ragdesk");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }

    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("ragdesk.log"))
    else {
        return;
    };

    let filter = EnvFilter::try_from_env("RAGDESK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
}
