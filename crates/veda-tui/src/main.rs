mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use anyhow::{bail, Result};
use tracing::{info, warn};
use veda_core::{Config, Session};

use app::App;
use tui::{EventHandler, Tui};

const USAGE: &str = "Usage: veda [--server <url>]";

/// `--server <url>` or `--server=<url>`; anything else is rejected.
fn parse_server_arg(args: impl IntoIterator<Item = String>) -> Result<Option<String>> {
    let mut server = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server" => match args.next() {
                Some(url) => server = Some(url),
                None => bail!("--server needs a value\n{}", USAGE),
            },
            "-h" | "--help" => bail!("{}", USAGE),
            other => match other.strip_prefix("--server=") {
                Some(url) => server = Some(url.to_string()),
                None => bail!("unexpected argument '{}'\n{}", other, USAGE),
            },
        }
    }
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    let server = parse_server_arg(std::env::args().skip(1))?;

    let log_path = logging::init()?;

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "config unreadable, using defaults");
        Config::new()
    });
    if let Some(url) = server {
        config.override_server_url(&url);
    }
    info!(log = %log_path.display(), server = %config.server_url, "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &config).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, config: &Config) -> Result<()> {
    let mut session = Session::new(config);
    let mut app = App::new(&config.server_url);
    let mut events = EventHandler::new();

    app.start_health_check();
    session.start();

    loop {
        app.sync(&session);
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        tokio::select! {
            Some(event) = events.next() => {
                handler::handle_event(&mut app, &mut session, event).await?;
            }
            Some(event) = session.next_event() => session.handle(event),
            else => break,
        }

        if app.should_quit {
            break;
        }
    }

    session.shutdown();
    info!("exiting");
    Ok(())
}
