mod api;
mod app;
mod config;
mod debounce;
mod error;
mod filter;
mod form;
mod models;
mod normalizer;
mod parser;
mod store;
#[cfg(test)]
mod testing;
mod ui;
mod validation;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotenv::dotenv;
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::HttpApi;
use crate::app::App;
use crate::config::Config;
use crate::store::Store;
use crate::ui::run_app;

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("momentum=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.log_file)?;
    info!(
        "momentum v{} starting against {}",
        env!("CARGO_PKG_VERSION"),
        config.instance_url
    );

    let api = Arc::new(HttpApi::new(&config.instance_url, &config.api_key));
    let store = Arc::new(Store::new(api, config.reload_debounce));
    let app = App::new(store);

    // Setup terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.hide_cursor()?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("terminal error: {}", err);
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}
