mod api;
mod app;
mod search;
mod ui;

use std::io;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::sync::mpsc;

use api::ApiClient;
use app::{App, AppEvent, View};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let server_url =
        std::env::var("NEXUS_SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let mut api = ApiClient::new(&server_url);
    let has_session = api.load_session().unwrap_or(false);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(api, has_session);
    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<AppEvent>(100);

    // Input reading task
    let tx_input = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(std::time::Duration::from_millis(100)).unwrap() {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == crossterm::event::KeyEventKind::Press {
                        if tx_input.send(AppEvent::Key(key)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            if tx_input.send(AppEvent::Tick).await.is_err() {
                break;
            }
        }
    });

    // Check the stored session before showing the feed
    if app.view == View::VerifyingSession {
        let tx_verify = tx.clone();
        tokio::spawn(async move {
            let _ = tx_verify.send(AppEvent::VerifySession).await;
        });
    }

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        if let Some(event) = rx.recv().await {
            match event {
                AppEvent::Key(key) => {
                    if app.handle_key(key).await? {
                        return Ok(());
                    }
                }
                AppEvent::Tick => app.on_tick(&tx),
                AppEvent::VerifySession => app.verify_session().await,
                AppEvent::SearchResults { seq, result } => app.on_search_results(seq, result),
            }
        }
    }
}
