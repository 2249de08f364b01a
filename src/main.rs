//! plantify-admin - NFT purchase console
//!
//! A terminal console for buying startup NFTs on behalf of investors. The
//! purchase runs as a saga over the business backend and the token ledger,
//! and payments that were made but never finalized are kept in a journal.

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use plantify_admin::application::{App, PurchaseSaga, SagaOptions, SagaState};
use plantify_admin::infrastructure::{
    init_tracing, Config, Credential, HttpBackendClient, HttpLedgerClient, ReceiptJournal, RpcTransport,
    DEFAULT_CONFIG_FILE,
};
use plantify_admin::presentation::{render_ui, InputHandler, SagaCommand};

const TICK: Duration = Duration::from_millis(100);

/// Entry point for the purchase console.
///
/// Loads the configuration named by the first argument (or
/// `plantify-admin.json`), wires the remote clients and the receipt journal
/// into a saga, and runs the terminal UI until the operator quits.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Config::from_file_and_env(&config_path)?;
    init_tracing(&config.log_path, &config.log_filter)?;
    info!(config = %config_path.display(), backend = %config.backend.url, ledger = %config.ledger.url, "starting");

    let saga = build_saga(&config)?;
    let mut app = App::with_pending(saga.pending_receipts());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, saga).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!(%err, "console stopped");
        println!("{err:?}");
    }

    Ok(())
}

fn build_saga(config: &Config) -> Result<PurchaseSaga, Box<dyn std::error::Error + Send + Sync>> {
    let credential = match &config.identity_token {
        Some(token) => Credential::bearer(token.clone()),
        None => Credential::anonymous(),
    };
    let backend = HttpBackendClient::new(RpcTransport::new(&config.backend, credential.clone())?);
    let ledger = HttpLedgerClient::new(RpcTransport::new(&config.ledger, credential)?);
    let journal = ReceiptJournal::open(&config.journal_path)?;

    let options = SagaOptions {
        memo_max_bytes: config.memo_max_bytes,
        transfer_fee: config.transfer_fee,
        payer: config.payer_account()?,
    };

    Ok(PurchaseSaga::new(Arc::new(backend), Arc::new(ledger))
        .with_options(options)
        .with_store(journal))
}

/// Runs one saga command to completion and hands the saga back.
async fn run_command(mut saga: PurchaseSaga, command: SagaCommand) -> PurchaseSaga {
    match command {
        SagaCommand::Submit(request) => {
            saga.purchase(request).await;
        }
        SagaCommand::Retry => {
            saga.retry().await;
        }
        SagaCommand::Resume(pending) => {
            saga.resume(pending).await;
        }
        SagaCommand::Discard { .. } | SagaCommand::Quit => {}
    }
    saga
}

/// Main event loop.
///
/// The saga is moved into a task while it talks to the remote services, so the
/// UI keeps redrawing from the snapshots it publishes. Once the task finishes
/// the saga comes back and accepts the next command.
async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App, saga: PurchaseSaga) -> io::Result<()> {
    let mut progress: watch::Receiver<SagaState> = saga.subscribe();
    let mut idle = Some(saga);
    let mut running: Option<JoinHandle<PurchaseSaga>> = None;

    loop {
        if progress.has_changed().unwrap_or(false) {
            let snapshot = progress.borrow_and_update().clone();
            app.apply_snapshot(snapshot);
        }

        if running.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = running.take() {
                let saga = task.await.map_err(io::Error::other)?;
                app.finish_run(saga.state().clone(), saga.pending_receipts());
                idle = Some(saga);
            }
        }

        terminal.draw(|f| render_ui(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match InputHandler::handle_key_event(app, key.code, key.modifiers) {
            None => {}
            Some(SagaCommand::Quit) => {
                // Dropping the task would cancel a transfer before its receipt is journaled.
                if let Some(task) = running.take() {
                    warn!(phase = ?app.saga.phase, "waiting for the running purchase before quitting");
                    let saga = task.await.map_err(io::Error::other)?;
                    info!(phase = ?saga.state().phase, "purchase settled, quitting");
                }
                return Ok(());
            }
            Some(SagaCommand::Discard { confirm_unfinalized }) => match idle.as_mut() {
                Some(saga) => {
                    let result = saga.discard(confirm_unfinalized).map_err(|e| e.to_string());
                    app.set_discard_result(result);
                    app.pending = saga.pending_receipts();
                }
                None => app.status_message = Some("Cannot discard while a purchase is in progress".to_string()),
            },
            Some(command) => match idle.take() {
                Some(saga) => {
                    app.start_run();
                    running = Some(tokio::spawn(run_command(saga, command)));
                }
                None => app.status_message = Some("A purchase is already in progress".to_string()),
            },
        }
    }
}
