use crate::application::{App, AppMode, FormField, SagaPhase, StepStatus, PROGRESS_STEPS};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

pub fn render_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_form(f, app, chunks[1]);
    render_progress(f, app, chunks[2]);
    render_details(f, app, chunks[3]);
    render_status_bar(f, app, chunks[4]);

    if matches!(app.mode, AppMode::Help) {
        render_help_popup(f, app.help_scroll);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let header = Paragraph::new(format!(
        "plantify-admin - NFT Purchase | Phase: {} | Pending payments: {}",
        app.saga.phase.label(),
        app.pending.len()
    ))
    .style(Style::default().fg(Color::Cyan));
    f.render_widget(header, area);
}

fn render_form(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = FormField::ALL
        .iter()
        .map(|field| {
            let focused = *field == app.focused && matches!(app.mode, AppMode::Editing);
            let value = app.form.value(*field);
            let (label_style, value_style) = if focused {
                (
                    Style::default().bg(Color::LightBlue).fg(Color::Black),
                    Style::default().bg(Color::Blue).fg(Color::White),
                )
            } else {
                (Style::default().fg(Color::Yellow), Style::default())
            };
            let shown = if focused { format!("{value}_") } else { value.to_string() };
            Row::new(vec![
                Cell::from(field.label()).style(label_style),
                Cell::from(shown).style(value_style),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(12), Constraint::Min(10)])
        .block(Block::default().borders(Borders::ALL).title("Purchase NFT"))
        .column_spacing(1);
    f.render_widget(table, area);
}

fn render_progress(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    for (i, step) in PROGRESS_STEPS.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  >  "));
        }
        let (marker, style) = match app.step_status(*step) {
            StepStatus::Pending => ("[ ]", Style::default().fg(Color::DarkGray)),
            StepStatus::Active => ("[~]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            StepStatus::Done => ("[x]", Style::default().fg(Color::Green)),
            StepStatus::Failed => ("[!]", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        };
        spans.push(Span::styled(format!("{marker} {}", step.label()), style));
    }

    let progress = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("Progress"));
    f.render_widget(progress, area);
}

fn render_details(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let mut lines = Vec::new();
    if let Some(account) = &app.saga.platform_account {
        lines.push(Line::from(format!("Platform account: {account}")));
    }
    if let Some(quote) = &app.saga.price_quote {
        lines.push(Line::from(format!("Unit price: {}", quote.nft_price)));
    }
    if let Some(total) = app.saga.total_amount {
        lines.push(Line::from(format!("Total: {total}")));
    }
    if let Some(receipt) = app.saga.transfer_receipt {
        lines.push(Line::from(format!("Transfer block: {}", receipt.block_index)));
    }
    if let Some(confirmation) = &app.saga.confirmation {
        let token_ids: Vec<String> = confirmation.token_ids.iter().map(|id| id.to_string()).collect();
        lines.push(Line::from(Span::styled(
            format!("Transaction {} issued tokens {}", confirmation.transaction_id, token_ids.join(", ")),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(err) = &app.saga.error {
        lines.push(Line::from(Span::styled(
            format!("Failed while {}: {err}", err.failed_phase().label().to_lowercase()),
            Style::default().fg(Color::Red),
        )));
        if let Some(block_index) = err.block_index() {
            lines.push(Line::from(Span::styled(
                format!("Funds moved at block {block_index}. Ctrl+R retries completion, Ctrl+Y copies the block index."),
                Style::default().fg(Color::Yellow),
            )));
        }
    }
    if lines.is_empty() && app.saga.phase == SagaPhase::Idle {
        lines.push(Line::from("Fill in the form and press Enter to purchase."));
    }

    let details = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Attempt"));
    f.render_widget(details, chunks[0]);

    let rows: Vec<Row> = app
        .pending
        .iter()
        .map(|pending| {
            Row::new(vec![
                Cell::from(pending.receipt.block_index.to_string()),
                Cell::from(pending.request.startup_id().to_string()),
                Cell::from(pending.request.investor_id().to_string()),
                Cell::from(pending.request.quantity().to_string()),
            ])
        })
        .collect();
    let header = Row::new(vec!["Block", "Startup", "Investor", "Qty"]).style(Style::default().fg(Color::Yellow));
    let pending = Table::new(
        rows,
        [Constraint::Length(8), Constraint::Min(8), Constraint::Min(8), Constraint::Length(4)],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Awaiting finalization"))
    .column_spacing(1);
    f.render_widget(pending, chunks[1]);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let input_text = match app.mode {
        AppMode::Editing => {
            if let Some(ref status) = app.status_message {
                status.clone()
            } else if app.running {
                format!("{}...", app.saga.phase.label())
            } else {
                "Enter: purchase | Tab: next field | Ctrl+R: retry | Ctrl+P: resume | Ctrl+D: discard | F1: help | Esc: quit"
                    .to_string()
            }
        }
        AppMode::Help => "↑↓/jk: scroll | PgUp/PgDn: fast scroll | Home: top | Esc/q: close help".to_string(),
        AppMode::ConfirmDiscard => app
            .status_message
            .clone()
            .unwrap_or_else(|| "Discard unfinalized payment? (y/N)".to_string()),
        AppMode::ExportCsv => format!("Export pending payments as: {} (Enter to export, Esc to cancel)", app.filename_input),
    };

    let input = Paragraph::new(input_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(match app.mode {
            AppMode::Editing if app.saga.phase == SagaPhase::Error => Style::default().fg(Color::Red),
            AppMode::Editing => Style::default(),
            AppMode::Help => Style::default().fg(Color::Cyan),
            AppMode::ConfirmDiscard => Style::default().fg(Color::Yellow),
            AppMode::ExportCsv => Style::default().fg(Color::Magenta),
        });
    f.render_widget(input, area);
}

fn render_help_popup(f: &mut Frame, scroll: usize) {
    let area = f.area();
    let popup_area = Rect {
        x: area.width / 10,
        y: area.height / 10,
        width: area.width * 4 / 5,
        height: area.height * 4 / 5,
    };

    f.render_widget(Clear, popup_area);

    let help_text = get_help_text();
    let help_lines: Vec<&str> = help_text.lines().collect();
    let visible_height = popup_area.height.saturating_sub(2) as usize;

    let start_line = scroll.min(help_lines.len().saturating_sub(visible_height));
    let end_line = (start_line + visible_height).min(help_lines.len());

    let visible_text = help_lines[start_line..end_line].join("\n");

    let help_widget = Paragraph::new(visible_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("plantify-admin Help (Line {}/{})", start_line + 1, help_lines.len()))
                .style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(help_widget, popup_area);
}

fn get_help_text() -> &'static str {
    r#"PLANTIFY ADMIN - NFT PURCHASE CONSOLE

=== HOW A PURCHASE RUNS ===
1. Getting purchase info   Eligibility, platform account and NFT price are
                           fetched together. Any failure stops the purchase
                           before funds move.
2. Transferring tokens     One ledger transfer of price x quantity to the
                           platform account.
3. Completing purchase     The backend issues the NFTs against the transfer's
                           block index.

=== FORM ===
Startup ID      Startup whose NFTs are bought (required)
Investor ID     Investor receiving the NFTs (required)
Quantity        Number of NFTs, a positive whole number
Memo            Optional note; the startup id is sent as the ledger memo

=== KEYS ===
Enter           Start a purchase
Tab / ↓         Next field
Shift+Tab / ↑   Previous field
Ctrl+R          Retry after an error
Ctrl+P          Resume the oldest payment awaiting finalization
Ctrl+D          Discard the current attempt
Ctrl+Y          Copy the transfer block index to the clipboard
Ctrl+E          Export payments awaiting finalization to CSV
F1              Show this help
Esc / Ctrl+C    Quit (refused while a purchase is running)

=== WHEN FUNDS MOVED BUT THE PURCHASE FAILED ===
If completing fails after the transfer, the payment is kept in the receipt
journal. Ctrl+R retries completion with the same block index; it never pays
twice. New purchases are blocked until the payment is finalized or explicitly
discarded. Discarding keeps the journal entry so it can still be reconciled.
If the ledger's answer to a transfer is lost, Ctrl+R resends the identical
transfer so the ledger recognises it as a duplicate.

=== HELP NAVIGATION ===
↑↓ or j/k       Scroll help text up/down one line
Page Up/Down    Scroll help text up/down 5 lines
Home            Jump to top of help text
Esc/F1/q        Close this help window"#
}
