use crate::application::{App, AppMode};
use crate::domain::{PendingPurchase, PurchaseRequest};
use crate::infrastructure::{copy_to_clipboard, CsvExporter};
use crossterm::event::{KeyCode, KeyModifiers};

/// Work the event loop has to hand to the purchase saga.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaCommand {
    Submit(PurchaseRequest),
    Retry,
    Resume(PendingPurchase),
    Discard { confirm_unfinalized: bool },
    Quit,
}

pub struct InputHandler;

impl InputHandler {
    pub fn handle_key_event(app: &mut App, key: KeyCode, modifiers: KeyModifiers) -> Option<SagaCommand> {
        match app.mode {
            AppMode::Editing => Self::handle_editing_mode(app, key, modifiers),
            AppMode::Help => {
                Self::handle_help_mode(app, key);
                None
            }
            AppMode::ConfirmDiscard => Self::handle_confirm_discard_mode(app, key),
            AppMode::ExportCsv => {
                Self::handle_filename_input_mode(app, key);
                None
            }
        }
    }

    fn handle_editing_mode(app: &mut App, key: KeyCode, modifiers: KeyModifiers) -> Option<SagaCommand> {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match key {
                KeyCode::Char('c') | KeyCode::Char('q') => app.request_quit().then_some(SagaCommand::Quit),
                KeyCode::Char('r') => {
                    if app.can_retry() {
                        Some(SagaCommand::Retry)
                    } else {
                        app.status_message = Some("Nothing to retry".to_string());
                        None
                    }
                }
                KeyCode::Char('p') => app.next_resumable().map(SagaCommand::Resume),
                KeyCode::Char('d') => app.start_discard().then_some(SagaCommand::Discard {
                    confirm_unfinalized: false,
                }),
                KeyCode::Char('y') => {
                    match app.receipt_text() {
                        Some(text) => {
                            let result = copy_to_clipboard(&text).map(|_| text);
                            app.set_clipboard_result(result);
                        }
                        None => app.status_message = Some("No transfer receipt to copy".to_string()),
                    }
                    None
                }
                KeyCode::Char('e') => {
                    app.start_csv_export();
                    None
                }
                _ => None,
            };
        }

        match key {
            KeyCode::Esc => return app.request_quit().then_some(SagaCommand::Quit),
            KeyCode::F(1) => app.toggle_help(),
            KeyCode::Enter => return app.prepare_submit().map(SagaCommand::Submit),
            KeyCode::Tab | KeyCode::Down => app.next_field(),
            KeyCode::BackTab | KeyCode::Up => app.previous_field(),
            KeyCode::Backspace => app.backspace(),
            KeyCode::Char(c) => app.insert_char(c),
            _ => {}
        }
        None
    }

    fn handle_confirm_discard_mode(app: &mut App, key: KeyCode) -> Option<SagaCommand> {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(SagaCommand::Discard {
                confirm_unfinalized: true,
            }),
            _ => {
                app.cancel_discard();
                None
            }
        }
    }

    fn handle_help_mode(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q') => app.toggle_help(),
            KeyCode::Up | KeyCode::Char('k') => app.help_scroll = app.help_scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => app.help_scroll += 1,
            KeyCode::PageUp => app.help_scroll = app.help_scroll.saturating_sub(5),
            KeyCode::PageDown => app.help_scroll += 5,
            KeyCode::Home => app.help_scroll = 0,
            _ => {}
        }
    }

    fn handle_filename_input_mode(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Enter => {
                let filename = app.get_csv_export_filename();
                let result = CsvExporter::export_pending(&app.pending, &filename);
                app.set_csv_export_result(result);
            }
            KeyCode::Esc => app.cancel_filename_input(),
            KeyCode::Backspace => {
                app.filename_input.pop();
            }
            KeyCode::Char(c) => app.filename_input.push(c),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{FormField, SagaError, SagaPhase, SagaState};
    use crate::domain::{RemoteError, TransferReceipt};

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            InputHandler::handle_key_event(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    fn unfinalized_error() -> SagaState {
        SagaState {
            phase: SagaPhase::Error,
            transfer_receipt: Some(TransferReceipt { block_index: 7 }),
            error: Some(SagaError::Finalize {
                block_index: 7,
                source: RemoteError::Transport("timed out".to_string()),
            }),
            ..SagaState::default()
        }
    }

    #[test]
    fn test_enter_submits_filled_form() {
        let mut app = App::default();
        type_text(&mut app, "S1");
        InputHandler::handle_key_event(&mut app, KeyCode::Tab, KeyModifiers::NONE);
        type_text(&mut app, "I1");
        InputHandler::handle_key_event(&mut app, KeyCode::Tab, KeyModifiers::NONE);
        type_text(&mut app, "3");

        let command = InputHandler::handle_key_event(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        match command {
            Some(SagaCommand::Submit(request)) => {
                assert_eq!(request.startup_id(), "S1");
                assert_eq!(request.investor_id(), "I1");
                assert_eq!(request.quantity(), 3);
            }
            other => panic!("expected submit, got {other:?}"),
        }
    }

    #[test]
    fn test_enter_with_invalid_form_reports_error() {
        let mut app = App::default();
        let command = InputHandler::handle_key_event(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert!(command.is_none());
        assert_eq!(app.status_message.as_deref(), Some("A startup must be selected"));
    }

    #[test]
    fn test_quantity_accepts_digits_only() {
        let mut app = App::default();
        app.focused = FormField::Quantity;
        type_text(&mut app, "1a2");
        assert_eq!(app.form.quantity, "12");
    }

    #[test]
    fn test_retry_only_after_error() {
        let mut app = App::default();
        assert!(InputHandler::handle_key_event(&mut app, KeyCode::Char('r'), KeyModifiers::CONTROL).is_none());

        app.apply_snapshot(unfinalized_error());
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Char('r'), KeyModifiers::CONTROL),
            Some(SagaCommand::Retry)
        );
    }

    #[test]
    fn test_discard_flow() {
        let mut app = App::default();
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL),
            Some(SagaCommand::Discard {
                confirm_unfinalized: false
            })
        );

        app.apply_snapshot(unfinalized_error());
        assert!(InputHandler::handle_key_event(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL).is_none());
        assert_eq!(app.mode, AppMode::ConfirmDiscard);

        assert!(InputHandler::handle_key_event(&mut app, KeyCode::Char('n'), KeyModifiers::NONE).is_none());
        assert_eq!(app.mode, AppMode::Editing);

        InputHandler::handle_key_event(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL);
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Char('y'), KeyModifiers::NONE),
            Some(SagaCommand::Discard {
                confirm_unfinalized: true
            })
        );
    }

    #[test]
    fn test_quit_keys() {
        let mut app = App::default();
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Esc, KeyModifiers::NONE),
            Some(SagaCommand::Quit)
        );
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(SagaCommand::Quit)
        );
    }

    #[test]
    fn test_quit_keys_refused_while_purchase_runs() {
        let mut app = App::default();
        app.start_run();

        assert!(InputHandler::handle_key_event(&mut app, KeyCode::Esc, KeyModifiers::NONE).is_none());
        assert!(InputHandler::handle_key_event(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL).is_none());
        assert!(app.status_message.as_ref().unwrap().starts_with("Cannot quit"));

        app.finish_run(SagaState::default(), Vec::new());
        assert_eq!(
            InputHandler::handle_key_event(&mut app, KeyCode::Esc, KeyModifiers::NONE),
            Some(SagaCommand::Quit)
        );
    }

    #[test]
    fn test_help_scrolling() {
        let mut app = App::default();
        InputHandler::handle_key_event(&mut app, KeyCode::F(1), KeyModifiers::NONE);
        assert_eq!(app.mode, AppMode::Help);

        InputHandler::handle_key_event(&mut app, KeyCode::PageDown, KeyModifiers::NONE);
        InputHandler::handle_key_event(&mut app, KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(app.help_scroll, 4);

        InputHandler::handle_key_event(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(app.mode, AppMode::Editing);
    }

    #[test]
    fn test_csv_export_filename_input() {
        let mut app = App::default();
        InputHandler::handle_key_event(&mut app, KeyCode::Char('e'), KeyModifiers::CONTROL);
        assert_eq!(app.mode, AppMode::ExportCsv);
        assert_eq!(app.filename_input, "pending-receipts.csv");

        InputHandler::handle_key_event(&mut app, KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(app.filename_input, "pending-receipts.csvx");
        InputHandler::handle_key_event(&mut app, KeyCode::Backspace, KeyModifiers::NONE);
        assert_eq!(app.filename_input, "pending-receipts.csv");

        InputHandler::handle_key_event(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(app.mode, AppMode::Editing);
        assert!(app.filename_input.is_empty());
    }
}
