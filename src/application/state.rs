//! Application state for the purchase console.
//!
//! This module holds the operator's form input, the latest snapshot of the
//! purchase saga and the UI mode. The saga itself runs elsewhere; the console
//! only reads its phase and error and decides what the operator may do next.

use crate::application::saga::{SagaPhase, SagaState};
use crate::domain::{DomainError, PendingPurchase, PurchaseRequest};

/// Represents the current mode of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Typing into the purchase form
    Editing,
    /// Help screen is displayed
    Help,
    /// Asking whether to drop a payment that was never finalized
    ConfirmDiscard,
    /// CSV export dialog is open
    ExportCsv,
}

/// Input fields of the purchase form, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Startup,
    Investor,
    Quantity,
    Memo,
}

impl FormField {
    pub const ALL: [FormField; 4] = [FormField::Startup, FormField::Investor, FormField::Quantity, FormField::Memo];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Startup => "Startup ID",
            FormField::Investor => "Investor ID",
            FormField::Quantity => "Quantity",
            FormField::Memo => "Memo",
        }
    }

    pub fn next(self) -> Self {
        match self {
            FormField::Startup => FormField::Investor,
            FormField::Investor => FormField::Quantity,
            FormField::Quantity => FormField::Memo,
            FormField::Memo => FormField::Startup,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            FormField::Startup => FormField::Memo,
            FormField::Investor => FormField::Startup,
            FormField::Quantity => FormField::Investor,
            FormField::Memo => FormField::Quantity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseForm {
    pub startup_id: String,
    pub investor_id: String,
    pub quantity: String,
    pub memo: String,
}

impl PurchaseForm {
    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Startup => &self.startup_id,
            FormField::Investor => &self.investor_id,
            FormField::Quantity => &self.quantity,
            FormField::Memo => &self.memo,
        }
    }

    fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Startup => &mut self.startup_id,
            FormField::Investor => &mut self.investor_id,
            FormField::Quantity => &mut self.quantity,
            FormField::Memo => &mut self.memo,
        }
    }

    /// Validates the fields in tab order; no remote call is made for an invalid request.
    pub fn to_request(&self) -> Result<PurchaseRequest, DomainError> {
        if self.startup_id.trim().is_empty() {
            return Err(DomainError::MissingStartup);
        }
        if self.investor_id.trim().is_empty() {
            return Err(DomainError::MissingInvestor);
        }

        let quantity_text = self.quantity.trim();
        let quantity = quantity_text.parse::<u64>().map_err(|_| {
            DomainError::InvalidQuantity(if quantity_text.is_empty() {
                "nothing".to_string()
            } else {
                quantity_text.to_string()
            })
        })?;

        Ok(PurchaseRequest::new(&self.startup_id, &self.investor_id, quantity)?.with_memo(self.memo.trim()))
    }
}

/// How a protocol step is displayed in the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Done,
    Failed,
}

/// The three protocol steps shown to the operator.
pub const PROGRESS_STEPS: [SagaPhase; 3] = [SagaPhase::GettingInfo, SagaPhase::Transferring, SagaPhase::Completing];

fn step_order(phase: SagaPhase) -> usize {
    match phase {
        SagaPhase::Idle | SagaPhase::Error => 0,
        SagaPhase::GettingInfo => 1,
        SagaPhase::Transferring => 2,
        SagaPhase::Completing => 3,
        SagaPhase::Success => 4,
    }
}

/// Main console state.
///
/// # Examples
///
/// ```
/// use plantify_admin::application::{App, AppMode};
///
/// let app = App::default();
/// assert_eq!(app.mode, AppMode::Editing);
/// assert!(app.can_submit());
/// ```
#[derive(Debug)]
pub struct App {
    pub form: PurchaseForm,
    pub focused: FormField,
    pub mode: AppMode,
    /// Latest published state of the purchase saga
    pub saga: SagaState,
    /// Whether a saga run is currently executing
    pub running: bool,
    /// Payments awaiting finalization, as last read from the journal
    pub pending: Vec<PendingPurchase>,
    /// Temporary status message to display
    pub status_message: Option<String>,
    /// Input buffer for filename entry
    pub filename_input: String,
    /// Scroll position in help text
    pub help_scroll: usize,
}

impl Default for App {
    fn default() -> Self {
        Self {
            form: PurchaseForm::default(),
            focused: FormField::Startup,
            mode: AppMode::Editing,
            saga: SagaState::default(),
            running: false,
            pending: Vec::new(),
            status_message: None,
            filename_input: String::new(),
            help_scroll: 0,
        }
    }
}

impl App {
    pub fn with_pending(pending: Vec<PendingPurchase>) -> Self {
        let status_message = (!pending.is_empty()).then(|| {
            format!(
                "{} payment(s) from a previous session await finalization (Ctrl+P to resume)",
                pending.len()
            )
        });
        Self {
            pending,
            status_message,
            ..Self::default()
        }
    }

    pub fn insert_char(&mut self, c: char) {
        if self.focused == FormField::Quantity && !c.is_ascii_digit() {
            return;
        }
        self.form.value_mut(self.focused).push(c);
    }

    pub fn backspace(&mut self) {
        self.form.value_mut(self.focused).pop();
    }

    pub fn next_field(&mut self) {
        self.focused = self.focused.next();
    }

    pub fn previous_field(&mut self) {
        self.focused = self.focused.previous();
    }

    /// A new purchase may start only when nothing runs and no payment is left unfinalized.
    pub fn can_submit(&self) -> bool {
        !self.running && !self.saga.phase.is_in_flight() && self.saga.unfinalized_block_index().is_none()
    }

    pub fn can_retry(&self) -> bool {
        !self.running && self.saga.phase == SagaPhase::Error
    }

    /// Validates the form and returns the request to submit, or explains why not.
    pub fn prepare_submit(&mut self) -> Option<PurchaseRequest> {
        if let Some(block_index) = self.saga.unfinalized_block_index() {
            self.status_message = Some(format!(
                "Payment at block {block_index} is not finalized: retry (Ctrl+R) or discard (Ctrl+D) first"
            ));
            return None;
        }
        if !self.can_submit() {
            self.status_message = Some("A purchase is already in progress".to_string());
            return None;
        }

        match self.form.to_request() {
            Ok(request) => {
                self.status_message = None;
                Some(request)
            }
            Err(err) => {
                self.status_message = Some(err.to_string());
                None
            }
        }
    }

    /// Quitting mid-run would abandon a transfer before its receipt is journaled.
    pub fn request_quit(&mut self) -> bool {
        if self.running {
            let activity = if self.saga.phase.is_in_flight() {
                self.saga.phase.label().to_lowercase()
            } else {
                "a purchase".to_string()
            };
            self.status_message = Some(format!("Cannot quit while {activity} is in progress"));
            return false;
        }
        true
    }

    /// Marks a saga run as started.
    pub fn start_run(&mut self) {
        self.running = true;
        self.status_message = None;
    }

    /// Applies a progress snapshot published by the saga.
    pub fn apply_snapshot(&mut self, state: SagaState) {
        self.saga = state;
    }

    /// Records the final state of a run and the journal contents after it.
    pub fn finish_run(&mut self, state: SagaState, pending: Vec<PendingPurchase>) {
        self.running = false;
        self.pending = pending;

        self.status_message = match (&state.phase, &state.confirmation, &state.error) {
            (SagaPhase::Success, Some(confirmation), _) => {
                let token_ids: Vec<String> = confirmation.token_ids.iter().map(|id| id.to_string()).collect();
                self.form = PurchaseForm::default();
                self.focused = FormField::Startup;
                Some(format!(
                    "NFT purchased successfully! Transaction ID: {}. Token IDs: {}",
                    confirmation.transaction_id,
                    token_ids.join(", ")
                ))
            }
            (SagaPhase::Error, _, Some(err)) => Some(format!("Failed to purchase NFT: {err}")),
            _ => None,
        };
        self.saga = state;
    }

    pub fn step_status(&self, step: SagaPhase) -> StepStatus {
        let step = step_order(step);
        let (current, failed) = match (&self.saga.phase, &self.saga.error) {
            (SagaPhase::Error, Some(err)) => (step_order(err.failed_phase()), true),
            (phase, _) => (step_order(*phase), false),
        };

        if current == 0 || step > current {
            StepStatus::Pending
        } else if step < current {
            StepStatus::Done
        } else if failed {
            StepStatus::Failed
        } else {
            StepStatus::Active
        }
    }

    /// Block index to hand to whoever reconciles the payment.
    pub fn receipt_text(&self) -> Option<String> {
        self.saga
            .transfer_receipt
            .map(|receipt| receipt.block_index.to_string())
            .or_else(|| self.pending.first().map(|p| p.receipt.block_index.to_string()))
    }

    pub fn set_clipboard_result(&mut self, result: Result<String, String>) {
        self.status_message = Some(match result {
            Ok(text) => format!("Copied block index {text} to clipboard"),
            Err(e) => format!("Clipboard unavailable: {e}"),
        });
    }

    /// Asks for confirmation when the discard would drop an unfinalized payment.
    ///
    /// Returns `true` when the saga can be discarded right away.
    pub fn start_discard(&mut self) -> bool {
        if self.running {
            self.status_message = Some("Cannot discard while a purchase is in progress".to_string());
            return false;
        }
        if let Some(block_index) = self.saga.unfinalized_block_index() {
            self.mode = AppMode::ConfirmDiscard;
            self.status_message = Some(format!(
                "Payment at block {block_index} was never finalized. Discard anyway? (y/N)"
            ));
            return false;
        }
        true
    }

    pub fn cancel_discard(&mut self) {
        self.mode = AppMode::Editing;
        self.status_message = None;
    }

    pub fn set_discard_result(&mut self, result: Result<(), String>) {
        self.mode = AppMode::Editing;
        match result {
            Ok(()) => {
                self.saga = SagaState::default();
                self.status_message = Some("Purchase discarded".to_string());
            }
            Err(e) => self.status_message = Some(e),
        }
    }

    /// Oldest journaled payment, if the console is free to resume it.
    pub fn next_resumable(&mut self) -> Option<PendingPurchase> {
        if !self.can_submit() {
            self.status_message = Some("Finish or discard the current purchase before resuming".to_string());
            return None;
        }
        match self.pending.iter().min_by_key(|p| p.recorded_at) {
            Some(pending) => Some(pending.clone()),
            None => {
                self.status_message = Some("No payments await finalization".to_string());
                None
            }
        }
    }

    pub fn start_csv_export(&mut self) {
        self.mode = AppMode::ExportCsv;
        self.filename_input = "pending-receipts.csv".to_string();
        self.status_message = None;
    }

    pub fn get_csv_export_filename(&self) -> String {
        if self.filename_input.is_empty() {
            "pending-receipts.csv".to_string()
        } else if self.filename_input.ends_with(".csv") {
            self.filename_input.clone()
        } else {
            format!("{}.csv", self.filename_input)
        }
    }

    pub fn set_csv_export_result(&mut self, result: Result<String, String>) {
        self.status_message = Some(match result {
            Ok(filename) => format!("Exported {} pending payment(s) to {filename}", self.pending.len()),
            Err(e) => format!("Export failed: {e}"),
        });
        self.cancel_filename_input();
    }

    pub fn cancel_filename_input(&mut self) {
        self.mode = AppMode::Editing;
        self.filename_input.clear();
    }

    pub fn toggle_help(&mut self) {
        self.mode = match self.mode {
            AppMode::Help => AppMode::Editing,
            _ => AppMode::Help,
        };
        self.help_scroll = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::saga::SagaError;
    use crate::domain::{PurchaseConfirmation, RemoteError, TransferReceipt};
    use uuid::Uuid;

    fn filled_app() -> App {
        let mut app = App::default();
        app.form = PurchaseForm {
            startup_id: "S1".to_string(),
            investor_id: "I1".to_string(),
            quantity: "2".to_string(),
            memo: String::new(),
        };
        app
    }

    fn failed_state(err: SagaError, receipt: Option<u64>) -> SagaState {
        SagaState {
            attempt_id: Uuid::new_v4(),
            phase: SagaPhase::Error,
            transfer_receipt: receipt.map(|block_index| TransferReceipt { block_index }),
            error: Some(err),
            ..SagaState::default()
        }
    }

    #[test]
    fn test_app_default() {
        let app = App::default();
        assert_eq!(app.mode, AppMode::Editing);
        assert_eq!(app.focused, FormField::Startup);
        assert_eq!(app.saga.phase, SagaPhase::Idle);
        assert!(!app.running);
        assert!(app.status_message.is_none());
        assert!(app.pending.is_empty());
    }

    #[test]
    fn test_typing_into_fields() {
        let mut app = App::default();
        for c in "S1".chars() {
            app.insert_char(c);
        }
        app.next_field();
        app.insert_char('I');
        app.next_field();
        app.insert_char('x');
        app.insert_char('3');
        app.backspace();
        app.insert_char('4');

        assert_eq!(app.form.startup_id, "S1");
        assert_eq!(app.form.investor_id, "I");
        assert_eq!(app.form.quantity, "4");

        app.previous_field();
        assert_eq!(app.focused, FormField::Investor);
    }

    #[test]
    fn test_field_order_wraps() {
        let mut field = FormField::Startup;
        for _ in 0..FormField::ALL.len() {
            field = field.next();
        }
        assert_eq!(field, FormField::Startup);
        assert_eq!(FormField::Startup.previous(), FormField::Memo);
    }

    #[test]
    fn test_prepare_submit_valid_form() {
        let mut app = filled_app();
        app.form.memo = "  Q3 round ".to_string();

        let request = app.prepare_submit().unwrap();
        assert_eq!(request.startup_id(), "S1");
        assert_eq!(request.quantity(), 2);
        assert_eq!(request.memo(), Some("Q3 round"));
        assert!(app.status_message.is_none());
    }

    #[test]
    fn test_prepare_submit_reports_validation_errors() {
        let mut app = filled_app();
        app.form.quantity = "0".to_string();
        assert!(app.prepare_submit().is_none());
        assert!(app.status_message.as_ref().unwrap().contains("Quantity"));

        let mut app = filled_app();
        app.form.startup_id.clear();
        assert!(app.prepare_submit().is_none());
        assert_eq!(app.status_message.as_deref(), Some("A startup must be selected"));

        let mut app = filled_app();
        app.form.quantity.clear();
        assert!(app.prepare_submit().is_none());
    }

    #[test]
    fn test_form_errors_follow_field_order() {
        let form = PurchaseForm::default();
        assert_eq!(form.to_request(), Err(DomainError::MissingStartup));

        let form = PurchaseForm {
            startup_id: "S1".to_string(),
            ..PurchaseForm::default()
        };
        assert_eq!(form.to_request(), Err(DomainError::MissingInvestor));

        let form = PurchaseForm {
            startup_id: "S1".to_string(),
            investor_id: "I1".to_string(),
            ..PurchaseForm::default()
        };
        assert_eq!(
            form.to_request(),
            Err(DomainError::InvalidQuantity("nothing".to_string()))
        );

        let form = PurchaseForm {
            quantity: "0".to_string(),
            ..form
        };
        assert_eq!(form.to_request(), Err(DomainError::InvalidQuantity("0".to_string())));
    }

    #[test]
    fn test_submission_blocked_while_running() {
        let mut app = filled_app();
        app.start_run();
        assert!(!app.can_submit());
        assert!(app.prepare_submit().is_none());

        let mut app = filled_app();
        app.apply_snapshot(SagaState {
            phase: SagaPhase::Transferring,
            ..SagaState::default()
        });
        assert!(!app.can_submit());
    }

    #[test]
    fn test_submission_blocked_by_unfinalized_payment() {
        let mut app = filled_app();
        let err = SagaError::Finalize {
            block_index: 7,
            source: RemoteError::Rejected("already sold".to_string()),
        };
        app.finish_run(failed_state(err, Some(7)), Vec::new());

        assert!(app.can_retry());
        assert!(app.prepare_submit().is_none());
        assert!(app.status_message.as_ref().unwrap().contains("block 7"));
        assert_eq!(app.receipt_text(), Some("7".to_string()));
    }

    #[test]
    fn test_quit_refused_while_running() {
        let mut app = filled_app();
        assert!(app.request_quit());

        app.start_run();
        app.apply_snapshot(SagaState {
            phase: SagaPhase::Transferring,
            ..SagaState::default()
        });
        assert!(!app.request_quit());
        assert_eq!(
            app.status_message.as_deref(),
            Some("Cannot quit while transferring tokens is in progress")
        );

        app.finish_run(
            SagaState {
                phase: SagaPhase::Error,
                error: Some(SagaError::Transfer(RemoteError::Rejected("bad fee".to_string()))),
                ..SagaState::default()
            },
            Vec::new(),
        );
        assert!(app.request_quit());
    }

    #[test]
    fn test_finish_run_success_clears_form() {
        let mut app = filled_app();
        app.start_run();
        let state = SagaState {
            phase: SagaPhase::Success,
            transfer_receipt: Some(TransferReceipt { block_index: 42 }),
            confirmation: Some(PurchaseConfirmation {
                startup_id: "S1".to_string(),
                token_ids: vec![101, 102],
                investor_id: "I1".to_string(),
                total_amount: 1000,
                quantity: 2,
                unit_price: 500,
                transaction_id: "tx-42".to_string(),
            }),
            ..SagaState::default()
        };

        app.finish_run(state, Vec::new());

        assert!(!app.running);
        assert_eq!(app.form, PurchaseForm::default());
        assert_eq!(
            app.status_message.as_deref(),
            Some("NFT purchased successfully! Transaction ID: tx-42. Token IDs: 101, 102")
        );
        assert!(app.can_submit());
    }

    #[test]
    fn test_step_status_progress() {
        let mut app = App::default();
        assert!(PROGRESS_STEPS.iter().all(|s| app.step_status(*s) == StepStatus::Pending));

        app.apply_snapshot(SagaState {
            phase: SagaPhase::Transferring,
            ..SagaState::default()
        });
        assert_eq!(app.step_status(SagaPhase::GettingInfo), StepStatus::Done);
        assert_eq!(app.step_status(SagaPhase::Transferring), StepStatus::Active);
        assert_eq!(app.step_status(SagaPhase::Completing), StepStatus::Pending);

        app.apply_snapshot(SagaState {
            phase: SagaPhase::Success,
            ..SagaState::default()
        });
        assert!(PROGRESS_STEPS.iter().all(|s| app.step_status(*s) == StepStatus::Done));
    }

    #[test]
    fn test_step_status_marks_failed_phase() {
        let mut app = App::default();
        app.apply_snapshot(failed_state(
            SagaError::Transfer(RemoteError::Rejected("insufficient funds".to_string())),
            None,
        ));
        assert_eq!(app.step_status(SagaPhase::GettingInfo), StepStatus::Done);
        assert_eq!(app.step_status(SagaPhase::Transferring), StepStatus::Failed);
        assert_eq!(app.step_status(SagaPhase::Completing), StepStatus::Pending);

        app.apply_snapshot(failed_state(SagaError::Ineligible("sold out".to_string()), None));
        assert_eq!(app.step_status(SagaPhase::GettingInfo), StepStatus::Failed);
    }

    #[test]
    fn test_discard_requires_confirmation_for_unfinalized_payment() {
        let mut app = App::default();
        assert!(app.start_discard());

        let err = SagaError::Finalize {
            block_index: 7,
            source: RemoteError::Transport("timed out".to_string()),
        };
        app.finish_run(failed_state(err, Some(7)), Vec::new());
        assert!(!app.start_discard());
        assert_eq!(app.mode, AppMode::ConfirmDiscard);

        app.set_discard_result(Ok(()));
        assert_eq!(app.mode, AppMode::Editing);
        assert_eq!(app.saga.phase, SagaPhase::Idle);
        assert!(app.can_submit());
    }

    #[test]
    fn test_resume_picks_oldest_pending_payment() {
        let request = PurchaseRequest::new("S1", "I1", 1).unwrap();
        let pending = |block_index, recorded_at| PendingPurchase {
            attempt_id: Uuid::new_v4(),
            request: request.clone(),
            receipt: TransferReceipt { block_index },
            total_amount: 500,
            recorded_at,
        };
        let mut app = App::with_pending(vec![pending(9, 200), pending(4, 100)]);
        assert!(app.status_message.as_ref().unwrap().contains("2 payment(s)"));

        assert_eq!(app.next_resumable().unwrap().receipt.block_index, 4);

        let mut empty = App::default();
        assert!(empty.next_resumable().is_none());
        assert_eq!(empty.status_message.as_deref(), Some("No payments await finalization"));
    }

    #[test]
    fn test_csv_export_filename() {
        let mut app = App::default();
        app.start_csv_export();
        assert_eq!(app.mode, AppMode::ExportCsv);
        assert_eq!(app.get_csv_export_filename(), "pending-receipts.csv");

        app.filename_input = "audit".to_string();
        assert_eq!(app.get_csv_export_filename(), "audit.csv");

        app.set_csv_export_result(Err("permission denied".to_string()));
        assert_eq!(app.mode, AppMode::Editing);
        assert_eq!(app.status_message.as_deref(), Some("Export failed: permission denied"));
    }

    #[test]
    fn test_toggle_help() {
        let mut app = App::default();
        app.toggle_help();
        assert_eq!(app.mode, AppMode::Help);
        app.toggle_help();
        assert_eq!(app.mode, AppMode::Editing);
    }
}
