//! Explicit state machine for modal-driven actions.
//!
//! `Closed -> Open -> Submitting -> Closed` on success, or
//! `Submitting -> ErrorShown` on failure (the form stays open for correction).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ActionState<I> {
    Closed,
    Open { input: I },
    Submitting { input: I },
    ErrorShown { input: I, message: String },
}

/// Where a failed submit reports its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisplay {
    /// Inline alert inside the still-open form.
    Inline,
    /// Separate blocking modal; the form itself closes.
    BlockingModal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("form is not open")]
    NotOpen,
    #[error("form is already submitting")]
    AlreadySubmitting,
    #[error("no submit in progress")]
    NotSubmitting,
}

#[derive(Debug, Clone)]
pub struct ModalWorkflow<I> {
    state: ActionState<I>,
    display: ErrorDisplay,
}

impl<I: Clone + Default> ModalWorkflow<I> {
    pub fn new(display: ErrorDisplay) -> Self {
        Self {
            state: ActionState::Closed,
            display,
        }
    }

    pub fn state(&self) -> &ActionState<I> {
        &self.state
    }

    pub fn error_display(&self) -> ErrorDisplay {
        self.display
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, ActionState::Closed)
    }

    /// The submit control is disabled while this is true.
    pub fn is_submitting(&self) -> bool {
        matches!(self.state, ActionState::Submitting { .. })
    }

    pub fn input(&self) -> Option<&I> {
        match &self.state {
            ActionState::Closed => None,
            ActionState::Open { input }
            | ActionState::Submitting { input }
            | ActionState::ErrorShown { input, .. } => Some(input),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ActionState::ErrorShown { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Opens with fresh input.
    pub fn open(&mut self) {
        self.state = ActionState::Open {
            input: I::default(),
        };
    }

    pub fn open_with(&mut self, input: I) {
        self.state = ActionState::Open { input };
    }

    /// Edits the input; any shown error is dismissed.
    pub fn edit(&mut self, f: impl FnOnce(&mut I)) -> Result<(), WorkflowError> {
        let mut input = match std::mem::replace(&mut self.state, ActionState::Closed) {
            ActionState::Open { input } | ActionState::ErrorShown { input, .. } => input,
            other => {
                let err = match &other {
                    ActionState::Submitting { .. } => WorkflowError::AlreadySubmitting,
                    _ => WorkflowError::NotOpen,
                };
                self.state = other;
                return Err(err);
            }
        };
        f(&mut input);
        self.state = ActionState::Open { input };
        Ok(())
    }

    /// Moves to `Submitting` and hands out the input to send.
    pub fn submit(&mut self) -> Result<I, WorkflowError> {
        match std::mem::replace(&mut self.state, ActionState::Closed) {
            ActionState::Open { input } | ActionState::ErrorShown { input, .. } => {
                self.state = ActionState::Submitting {
                    input: input.clone(),
                };
                Ok(input)
            }
            other => {
                let err = match &other {
                    ActionState::Submitting { .. } => WorkflowError::AlreadySubmitting,
                    _ => WorkflowError::NotOpen,
                };
                self.state = other;
                Err(err)
            }
        }
    }

    /// Success closes the form and discards its input.
    pub fn succeed(&mut self) -> Result<(), WorkflowError> {
        if !self.is_submitting() {
            return Err(WorkflowError::NotSubmitting);
        }
        self.state = ActionState::Closed;
        Ok(())
    }

    /// Failure keeps the form open with the message, unless errors go to the
    /// blocking modal in which case the form closes.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        match std::mem::replace(&mut self.state, ActionState::Closed) {
            ActionState::Submitting { input } => {
                if self.display == ErrorDisplay::Inline {
                    self.state = ActionState::ErrorShown {
                        input,
                        message: message.into(),
                    };
                }
                Ok(())
            }
            other => {
                self.state = other;
                Err(WorkflowError::NotSubmitting)
            }
        }
    }

    pub fn close(&mut self) {
        self.state = ActionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct BidInput {
        amount: String,
    }

    #[test]
    fn success_path_closes_and_clears_input() {
        let mut wf = ModalWorkflow::<BidInput>::new(ErrorDisplay::Inline);
        wf.open();
        wf.edit(|i| i.amount = "50".into()).unwrap();
        let sent = wf.submit().unwrap();
        assert_eq!(sent.amount, "50");
        assert!(wf.is_submitting());
        wf.succeed().unwrap();
        assert_eq!(wf.state(), &ActionState::Closed);
        wf.open();
        assert_eq!(wf.input(), Some(&BidInput::default()));
    }

    #[test]
    fn inline_failure_keeps_form_open_with_input() {
        let mut wf = ModalWorkflow::<BidInput>::new(ErrorDisplay::Inline);
        wf.open_with(BidInput { amount: "5".into() });
        wf.submit().unwrap();
        wf.fail("Bid too low").unwrap();
        assert_eq!(wf.error(), Some("Bid too low"));
        assert_eq!(wf.input().unwrap().amount, "5");
        wf.edit(|i| i.amount = "10".into()).unwrap();
        assert_eq!(wf.error(), None);
        assert!(wf.submit().is_ok());
    }

    #[test]
    fn blocking_modal_failure_closes_form() {
        let mut wf = ModalWorkflow::<BidInput>::new(ErrorDisplay::BlockingModal);
        wf.open();
        wf.submit().unwrap();
        wf.fail("Insufficient funds").unwrap();
        assert!(!wf.is_open());
    }

    #[test]
    fn double_submit_is_rejected() {
        let mut wf = ModalWorkflow::<BidInput>::new(ErrorDisplay::Inline);
        wf.open();
        wf.submit().unwrap();
        assert_eq!(wf.submit().unwrap_err(), WorkflowError::AlreadySubmitting);
        assert!(wf.is_submitting());
    }

    #[test]
    fn closed_form_cannot_submit() {
        let mut wf = ModalWorkflow::<BidInput>::new(ErrorDisplay::Inline);
        assert_eq!(wf.submit().unwrap_err(), WorkflowError::NotOpen);
        assert_eq!(wf.succeed().unwrap_err(), WorkflowError::NotSubmitting);
    }

    #[test]
    fn workflow_errors_display_as_std_errors() {
        let err: Box<dyn std::error::Error + Send + Sync> = Box::new(WorkflowError::AlreadySubmitting);
        assert_eq!(err.to_string(), "form is already submitting");
        assert_eq!(WorkflowError::NotOpen.to_string(), "form is not open");
    }
}
