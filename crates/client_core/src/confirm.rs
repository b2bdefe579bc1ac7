use anyhow::Result;

/// Yes/no approval consulted before a destructive command is sent.
///
/// `Ok(false)` means the user declined; an `Err` means no answer could be
/// obtained. Both stop the command.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Approves every prompt without asking (`--yes`).
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}
