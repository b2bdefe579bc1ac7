use anyhow::Result;
use client_core::ConfirmationGate;
use dialoguer::{Confirm, Input, Select};
use shared::domain::{Student, StudentId};

use crate::render;

/// Asks on the terminal; an unanswered prompt defaults to "no".
pub struct TerminalConfirm;

impl ConfirmationGate for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

pub fn search_text() -> Result<String> {
    Ok(Input::<String>::new()
        .with_prompt("Search by name or email (empty for everyone)")
        .allow_empty(true)
        .interact_text()?)
}

/// `None` when the user cancels the picker.
pub fn pick_student(candidates: &[&Student]) -> Result<Option<StudentId>> {
    let labels: Vec<String> = candidates.iter().map(|s| render::student_line(s)).collect();
    let picked = Select::new()
        .with_prompt("Add which student?")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(picked
        .and_then(|index| candidates.get(index))
        .map(|s| s.id))
}
