//! Prompts
//!
//! Interactive terminal prompts for the setup wizard.
//! Uses the `dialoguer` crate for input handling.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;

/// Prompt the user for a required string value.
/// Repeats until a non-empty value is entered.
pub fn prompt_required(label: &str) -> Result<String> {
    loop {
        let value: String = Input::new()
            .with_prompt(format!("  {} {}", "\u{2192}".cyan(), label.white()))
            .allow_empty(true)
            .interact_text()?;

        let trimmed = value.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
        println!("{}", "  This field is required.".yellow());
    }
}

/// Prompt the user for an optional string value. Empty input means `None`.
pub fn prompt_optional(label: &str) -> Result<Option<String>> {
    let value: String = Input::new()
        .with_prompt(format!("  {} {}", "\u{2192}".cyan(), label.white()))
        .allow_empty(true)
        .interact_text()?;

    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed))
    }
}

/// Prompt for a value with a default shown and used on empty input.
pub fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let value: String = Input::new()
        .with_prompt(format!("  {} {}", "\u{2192}".cyan(), label.white()))
        .default(default.to_string())
        .interact_text()?;

    Ok(value.trim().to_string())
}
