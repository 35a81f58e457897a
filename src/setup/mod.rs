//! Setup Wizard
//!
//! Interactive first-run setup. Walks through the source image location,
//! the provider failover list, and the optional standing directive, then
//! saves the configuration with restrictive permissions.

pub mod prompts;

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Confirm, Select};

use crate::config::{derive_backup_dir, get_config_path, save_config};
use crate::types::{default_config, AgentConfig, ProviderDescriptor, ProviderKind};

use prompts::{prompt_optional, prompt_required, prompt_with_default};

const BANNER: &str = r#"
  __  __ ___ _____ _   __  __  ___  ___ ___ _  _
 |  \/  | __|_   _/_\ |  \/  |/ _ \| _ \ _ \ || |
 | |\/| | _|  | |/ _ \| |\/| | (_) |   /  _/ __ |
 |_|  |_|___| |_/_/ \_\_|  |_|\___/|_|_\_| |_||_|
"#;

/// Run the interactive setup wizard.
/// Returns a fully populated `AgentConfig`, already saved to disk.
pub fn run_setup_wizard() -> Result<AgentConfig> {
    println!("{}", BANNER.cyan());
    println!(
        "{}",
        "  First-run setup. Let's wire up the mutation loop.\n".white()
    );

    let mut config = default_config();

    // ---- 1. Identity --------------------------------------------------------
    println!("{}", "  [1/4] Identity".cyan());
    config.name = prompt_with_default("Agent name", "metamorph")?;
    println!();

    // ---- 2. Source image ----------------------------------------------------
    println!("{}", "  [2/4] Source image".cyan());
    config.source_path = prompt_required("Path to the source file this agent rewrites")?;
    config.backup_dir = derive_backup_dir(&config.source_path);
    if !std::path::Path::new(&crate::config::resolve_path(&config.source_path)).exists() {
        println!(
            "{}",
            "  Warning: that file does not exist yet. The first cycle will fail until it does.\n"
                .yellow()
        );
    } else {
        println!();
    }

    // ---- 3. Providers -------------------------------------------------------
    println!("{}", "  [3/4] Providers (failover order)".cyan());
    loop {
        config.providers.push(prompt_provider()?);

        let another = Confirm::new()
            .with_prompt("  Add a fallback provider?")
            .default(false)
            .interact()?;
        if !another {
            break;
        }
    }
    println!(
        "{}",
        format!("  {} provider(s) configured.\n", config.providers.len()).green()
    );

    // ---- 4. Directive -------------------------------------------------------
    println!("{}", "  [4/4] Directive".cyan());
    config.directive = prompt_optional("Standing directive (empty for autonomous mode)")?;
    println!();

    save_config(&config)?;
    println!(
        "{}",
        format!("  Config saved to {}\n", get_config_path().display()).green()
    );

    Ok(config)
}

/// Ask for one provider descriptor.
fn prompt_provider() -> Result<ProviderDescriptor> {
    let choices = &["OpenRouter", "Gemini", "Custom OpenAI-compatible"];
    let selection = Select::new()
        .with_prompt("  Provider")
        .items(choices)
        .default(0)
        .interact()?;

    let (name, kind, endpoint, default_model) = match selection {
        0 => (
            "openrouter".to_string(),
            ProviderKind::Openai,
            "https://openrouter.ai/api/v1".to_string(),
            "deepseek/deepseek-chat",
        ),
        1 => (
            "gemini".to_string(),
            ProviderKind::Gemini,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
            "gemini-2.0-flash",
        ),
        _ => {
            let name = prompt_required("Provider name")?;
            let endpoint = prompt_required("Base URL (e.g. https://api.example.com/v1)")?;
            (name, ProviderKind::Openai, endpoint, "gpt-4o")
        }
    };

    let model = prompt_with_default("Model", default_model)?;
    let api_key = prompt_required("API key")?;

    Ok(ProviderDescriptor {
        name,
        kind,
        endpoint,
        model,
        api_key,
        api_key_env: None,
    })
}
