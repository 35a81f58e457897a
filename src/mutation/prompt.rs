//! Mutation Prompt Builder
//!
//! Builds the prompts that carry the current source image to a provider,
//! and extracts the candidate body from whatever comes back. Providers are
//! stateless, so everything the model needs rides in these two strings.

use regex::Regex;

// --- Immutable Constants ---

pub const MUTATION_SYSTEM_PROMPT: &str = r#"You are the mutation engine of a self-rewriting program.

You will be shown the complete current source of the program. Produce a complete
replacement source that fulfils the directive. Rules:
- Return the ENTIRE new source file, not a fragment or a diff.
- The result must be a single valid Rust source file.
- Reply with exactly one fenced code block and nothing else.
- Preserve behavior you were not asked to change.

A syntactically invalid reply is discarded without being applied."#;

/// Standing instruction used when no directive is supplied.
pub const AUTONOMOUS_DIRECTIVE: &str =
    "Choose one small, safe improvement to the program and apply it. \
     Prefer robustness and clarity over new features.";

/// Build the user prompt embedding the current image and the directive.
pub fn build_user_prompt(current_source: &str, directive: Option<&str>) -> String {
    let directive = directive.unwrap_or(AUTONOMOUS_DIRECTIVE);

    format!(
        "DIRECTIVE:\n{}\n\nCURRENT SOURCE:\n```rust\n{}\n```\n\nReply with the complete replacement source in one fenced code block.",
        directive, current_source
    )
}

/// Extract the candidate source body from a raw provider reply.
///
/// Prefers the first fenced code block. When the reply carries no fences,
/// falls back to the first line that looks like the start of a Rust item,
/// discarding any conversational preamble. Returns the trimmed remainder
/// either way; the validator has the final say.
pub fn extract_candidate(raw: &str) -> String {
    if raw.contains("```") {
        if let Some(block) = first_fenced_block(raw) {
            return block.trim().to_string();
        }
        // Unbalanced fences: strip the markers and hope for the best.
        return raw
            .replace("```rust", "")
            .replace("```", "")
            .trim()
            .to_string();
    }

    if let Some(start) = first_item_offset(raw) {
        return raw[start..].trim().to_string();
    }

    raw.trim().to_string()
}

fn first_fenced_block(raw: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```(?:rust)?\r?\n(.*?)```").ok()?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn first_item_offset(raw: &str) -> Option<usize> {
    let re = Regex::new(
        r"(?m)^(//!|#!\[|#\[|use |pub |fn |mod |struct |enum |impl |trait |const |static |extern )",
    )
    .ok()?;
    re.find(raw).map(|m| m.start())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_fenced_block() {
        let raw = "Here is the new version:\n```rust\nfn main() {}\n```\nGood luck!";
        assert_eq!(extract_candidate(raw), "fn main() {}");
    }

    #[test]
    fn test_extracts_plain_fence_without_language_tag() {
        let raw = "```\nuse std::fs;\nfn main() {}\n```";
        assert_eq!(extract_candidate(raw), "use std::fs;\nfn main() {}");
    }

    #[test]
    fn test_takes_first_of_multiple_blocks() {
        let raw = "```rust\nfn a() {}\n```\nand also\n```rust\nfn b() {}\n```";
        assert_eq!(extract_candidate(raw), "fn a() {}");
    }

    #[test]
    fn test_rescues_bare_code_after_preamble() {
        let raw = "Sure! I made the change you asked for.\n\nuse std::fs;\n\nfn main() {}\n";
        assert_eq!(extract_candidate(raw), "use std::fs;\n\nfn main() {}");
    }

    #[test]
    fn test_unbalanced_fence_strips_markers() {
        let raw = "```rust\nfn main() {}";
        assert_eq!(extract_candidate(raw), "fn main() {}");
    }

    #[test]
    fn test_user_prompt_embeds_source_and_directive() {
        let prompt = build_user_prompt("fn main() {}", Some("add logging"));
        assert!(prompt.contains("add logging"));
        assert!(prompt.contains("fn main() {}"));
    }

    #[test]
    fn test_user_prompt_autonomous_mode() {
        let prompt = build_user_prompt("fn main() {}", None);
        assert!(prompt.contains(AUTONOMOUS_DIRECTIVE));
    }
}
