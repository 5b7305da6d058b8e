//! Check command - show which target rules select a process name.

use anyhow::{bail, Result};
use mter_core::{MterConfig, TargetRule};
use serde::Serialize;

#[derive(Serialize)]
struct RuleCheck {
    entry: String,
    rule: Option<TargetRule>,
    error: Option<String>,
    matches: bool,
}

pub fn run(name: &str, rules: Vec<String>, json: bool) -> Result<()> {
    let entries = if rules.is_empty() {
        MterConfig::from_env()?.targets
    } else {
        rules
            .iter()
            .flat_map(|r| TargetRule::split_entries(r))
            .map(str::to_string)
            .collect()
    };

    if entries.is_empty() {
        bail!("No target rules given and MTER is not set");
    }

    let checks: Vec<RuleCheck> = entries
        .into_iter()
        .map(|entry| match TargetRule::parse(&entry) {
            Ok(rule) => RuleCheck {
                matches: rule.matches(name),
                entry,
                rule: Some(rule),
                error: None,
            },
            Err(e) => RuleCheck {
                entry,
                rule: None,
                error: Some(e.to_string()),
                matches: false,
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
        return Ok(());
    }

    println!("{:<7} {:<30} RULE", "MATCH", "ENTRY");
    println!("{}", "-".repeat(60));

    for check in &checks {
        let mark = if check.matches { "yes" } else { "no" };
        let detail = match (&check.rule, &check.error) {
            (Some(rule), _) => rule.to_string(),
            (None, Some(error)) => format!("invalid: {}", error),
            (None, None) => String::new(),
        };
        println!("{:<7} {:<30} {}", mark, check.entry, detail);
    }

    match checks.iter().find(|c| c.matches) {
        Some(first) => println!("\n{} is exported by '{}'", name, first.entry),
        None => println!("\n{} is not exported", name),
    }
    Ok(())
}
