//! Help text generated from the command table.
//!
//! Three tiers: no topic lists every command, a classification slug lists
//! that class, a command name shows its usage and parameters.

use super::params::ParamStyle;
use super::{Classification, CommandDescriptor, CommandRegistry};

/// Width of the name column in listings.
const NAME_WIDTH: usize = 20;

pub fn help_text(registry: &CommandRegistry, topic: Option<&str>) -> String {
    let Some(topic) = topic else {
        let mut lines = vec!["Available commands:".to_string()];
        for descriptor in registry.descriptors() {
            push_entry(&mut lines, descriptor);
        }
        lines.push(String::new());
        lines.push(
            "Use 'help <command>' for parameters, 'help read|write|utility' for one class."
                .to_string(),
        );
        return lines.join("\n");
    };

    // Command name first (tier 3), then classification (tier 2).
    if let Some(descriptor) = registry.get(topic) {
        return command_help(descriptor);
    }

    let lower = topic.to_ascii_lowercase();
    if let Some(class) = Classification::all().iter().find(|c| c.slug() == lower) {
        let mut lines = vec![format!("{} commands ({}):", class.slug(), class.description())];
        for descriptor in registry
            .descriptors()
            .filter(|d| d.classification == *class)
        {
            push_entry(&mut lines, descriptor);
        }
        return lines.join("\n");
    }

    format!("No help available for: {topic}")
}

/// `  name                 - first line`, continuation lines aligned under it.
fn push_entry(lines: &mut Vec<String>, descriptor: &CommandDescriptor) {
    let mut desc = descriptor.description.lines();
    let first = desc.next().unwrap_or_default();
    lines.push(format!("  {:NAME_WIDTH$} - {first}", descriptor.name));
    for line in desc {
        lines.push(format!("  {:NAME_WIDTH$}   {line}", ""));
    }
}

fn command_help(descriptor: &CommandDescriptor) -> String {
    let mut lines = vec![
        format!("{}: {}", descriptor.name, descriptor.description),
        format!("Usage: {}", descriptor.usage),
        format!("Class: {}", descriptor.classification.slug()),
    ];

    if !descriptor.params.is_empty() {
        lines.push("Parameters:".to_string());
        for spec in &descriptor.params {
            let style = match spec.style {
                ParamStyle::Positional => "positional",
                ParamStyle::Keyword => "keyword",
            };
            let required = if spec.required { "required" } else { "optional" };
            lines.push(format!(
                "  {:12} {style}, {required}, {}",
                spec.usage(),
                spec.kind.hint()
            ));
        }
    }
    if descriptor.open_keywords {
        lines.push("Extra KEY=VALUE pairs are passed through unchanged.".to_string());
    }
    lines.join("\n")
}
