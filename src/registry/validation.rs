//! Schema validation of a parsed invocation against its descriptor.
//!
//! Order is fixed so users see the most actionable error first: unknown
//! keywords, then values that fail coercion, then missing required params.

use super::params::{ParamSpec, ParamStyle};
use super::CommandDescriptor;
use crate::error::ShellError;
use crate::parser::ParsedInvocation;

pub fn validate(descriptor: &CommandDescriptor, inv: &ParsedInvocation) -> Result<(), ShellError> {
    let command = descriptor.name;

    if !descriptor.open_keywords {
        for key in inv.keyword.keys() {
            if descriptor.keyword(key).is_none() {
                return Err(ShellError::UnknownParameter {
                    command: command.to_string(),
                    param: key.clone(),
                });
            }
        }
    }

    let mut position = 0usize;
    let mut last_positional = None;
    for spec in &descriptor.params {
        let raw = match spec.style {
            ParamStyle::Keyword => inv.kw(spec.key),
            ParamStyle::Positional => {
                let v = inv.arg(position);
                position += 1;
                last_positional = Some(spec);
                v
            }
        };
        if let Some(raw) = raw {
            check_value(command, spec, raw)?;
        }
    }
    if let Some(spec) = last_positional.filter(|s| s.kind.is_repeatable()) {
        for raw in inv.positional.iter().skip(position) {
            check_value(command, spec, raw)?;
        }
    }

    let mut position = 0usize;
    for spec in &descriptor.params {
        let present = match spec.style {
            ParamStyle::Keyword => inv.keyword.contains_key(spec.key),
            ParamStyle::Positional => {
                let p = inv.positional.len() > position;
                position += 1;
                p
            }
        };
        if spec.required && !present {
            return Err(ShellError::MissingParameter {
                command: command.to_string(),
                param: spec.key.to_string(),
            });
        }
    }

    Ok(())
}

fn check_value(command: &str, spec: &ParamSpec, raw: &str) -> Result<(), ShellError> {
    spec.kind.check(raw).map_err(|reason| ShellError::InvalidValue {
        command: command.to_string(),
        param: spec.key.to_string(),
        value: raw.to_string(),
        reason,
    })
}
