use atty::Stream;
use color_eyre::Result;
use fnport_core::{CommandStatus, ExecutionOutcome};
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(
    opts: &OutputOptions,
    command: &str,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = outcome.exit_code();

    if opts.json {
        let payload = fnport_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if let CommandStatus::Ok = outcome.status {
        if opts.quiet {
            return Ok(code);
        }
        let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
        let message = fnport_core::format_status_message(command, &outcome.message);
        println!("{}", style.status(&outcome.status, &message));
        for line in summary_lines(&outcome.details) {
            println!("  {line}");
        }
        for warning in warnings_from_details(&outcome.details) {
            println!("{}", style.warning(&format!("warning: {warning}")));
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Tip: {hint}")));
        }
    } else {
        let style = Style::new(opts.no_color, atty::is(Stream::Stderr));
        let header = match code_from_details(&outcome.details) {
            Some(code) => format!("{code}  {}", outcome.message),
            None => fnport_core::format_status_message(command, &outcome.message),
        };
        eprintln!("{}", style.error_header(&header));
        if let Some(reason) = error_from_details(&outcome.details) {
            eprintln!();
            eprintln!("Why:");
            eprintln!("  • {reason}");
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!();
            eprintln!("Fix:");
            eprintln!("{}", style.fix_bullet(&format!("  • {hint}")));
        }
    }

    Ok(code)
}

fn summary_lines(details: &Value) -> Vec<String> {
    let Some(map) = details.as_object() else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for (key, label) in [
        ("handler_path", "handler"),
        ("archive_out", "archive"),
        ("archive_sha256", "sha256"),
        ("module_path", "module"),
    ] {
        if let Some(value) = map.get(key).and_then(Value::as_str) {
            lines.push(format!("{label}: {value}"));
        }
    }
    lines
}

fn warnings_from_details(details: &Value) -> Vec<String> {
    let mut warnings: Vec<String> = details
        .get("warnings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(path) = details.get("handler_warning").and_then(Value::as_str) {
        warnings.push(format!("built without the expected handler file {path}"));
    }
    warnings
}

fn code_from_details(details: &Value) -> Option<&str> {
    details.get("code").and_then(Value::as_str)
}

fn error_from_details(details: &Value) -> Option<&str> {
    details.get("error").and_then(Value::as_str)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}
