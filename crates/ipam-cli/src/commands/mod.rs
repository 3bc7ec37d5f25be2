//! CLI commands

pub mod binding;
pub mod scheme;
pub mod subnet;
pub mod template;

pub use binding::BindingCommand;
pub use scheme::SchemeCommand;
pub use subnet::SubnetCommand;
pub use template::TemplateCommand;

use anyhow::Result;
use serde::Serialize;

/// Print `value` as pretty JSON or through its text renderer
pub(crate) fn emit<T: Serialize>(
    json: bool,
    value: &T,
    render: impl FnOnce(&T) -> String,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render(value));
    }
    Ok(())
}

pub(crate) fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
