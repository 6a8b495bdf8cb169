//! # Report Output
//!
//! Rendering of reconciliation reports and status lines for the terminal.
//!
//! Symbols are shown as emoji only when the terminal takes colors; otherwise
//! a bracketed plain word is printed, so that logs and pipes stay greppable.
//! Color support follows, in order:
//!
//! - `--color=always|never`, overriding everything else
//! - `NO_COLOR` (any value, see https://no-color.org/)
//! - `CLICOLOR=0` and `CLICOLOR_FORCE=1`
//! - `TERM=dumb`
//! - whether stdout is a color-capable terminal
//!
//! ```
//! use kdb_state::output::{OutputConfig, Symbol};
//! use kdb_state::reconcile::{Outcome, ResourceReport};
//!
//! let out = OutputConfig::from_env_and_flag("never");
//! assert_eq!(out.symbol(Symbol::Drift), "[DRIFT]");
//!
//! let mut report = ResourceReport::new("key user/app/port");
//! report.outcome = Outcome::Created;
//! assert_eq!(out.resource_line(&report), "+ key user/app/port (created)");
//! ```

use std::env;

use crate::reconcile::{Outcome, Report, ResourceReport};

/// Status symbols printed in front of CLI messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Ok,
    Error,
    Scan,
    Info,
    Plan,
    DryRun,
    Drift,
}

impl Symbol {
    fn emoji(self) -> &'static str {
        match self {
            Symbol::Ok => "✅",
            Symbol::Error => "❌",
            Symbol::Scan => "🔍",
            Symbol::Info => "📊",
            Symbol::Plan => "🔄",
            Symbol::DryRun => "🔎",
            Symbol::Drift => "⚠️",
        }
    }

    fn plain(self) -> &'static str {
        match self {
            Symbol::Ok => "[OK]",
            Symbol::Error => "[ERR]",
            Symbol::Scan => "[SCAN]",
            Symbol::Info => "[INFO]",
            Symbol::Plan => "[PLAN]",
            Symbol::DryRun => "[DRY RUN]",
            Symbol::Drift => "[DRIFT]",
        }
    }
}

/// How CLI output is rendered.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Emoji and the colored in-sync marker are used.
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag (`always`, `never` or `auto`) against the
    /// environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_ascii_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => terminal_wants_color(),
        };
        Self { use_color }
    }

    pub fn symbol(&self, symbol: Symbol) -> &'static str {
        if self.use_color {
            symbol.emoji()
        } else {
            symbol.plain()
        }
    }

    /// Marker of a resource line: `+` created, `~` updated, `-` removed.
    pub fn marker(&self, outcome: Outcome) -> &'static str {
        match outcome {
            Outcome::Unchanged if self.use_color => "✓",
            Outcome::Unchanged => "=",
            Outcome::Created => "+",
            Outcome::Updated => "~",
            Outcome::Removed => "-",
        }
    }

    /// `<marker> <resource> (<outcome>)`
    pub fn resource_line(&self, report: &ResourceReport) -> String {
        format!(
            "{} {} ({})",
            self.marker(report.outcome),
            report.resource,
            report.outcome
        )
    }

    /// Report lines for every changed resource, or every resource when
    /// `verbose`, each followed by its indented changes.
    pub fn report_lines(&self, report: &Report, verbose: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for resource in &report.resources {
            if !resource.is_changed() && !verbose {
                continue;
            }
            lines.push(self.resource_line(resource));
            lines.extend(resource.changes.iter().map(|change| format!("    {}", change)));
        }
        lines
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Closing line of a report.
pub fn summary_line(report: &Report) -> String {
    let changed = report.changed().count();
    let unchanged = report.resources.len() - changed;
    if report.dry_run {
        format!("Summary: {} to change, {} in sync", changed, unchanged)
    } else {
        format!("Summary: {} changed, {} unchanged", changed, unchanged)
    }
}

fn terminal_wants_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match env::var("CLICOLOR") {
        Ok(value) if value == "0" => return false,
        _ => {}
    }
    if env::var("CLICOLOR_FORCE").is_ok_and(|value| !value.is_empty() && value != "0") {
        return true;
    }
    if env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }
    console::Term::stdout().features().colors_supported()
}
