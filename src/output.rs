//! # Report Output
//!
//! Rendering of objective reports for the terminal. Whether colors and
//! symbols are used is decided once per run from `--color` and, in `auto`
//! mode, from the environment: `NO_COLOR` and `CLICOLOR=0` switch them off,
//! `CLICOLOR_FORCE` switches them on, a dumb terminal or a redirected
//! stdout falls back to plain `[OK]`-style markers.
//!
//! ```rust,ignore
//! use caas::output::{OutputConfig, render_objective};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! print!("{}", render_objective(&config, &report, false));
//! ```

use std::env;
use std::fmt::Write as _;

use console::style;

use crate::template::{Objective, Status};

/// How reports are printed.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Colored status symbols instead of bracketed words.
    pub use_color: bool,
}

impl OutputConfig {
    /// `color_flag` is the `--color` value; anything but `always` or
    /// `never` means auto-detect.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = if color_flag.eq_ignore_ascii_case("always") {
            true
        } else if color_flag.eq_ignore_ascii_case("never") {
            false
        } else {
            terminal_wants_color()
        };
        Self { use_color }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

fn terminal_wants_color() -> bool {
    let set = |name: &str| env::var(name).ok();
    if env::var_os("NO_COLOR").is_some() || set("CLICOLOR").as_deref() == Some("0") {
        return false;
    }
    match set("CLICOLOR_FORCE").as_deref() {
        Some("") | Some("0") | None => {}
        Some(_) => return true,
    }
    set("TERM").as_deref() != Some("dumb") && console::Term::stdout().features().colors_supported()
}

/// Returns `symbol` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, symbol: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        symbol
    } else {
        plain
    }
}

/// Marker printed in front of an objective.
pub fn status_marker(config: &OutputConfig, status: Status) -> String {
    let (symbol, plain) = match status {
        Status::Ok => ("✔", "[OK]"),
        Status::NeedsConfigure => ("✘", "[DIFF]"),
        Status::Error => ("‼", "[ERROR]"),
    };
    let marker = emoji(config, symbol, plain);
    if !config.use_color {
        return marker.to_string();
    }
    match status {
        Status::Ok => style(marker).green().to_string(),
        Status::NeedsConfigure => style(marker).yellow().to_string(),
        Status::Error => style(marker).red().bold().to_string(),
    }
}

/// Indented text rendering of a report.
///
/// Children whose subtree is entirely `Ok` and silent are left out unless
/// `verbose` is set.
pub fn render_objective(config: &OutputConfig, objective: &Objective, verbose: bool) -> String {
    let mut out = String::new();
    render_into(&mut out, config, objective, 0, verbose);
    out
}

fn render_into(
    out: &mut String,
    config: &OutputConfig,
    objective: &Objective,
    depth: usize,
    verbose: bool,
) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{}{} {}",
        indent,
        status_marker(config, objective.status()),
        objective.target()
    );
    if verbose || !objective.is_ok() {
        for message in objective.messages() {
            let _ = writeln!(out, "{}    {}", indent, message);
        }
    }
    for child in objective.children() {
        if verbose || !child.is_ok() || depth == 0 {
            render_into(out, config, child, depth + 1, verbose);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_flag_overrides_detection() {
        assert!(OutputConfig::from_env_and_flag("ALWAYS").use_color);
        assert!(!OutputConfig::from_env_and_flag("never").use_color);
    }

    #[test]
    fn test_emoji_helper() {
        assert_eq!(emoji(&OutputConfig::with_color(), "✔", "[OK]"), "✔");
        assert_eq!(emoji(&OutputConfig::without_color(), "✔", "[OK]"), "[OK]");
    }

    #[test]
    fn test_render_objective_plain() {
        let mut root = Objective::new("organization acme");
        let mut role = Objective::new("role Approver");
        role.needs("role Approver is missing");
        root.push(role);
        let mut package = Objective::new("package Orders");
        package.note("loaded");
        root.push(package);

        let text = render_objective(&OutputConfig::without_color(), &root, false);
        assert_eq!(
            text,
            "[DIFF] organization acme\n  [DIFF] role Approver\n      role Approver is missing\n  [OK] package Orders\n"
        );
    }
}
