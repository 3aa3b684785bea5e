//! Terminal styling for help text and diagnostics
// (c) 2024 Ross Younger

use anstyle::{AnsiColor, Color, Style};
use clap::builder::styling::Styles;

const fn fg(colour: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(colour)))
}

/// Fatal errors
pub(crate) const ERROR: Style = fg(AnsiColor::Red).bold();
const INVALID: Style = fg(AnsiColor::Yellow).bold();
const ACCENT: Style = fg(AnsiColor::Green);
/// Section headings, in help text and in the results summary
pub(crate) const HEADING: Style = fg(AnsiColor::Green).bold().underline();

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(HEADING)
    .header(HEADING)
    .literal(Style::new().bold())
    .invalid(INVALID)
    .error(ERROR)
    .valid(ACCENT.bold())
    .placeholder(ACCENT);
