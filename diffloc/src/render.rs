//! Static table rendering for CLI output.

use console::Style;
use diffloclib::{FileRecord, StatsAggregate};

const INDENT: &str = "    ";
const COLUMN_WIDTH: usize = 10;

struct Theme {
    header: Style,
    section: Style,
    table_header: Style,
    separator: Style,
    value: Style,
    muted: Style,
    addition: Style,
    deletion: Style,
    accent: Style,
    label: Style,
}

impl Theme {
    fn new() -> Self {
        Self {
            header: Style::new().bold().magenta(),
            section: Style::new().bold().cyan(),
            table_header: Style::new().bold(),
            separator: Style::new().dim(),
            value: Style::new().bold(),
            muted: Style::new().dim(),
            addition: Style::new().green(),
            deletion: Style::new().red(),
            accent: Style::new().bold().yellow(),
            label: Style::new().dim(),
        }
    }
}

/// Render the full report: file sections followed by the summary.
///
/// Added/removed columns are shown only when the run has changes.
pub fn render_stats(stats: &StatsAggregate) -> String {
    let theme = Theme::new();
    let show_changes = stats.has_changes();
    let mut out = String::new();

    out.push_str(&format!("{}\n\n", theme.header.apply_to("diffloc: Diff Line Counter")));

    if show_changes {
        if !stats.unchanged_files.is_empty() {
            push_section(&mut out, &theme, stats.unchanged_files.len(), "Unchanged Files");
            push_table(&mut out, &theme, stats.unchanged_files.iter(), false, true);
        }
        if !stats.changed_files.is_empty() {
            push_section(&mut out, &theme, stats.changed_files.len(), "Changed Files");
            push_table(&mut out, &theme, stats.changed_files.iter(), true, true);
        }
    } else {
        let count = stats.changed_files.len() + stats.unchanged_files.len();
        if count > 0 {
            push_section(&mut out, &theme, count, "Files");
            push_table(&mut out, &theme, stats.files(), false, false);
        }
    }

    push_summary(&mut out, &theme, stats, show_changes);
    out
}

fn push_section(out: &mut String, theme: &Theme, count: usize, title: &str) {
    out.push_str(&format!(
        "{}\n",
        theme.section.apply_to(format!("[{}] {}", count, title))
    ));
}

fn push_table<'a>(
    out: &mut String,
    theme: &Theme,
    files: impl Iterator<Item = &'a FileRecord>,
    changed: bool,
    change_columns: bool,
) {
    let mut header = format!("{:<w$}  ", "LINES", w = COLUMN_WIDTH);
    if change_columns {
        header.push_str(&format!("{:<w$}  {:<w$}  ", "ADDED", "REMOVED", w = COLUMN_WIDTH));
    }
    header.push_str("FILE PATH");
    out.push_str(&format!("{INDENT}{}\n", theme.table_header.apply_to(header)));

    let width = if change_columns { 90 } else { 60 };
    out.push_str(&format!("{INDENT}{}\n", theme.separator.apply_to("─".repeat(width))));

    for file in files {
        out.push_str(INDENT);
        out.push_str(&format!(
            "{}  ",
            theme.value.apply_to(format!("{:<w$}", file.line_count, w = COLUMN_WIDTH))
        ));

        if change_columns {
            push_change_cell(out, theme, file.added, '+', &theme.addition);
            push_change_cell(out, theme, file.removed, '-', &theme.deletion);
        }

        let marker = if changed && change_columns {
            change_marker(file)
        } else {
            ""
        };
        out.push_str(&format!("{}{}\n", marker, file.path));
    }
    out.push('\n');
}

fn push_change_cell(out: &mut String, theme: &Theme, value: u64, sign: char, style: &Style) {
    if value > 0 {
        let cell = format!("{}{:<w$}", sign, value, w = COLUMN_WIDTH - 1);
        out.push_str(&format!("{}  ", style.apply_to(cell)));
    } else {
        let cell = format!("{:<w$}", "—", w = COLUMN_WIDTH);
        out.push_str(&format!("{}  ", theme.muted.apply_to(cell)));
    }
}

/// Path prefix for a changed file.
fn change_marker(file: &FileRecord) -> &'static str {
    match (file.added > 0, file.removed > 0) {
        (true, true) => "◆ ",
        (true, false) => "+ ",
        (false, true) => "- ",
        (false, false) => "",
    }
}

fn push_summary(out: &mut String, theme: &Theme, stats: &StatsAggregate, show_changes: bool) {
    out.push_str(&format!("{}\n", theme.table_header.apply_to("SUMMARY")));
    out.push_str(&format!("{}\n", theme.separator.apply_to("─".repeat(60))));

    if !show_changes {
        out.push_str(&format!(
            "{} {}\n",
            theme.label.apply_to("Total Files:"),
            theme.value.apply_to(stats.total_files)
        ));
        out.push_str(&format!(
            "{} {}\n",
            theme.label.apply_to("Total Lines:"),
            theme.value.apply_to(stats.total_lines)
        ));
        return;
    }

    let net = match stats.net_change {
        n if n > 0 => theme.addition.apply_to(format!("▲ +{} lines", n)),
        n if n < 0 => theme.deletion.apply_to(format!("▼ {} lines", n)),
        _ => theme.muted.apply_to("● no change".to_string()),
    };
    out.push_str(&format!("{}  {}\n", theme.label.apply_to("Net Change:"), net));

    out.push_str(&format!(
        "{}       {}{}{}{}{}{}\n",
        theme.label.apply_to("Files:"),
        theme.value.apply_to(stats.total_files),
        theme.label.apply_to(" total  •  "),
        theme.accent.apply_to(stats.changed_count),
        theme.label.apply_to(" changed  •  "),
        theme.muted.apply_to(stats.unchanged_count),
        theme.label.apply_to(" unchanged"),
    ));
    out.push_str(&format!(
        "{} {}\n",
        theme.label.apply_to("Total Lines:"),
        theme.value.apply_to(stats.total_lines)
    ));
    out.push_str(&format!(
        "{}    {}{}{}{}\n",
        theme.label.apply_to("Changes:"),
        theme.addition.apply_to(format!("+{}", stats.total_additions)),
        theme.label.apply_to(" added  •  "),
        theme.deletion.apply_to(format!("-{}", stats.total_deletions)),
        theme.label.apply_to(" removed"),
    ));
}
