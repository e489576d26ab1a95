use std::fmt::Display;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use console::{style, StyledObject};

/// How a message or counter should read at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Work in progress
    Active,
    Good,
    /// Failures were found, which is what the tool is for
    Attention,
    /// Something went wrong while processing
    Problem,
}

pub fn paint(text: impl Display, tone: Tone) -> StyledObject<String> {
    let styled = style(text.to_string()).bright();
    match tone {
        Tone::Active | Tone::Attention => styled.yellow(),
        Tone::Good => styled.green(),
        Tone::Problem => styled.red(),
    }
}

pub fn heading(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().underlined()
}

pub fn muted(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn accent(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn brand(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

pub fn stats_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stage").fg(TableColor::Cyan),
            Cell::new("Count").fg(TableColor::Cyan),
        ]);
    table
}

/// Green when zero, otherwise colored by `nonzero`.
pub fn count_cell(count: usize, nonzero: Tone) -> Cell {
    let color = match (count, nonzero) {
        (0, _) | (_, Tone::Good) => TableColor::Green,
        (_, Tone::Problem) => TableColor::Red,
        (_, Tone::Active | Tone::Attention) => TableColor::Yellow,
    };
    Cell::new(count).fg(color)
}
