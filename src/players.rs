//! Player table handling: CSV parsing, column validation, and rendering of the
//! static data artifact.

use crate::error::StepError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::mem::take;

/// Columns the CSV snapshot must carry.
pub const REQUIRED_COLUMNS: [&str; 17] = [
    "Name", "Team", "Pos", "g", "min", "pts", "3", "reb", "ast", "stl", "blk", "fg%", "fga",
    "ft%", "fta", "to", "USG",
];

/// Column order of the generated static table.
pub const STATIC_COLUMNS: [&str; 30] = [
    "Round", "Rank", "Value", "Name", "Team", "Pos", "Inj", "g", "min", "pts", "3", "reb", "ast",
    "stl", "blk", "fg%", "fga", "ft%", "fta", "to", "USG", "pV", "3V", "rV", "aV", "sV", "bV",
    "fg%V", "ft%V", "toV",
];

const PERCENT_COLUMNS: [&str; 2] = ["fg%", "ft%"];

const TWO_DECIMAL_COLUMNS: [&str; 11] = [
    "Value", "USG", "pV", "3V", "rV", "aV", "sV", "bV", "fg%V", "ft%V", "toV",
];

/// Quote and CRLF tolerant delimited-text parser.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush the trailing row even if quotes were unterminated.
    row.push(field);
    if !(row.len() == 1 && row[0].is_empty()) {
        rows.push(row);
    }
    rows
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn push_row(out: &mut String, row: &[String], sep: char) {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        if needs_quotes(cell, sep) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// A parsed CSV snapshot: trimmed headers plus one map per row.
#[derive(Debug, Clone)]
pub struct PlayerTable {
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl PlayerTable {
    /// Parse comma-separated text. Returns `None` when there is no header row.
    pub fn from_csv(text: &str) -> Option<Self> {
        let mut rows = parse_rows(text.trim_start_matches('\u{feff}'), ',').into_iter();
        let headers: Vec<String> = rows.next()?.iter().map(|h| h.trim().to_string()).collect();
        let rows = rows
            .map(|cells| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect();
        Some(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn validate_columns(&self) -> Result<(), StepError> {
        validate_columns(&self.headers)
    }

    pub fn players(&self) -> Vec<Player> {
        self.rows.iter().map(Player::from_row).collect()
    }
}

pub fn validate_columns(headers: &[String]) -> Result<(), StepError> {
    let present: BTreeSet<&str> = headers.iter().map(|h| h.trim()).collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !present.contains(*c))
        .map(|c| c.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StepError::MissingColumns(missing))
    }
}

/// Exact header first, then its lowercase form.
fn lookup<'a>(row: &'a HashMap<String, String>, column: &str) -> &'a str {
    row.get(column)
        .or_else(|| row.get(&column.to_lowercase()))
        .map(String::as_str)
        .unwrap_or("")
}

/// Normalize a percentage to the `.577` style.
pub fn format_percentage(value: &str) -> String {
    let value = value.trim();
    if value.starts_with('.') {
        return value.to_string();
    }
    match value.parse::<f64>() {
        // `{:?}` gives the shortest round-trip form, so "0.5770" becomes ".577".
        Ok(v) if v < 1.0 => {
            let repr = format!("{:?}", v);
            format!(".{}", repr.split_once('.').map_or("0", |(_, frac)| frac))
        }
        _ => value.to_string(),
    }
}

fn format_two_decimals(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(v) => format!("{:.2}", v),
        Err(_) => value.to_string(),
    }
}

/// One output row in `STATIC_COLUMNS` order.
pub fn static_row(row: &HashMap<String, String>) -> Vec<String> {
    STATIC_COLUMNS
        .iter()
        .map(|col| {
            let raw = lookup(row, col);
            if PERCENT_COLUMNS.contains(col) {
                format_percentage(raw)
            } else if TWO_DECIMAL_COLUMNS.contains(col) {
                format_two_decimals(raw)
            } else {
                raw.to_string()
            }
        })
        .collect()
}

/// Render the tab-separated static table artifact.
pub fn render_table(table: &PlayerTable, generated_at: &str) -> String {
    let mut out = String::new();
    out.push_str("# nba_static_data\n");
    out.push_str(&format!("# Auto-generated on {}\n", generated_at));
    out.push_str(&format!("# Contains {} NBA players\n", table.len()));
    let header: Vec<String> = STATIC_COLUMNS.iter().map(|c| c.to_string()).collect();
    push_row(&mut out, &header, '\t');
    for row in &table.rows {
        push_row(&mut out, &static_row(row), '\t');
    }
    out
}

#[derive(Debug, Serialize)]
struct JsonArtifact<'a> {
    generated_at: &'a str,
    count: usize,
    players: &'a [Player],
}

/// Render the JSON artifact with derived per-game stats.
pub fn render_json(players: &[Player], generated_at: &str) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonArtifact {
        generated_at,
        count: players.len(),
        players,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjuryStatus {
    Healthy,
    Injured,
    Questionable,
    DayToDay,
    Out,
    Suspended,
}

impl InjuryStatus {
    /// Map a free-form injury note. Checks run in a fixed order, so the
    /// first matching fragment wins.
    pub fn from_note(note: &str) -> Self {
        let inj = note.to_lowercase();
        if inj.contains("inj") || inj.contains("out") {
            InjuryStatus::Injured
        } else if inj.contains('q') {
            InjuryStatus::Questionable
        } else if inj.contains('d') || inj.contains("probable") {
            InjuryStatus::DayToDay
        } else if inj.contains('x') {
            InjuryStatus::Out
        } else if inj.contains("susp") {
            InjuryStatus::Suspended
        } else {
            InjuryStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub team: String,
    pub position: String,
    pub injury: String,
    pub games: f64,
    pub minutes: f64,
    pub points: f64,
    pub threes: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub fg_pct: f64,
    pub fga: f64,
    pub ft_pct: f64,
    pub fta: f64,
    pub turnovers: f64,
    pub usage: f64,
    pub pts_per_game: f64,
    pub reb_per_game: f64,
    pub ast_per_game: f64,
    pub stl_per_game: f64,
    pub blk_per_game: f64,
    pub to_per_game: f64,
    pub fantasy_points: f64,
    pub injury_status: InjuryStatus,
}

fn parse_number(raw: &str) -> f64 {
    let cleaned = raw.trim().trim_end_matches('$').replace(',', "");
    cleaned.parse().unwrap_or(0.0)
}

fn parse_pct(raw: &str) -> f64 {
    let raw = raw.trim();
    if let Some(frac) = raw.strip_prefix('.') {
        format!("0.{}", frac).parse().unwrap_or(0.0)
    } else {
        raw.parse().unwrap_or(0.0)
    }
}

impl Player {
    pub fn from_row(row: &HashMap<String, String>) -> Self {
        let num = |col: &str| parse_number(lookup(row, col));
        let games = num("g");
        let per = if games == 0.0 { 1.0 } else { games };

        let points = num("pts");
        let rebounds = num("reb");
        let assists = num("ast");
        let steals = num("stl");
        let blocks = num("blk");
        let turnovers = num("to");

        let pts_per_game = points / per;
        let reb_per_game = rebounds / per;
        let ast_per_game = assists / per;
        let stl_per_game = steals / per;
        let blk_per_game = blocks / per;
        let to_per_game = turnovers / per;

        let injury = lookup(row, "Inj").trim().to_string();
        Self {
            name: lookup(row, "Name").trim().to_string(),
            team: lookup(row, "Team").trim().to_string(),
            position: lookup(row, "Pos").trim().to_string(),
            injury_status: InjuryStatus::from_note(&injury),
            injury,
            games,
            minutes: num("min"),
            points,
            threes: num("3"),
            rebounds,
            assists,
            steals,
            blocks,
            fg_pct: parse_pct(lookup(row, "fg%")),
            fga: num("fga"),
            ft_pct: parse_pct(lookup(row, "ft%")),
            fta: num("fta"),
            turnovers,
            usage: num("USG"),
            pts_per_game,
            reb_per_game,
            ast_per_game,
            stl_per_game,
            blk_per_game,
            to_per_game,
            fantasy_points: fantasy_points(
                pts_per_game,
                reb_per_game,
                ast_per_game,
                stl_per_game,
                blk_per_game,
                to_per_game,
            ),
        }
    }
}

/// Per-game fantasy score.
pub fn fantasy_points(pts: f64, reb: f64, ast: f64, stl: f64, blk: f64, to: f64) -> f64 {
    pts + 1.2 * reb + 1.5 * ast + 2.0 * stl + 2.0 * blk - to
}
