//! Statistics API response parsing
//!
//! Converts the loosely typed JSON the upstream API returns into the typed
//! [`TableBatch`] payloads the rest of the crate works with, validating the
//! per-kind shape at the boundary so nothing downstream has to handle opaque
//! maps.

use crate::client::{FetchError, FetchResult};
use crate::{ColumnData, ColumnValues, DiscoveredItem, SubResourceKind, SubResourcePayload, TableBatch};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

/// Raw discovery listing response.
#[derive(Debug, Deserialize)]
pub struct RawGameList {
    /// Games scheduled in the requested period
    pub games: Vec<RawGame>,
}

/// One game entry in the discovery listing.
#[derive(Debug, Deserialize)]
pub struct RawGame {
    /// Upstream game identifier
    #[serde(alias = "gameId")]
    pub game_id: String,
    /// Game date, `YYYY-MM-DD`
    #[serde(alias = "gameDate")]
    pub game_date: String,
}

/// Raw sub-resource response: a list of tabular result sets.
#[derive(Debug, Deserialize)]
pub struct RawResultSets {
    /// Tabular result sets carried by the response
    #[serde(alias = "resultSets")]
    pub result_sets: Vec<RawResultSet>,
}

/// One raw result set: headers plus a row-major value grid.
#[derive(Debug, Deserialize)]
pub struct RawResultSet {
    /// Result set name (e.g., "PlayerStats")
    pub name: String,
    /// Column headers
    pub headers: Vec<String>,
    /// Row-major cell values
    #[serde(alias = "rowSet")]
    pub row_set: Vec<Vec<Value>>,
}

/// Headers that must be present in the named result set for each kind.
///
/// Validation is a minimum contract, not a full schema: the upstream adds
/// columns between seasons and those must flow through untouched.
fn required_headers(kind: SubResourceKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        SubResourceKind::Traditional | SubResourceKind::Advanced => {
            ("PlayerStats", &["GAME_ID", "PLAYER_ID", "TEAM_ID"])
        }
        SubResourceKind::PlayByPlay => ("PlayByPlay", &["GAME_ID", "EVENTNUM", "PERIOD"]),
    }
}

/// Parse the discovery listing into validated [`DiscoveredItem`]s.
pub fn parse_game_list(raw: RawGameList) -> FetchResult<Vec<DiscoveredItem>> {
    let mut items = Vec::with_capacity(raw.games.len());
    for game in raw.games {
        let game_date = NaiveDate::parse_from_str(&game.game_date, "%Y-%m-%d").map_err(|e| {
            FetchError::Decode(format!(
                "game {}: unparseable date {:?}: {e}",
                game.game_id, game.game_date
            ))
        })?;
        let item = DiscoveredItem {
            game_id: game.game_id,
            game_date,
        };
        item.validate().map_err(FetchError::InvalidResponse)?;
        items.push(item);
    }
    Ok(items)
}

/// Parse a sub-resource response into a typed, validated payload.
pub fn parse_sub_resource(
    kind: SubResourceKind,
    raw: RawResultSets,
) -> FetchResult<SubResourcePayload> {
    let mut tables = Vec::with_capacity(raw.result_sets.len());
    for set in raw.result_sets {
        tables.push(parse_result_set(set)?);
    }

    validate_payload(kind, &tables)?;
    Ok(SubResourcePayload { kind, tables })
}

/// Per-kind boundary validation over parsed tables.
fn validate_payload(kind: SubResourceKind, tables: &[TableBatch]) -> FetchResult<()> {
    for table in tables {
        table.validate().map_err(FetchError::InvalidResponse)?;
    }

    // An entirely absent result-set list is a legitimate empty payload
    // (e.g., play-by-play not tracked for historic games).
    if tables.is_empty() {
        return Ok(());
    }

    let (expected_name, headers) = required_headers(kind);
    let table = tables.iter().find(|t| t.name == expected_name).ok_or_else(|| {
        FetchError::InvalidResponse(format!(
            "{kind} payload is missing expected result set {expected_name}"
        ))
    })?;

    for header in headers {
        if !table.columns.iter().any(|c| c.name == *header) {
            return Err(FetchError::InvalidResponse(format!(
                "{kind} result set {expected_name} is missing required column {header}"
            )));
        }
    }

    Ok(())
}

fn parse_result_set(set: RawResultSet) -> FetchResult<TableBatch> {
    let width = set.headers.len();
    for (idx, row) in set.row_set.iter().enumerate() {
        if row.len() != width {
            return Err(FetchError::InvalidResponse(format!(
                "result set {}: row {idx} has {} cells, expected {width}",
                set.name,
                row.len()
            )));
        }
    }

    let columns = set
        .headers
        .iter()
        .enumerate()
        .map(|(col, header)| ColumnData {
            name: header.clone(),
            values: parse_column(&set.row_set, col),
        })
        .collect();

    Ok(TableBatch {
        name: set.name,
        columns,
    })
}

/// Inferred JSON column type, widened across all rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredType {
    Int64,
    Float64,
    Utf8,
}

fn infer_column_type(rows: &[Vec<Value>], col: usize) -> InferredType {
    let mut inferred = InferredType::Int64;
    for row in rows {
        match &row[col] {
            Value::Null => {}
            Value::Number(n) => {
                if n.as_i64().is_none() && inferred == InferredType::Int64 {
                    inferred = InferredType::Float64;
                }
            }
            // Any non-numeric cell widens the whole column to strings.
            _ => return InferredType::Utf8,
        }
    }
    inferred
}

fn parse_column(rows: &[Vec<Value>], col: usize) -> ColumnValues {
    match infer_column_type(rows, col) {
        InferredType::Int64 => ColumnValues::Int64(
            rows.iter().map(|row| row[col].as_i64()).collect(),
        ),
        InferredType::Float64 => ColumnValues::Float64(
            rows.iter().map(|row| row[col].as_f64()).collect(),
        ),
        InferredType::Utf8 => ColumnValues::Utf8(
            rows.iter()
                .map(|row| match &row[col] {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
    }
}
