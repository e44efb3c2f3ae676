//! Parser for the runner's human-readable `migrate status` table.
//!
//! The CLI prints a few informational lines, then a header that starts with
//! `VERSION`, then one row per step:
//!
//! ```text
//! VERSION        NAME          SOURCE STATUS  DATABASE STATUS
//! 0              init          Present        Present
//! 1              add_tags      Present        Not Present
//! ```
//!
//! This is the only place that knows about that layout.

use super::types::{Presence, RemoteError, RemoteStatusRow, StatusTable};

const HEADER_PREFIX: &str = "VERSION";

/// Parse the full stdout of `migrate status`.
pub fn parse_status_table(output: &str) -> Result<StatusTable, RemoteError> {
    let mut lines = output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with(HEADER_PREFIX));

    if lines.next().is_none() {
        return Err(RemoteError::MalformedStatus(
            "no status header found in runner output".to_string(),
        ));
    }

    let mut rows: Vec<RemoteStatusRow> = Vec::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let row = parse_row(line)?;

        if let Some(prev) = rows.last() {
            if row.id <= prev.id {
                return Err(RemoteError::MalformedStatus(format!(
                    "rows out of order: {} listed after {}",
                    row.id, prev.id
                )));
            }
        }
        rows.push(row);
    }

    Ok(StatusTable { rows })
}

fn parse_row(line: &str) -> Result<RemoteStatusRow, RemoteError> {
    let malformed = || RemoteError::MalformedStatus(format!("unrecognised row '{}'", line.trim()));

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(malformed());
    }

    let id: u32 = tokens[0].parse().map_err(|_| malformed())?;
    let name = tokens[1].to_string();

    let mut presences = Vec::with_capacity(2);
    let mut rest = tokens[2..].iter();
    while let Some(token) = rest.next() {
        match *token {
            "Present" => presences.push(Presence::Present),
            "Not" => match rest.next() {
                Some(&"Present") => presences.push(Presence::NotPresent),
                _ => return Err(malformed()),
            },
            _ => return Err(malformed()),
        }
    }

    match presences.as_slice() {
        [source, database] => Ok(RemoteStatusRow {
            id,
            name,
            source: *source,
            database: *database,
        }),
        _ => Err(malformed()),
    }
}
