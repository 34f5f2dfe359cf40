//! Parsers for the three input files.
//!
//! - ratings: `user,item,rating[,timestamp]`
//! - relations: `item,related_item_1,related_item_2,...`
//! - content features: `item,f_1,f_2,...,f_d`
//!
//! Fields may be separated by `::` (MovieLens style), commas, tabs or
//! spaces. Blank lines and lines starting with `#` are skipped.

use crate::error::{DataLoadError, Result};
use crate::types::RawRating;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read a whole file as lines, mapping a missing file to `FileNotFound`
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    // Latin-1 fallback: each byte maps directly to a code point
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    };

    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Split a line into fields on `::`, `,`, tab or space
fn split_fields(line: &str) -> Vec<&str> {
    if line.contains("::") {
        line.split("::").map(str::trim).collect()
    } else {
        line.split([',', '\t', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Iterate over `(line_no, fields)` for all non-blank, non-comment lines
fn data_lines(lines: &[String]) -> impl Iterator<Item = (usize, Vec<&str>)> {
    lines.iter().enumerate().filter_map(|(idx, line)| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            None
        } else {
            Some((idx + 1, split_fields(trimmed)))
        }
    })
}

/// Parse a rating file
///
/// Format: user,item,rating[,timestamp]
pub fn parse_ratings(path: &Path) -> Result<Vec<RawRating>> {
    let lines = read_lines(path)?;
    let file = file_name(path);
    let mut ratings = Vec::with_capacity(lines.len());

    for (line_no, fields) in data_lines(&lines) {
        let mut parts = fields.into_iter();

        let mut next_field = |name: &str| {
            parts.next().ok_or_else(|| DataLoadError::ParseError {
                file: file.clone(),
                line: line_no,
                reason: format!("Missing {name}"),
            })
        };

        let user = next_field("user")?;
        let item = next_field("item")?;
        let value = next_field("rating")?;
        let timestamp = next_field("timestamp").ok();

        let rating = RawRating {
            user: user.to_string(),
            item: item.to_string(),
            value: value.parse().map_err(|e| DataLoadError::ParseError {
                file: file.clone(),
                line: line_no,
                reason: format!("Invalid rating: {}", e),
            })?,
            timestamp: timestamp
                .map(|t| {
                    // Some exports write timestamps as floats
                    t.parse::<i64>()
                        .or_else(|_| t.parse::<f64>().map(|f| f as i64))
                        .map_err(|e| DataLoadError::ParseError {
                            file: file.clone(),
                            line: line_no,
                            reason: format!("Invalid timestamp: {}", e),
                        })
                })
                .transpose()?,
        };

        ratings.push(rating);
    }
    Ok(ratings)
}

/// Parse an item relation file
///
/// Format: item,related_1,related_2,...
///
/// Returns `(item, related_items)` with external ids untouched; joining
/// against the rating ids happens in the index builder.
pub fn parse_relations(path: &Path) -> Result<Vec<(String, Vec<String>)>> {
    let lines = read_lines(path)?;
    let relations = data_lines(&lines)
        .filter_map(|(_, fields)| {
            let (head, tail) = fields.split_first()?;
            Some((
                head.to_string(),
                tail.iter().map(|s| s.to_string()).collect(),
            ))
        })
        .collect();
    Ok(relations)
}

/// Parse a content feature file
///
/// Format: item,f_1,...,f_d. Every row must carry the same `d`.
pub fn parse_content_features(path: &Path) -> Result<Vec<(String, Vec<f64>)>> {
    let lines = read_lines(path)?;
    let file = file_name(path);
    let mut rows: Vec<(String, Vec<f64>)> = Vec::new();
    let mut width: Option<usize> = None;

    for (line_no, fields) in data_lines(&lines) {
        let Some((head, tail)) = fields.split_first() else {
            continue;
        };

        let expected = *width.get_or_insert(tail.len());
        if tail.len() != expected {
            return Err(DataLoadError::FieldCountMismatch {
                expected,
                found: tail.len(),
                line: line_no,
            });
        }

        let values = tail
            .iter()
            .map(|v| {
                v.parse::<f64>().map_err(|e| DataLoadError::ParseError {
                    file: file.clone(),
                    line: line_no,
                    reason: format!("Invalid feature value '{}': {}", v, e),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        rows.push((head.to_string(), values));
    }
    Ok(rows)
}
