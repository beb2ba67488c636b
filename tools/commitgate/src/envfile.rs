use std::fs;
use std::path::Path;

use crate::errors::ConfigError;

/// Parse `.env`-style content into ordered `(key, value)` pairs.
///
/// Supports `#` comments, an optional `export` prefix, single quotes
/// (literal), double quotes (with `\n`, `\"` and `\\` escapes) and inline
/// comments after unquoted values.
pub fn parse(content: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    let mut pairs = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err((line_no, format!("expected KEY=VALUE, got {line:?}")));
        };
        let key = key.trim();
        if !is_valid_key(key) {
            return Err((line_no, format!("invalid variable name {key:?}")));
        }
        let value = parse_value(value.trim()).map_err(|message| (line_no, message))?;
        pairs.push((key.to_string(), value));
    }
    Ok(pairs)
}

pub fn read(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content).map_err(|(line, message)| ConfigError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    })
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(value: &str) -> Result<String, String> {
    if let Some(rest) = value.strip_prefix('\'') {
        return rest
            .find('\'')
            .map(|end| rest[..end].to_string())
            .ok_or_else(|| "unterminated single-quoted value".to_string());
    }

    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(out),
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => break,
                },
                other => out.push(other),
            }
        }
        return Err("unterminated double-quoted value".to_string());
    }

    let unquoted = match value.find(" #") {
        Some(pos) => &value[..pos],
        None => value,
    };
    Ok(unquoted.trim().to_string())
}
