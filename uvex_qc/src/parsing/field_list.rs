//! Plain-text field lists: one identifier per line.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::domain::FieldId;

/// Parses a field list. Blank lines, `#` comments and a `field` header are
/// ignored; any other unparsable line is an error.
pub fn parse_field_list(content: &str) -> Result<Vec<FieldId>> {
    let mut fields = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed == "field" {
            continue;
        }
        let field = trimmed
            .parse::<FieldId>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Line {}", idx + 1))?;
        fields.push(field);
    }
    Ok(fields)
}

pub fn read_field_list(path: &Path) -> Result<Vec<FieldId>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read field list: {}", path.display()))?;
    parse_field_list(&content).with_context(|| format!("Invalid field list: {}", path.display()))
}

/// Writes one identifier per line.
pub fn write_field_list<'a, I>(fields: I, path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a FieldId>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create field list: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for field in fields {
        writeln!(writer, "{}", field)
            .with_context(|| format!("Failed to write field list: {}", path.display()))?;
        count += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write field list: {}", path.display()))?;

    log::info!("Wrote {} fields to {}", count, path.display());
    Ok(count)
}
