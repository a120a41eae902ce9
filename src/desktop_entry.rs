use crate::launcher::App;
use freedesktop_entry_parser::parse_entry;
use std::path::Path;
use thiserror::Error;

const FIELD_CODES: &[char] = &[
    'f', 'F', 'u', 'U', 'd', 'D', 'n', 'N', 'i', 'c', 'k', 'v', 'm',
];

/// Error from parsing a desktop entry.
#[derive(Debug, Error)]
pub enum EntryParseError {
    #[error("Error parsing desktop file {file}: {reason}")]
    Parse { file: String, reason: String },
    #[error("Desktop file {file} is missing 'Desktop Entry' section")]
    MissingSection { file: String },
    #[error("Desktop file {file} is missing the 'Name' parameter")]
    MissingName { file: String },
    #[error("Desktop file {file} is missing the 'Exec' parameter")]
    MissingExec { file: String },
    /// `NoDisplay`, `Hidden` or `Terminal` set to something other than
    /// `true` or `false`.
    #[error("In entry {file} property {name} has an invalid value {value}")]
    InvalidPropVal {
        file: String,
        name: String,
        value: String,
    },
}

fn parse_bool(file: &str, name: &str, value: Option<&str>) -> Result<bool, EntryParseError> {
    match value.map(str::trim) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(EntryParseError::InvalidPropVal {
            file: file.to_owned(),
            name: name.to_owned(),
            value: other.to_owned(),
        }),
    }
}

/// Drops `%f`-style field codes from an `Exec` line and unescapes `%%`.
pub fn strip_field_codes(exec: &str) -> String {
    exec.split_whitespace()
        .filter_map(|arg| {
            let mut cleaned = String::with_capacity(arg.len());
            let mut chars = arg.chars();
            while let Some(c) = chars.next() {
                if c != '%' {
                    cleaned.push(c);
                    continue;
                }
                match chars.next() {
                    Some('%') => cleaned.push('%'),
                    Some(code) if FIELD_CODES.contains(&code) => {}
                    Some(other) => {
                        cleaned.push('%');
                        cleaned.push(other);
                    }
                    None => cleaned.push('%'),
                }
            }
            (!cleaned.is_empty()).then_some(cleaned)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl App {
    /// Parses a desktop entry.
    ///
    /// Returns `Ok(None)` if the app should not be listed.
    pub fn parse_desktop_file(path: impl AsRef<Path>) -> Result<Option<Self>, EntryParseError> {
        let file = path.as_ref().display().to_string();
        let entry = parse_entry(path.as_ref()).map_err(|e| EntryParseError::Parse {
            file: file.clone(),
            reason: e.to_string(),
        })?;

        if !entry.has_section("Desktop Entry") {
            return Err(EntryParseError::MissingSection { file });
        }
        let section = entry.section("Desktop Entry");

        if parse_bool(&file, "NoDisplay", section.attr("NoDisplay"))?
            || parse_bool(&file, "Hidden", section.attr("Hidden"))?
        {
            return Ok(None);
        }

        let name = section
            .attr("Name")
            .ok_or_else(|| EntryParseError::MissingName { file: file.clone() })?;
        let exec = section
            .attr("Exec")
            .ok_or_else(|| EntryParseError::MissingExec { file: file.clone() })?;
        let icon = section.attr("Icon").unwrap_or_default();
        let terminal = parse_bool(&file, "Terminal", section.attr("Terminal"))?;

        Ok(Some(App::new(
            name.to_owned(),
            icon.to_owned(),
            strip_field_codes(exec),
            terminal,
        )))
    }
}
