use crate::desktop_entry::EntryParseError;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    path::PathBuf,
};
use thiserror::Error;
use walkdir::WalkDir;

/// An app on your machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct App {
    /// Stable identity derived from name, exec and icon.
    pub id: u64,
    pub name: String,
    /// Icon name, looked up in the icon theme unless it is an absolute path.
    pub icon: String,
    pub exec: String,
    /// Launch inside a terminal emulator.
    pub terminal: bool,
    /// Frecency score, scaled to the database reference time.
    #[serde(default)]
    pub score: f32,
}

impl App {
    pub fn new(name: String, icon: String, exec: String, terminal: bool) -> App {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        exec.hash(&mut hasher);
        icon.hash(&mut hasher);

        App {
            id: hasher.finish(),
            name,
            icon,
            exec,
            terminal,
            score: 0.0,
        }
    }
}

impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.exec == other.exec && self.icon == other.icon
    }
}

impl Eq for App {}

impl Ord for App {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.exec.cmp(&other.exec))
            .then_with(|| self.icon.cmp(&other.icon))
    }
}

impl PartialOrd for App {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An error from scanning for desktop entries.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to expand path {path}: {reason}")]
    PathExpand { path: String, reason: String },
    #[error("Failed to scan directory {dir} for desktop entries: {source}")]
    ScanDirectory {
        dir: String,
        source: walkdir::Error,
    },
    #[error(transparent)]
    Entry(#[from] EntryParseError),
}

pub fn expand_path(path: &str) -> Result<PathBuf, ScanError> {
    shellexpand::full(path)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ScanError::PathExpand {
            path: path.to_owned(),
            reason: e.to_string(),
        })
}

/// Lists the `.desktop` files under each of `paths`.
pub fn desktop_entries(paths: &[String]) -> (Vec<PathBuf>, Vec<ScanError>) {
    let mut files = Vec::with_capacity(500);
    let mut errors = Vec::new();

    for loc in paths {
        let expanded = match expand_path(loc) {
            Ok(path) => path,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        if !expanded.exists() {
            debug!("Skipping missing app directory {}", expanded.display());
            continue;
        }

        for entry in WalkDir::new(&expanded).follow_links(true) {
            match entry {
                Ok(entry) => {
                    let is_desktop = entry.file_type().is_file()
                        && entry.path().extension().and_then(|e| e.to_str()) == Some("desktop");
                    if is_desktop {
                        files.push(entry.into_path());
                    }
                }
                Err(source) => errors.push(ScanError::ScanDirectory {
                    dir: loc.clone(),
                    source,
                }),
            }
        }
    }

    (files, errors)
}

/// Scans `paths` for apps, returning them sorted and deduplicated along with
/// every error that was hit on the way.
pub fn scan_desktop_entries(paths: &[String]) -> (Vec<App>, Vec<ScanError>) {
    debug!("Scanning desktop entry paths: {:?}", paths);
    let (entries, mut errors) = desktop_entries(paths);

    let parsed: Vec<_> = entries
        .par_iter()
        .map(App::parse_desktop_file)
        .collect();

    let mut apps = Vec::with_capacity(parsed.len());
    for result in parsed {
        match result {
            Ok(Some(app)) => apps.push(app),
            Ok(None) => {}
            Err(e) => errors.push(e.into()),
        }
    }

    apps.sort_unstable();
    apps.dedup();
    debug!("Found {} apps, {} errors", apps.len(), errors.len());
    (apps, errors)
}

pub fn log_errs(errs: &[ScanError]) {
    for err in errs {
        warn!("{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn id_follows_identity() {
        let a = App::new("A".into(), "icon".into(), "a".into(), false);
        let b = App::new("A".into(), "icon".into(), "a".into(), true);
        let c = App::new("A".into(), "icon".into(), "a --flag".into(), false);

        assert_eq!(a.id, b.id);
        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn scan_finds_nested_entries_and_collects_errors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("kde");
        fs::create_dir(&nested).unwrap();
        fs::write(
            dir.path().join("firefox.desktop"),
            "[Desktop Entry]\nName=Firefox\nExec=firefox %u\nIcon=firefox\n",
        )
        .unwrap();
        fs::write(
            nested.join("kate.desktop"),
            "[Desktop Entry]\nName=Kate\nExec=kate\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("hidden.desktop"),
            "[Desktop Entry]\nName=Hidden\nExec=hidden\nNoDisplay=true\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.desktop"), "[Desktop Entry]\nExec=x\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "not an entry").unwrap();

        let paths = vec![dir.path().display().to_string()];
        let (apps, errors) = scan_desktop_entries(&paths);

        let names: Vec<_> = apps.iter().map(|app| app.name.as_str()).collect();
        assert_eq!(names, vec!["Firefox", "Kate"]);
        assert_eq!(apps[0].exec, "firefox");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn scan_dedups_identical_entries() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            fs::write(
                dir.path().join("vim.desktop"),
                "[Desktop Entry]\nName=Vim\nExec=vim\nTerminal=true\n",
            )
            .unwrap();
        }

        let paths = vec![
            first.path().display().to_string(),
            second.path().display().to_string(),
        ];
        let (apps, errors) = scan_desktop_entries(&paths);

        assert_eq!(apps.len(), 1);
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_directories_are_skipped() {
        let (apps, errors) = scan_desktop_entries(&[String::from("/nonexistent/poki/apps")]);

        assert!(apps.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn unset_variables_fail_expansion() {
        let (_, errors) =
            scan_desktop_entries(&[String::from("$POKI_TEST_SURELY_UNSET_VAR/apps")]);

        assert!(matches!(errors.as_slice(), [ScanError::PathExpand { .. }]));
    }
}
