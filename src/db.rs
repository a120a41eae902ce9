use crate::launcher::App;
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;

/// Launch weight decays by half every three days.
const HALF_LIFE_SECS: f32 = 60.0 * 60.0 * 24.0 * 3.0;
const LAUNCH_WEIGHT: f32 = 1.0;

static MATCHER: Lazy<SkimMatcherV2> = Lazy::new(|| SkimMatcherV2::default().smart_case());

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Error reading apps database file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error writing apps database file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error parsing apps database file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Error encoding apps database: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("No app with id {0} in the database")]
    UnknownApp(u64),
}

/// An apps database ranked by frecency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppsDb {
    pub apps: Vec<App>,
    /// Seconds since the epoch that all scores are scaled against.
    reference_time: f64,
    half_life: f32,
}

impl AppsDb {
    pub fn new(apps: Vec<App>) -> Self {
        Self {
            apps,
            reference_time: current_time_secs(),
            half_life: HALF_LIFE_SECS,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        debug!("Loading db from: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| DbError::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| DbError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes the database next to `path` and renames it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DbError> {
        let path = path.as_ref();
        let write_err = |source| DbError::Write {
            path: path.to_owned(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let buf = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, buf).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)
    }

    pub fn dump(&self) -> Result<String, DbError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get the apps in rank order for a given search string.
    ///
    /// Only apps the fuzzy matcher scores above zero are returned, ranked by
    /// match score plus frecency. An empty search matches nothing.
    pub fn get_ranked_list(&self, search: &str, num_items: Option<usize>) -> Vec<App> {
        let mut app_list: Vec<App> = self
            .apps
            .iter()
            .filter_map(|app| match MATCHER.fuzzy_match(&app.name, search) {
                Some(score) if score > 0 => {
                    let mut app = app.clone();
                    app.score += score as f32;
                    Some(app)
                }
                _ => None,
            })
            .collect();

        app_list.sort_by(|left, right| right.score.total_cmp(&left.score));
        if let Some(n) = num_items {
            app_list.truncate(n);
        }
        app_list
    }

    pub fn get_by_id(&self, id: u64) -> Option<&App> {
        self.apps.iter().find(|app| app.id == id)
    }

    /// Records one launch of the app with `id`.
    pub fn update(&mut self, id: u64) -> Result<(), DbError> {
        self.update_score(id, LAUNCH_WEIGHT, self.secs_elapsed())
    }

    fn update_score(&mut self, id: u64, weight: f32, elapsed: f32) -> Result<(), DbError> {
        let half_life = self.half_life;
        let app = self
            .apps
            .iter_mut()
            .find(|app| app.id == id)
            .ok_or(DbError::UnknownApp(id))?;
        let scale = 2.0f32.powf(elapsed / half_life);
        app.score = (app.score / scale + weight) * scale;
        Ok(())
    }

    /// Merge the apps from a re-scan into the database.
    ///
    /// Apps missing from `apps_to_merge` are removed, new ones are added and
    /// the ones present in both keep their score.
    pub fn merge_new_entries(&mut self, mut apps_to_merge: Vec<App>) {
        let old = std::mem::take(&mut self.apps);
        self.apps = old
            .into_iter()
            .filter(|app| apps_to_merge.contains(app))
            .collect();
        apps_to_merge.retain(|app| !self.apps.contains(app));
        self.apps.extend(apps_to_merge);
    }

    fn secs_elapsed(&self) -> f32 {
        (current_time_secs() - self.reference_time) as f32
    }
}

fn current_time_secs() -> f64 {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(n) => n.as_secs_f64(),
        Err(e) => {
            warn!("Invalid system time: {}", e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> App {
        App::new(name.to_owned(), "icon".to_owned(), format!("/bin/{}", name), false)
    }

    #[test]
    fn merge_new_entries_identical() {
        let apps = vec![app("Test1"), app("Test2")];
        let mut db = AppsDb::new(apps.clone());

        db.merge_new_entries(apps.clone());

        assert_eq!(db.apps, apps);
    }

    #[test]
    fn merge_new_entries_remove() {
        let mut apps = vec![app("Test1"), app("Test2")];
        let mut db = AppsDb::new(apps.clone());

        apps.remove(0);
        db.merge_new_entries(apps.clone());

        assert_eq!(db.apps, apps);
    }

    #[test]
    fn merge_new_entries_add_keeps_scores() {
        let mut db = AppsDb::new(vec![app("Test1")]);
        let id = db.apps[0].id;
        db.update(id).unwrap();
        let score = db.apps[0].score;

        db.merge_new_entries(vec![app("Test1"), app("Test2")]);

        assert_eq!(db.apps, vec![app("Test1"), app("Test2")]);
        assert_eq!(db.apps[0].score, score);
        assert_eq!(db.apps[1].score, 0.0);
    }

    #[test]
    fn empty_search_matches_nothing() {
        let db = AppsDb::new(vec![app("firefox"), app("files")]);

        assert!(db.get_ranked_list("", None).is_empty());
    }

    #[test]
    fn ranked_list_filters_and_limits() {
        let db = AppsDb::new(vec![app("firefox"), app("files"), app("gimp"), app("foot")]);

        let all = db.get_ranked_list("f", None);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|app| app.name.starts_with('f')));

        let limited = db.get_ranked_list("f", Some(2));
        assert_eq!(limited.len(), 2);
        assert!(db.get_ranked_list("zzz", None).is_empty());
    }

    #[test]
    fn launches_raise_rank() {
        let mut db = AppsDb::new(vec![app("firefox"), app("fire")]);
        let baseline = db.get_ranked_list("fire", None);
        let last = baseline.last().unwrap().id;

        for _ in 0..200 {
            db.update(last).unwrap();
        }

        assert_eq!(db.get_ranked_list("fire", None)[0].id, last);
    }

    #[test]
    fn frecency_decays_with_half_life() {
        let mut db = AppsDb::new(vec![app("a")]);
        let id = db.apps[0].id;

        db.update_score(id, 1.0, 0.0).unwrap();
        assert_eq!(db.apps[0].score, 1.0);

        // One half life later the stored score is worth half as much, so the
        // new launch lands on 0.5 + 1 decayed units.
        db.update_score(id, 1.0, HALF_LIFE_SECS).unwrap();
        assert!((db.apps[0].score - 3.0).abs() < 1e-4);
    }

    #[test]
    fn unknown_app_update_is_an_error() {
        let mut db = AppsDb::new(vec![app("a")]);

        assert!(matches!(db.update(42), Err(DbError::UnknownApp(42))));
    }

    #[test]
    fn save_then_load_keeps_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("apps.json");
        let mut db = AppsDb::new(vec![app("a"), app("b")]);
        let id = db.apps[1].id;
        db.update(id).unwrap();

        db.save(&path).unwrap();
        let loaded = AppsDb::load(&path).unwrap();

        assert_eq!(loaded.apps, db.apps);
        assert_eq!(loaded.get_by_id(id).unwrap().score, db.apps[1].score);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(AppsDb::load(&path), Err(DbError::Parse { .. })));
    }
}
