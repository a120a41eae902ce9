use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use thiserror::Error;

const APP_DIR_NAME: &str = "poki-launcher";
const CONFIG_FILE_NAME: &str = "config.json";
const MAX_MERGE_DEPTH: usize = 10;

static CONFIG_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let xdg_config_dirs = env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| String::from("/etc/xdg"));

    for dir in xdg_config_dirs.split(':') {
        let config_dir = PathBuf::from(dir).join(APP_DIR_NAME);
        if config_dir.exists() {
            return config_dir;
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".config")
        })
        .join(APP_DIR_NAME)
});

static DATA_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} at line {line}, column {column}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        source: serde_json::Error,
    },
    #[error("merged config does not match the expected layout: {0}")]
    Convert(serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Colors {
    pub background: String,
    pub border: String,
    pub input_box: String,
    pub input_text: String,
    pub selected_app: String,
    pub app_text: String,
    pub app_separator: String,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            background: String::from("#282a36"),
            border: String::from("#2e303b"),
            input_box: String::from("#44475a"),
            input_text: String::from("#f8f8f2"),
            selected_app: String::from("#44475a"),
            app_text: String::from("#f8f8f2"),
            app_separator: String::from("#bd93f9"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Typography {
    pub input_font_size: i32,
    pub app_font_size: i32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            input_font_size: 13,
            app_font_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Corners {
    pub window: i32,
    pub input_box: i32,
}

impl Default for Corners {
    fn default() -> Self {
        Self {
            window: 8,
            input_box: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Theme {
    pub colors: Colors,
    pub corners: Corners,
    pub typography: Typography,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum WindowAnchor {
    center,
    top,
    bottom,
    left,
    right,
    top_left,
    top_right,
    bottom_left,
    bottom_right,
}

impl WindowAnchor {
    /// Edges to pin, in top/right/bottom/left order.
    pub fn edges(self) -> [bool; 4] {
        match self {
            WindowAnchor::center => [false; 4],
            WindowAnchor::top => [true, false, false, false],
            WindowAnchor::bottom => [false, false, true, false],
            WindowAnchor::left => [false, false, false, true],
            WindowAnchor::right => [false, true, false, false],
            WindowAnchor::top_left => [true, false, false, true],
            WindowAnchor::top_right => [true, true, false, false],
            WindowAnchor::bottom_left => [false, false, true, true],
            WindowAnchor::bottom_right => [false, true, true, false],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Window {
    pub width: i32,
    pub height: i32,
    pub input_box_ratio: f32,
    pub max_apps_shown: usize,
    pub icon_size: i32,
    pub use_layer_shell: bool,
    pub anchor: WindowAnchor,
    pub margin_top: i32,
    pub margin_bottom: i32,
    pub margin_left: i32,
    pub margin_right: i32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            input_box_ratio: 0.1,
            max_apps_shown: 5,
            icon_size: 48,
            use_layer_shell: true,
            anchor: WindowAnchor::center,
            margin_top: 0,
            margin_bottom: 0,
            margin_left: 0,
            margin_right: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Apps {
    pub app_paths: Vec<String>,
    pub term_cmd: Option<String>,
    pub icon_theme: Option<String>,
}

impl Default for Apps {
    fn default() -> Self {
        Self {
            app_paths: vec![
                String::from("/usr/share/applications"),
                String::from("~/.local/share/applications/"),
                String::from("/var/lib/snapd/desktop/applications"),
                String::from("/var/lib/flatpak/exports/share/applications"),
            ],
            term_cmd: None,
            icon_theme: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Debug {
    pub enable_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: Window,
    pub theme: Theme,
    pub apps: Apps,
    pub debug: Debug,
}

impl Config {
    pub fn config_dir() -> &'static Path {
        &CONFIG_DIR
    }

    pub fn data_dir() -> &'static Path {
        &DATA_DIR
    }

    pub fn db_path() -> PathBuf {
        Self::data_dir().join("apps.json")
    }

    /// Loads the user config, falling back to defaults on any error.
    pub fn load() -> Self {
        let config_dir = Self::config_dir();
        if !config_dir.exists() {
            if let Err(e) = fs::create_dir_all(config_dir) {
                warn!("Failed to create config dir {}: {}", config_dir.display(), e);
            }
        }

        let config_file = config_dir.join(CONFIG_FILE_NAME);
        match Self::load_from(&config_file) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Loads `path`, creating it with defaults when missing and writing back
    /// the merged result when keys were added or replaced.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from: {:?}", path);
        let default_config = Config::default();

        if !path.exists() {
            debug!("Config file not found, creating default configuration");
            if let Ok(contents) = serde_json::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(path, contents) {
                    warn!("Failed to write default config to {}: {}", path.display(), e);
                }
            }
            return Ok(default_config);
        }

        let file_contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        let existing: serde_json::Value =
            serde_json::from_str(&file_contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                line: source.line(),
                column: source.column(),
                source,
            })?;

        let default_json = serde_json::to_value(&default_config).map_err(ConfigError::Convert)?;
        let mut merged = merge_json(existing, &default_json, 0);
        retain_valid_settings(&mut merged, &default_json);
        let config: Config = serde_json::from_value(merged.clone()).map_err(ConfigError::Convert)?;

        if let Ok(pretty_merged) = serde_json::to_string_pretty(&merged) {
            if pretty_merged != file_contents {
                debug!("Writing merged configuration back to file");
                if let Err(e) = fs::write(path, pretty_merged) {
                    warn!("Failed to write merged config to {}: {}", path.display(), e);
                }
            }
        }

        Ok(config)
    }

    pub fn get_css(&self) -> String {
        let theme = &self.theme;
        let window = &self.window;
        let input_height = (window.height as f32 * window.input_box_ratio).round() as i32;

        format!(
            "window {{
                background-color: {};
                border: 2px solid {};
                border-radius: {}px;
            }}
            entry {{
                min-height: {}px;
                margin: 8px;
                border-radius: {}px;
                background-color: {};
                color: {};
                caret-color: {};
                font-size: {}pt;
            }}
            listview, list {{
                background: transparent;
            }}
            list > row {{
                padding: 4px 8px;
                border-bottom: 1px solid {};
            }}
            list > row:selected {{
                background-color: {};
            }}
            .app-name {{
                color: {};
                font-size: {}pt;
            }}
            scrollbar {{ opacity: 0; }}",
            theme.colors.background,
            theme.colors.border,
            theme.corners.window,
            input_height,
            theme.corners.input_box,
            theme.colors.input_box,
            theme.colors.input_text,
            theme.colors.input_text,
            theme.typography.input_font_size,
            theme.colors.app_separator,
            theme.colors.selected_app,
            theme.colors.app_text,
            theme.typography.app_font_size,
        )
    }
}

/// Keeps every key of `schema` that `existing` provides with a matching JSON
/// type, and fills the rest from `schema`. Unknown keys are dropped.
fn merge_json(existing: serde_json::Value, schema: &serde_json::Value, depth: usize) -> serde_json::Value {
    let (mut existing_obj, schema_obj) = match (existing, schema.as_object()) {
        (serde_json::Value::Object(existing_obj), Some(schema_obj)) => (existing_obj, schema_obj),
        _ => return schema.clone(),
    };

    if depth >= MAX_MERGE_DEPTH {
        return schema.clone();
    }

    let mut result = serde_json::Map::new();
    for (key, schema_val) in schema_obj {
        let merged = match existing_obj.remove(key) {
            Some(existing_val) if schema_val.is_object() && existing_val.is_object() => {
                merge_json(existing_val, schema_val, depth + 1)
            }
            Some(existing_val) => {
                let is_valid = match schema_val {
                    // Optional settings default to null and accept any value.
                    serde_json::Value::Null => true,
                    serde_json::Value::Bool(_) => existing_val.is_boolean(),
                    serde_json::Value::Number(_) => existing_val.is_number(),
                    serde_json::Value::String(_) => existing_val.is_string(),
                    serde_json::Value::Array(_) => existing_val.is_array(),
                    serde_json::Value::Object(_) => existing_val.is_object(),
                };
                if is_valid {
                    existing_val
                } else {
                    warn!("Config key `{}` has the wrong type, using the default", key);
                    schema_val.clone()
                }
            }
            None => schema_val.clone(),
        };
        result.insert(key.clone(), merged);
    }

    serde_json::Value::Object(result)
}

/// Checks every setting against the field it fills, resetting the ones that
/// don't deserialize (a negative count, a number where text is expected).
fn retain_valid_settings(merged: &mut serde_json::Value, schema: &serde_json::Value) {
    retain_valid::<Window>(&mut merged["window"], &schema["window"]);
    retain_valid::<Apps>(&mut merged["apps"], &schema["apps"]);
    retain_valid::<Debug>(&mut merged["debug"], &schema["debug"]);
    retain_valid::<Colors>(&mut merged["theme"]["colors"], &schema["theme"]["colors"]);
    retain_valid::<Corners>(&mut merged["theme"]["corners"], &schema["theme"]["corners"]);
    retain_valid::<Typography>(
        &mut merged["theme"]["typography"],
        &schema["theme"]["typography"],
    );
}

/// `T` fills missing fields with defaults, so each key can be tried alone.
fn retain_valid<T: DeserializeOwned>(section: &mut serde_json::Value, schema: &serde_json::Value) {
    let Some(section) = section.as_object_mut() else {
        return;
    };
    for (key, value) in section.iter_mut() {
        let mut single = serde_json::Map::new();
        single.insert(key.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(serde_json::Value::Object(single)) {
            warn!("Config key `{}` is invalid ({}), using the default", key, e);
            *value = schema.get(key).cloned().unwrap_or(serde_json::Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config, Config::default());
        let written: Config = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default());
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "window": { "width": 800 }, "apps": { "term_cmd": "kitty" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, Window::default().height);
        assert_eq!(config.apps.term_cmd.as_deref(), Some("kitty"));
        assert_eq!(config.apps.app_paths, Apps::default().app_paths);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("\"max_apps_shown\""));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ \"window\": ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn mistyped_values_fall_back_to_defaults() {
        let schema = serde_json::to_value(Config::default()).unwrap();
        let existing = json!({
            "window": { "width": "wide", "max_apps_shown": 8 },
            "unknown": true
        });

        let merged = merge_json(existing, &schema, 0);

        assert_eq!(merged["window"]["width"], json!(500));
        assert_eq!(merged["window"]["max_apps_shown"], json!(8));
        assert!(merged.get("unknown").is_none());
    }

    #[test]
    fn wrong_optional_type_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "window": { "width": 800 }, "apps": { "term_cmd": 5 } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.apps.term_cmd, None);
        let rewritten: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["apps"]["term_cmd"], serde_json::Value::Null);
        assert_eq!(rewritten["window"]["width"], json!(800));
    }

    #[test]
    fn out_of_range_number_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "window": { "width": 800, "max_apps_shown": -1, "anchor": "nowhere" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.max_apps_shown, Window::default().max_apps_shown);
        assert_eq!(config.window.anchor, Window::default().anchor);
        let rewritten: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            rewritten["window"]["max_apps_shown"],
            json!(Window::default().max_apps_shown)
        );
    }

    #[test]
    fn css_uses_theme_colors() {
        let mut config = Config::default();
        config.theme.colors.selected_app = String::from("#123456");

        let css = config.get_css();

        assert!(css.contains("#123456"));
        assert!(css.contains("font-size: 20pt"));
    }

    #[test]
    fn anchor_edges() {
        assert_eq!(WindowAnchor::center.edges(), [false; 4]);
        assert_eq!(WindowAnchor::top_left.edges(), [true, false, false, true]);
        assert_eq!(WindowAnchor::bottom_right.edges(), [false, true, true, false]);
        assert_eq!(WindowAnchor::bottom_left.edges(), [false, false, true, true]);
        assert_eq!(WindowAnchor::top_right.edges(), [true, true, false, false]);
    }
}
