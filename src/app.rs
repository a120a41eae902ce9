use crate::{
    config::Config,
    db::AppsDb,
    engine::{UiEngine, UiSource},
    icon::IconProvider,
    model::{self, AppsModel, LauncherState},
    notifier::{self, PidFile},
};
use gtk4::{prelude::*, Application, Window};
use log::{debug, error, info, warn};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::runtime::Runtime;

pub const APP_ID: &str = "info.bengoldberg.poki_launcher";

/// Module the UI description imports the model from.
pub const MODULE_URI: &str = "PokiLauncher";
pub const MODULE_VERSION: (u32, u32) = (1, 0);

/// Description file looked up in the working directory before the embedded
/// copy is used.
pub const LOCAL_UI_FILE: &str = "main.ui";
const EMBEDDED_UI: &str = include_str!("../ui/main.ui");

/// Returned when the UI description produced no windows.
pub const LOAD_FAILURE_EXIT_CODE: i32 = -1;

fn load_failure(roots: &[Window]) -> Option<i32> {
    roots.is_empty().then_some(LOAD_FAILURE_EXIT_CODE)
}

/// Loads the database at `path`. A missing or unreadable one starts empty;
/// the model's first background scan fills and saves it.
fn open_db(path: &Path) -> AppsDb {
    if path.exists() {
        match AppsDb::load(path) {
            Ok(db) => return db,
            Err(e) => warn!("{}, rebuilding it", e),
        }
    }
    AppsDb::new(Vec::new())
}

/// Starts the launcher and returns the process exit code.
pub fn run(app_path: &str, config: Config, show_on_start: bool) -> i32 {
    if let Err(e) = gtk4::init() {
        error!("Failed to initialize GTK: {}", e);
        return LOAD_FAILURE_EXIT_CODE;
    }

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return LOAD_FAILURE_EXIT_CODE;
        }
    };

    let db_path = Config::db_path();
    let db = open_db(&db_path);
    let app = Application::builder().application_id(APP_ID).build();

    let mut engine = UiEngine::new(&app);
    engine.add_image_provider("icon", IconProvider::new(config.apps.icon_theme.clone()));
    let state = LauncherState {
        config,
        db: Arc::new(Mutex::new(db)),
        db_path,
        rt: rt.handle().clone(),
        show_on_start,
    };
    let (major, minor) = MODULE_VERSION;
    engine.register_type(MODULE_URI, major, minor, model::TYPE_NAME, move |builder, ctx| {
        AppsModel::bind(builder, ctx, state.clone())
    });

    engine.load(&UiSource::resolve(LOCAL_UI_FILE, EMBEDDED_UI));
    if let Some(code) = load_failure(engine.root_objects()) {
        error!("No windows were loaded, exiting");
        return code;
    }
    let roots = engine.root_objects().to_vec();

    app.connect_startup(move |app| {
        for window in &roots {
            window.set_application(Some(app));
        }
    });

    let _pid_file = match PidFile::create(notifier::pid_file_path()) {
        Ok(pid_file) => {
            debug!("Listening for show requests, pid file {}", pid_file.path().display());
            Some(pid_file)
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    };
    let _signals = notifier::listen(&app);

    info!("Starting Poki Launcher");
    if app.run_with_args(&[app_path]) == gtk4::glib::ExitCode::SUCCESS {
        0
    } else {
        1
    }
}
