use crate::{
    config::Config,
    db::AppsDb,
    engine::{EngineContext, EngineError, ImageRegistry},
    icon::Size,
    launcher::{self, App},
    runner, ui, watcher,
};
use gtk4::{
    gdk::{Key, ModifierType},
    glib,
    prelude::*,
    Application, Builder, Entry, EventControllerKey, Image, ListBox, PropagationPhase, Spinner,
    Window,
};
use log::{debug, error, trace, warn};
use std::{
    cell::{Cell, RefCell},
    path::PathBuf,
    rc::Rc,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::runtime::Handle;

pub const TYPE_NAME: &str = "AppsModel";

/// One row of the results list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub id: u64,
    pub name: String,
    pub icon: String,
}

impl From<App> for ListItem {
    fn from(app: App) -> Self {
        Self {
            id: app.id,
            name: app.name,
            icon: app.icon,
        }
    }
}

/// The shown results and which of them is selected.
#[derive(Debug, Default)]
pub struct Selection {
    items: Vec<ListItem>,
    selected: Option<u64>,
    /// The user moved the selection since the last launch or hide.
    has_moved: bool,
}

impl Selection {
    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn selected(&self) -> Option<&ListItem> {
        let id = self.selected?;
        self.items.iter().find(|item| item.id == id)
    }

    pub fn selected_index(&self) -> Option<usize> {
        let id = self.selected?;
        self.items.iter().position(|item| item.id == id)
    }

    /// Replaces the list. A selection the user moved to survives as long as
    /// the item is still listed; otherwise the first item is selected.
    pub fn set_results(&mut self, items: Vec<ListItem>) {
        let keep = self.has_moved
            && self
                .selected
                .is_some_and(|id| items.iter().any(|item| item.id == id));
        if !keep {
            self.selected = items.first().map(|item| item.id);
        }
        self.items = items;
    }

    pub fn down(&mut self) {
        self.step(true);
    }

    pub fn up(&mut self) {
        self.step(false);
    }

    fn step(&mut self, forward: bool) {
        if self.items.is_empty() {
            return;
        }
        self.has_moved = true;
        let idx = self.selected_index().unwrap_or(0);
        let next = if forward {
            (idx + 1).min(self.items.len() - 1)
        } else {
            idx.saturating_sub(1)
        };
        self.selected = Some(self.items[next].id);
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.selected = None;
        self.has_moved = false;
    }
}

/// Tracks the background scan. Requests made while one runs are folded into
/// a single follow-up scan.
#[derive(Debug, Default)]
pub struct ScanState {
    running: bool,
    pending: bool,
}

impl ScanState {
    /// Returns whether a scan should start now.
    pub fn request(&mut self) -> bool {
        if self.running {
            self.pending = true;
            return false;
        }
        self.running = true;
        true
    }

    /// Marks the running scan done. Returns whether another was requested
    /// meanwhile.
    pub fn finish(&mut self) -> bool {
        self.running = false;
        std::mem::take(&mut self.pending)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Everything the model needs besides the widgets it binds to.
#[derive(Clone)]
pub struct LauncherState {
    pub config: Config,
    pub db: Arc<Mutex<AppsDb>>,
    pub db_path: PathBuf,
    pub rt: Handle,
    pub show_on_start: bool,
}

pub fn lock_db(db: &Mutex<AppsDb>) -> MutexGuard<'_, AppsDb> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AppsModel {
    state: LauncherState,
    selection: RefCell<Selection>,
    visible: Cell<bool>,
    scan_state: RefCell<ScanState>,
    activated: Cell<bool>,
    images: ImageRegistry,
    application: Application,
    window: Window,
    search_input: Entry,
    app_list: ListBox,
    spinner: Spinner,
}

fn object<T: IsA<glib::Object>>(builder: &Builder, id: &str) -> Result<T, EngineError> {
    builder.object::<T>(id).ok_or_else(|| EngineError::Bind {
        name: TYPE_NAME.to_owned(),
        reason: format!("the UI description has no `{}` object of the expected type", id),
    })
}

impl AppsModel {
    /// Binds a model to the `window`, `search_input`, `app_list` and
    /// `scanning_spinner` objects of a loaded description.
    pub fn bind(builder: &Builder, ctx: &EngineContext, state: LauncherState) -> Result<(), EngineError> {
        let model = Rc::new(AppsModel {
            visible: Cell::new(state.show_on_start),
            state,
            selection: RefCell::new(Selection::default()),
            scan_state: RefCell::new(ScanState::default()),
            activated: Cell::new(false),
            images: ctx.images.clone(),
            application: ctx.application.clone(),
            window: object(builder, "window")?,
            search_input: object(builder, "search_input")?,
            app_list: object(builder, "app_list")?,
            spinner: object(builder, "scanning_spinner")?,
        });

        model.setup_window();
        model.setup_signals();
        model.watch_app_dirs();
        model.scan();

        let for_activate = model.clone();
        ctx.application
            .connect_activate(move |_| for_activate.activate());
        Ok(())
    }

    fn setup_window(&self) {
        ui::setup_window(&self.window, &self.state.config);
        ui::apply_css(&WidgetExt::display(&self.window), &self.state.config);
    }

    fn setup_signals(self: &Rc<Self>) {
        let model = self.clone();
        self.search_input
            .connect_changed(move |entry| model.search(&entry.text()));

        let model = self.clone();
        self.search_input.connect_activate(move |_| model.run());

        let model = self.clone();
        self.app_list.connect_row_activated(move |_, row| {
            let index = usize::try_from(row.index()).ok();
            if let Some(id) = index.and_then(|i| model.selection.borrow().items().get(i).map(|item| item.id)) {
                model.selection.borrow_mut().selected = Some(id);
                model.run();
            }
        });

        let model = self.clone();
        self.window.connect_close_request(move |_| {
            model.hide();
            glib::Propagation::Stop
        });

        let keys = EventControllerKey::new();
        keys.set_propagation_phase(PropagationPhase::Capture);
        let model = self.clone();
        keys.connect_key_pressed(move |_, key, _, modifiers| match key {
            Key::Escape => {
                model.hide();
                glib::Propagation::Stop
            }
            Key::Up => {
                model.up();
                glib::Propagation::Stop
            }
            Key::Down => {
                model.down();
                glib::Propagation::Stop
            }
            Key::q if modifiers.contains(ModifierType::CONTROL_MASK) => {
                model.exit();
                glib::Propagation::Stop
            }
            _ => glib::Propagation::Proceed,
        });
        self.window.add_controller(keys);
    }

    fn watch_app_dirs(self: &Rc<Self>) {
        let mut changes = match watcher::watch_app_dirs(&self.state.config.apps.app_paths) {
            Ok(changes) => changes,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        let model = self.clone();
        glib::spawn_future_local(async move {
            while changes.recv().await.is_some() {
                model.scan();
            }
        });
    }

    fn activate(&self) {
        let first = !self.activated.replace(true);
        if first && !self.visible.get() {
            debug!("Started hidden");
            return;
        }
        self.show();
    }

    pub fn search(&self, text: &str) {
        trace!(
            "Search {:?}, scan running: {}",
            text,
            self.scan_state.borrow().is_running()
        );
        let max = self.state.config.window.max_apps_shown;
        let items = lock_db(&self.state.db)
            .get_ranked_list(text, Some(max))
            .into_iter()
            .map(ListItem::from)
            .collect();
        self.selection.borrow_mut().set_results(items);
        self.render();
    }

    pub fn scan(self: &Rc<Self>) {
        if !self.scan_state.borrow_mut().request() {
            debug!("Scan already in progress, queued another");
            return;
        }
        trace!("Scanning...");
        self.spinner.set_spinning(true);

        let db = self.state.db.clone();
        let db_path = self.state.db_path.clone();
        let paths = self.state.config.apps.app_paths.clone();
        let task = self.state.rt.spawn_blocking(move || {
            let (apps, errors) = launcher::scan_desktop_entries(&paths);
            let mut db = lock_db(&db);
            db.merge_new_entries(apps);
            if let Err(e) = db.save(&db_path) {
                error!("Saving database failed: {}", e);
            }
            errors
        });

        let model = self.clone();
        glib::spawn_future_local(async move {
            match task.await {
                Ok(errors) => launcher::log_errs(&errors),
                Err(e) => error!("Desktop entry scan failed: {}", e),
            }
            let rescan = model.scan_state.borrow_mut().finish();
            model.spinner.set_spinning(false);
            model.search(&model.search_input.text());
            trace!("Scanning...done");
            if rescan {
                model.scan();
            }
        });
    }

    pub fn down(&self) {
        self.selection.borrow_mut().down();
        self.sync_selected_row();
    }

    pub fn up(&self) {
        self.selection.borrow_mut().up();
        self.sync_selected_row();
    }

    /// Launches the selected app and hides the window.
    pub fn run(&self) {
        let Some(id) = self.selection.borrow().selected().map(|item| item.id) else {
            return;
        };
        let Some(app) = lock_db(&self.state.db).get_by_id(id).cloned() else {
            warn!("Selected app {} is no longer in the database", id);
            return;
        };

        debug!("Launching {}", app);
        match runner::run(&app, self.state.config.apps.term_cmd.as_deref()) {
            Ok(()) => {
                let mut db = lock_db(&self.state.db);
                if let Err(e) = db.update(id) {
                    error!("{}", e);
                }
                if let Err(e) = db.save(&self.state.db_path) {
                    error!("Failed to save apps database to disk: {}", e);
                }
            }
            Err(e) => error!("{}", e),
        }

        self.hide();
    }

    pub fn show(&self) {
        self.visible.set(true);
        self.window.present();
        self.search_input.grab_focus();
    }

    pub fn hide(&self) {
        trace!("Hide");
        self.visible.set(false);
        self.window.set_visible(false);
        self.selection.borrow_mut().reset();
        self.search_input.set_text("");
        self.render();
    }

    pub fn exit(&self) {
        trace!("Exit");
        self.application.quit();
    }

    fn render(&self) {
        ui::clear_list(&self.app_list);
        let icon_size = self.state.config.window.icon_size;
        for item in self.selection.borrow().items() {
            let icon = self.icon_image(&item.icon, icon_size);
            self.app_list
                .append(&ui::create_result_row(&item.name, icon, icon_size));
        }
        self.sync_selected_row();
    }

    fn sync_selected_row(&self) {
        let index = self.selection.borrow().selected_index();
        ui::select_index(&self.app_list, index);
    }

    fn icon_image(&self, icon: &str, size: i32) -> Image {
        if icon.is_empty() {
            return Image::new();
        }
        let uri = format!("image://icon/{}", icon);
        match self.images.request(&uri, Size::square(size)) {
            Ok((Some(pixmap), _)) => Image::from_paintable(Some(&pixmap.paintable)),
            Ok((None, _)) => Image::new(),
            Err(e) => {
                warn!("{}", e);
                Image::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<ListItem> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| ListItem {
                id: i as u64 + 1,
                name: name.to_string(),
                icon: String::new(),
            })
            .collect()
    }

    #[test]
    fn scan_requests_during_a_scan_are_queued_once() {
        let mut scans = ScanState::default();

        assert!(scans.request());
        assert!(scans.is_running());
        assert!(!scans.request());
        assert!(!scans.request());

        assert!(scans.finish());
        assert!(!scans.is_running());
        assert!(scans.request());
        assert!(!scans.finish());
    }

    #[test]
    fn idle_scan_state_starts_immediately() {
        let mut scans = ScanState::default();

        assert!(scans.request());
        assert!(!scans.finish());
        assert!(scans.request());
    }

    #[test]
    fn first_item_is_selected() {
        let mut selection = Selection::default();

        selection.set_results(items(&["a", "b", "c"]));

        assert_eq!(selection.selected_index(), Some(0));
    }

    #[test]
    fn empty_results_select_nothing() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a"]));

        selection.set_results(Vec::new());

        assert!(selection.selected().is_none());
        selection.down();
        assert!(selection.selected().is_none());
    }

    #[test]
    fn movement_is_clamped() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a", "b", "c"]));

        selection.up();
        assert_eq!(selection.selected_index(), Some(0));

        selection.down();
        selection.down();
        selection.down();
        assert_eq!(selection.selected_index(), Some(2));
        assert_eq!(selection.selected().unwrap().name, "c");
    }

    #[test]
    fn moved_selection_survives_refresh() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a", "b", "c"]));
        selection.down();
        let id = selection.selected().unwrap().id;

        let mut refreshed = items(&["a", "b", "c"]);
        refreshed.reverse();
        selection.set_results(refreshed);

        assert_eq!(selection.selected().unwrap().id, id);
        assert_eq!(selection.selected_index(), Some(1));
    }

    #[test]
    fn untouched_selection_follows_the_top_result() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a", "b"]));

        let mut refreshed = items(&["a", "b"]);
        refreshed.reverse();
        selection.set_results(refreshed);

        assert_eq!(selection.selected_index(), Some(0));
        assert_eq!(selection.selected().unwrap().name, "b");
    }

    #[test]
    fn moved_selection_resets_when_item_disappears() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a", "b", "c"]));
        selection.down();
        selection.down();

        selection.set_results(items(&["a", "b"]));

        assert_eq!(selection.selected_index(), Some(0));
    }

    #[test]
    fn reset_clears_everything() {
        let mut selection = Selection::default();
        selection.set_results(items(&["a", "b"]));
        selection.down();

        selection.reset();

        assert!(selection.items().is_empty());
        assert!(selection.selected().is_none());
        selection.set_results(items(&["a", "b"]));
        assert_eq!(selection.selected_index(), Some(0));
    }
}
