use crate::config::Config;
use gtk4::{
    gdk, prelude::*, Align, Box as GtkBox, CssProvider, Image, Label, ListBox, ListBoxRow,
    Orientation, Window, STYLE_PROVIDER_PRIORITY_APPLICATION,
};
use gtk4_layer_shell::{Edge, KeyboardMode, Layer, LayerShell};
use log::debug;

/// Sizes the window and, when the compositor supports it, turns it into an
/// overlay layer surface.
pub fn setup_window(window: &Window, config: &Config) {
    window.set_default_size(config.window.width, config.window.height);

    if !config.window.use_layer_shell {
        return;
    }
    if !gtk4_layer_shell::is_supported() {
        debug!("Layer shell not supported, using a regular window");
        return;
    }

    window.init_layer_shell();
    window.set_layer(Layer::Overlay);
    window.set_keyboard_mode(KeyboardMode::Exclusive);
    window.set_anchors(config.window.anchor.edges());
    apply_window_margins(window, config);
}

fn apply_window_margins(window: &Window, config: &Config) {
    window.set_margin(Edge::Top, config.window.margin_top);
    window.set_margin(Edge::Bottom, config.window.margin_bottom);
    window.set_margin(Edge::Left, config.window.margin_left);
    window.set_margin(Edge::Right, config.window.margin_right);
}

pub fn apply_css(display: &gdk::Display, config: &Config) {
    let css_provider = CssProvider::new();
    css_provider.load_from_data(&config.get_css());
    gtk4::style_context_add_provider_for_display(
        display,
        &css_provider,
        STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
}

pub fn clear_list(list: &ListBox) {
    while let Some(child) = list.first_child() {
        list.remove(&child);
    }
}

/// Selects row `index`, or nothing when there is no such row.
pub fn select_index(list: &ListBox, index: Option<usize>) {
    let row = index
        .and_then(|i| i32::try_from(i).ok())
        .and_then(|i| list.row_at_index(i));
    match row {
        Some(row) => list.select_row(Some(&row)),
        None => list.unselect_all(),
    }
}

#[inline]
pub fn create_result_row(name: &str, icon: Image, icon_size: i32) -> ListBoxRow {
    let row = ListBoxRow::new();
    let box_row = GtkBox::new(Orientation::Horizontal, 12);

    box_row.set_margin_start(12);
    box_row.set_margin_end(12);
    box_row.set_margin_top(8);
    box_row.set_margin_bottom(8);

    icon.set_pixel_size(icon_size);
    icon.set_margin_end(8);
    box_row.append(&icon);

    let name_label = create_label(name, "app-name");
    name_label.set_hexpand(true);
    box_row.append(&name_label);

    row.set_child(Some(&box_row));
    row
}

#[inline]
fn create_label(text: &str, css_class: &str) -> Label {
    let label = Label::new(Some(text));
    label.set_halign(Align::Start);
    label.set_ellipsize(gtk4::pango::EllipsizeMode::End);
    label.add_css_class(css_class);
    label
}

trait WindowAnchoring {
    fn set_anchors(&self, anchors: [bool; 4]);
}

impl WindowAnchoring for Window {
    fn set_anchors(&self, anchors: [bool; 4]) {
        self.set_anchor(Edge::Top, anchors[0]);
        self.set_anchor(Edge::Right, anchors[1]);
        self.set_anchor(Edge::Bottom, anchors[2]);
        self.set_anchor(Edge::Left, anchors[3]);
    }
}
