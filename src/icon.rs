//! Theme icon lookup for `image://icon/<name>` requests.

use gtk4::{gdk, gio, prelude::*, IconLookupFlags, IconPaintable, IconTheme, TextDirection};
use log::trace;
use once_cell::unsync::OnceCell;
use std::path::Path;

/// Edge length used for any axis the caller leaves unspecified.
pub const DEFAULT_ICON_SIZE: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    /// No size requested.
    pub const INVALID: Size = Size::new(-1, -1);

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub const fn square(edge: i32) -> Self {
        Self::new(edge, edge)
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Picks the pixel size for a request: each positive axis is honoured, any
/// other axis falls back to [`DEFAULT_ICON_SIZE`].
pub fn resolve_size(requested: Size) -> Size {
    let axis = |value: i32| if value > 0 { value } else { DEFAULT_ICON_SIZE };
    Size::new(axis(requested.width), axis(requested.height))
}

/// A rendered image handed back to the UI.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub paintable: gdk::Paintable,
    pub size: Size,
}

/// Something the engine can ask for images by id.
pub trait ImageProvider {
    /// Returns the image for `id` together with the provider's natural size.
    fn request_pixmap(&self, id: &str, requested: Size) -> (Option<Pixmap>, Size);
}

/// Resolves icon names through the OS icon theme.
///
/// Lookups are not cached and a name the theme doesn't know comes back
/// however the theme reports it.
#[derive(Debug, Default)]
pub struct IconProvider {
    theme_name: Option<String>,
    /// Built on first use, once GTK is up.
    custom_theme: OnceCell<IconTheme>,
}

impl IconProvider {
    pub fn new(theme_name: Option<String>) -> Self {
        Self {
            theme_name,
            custom_theme: OnceCell::new(),
        }
    }

    fn theme(&self, display: &gdk::Display) -> IconTheme {
        match &self.theme_name {
            Some(name) => self
                .custom_theme
                .get_or_init(|| {
                    let theme = IconTheme::new();
                    theme.set_theme_name(Some(name.as_str()));
                    theme
                })
                .clone(),
            None => IconTheme::for_display(display),
        }
    }

    fn lookup(&self, id: &str, size: Size) -> Option<IconPaintable> {
        // Icon themes only store square icons.
        let edge = size.width.min(size.height);

        if Path::new(id).is_absolute() {
            let file = gio::File::for_path(id);
            return Some(IconPaintable::for_file(&file, edge, 1));
        }

        let display = gdk::Display::default()?;
        Some(self.theme(&display).lookup_icon(
            id,
            &[],
            edge,
            1,
            TextDirection::None,
            IconLookupFlags::empty(),
        ))
    }
}

impl ImageProvider for IconProvider {
    fn request_pixmap(&self, id: &str, requested: Size) -> (Option<Pixmap>, Size) {
        let natural = Size::square(DEFAULT_ICON_SIZE);
        let size = resolve_size(requested);
        trace!("Icon request {} at {}x{}", id, size.width, size.height);

        let pixmap = self.lookup(id, size).map(|paintable| Pixmap {
            paintable: paintable.upcast(),
            size,
        });
        (pixmap, natural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrequested_size_uses_default() {
        assert_eq!(resolve_size(Size::INVALID), Size::square(128));
        assert_eq!(resolve_size(Size::default()), Size::square(128));
    }

    #[test]
    fn non_positive_dimensions_use_default() {
        assert_eq!(resolve_size(Size::new(0, 0)), Size::square(128));
        assert_eq!(resolve_size(Size::new(-5, 0)), Size::square(128));
        assert_eq!(resolve_size(Size::new(i32::MIN, -1)), Size::square(128));
    }

    #[test]
    fn positive_dimensions_are_honoured() {
        assert_eq!(resolve_size(Size::new(32, 64)), Size::new(32, 64));
        assert_eq!(resolve_size(Size::new(1, 1)), Size::new(1, 1));
        assert_eq!(resolve_size(Size::new(512, 512)), Size::new(512, 512));
    }

    #[test]
    fn custom_theme_is_built_lazily() {
        let provider = IconProvider::new(Some(String::from("Papirus")));

        assert!(provider.custom_theme.get().is_none());
        assert!(IconProvider::default().theme_name.is_none());
    }

    #[test]
    fn each_axis_falls_back_independently() {
        assert_eq!(resolve_size(Size::new(48, 0)), Size::new(48, 128));
        assert_eq!(resolve_size(Size::new(-1, 24)), Size::new(128, 24));
    }
}
