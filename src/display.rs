//! Display region settings of the video render.

use crate::component::{ComponentRegistry, ComponentRole};
use crate::hardware::Config;
use crate::ports::RENDER_INPUT_PORT;

/// How a picture is fitted into the destination rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Stretch to fill.
    Fill,
    /// Keep the aspect ratio, pad with borders.
    Letterbox,
}

/// Destination rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: i32,
    /// Height.
    pub height: i32,
}

/// A display region config. Only the fields that are `Some` are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRegion {
    /// Video render port.
    pub port: u32,
    /// Fitting mode.
    pub mode: Option<DisplayMode>,
    /// Ignore the stream's aspect ratio.
    pub noaspect: Option<bool>,
    /// Pixel aspect ratio as `(width, height)`.
    pub pixel_aspect: Option<(i32, i32)>,
    /// Use the whole screen.
    pub fullscreen: Option<bool>,
    /// Destination rectangle.
    pub dest_rect: Option<Rect>,
    /// Compositing layer.
    pub layer: Option<i32>,
    /// Display number.
    pub display: Option<u32>,
}

impl DisplayRegion {
    fn empty() -> Self {
        Self {
            port: RENDER_INPUT_PORT,
            mode: None,
            noaspect: None,
            pixel_aspect: None,
            fullscreen: None,
            dest_rect: None,
            layer: None,
            display: None,
        }
    }

    /// Fill or letterbox, with or without aspect correction.
    pub fn mode(fill: bool, noaspect: bool) -> Self {
        Self {
            mode: Some(if fill {
                DisplayMode::Fill
            } else {
                DisplayMode::Letterbox
            }),
            noaspect: Some(noaspect),
            ..Self::empty()
        }
    }

    /// Pixel aspect ratio.
    pub fn pixel_aspect(width: i32, height: i32) -> Self {
        Self {
            pixel_aspect: Some((width, height)),
            ..Self::empty()
        }
    }

    /// Destination rectangle; an all-zero rectangle means fullscreen.
    pub fn destination(x: i32, y: i32, width: i32, height: i32) -> Self {
        let rect = Rect {
            x,
            y,
            width,
            height,
        };
        Self {
            fullscreen: Some(rect == Rect::default()),
            dest_rect: Some(rect),
            ..Self::empty()
        }
    }

    /// Display number and layer.
    pub fn display(display: u32, layer: i32) -> Self {
        Self {
            display: Some(display),
            layer: Some(layer),
            ..Self::empty()
        }
    }
}

pub(crate) fn apply(components: &ComponentRegistry, region: DisplayRegion, what: &str) {
    if let Err(e) = components.set_config(ComponentRole::Render, &Config::DisplayRegion(region)) {
        tracing::error!(error = %e, "failed to set {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_region() {
        let region = DisplayRegion::mode(true, false);
        assert_eq!(region.port, RENDER_INPUT_PORT);
        assert_eq!(region.mode, Some(DisplayMode::Fill));
        assert_eq!(region.noaspect, Some(false));
        assert!(region.dest_rect.is_none());

        assert_eq!(
            DisplayRegion::mode(false, true).mode,
            Some(DisplayMode::Letterbox)
        );
    }

    #[test]
    fn test_zero_destination_is_fullscreen() {
        assert_eq!(DisplayRegion::destination(0, 0, 0, 0).fullscreen, Some(true));

        let region = DisplayRegion::destination(10, 20, 640, 360);
        assert_eq!(region.fullscreen, Some(false));
        assert_eq!(
            region.dest_rect,
            Some(Rect {
                x: 10,
                y: 20,
                width: 640,
                height: 360
            })
        );
    }

    #[test]
    fn test_display_and_layer() {
        let region = DisplayRegion::display(0, 1);
        assert_eq!(region.display, Some(0));
        assert_eq!(region.layer, Some(1));
        assert!(region.mode.is_none());
        assert!(region.pixel_aspect.is_none());
    }
}
