//! Placement of a contextual menu next to its anchor.

/// Horizontal and vertical gap kept between the menu and its anchor or the
/// viewport edge.
pub const MENU_MARGIN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Top-left corner for a menu of `menu` size anchored at `anchor`.
///
/// Prefers the right of the anchor, aligned with its top. Switches to the left
/// when the right placement would leave the viewport, and moves up when the
/// menu would run past the bottom. Never returns negative coordinates.
pub fn place_menu(anchor: Rect, viewport: Size, menu: Size) -> Point {
    let right_x = anchor.right + MENU_MARGIN;
    let x = if right_x + menu.width > viewport.width {
        (anchor.left - menu.width - MENU_MARGIN).max(0.0)
    } else {
        right_x
    };

    let y = if anchor.top + menu.height > viewport.height {
        (viewport.height - menu.height - MENU_MARGIN).max(0.0)
    } else {
        anchor.top
    };

    Point { x, y }
}
