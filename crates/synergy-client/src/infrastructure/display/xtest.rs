//! X11 display backend: XTest injection plus a cursor hider window.
//!
//! # What is XTest? (for beginners)
//!
//! XTest is an X11 extension that lets a client synthesize keyboard and
//! mouse events as if the user had used the hardware.  Applications cannot
//! tell them apart from real input.  This backend uses:
//!
//! - `XTestFakeKeyEvent(display, keycode, is_press, time)`,
//! - `XTestFakeButtonEvent(display, button, is_press, time)`,
//! - `XTestFakeMotionEvent(display, screen, x, y, time)`.
//!
//! XTest takes *keycodes*, which is why the key synthesizer works from the
//! display's own keysym table ([`DisplayBackend::keyboard_mapping`]).
//!
//! # Cursor hider
//!
//! While the pointer is on another screen the local cursor should vanish.
//! A 1×1 override-redirect input-only window with a blank cursor is mapped
//! under the pointer; when the pointer leaves it (the user moved the local
//! mouse) the window is unmapped so nobody gets stuck with no cursor.
//!
//! # Threads
//!
//! Xlib calls are serialised through one mutex.  `XInitThreads` is called
//! before the display is opened because the session task and the event
//! pump run on different threads.
//!
//! Clipboards are held in memory.  Serving them as X selections needs a
//! selection-owner window and is not implemented here.

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::sync::{Mutex, MutexGuard};

use synergy_core::keymap::{ButtonId, KeyCode, RawKeyboardMapping};
use synergy_core::{Clipboard, ClipboardId, ModifierMask, ScreenShape};
use tracing::{debug, info};
use x11::{xlib, xtest};

use crate::application::emulate_input::{DisplayBackend, DisplayEvent, EmulationError};

/// `CurrentTime`: let the server stamp synthetic events.
const CURRENT_TIME: c_ulong = 0;

struct Connection {
    display: *mut xlib::Display,
    root: xlib::Window,
    screen: c_int,
    hider: xlib::Window,
    blank_cursor: xlib::Cursor,
}

// SAFETY: the display pointer is only used while the surrounding mutex is
// held, and XInitThreads was called before it was opened.
unsafe impl Send for Connection {}

impl Drop for Connection {
    fn drop(&mut self) {
        // SAFETY: the connection owns these resources and nothing uses them
        // after this.
        unsafe {
            xlib::XDestroyWindow(self.display, self.hider);
            xlib::XFreeCursor(self.display, self.blank_cursor);
            xlib::XCloseDisplay(self.display);
        }
    }
}

pub struct XTestDisplay {
    conn: Mutex<Connection>,
    shape: ScreenShape,
    clipboards: Mutex<[Option<Clipboard>; ClipboardId::COUNT]>,
}

impl XTestDisplay {
    /// Opens the display named by `DISPLAY` and creates the hider window.
    ///
    /// # Errors
    ///
    /// [`EmulationError::DisplayUnavailable`] if the display cannot be
    /// opened or lacks the XTest extension.
    pub fn open() -> Result<Self, EmulationError> {
        // SAFETY: called before any other Xlib function in this process's
        // use of the client backend.
        unsafe { xlib::XInitThreads() };

        // SAFETY: a null name selects the display named by DISPLAY.
        let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            let name = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
            return Err(EmulationError::DisplayUnavailable(format!("cannot open DISPLAY={name}")));
        }

        let (mut event_base, mut error_base, mut major, mut minor) = (0, 0, 0, 0);
        // SAFETY: `display` is valid; the out-pointers refer to live locals.
        let has_xtest = unsafe {
            xtest::XTestQueryExtension(display, &mut event_base, &mut error_base, &mut major, &mut minor)
        };
        if has_xtest == xlib::False {
            // SAFETY: `display` is valid and not used afterwards.
            unsafe { xlib::XCloseDisplay(display) };
            return Err(EmulationError::DisplayUnavailable(
                "X server has no XTest extension".to_string(),
            ));
        }

        // SAFETY: `display` is valid for the rest of this block.
        let conn = unsafe {
            let screen = xlib::XDefaultScreen(display);
            let root = xlib::XDefaultRootWindow(display);
            let blank_cursor = create_blank_cursor(display, root);
            let hider = create_hider(display, root, blank_cursor);
            Connection {
                display,
                root,
                screen,
                hider,
                blank_cursor,
            }
        };
        // SAFETY: as above.
        let shape = unsafe {
            ScreenShape::new(
                0,
                0,
                xlib::XDisplayWidth(display, conn.screen),
                xlib::XDisplayHeight(display, conn.screen),
            )
        };
        info!(width = shape.width, height = shape.height, major, minor, "XTest display opened");

        Ok(Self {
            conn: Mutex::new(conn),
            shape,
            clipboards: Mutex::new(Default::default()),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clipboards(&self) -> MutexGuard<'_, [Option<Clipboard>; ClipboardId::COUNT]> {
        self.clipboards.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_pointer(conn: &Connection) -> (i32, i32, c_uint) {
        let (mut root, mut child): (xlib::Window, xlib::Window) = (0, 0);
        let (mut x, mut y, mut wx, mut wy): (c_int, c_int, c_int, c_int) = (0, 0, 0, 0);
        let mut state: c_uint = 0;
        // SAFETY: every out-pointer refers to a live local.
        unsafe {
            xlib::XQueryPointer(
                conn.display,
                conn.root,
                &mut root,
                &mut child,
                &mut x,
                &mut y,
                &mut wx,
                &mut wy,
                &mut state,
            );
        }
        (x, y, state)
    }
}

fn injected(status: c_int, what: &str) -> Result<(), EmulationError> {
    if status == 0 {
        Err(EmulationError::Platform(format!("XTest rejected {what}")))
    } else {
        Ok(())
    }
}

impl DisplayBackend for XTestDisplay {
    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn cursor_position(&self) -> (i32, i32) {
        let (x, y, _) = Self::query_pointer(&self.conn());
        (x, y)
    }

    fn keyboard_mapping(&self) -> Result<RawKeyboardMapping, EmulationError> {
        let conn = self.conn();
        // SAFETY: the connection is valid while locked.
        unsafe { read_keyboard_mapping(conn.display) }
            .ok_or_else(|| EmulationError::Platform("X server returned no keyboard mapping".to_string()))
    }

    fn toggle_state(&self) -> ModifierMask {
        let (_, _, state) = Self::query_pointer(&self.conn());
        let mut toggles = ModifierMask::empty();
        if state & xlib::LockMask != 0 {
            toggles |= ModifierMask::CAPS_LOCK;
        }
        if state & xlib::Mod2Mask != 0 {
            toggles |= ModifierMask::NUM_LOCK;
        }
        toggles
    }

    fn fake_key(&self, keycode: KeyCode, press: bool) -> Result<(), EmulationError> {
        let conn = self.conn();
        // SAFETY: the connection is valid while locked.
        let status = unsafe {
            xtest::XTestFakeKeyEvent(conn.display, c_uint::from(keycode), c_int::from(press), CURRENT_TIME)
        };
        injected(status, "key event")
    }

    fn fake_button(&self, button: ButtonId, press: bool) -> Result<(), EmulationError> {
        let conn = self.conn();
        // SAFETY: the connection is valid while locked.
        let status = unsafe {
            xtest::XTestFakeButtonEvent(conn.display, c_uint::from(button), c_int::from(press), CURRENT_TIME)
        };
        injected(status, "button event")
    }

    fn fake_motion(&self, x: i32, y: i32) -> Result<(), EmulationError> {
        let (x, y) = self.shape.clamp(x, y);
        let conn = self.conn();
        // SAFETY: the connection is valid while locked.
        let status = unsafe { xtest::XTestFakeMotionEvent(conn.display, conn.screen, x, y, CURRENT_TIME) };
        injected(status, "motion event")
    }

    fn flush(&self) -> Result<(), EmulationError> {
        let conn = self.conn();
        // SAFETY: the connection is valid while locked.
        unsafe { xlib::XFlush(conn.display) };
        Ok(())
    }

    fn show_hider(&self, x: i32, y: i32) {
        let conn = self.conn();
        // SAFETY: the connection and the hider window are valid while locked.
        unsafe {
            xlib::XMoveWindow(conn.display, conn.hider, x, y);
            xlib::XMapRaised(conn.display, conn.hider);
            xlib::XFlush(conn.display);
        }
    }

    fn hide_hider(&self) {
        let conn = self.conn();
        // SAFETY: the connection and the hider window are valid while locked.
        unsafe {
            xlib::XUnmapWindow(conn.display, conn.hider);
            xlib::XFlush(conn.display);
        }
    }

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) -> Result<(), EmulationError> {
        let mut clipboards = self.clipboards();
        let slot = clipboards
            .get_mut(id.index())
            .ok_or_else(|| EmulationError::Platform(format!("no {id}")))?;
        *slot = Some(clipboard.clone());
        Ok(())
    }

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard> {
        self.clipboards().get(id.index()).cloned().flatten()
    }

    fn poll_event(&self) -> Option<DisplayEvent> {
        let conn = self.conn();
        // SAFETY: the connection is valid while locked; XNextEvent fills
        // `event` completely.
        unsafe {
            if xlib::XPending(conn.display) == 0 {
                return None;
            }
            let mut event: xlib::XEvent = std::mem::zeroed();
            xlib::XNextEvent(conn.display, &mut event);
            let kind = event.get_type();
            let translated = match kind {
                xlib::MappingNotify => {
                    xlib::XRefreshKeyboardMapping(&mut event.mapping);
                    DisplayEvent::MappingChanged
                }
                xlib::LeaveNotify if event.crossing.window == conn.hider => DisplayEvent::HiderLeave,
                other => DisplayEvent::Other(other),
            };
            debug!(?translated, "X event");
            Some(translated)
        }
    }
}

// ── Xlib helpers ──────────────────────────────────────────────────────────────

/// An invisible 8×8 cursor.
///
/// # Safety
///
/// `display` must be a valid connection and `root` a window on it.
unsafe fn create_blank_cursor(display: *mut xlib::Display, root: xlib::Window) -> xlib::Cursor {
    let bits: [c_char; 8] = [0; 8];
    let pixmap = xlib::XCreateBitmapFromData(display, root, bits.as_ptr(), 8, 8);
    let mut color: xlib::XColor = std::mem::zeroed();
    let cursor = xlib::XCreatePixmapCursor(display, pixmap, pixmap, &mut color, &mut color, 0, 0);
    xlib::XFreePixmap(display, pixmap);
    cursor
}

/// The 1×1 window that hides the cursor.  Created unmapped.
///
/// # Safety
///
/// `display` must be a valid connection, `root` a window on it and `cursor`
/// a cursor created on it.
unsafe fn create_hider(
    display: *mut xlib::Display,
    root: xlib::Window,
    cursor: xlib::Cursor,
) -> xlib::Window {
    let mut attributes: xlib::XSetWindowAttributes = std::mem::zeroed();
    attributes.override_redirect = xlib::True;
    attributes.cursor = cursor;
    attributes.event_mask = xlib::LeaveWindowMask;
    xlib::XCreateWindow(
        display,
        root,
        0,
        0,
        1,
        1,
        0,
        0,
        xlib::InputOnly as c_uint,
        std::ptr::null_mut(),
        xlib::CWOverrideRedirect | xlib::CWCursor | xlib::CWEventMask,
        &mut attributes,
    )
}

/// Reads the keysym table and the eight modifier slots.
///
/// # Safety
///
/// `display` must be a valid connection.
unsafe fn read_keyboard_mapping(display: *mut xlib::Display) -> Option<RawKeyboardMapping> {
    let (mut min, mut max): (c_int, c_int) = (0, 0);
    xlib::XDisplayKeycodes(display, &mut min, &mut max);
    let count = max - min + 1;
    if count <= 0 {
        return None;
    }

    let mut per_keycode: c_int = 0;
    let table = xlib::XGetKeyboardMapping(display, min as u8, count, &mut per_keycode);
    if table.is_null() || per_keycode <= 0 {
        return None;
    }
    let keysyms = std::slice::from_raw_parts(table as *const c_ulong, (count * per_keycode) as usize)
        .iter()
        .map(|&k| k as u32)
        .collect();
    xlib::XFree(table as *mut c_void);

    let mut raw = RawKeyboardMapping {
        min_keycode: min as KeyCode,
        keysyms_per_keycode: per_keycode as usize,
        keysyms,
        modifier_slots: Default::default(),
    };

    let modmap = xlib::XGetModifierMapping(display);
    if !modmap.is_null() {
        let per_slot = (*modmap).max_keypermod.max(0) as usize;
        let keys = std::slice::from_raw_parts((*modmap).modifiermap, per_slot * 8);
        for (slot, chunk) in raw.modifier_slots.iter_mut().zip(keys.chunks(per_slot.max(1))) {
            *slot = chunk.iter().copied().filter(|&k| k != 0).collect();
        }
        xlib::XFreeModifiermap(modmap);
    }
    Some(raw)
}
