//! X11 primary screen via Xlib.
//!
//! # How it works (for beginners)
//!
//! Xlib connections are not thread-safe, so one dedicated OS thread owns the
//! `Display` and does everything:
//!
//! - **At home** it polls `XQueryPointer` every few milliseconds and reports
//!   absolute positions.  Keyboard and mouse stay with local applications.
//! - **Away** it grabs the pointer and keyboard with a blank cursor, pins the
//!   pointer at the screen centre and reports how far it moved since the last
//!   poll as a relative delta.  Key and button events arrive through the grab
//!   and are translated by the [`KeyTranslator`].
//! - A `MappingNotify` event rebuilds the translator's keyboard table.
//!
//! The router talks to the thread through a command channel, so
//! [`X11Primary`]'s trait methods never touch Xlib directly.
//!
//! Clipboards are kept in memory.  Exchanging them with X selections needs a
//! selection-owner window and is left to a later change.

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use synergy_core::keymap::layouts::us_pc105;
use synergy_core::keymap::{KeyCode, KeymapError, RawKeyboardMapping};
use synergy_core::{Clipboard, ClipboardId, ModifierMask, ScreenShape};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use x11::xlib;

use super::key_translator::KeyTranslator;
use super::{PrimaryEvent, PrimaryScreen};

// ── Constants ─────────────────────────────────────────────────────────────────

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One wheel notch in protocol units.
const WHEEL_NOTCH: i16 = 120;

#[derive(Debug, Error)]
pub enum X11Error {
    #[error("cannot open X display (DISPLAY={0})")]
    DisplayUnavailable(String),

    #[error("invalid keyboard mapping: {0}")]
    Keymap(#[from] KeymapError),

    #[error("X11 thread exited during start-up")]
    ThreadExited,
}

enum Command {
    Enter { x: i32, y: i32 },
    Leave,
}

// ── Public handle ─────────────────────────────────────────────────────────────

pub struct X11Primary {
    shape: ScreenShape,
    commands: Mutex<std_mpsc::Sender<Command>>,
    clipboards: Mutex<[Option<Clipboard>; ClipboardId::COUNT]>,
    toggles: Arc<AtomicU16>,
}

impl X11Primary {
    /// Opens the display on a new thread.
    ///
    /// Input is sent to `events` until `running` is cleared or the receiver
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`X11Error::DisplayUnavailable`] if `DISPLAY` cannot be opened.
    pub fn spawn(
        events: mpsc::Sender<PrimaryEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(Self, JoinHandle<()>), X11Error> {
        let (command_tx, command_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let toggles = Arc::new(AtomicU16::new(0));
        let thread_toggles = Arc::clone(&toggles);

        let handle = thread::Builder::new()
            .name("x11-primary".to_string())
            .spawn(move || {
                let mut driver = match Driver::open(events, command_rx, thread_toggles) {
                    Ok(driver) => driver,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(driver.shape));
                driver.run(&running);
            })
            .map_err(|_| X11Error::ThreadExited)?;

        let shape = ready_rx.recv().map_err(|_| X11Error::ThreadExited)??;
        info!(width = shape.width, height = shape.height, "X11 primary screen opened");
        Ok((
            Self {
                shape,
                commands: Mutex::new(command_tx),
                clipboards: Mutex::new(Default::default()),
                toggles,
            },
            handle,
        ))
    }

    fn command(&self, command: Command) {
        let sender = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        if sender.send(command).is_err() {
            warn!("X11 thread is gone; command dropped");
        }
    }

    fn clipboards(&self) -> std::sync::MutexGuard<'_, [Option<Clipboard>; ClipboardId::COUNT]> {
        self.clipboards.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PrimaryScreen for X11Primary {
    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn enter(&self, x: i32, y: i32) {
        self.command(Command::Enter { x, y });
    }

    fn leave(&self) {
        self.command(Command::Leave);
    }

    fn grab_clipboard(&self, id: ClipboardId) {
        if let Some(slot) = self.clipboards().get_mut(id.index()) {
            *slot = None;
        }
    }

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) {
        if let Some(slot) = self.clipboards().get_mut(id.index()) {
            *slot = Some(clipboard.clone());
        }
    }

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard> {
        self.clipboards().get(id.index()).cloned().flatten()
    }

    fn toggle_mask(&self) -> ModifierMask {
        ModifierMask::from_bits_truncate(self.toggles.load(Ordering::Relaxed))
    }
}

// ── Display thread ────────────────────────────────────────────────────────────

struct Driver {
    display: *mut xlib::Display,
    root: xlib::Window,
    blank_cursor: xlib::Cursor,
    shape: ScreenShape,
    translator: KeyTranslator,
    events: mpsc::Sender<PrimaryEvent>,
    commands: std_mpsc::Receiver<Command>,
    toggles: Arc<AtomicU16>,
    away: bool,
    last: (i32, i32),
}

impl Driver {
    fn open(
        events: mpsc::Sender<PrimaryEvent>,
        commands: std_mpsc::Receiver<Command>,
        toggles: Arc<AtomicU16>,
    ) -> Result<Self, X11Error> {
        // SAFETY: a null name selects the display named by DISPLAY.  The
        // pointer is closed in Drop.
        let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            let name = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
            return Err(X11Error::DisplayUnavailable(name));
        }

        // SAFETY: `display` is a valid connection for the rest of this block.
        let (root, shape, blank_cursor, raw) = unsafe {
            let screen = xlib::XDefaultScreen(display);
            let root = xlib::XDefaultRootWindow(display);
            let shape = ScreenShape::new(
                0,
                0,
                xlib::XDisplayWidth(display, screen),
                xlib::XDisplayHeight(display, screen),
            );
            (root, shape, create_blank_cursor(display, root), read_keyboard_mapping(display))
        };

        let raw = raw.unwrap_or_else(|| {
            warn!("X server returned no keyboard mapping; assuming US pc105");
            us_pc105()
        });
        let translator = match KeyTranslator::new(raw) {
            Ok(t) => t,
            Err(e) => {
                // SAFETY: `display` is valid and not used afterwards.
                unsafe { xlib::XCloseDisplay(display) };
                return Err(e.into());
            }
        };

        Ok(Self {
            display,
            root,
            blank_cursor,
            shape,
            translator,
            events,
            commands,
            toggles,
            away: false,
            last: shape.center(),
        })
    }

    fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            while let Ok(command) = self.commands.try_recv() {
                match command {
                    Command::Enter { x, y } => self.enter(x, y),
                    Command::Leave => self.leave(),
                }
            }
            if !self.drain_events() || !self.poll_pointer() {
                debug!("primary event receiver closed");
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if self.away {
            let (x, y) = self.shape.center();
            self.enter(x, y);
        }
        info!("X11 primary thread stopped");
    }

    fn enter(&mut self, x: i32, y: i32) {
        // SAFETY: `self.display` is valid for the lifetime of the driver.
        unsafe {
            xlib::XUngrabKeyboard(self.display, xlib::CurrentTime);
            xlib::XUngrabPointer(self.display, xlib::CurrentTime);
            xlib::XWarpPointer(self.display, 0, self.root, 0, 0, 0, 0, x, y);
            xlib::XFlush(self.display);
        }
        self.translator.reset();
        self.away = false;
        self.last = (x, y);
        debug!(x, y, "cursor shown on primary");
    }

    fn leave(&mut self) {
        let mask = (xlib::ButtonPressMask | xlib::ButtonReleaseMask | xlib::PointerMotionMask)
            as c_uint;
        // SAFETY: `self.display` is valid; the grab is released in `enter`.
        let (pointer, keyboard) = unsafe {
            let pointer = xlib::XGrabPointer(
                self.display,
                self.root,
                xlib::False,
                mask,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                self.root,
                self.blank_cursor,
                xlib::CurrentTime,
            );
            let keyboard = xlib::XGrabKeyboard(
                self.display,
                self.root,
                xlib::False,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                xlib::CurrentTime,
            );
            (pointer, keyboard)
        };
        if pointer != xlib::GrabSuccess || keyboard != xlib::GrabSuccess {
            warn!(pointer, keyboard, "could not grab input; another client holds a grab");
        }
        self.translator.set_toggles(self.query_pointer().2);
        self.pin();
        self.away = true;
        debug!("cursor hidden on primary");
    }

    /// Warps the pointer to the centre, where deltas are measured from.
    fn pin(&mut self) {
        let (x, y) = self.shape.center();
        // SAFETY: `self.display` is valid.
        unsafe {
            xlib::XWarpPointer(self.display, 0, self.root, 0, 0, 0, 0, x, y);
            xlib::XFlush(self.display);
        }
        self.last = (x, y);
    }

    /// Reports pointer motion.  Returns `false` once nobody is listening.
    fn poll_pointer(&mut self) -> bool {
        let (x, y, toggles) = self.query_pointer();
        self.toggles.store(toggles.bits(), Ordering::Relaxed);
        if (x, y) == self.last {
            return true;
        }
        if self.away {
            let (dx, dy) = (x - self.last.0, y - self.last.1);
            self.pin();
            self.send(PrimaryEvent::PointerDelta { dx, dy })
        } else {
            self.last = (x, y);
            self.send(PrimaryEvent::PointerMove { x, y })
        }
    }

    fn query_pointer(&self) -> (i32, i32, ModifierMask) {
        let (mut root, mut child): (xlib::Window, xlib::Window) = (0, 0);
        let (mut x, mut y, mut wx, mut wy): (c_int, c_int, c_int, c_int) = (0, 0, 0, 0);
        let mut state: c_uint = 0;
        // SAFETY: every out-pointer refers to a live local.
        unsafe {
            xlib::XQueryPointer(
                self.display,
                self.root,
                &mut root,
                &mut child,
                &mut x,
                &mut y,
                &mut wx,
                &mut wy,
                &mut state,
            );
        }
        let mut toggles = ModifierMask::empty();
        if state & xlib::LockMask != 0 {
            toggles |= ModifierMask::CAPS_LOCK;
        }
        if state & xlib::Mod2Mask != 0 {
            toggles |= ModifierMask::NUM_LOCK;
        }
        (x, y, toggles)
    }

    /// Handles queued X events.  Returns `false` once nobody is listening.
    fn drain_events(&mut self) -> bool {
        // SAFETY: `self.display` is valid; XNextEvent fills `event` fully.
        while unsafe { xlib::XPending(self.display) } > 0 {
            let mut event: xlib::XEvent = unsafe { std::mem::zeroed() };
            unsafe { xlib::XNextEvent(self.display, &mut event) };

            let translated = match event.get_type() {
                xlib::KeyPress | xlib::KeyRelease if self.away => {
                    // SAFETY: the type tag says this is a key event.
                    let keycode = unsafe { event.key.keycode } as KeyCode;
                    let key = if event.get_type() == xlib::KeyPress {
                        self.translator.press(keycode)
                    } else {
                        self.translator.release(keycode)
                    };
                    key.map(PrimaryEvent::Key)
                }
                xlib::ButtonPress | xlib::ButtonRelease if self.away => {
                    // SAFETY: the type tag says this is a button event.
                    let button = unsafe { event.button.button };
                    let down = event.get_type() == xlib::ButtonPress;
                    match button {
                        4 if down => Some(PrimaryEvent::Wheel { delta: WHEEL_NOTCH }),
                        5 if down => Some(PrimaryEvent::Wheel { delta: -WHEEL_NOTCH }),
                        4..=7 => None,
                        b => u8::try_from(b)
                            .ok()
                            .map(|button| PrimaryEvent::Button { button, down }),
                    }
                }
                xlib::MappingNotify => {
                    // SAFETY: the type tag says this is a mapping event.
                    unsafe { xlib::XRefreshKeyboardMapping(&mut event.mapping) };
                    self.reload_keymap();
                    None
                }
                _ => None,
            };
            if let Some(event) = translated {
                if !self.send(event) {
                    return false;
                }
            }
        }
        true
    }

    fn reload_keymap(&mut self) {
        // SAFETY: `self.display` is valid.
        let Some(raw) = (unsafe { read_keyboard_mapping(self.display) }) else {
            warn!("keyboard mapping changed but could not be read");
            return;
        };
        if let Err(e) = self.translator.set_mapping(raw) {
            error!("ignoring new keyboard mapping: {e}");
        }
    }

    fn send(&self, event: PrimaryEvent) -> bool {
        self.events.blocking_send(event).is_ok()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // SAFETY: the driver owns `display` and nothing uses it after this.
        unsafe {
            xlib::XFreeCursor(self.display, self.blank_cursor);
            xlib::XCloseDisplay(self.display);
        }
    }
}

// ── Xlib helpers ──────────────────────────────────────────────────────────────

/// An invisible 8×8 cursor shown while the pointer is grabbed.
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
    let len = (count * per_keycode) as usize;
    let keysyms: Vec<u32> = std::slice::from_raw_parts(table as *const c_ulong, len)
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
        for (slot, codes) in raw.modifier_slots.iter_mut().enumerate() {
            *codes = keys[slot * per_slot..(slot + 1) * per_slot]
                .iter()
                .copied()
                .filter(|&k| k != 0)
                .collect();
        }
        xlib::XFreeModifiermap(modmap);
    }
    Some(raw)
}
