use std::cell::RefCell;
use std::thread::LocalKey;

use gloo_storage::Storage;
use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use waymark_shared::{GeoPoint, SaveLocationRequest};

use crate::api;
use crate::app::show_banner;
use crate::history_view::{self, HistoryEntry};
use crate::map_bridge;
use crate::movement;
use crate::sensor::{self, GeoErrorKind, PositionFix};

/// Period of the self-save safety net.
pub const SELF_SAVE_INTERVAL_MS: i32 = 3_000;
/// Period of the liveness heartbeat.
pub const HEARTBEAT_INTERVAL_MS: i32 = 30_000;
/// A stream with no fix for longer than this is considered stalled.
pub const STALL_AFTER_MS: f64 = 120_000.0;
/// Delay before reopening the watch after a transient signal loss.
pub const REOPEN_DELAY_MS: u32 = 5_000;
/// Delay between repeated reopen attempts when the sensor keeps rejecting us.
pub const REOPEN_RETRY_MS: u32 = 10_000;

const TRACKING_FLAG_KEY: &str = "waymark_tracking";

/// Signal bundle the session operations work against. `Copy`, so the
/// timer and sensor closures can capture it freely.
#[derive(Clone, Copy)]
pub struct SessionHandles {
    pub active: RwSignal<bool>,
    pub current_fix: RwSignal<Option<PositionFix>>,
    pub last_position_at: RwSignal<Option<f64>>,
    pub last_saved: RwSignal<Option<GeoPoint>>,
    pub last_save_at: RwSignal<Option<f64>>,
    pub saved_count: RwSignal<u32>,
    pub banner: RwSignal<Option<String>>,
    pub history: RwSignal<Vec<HistoryEntry>>,
}

/// What to do about one sensor error. Total over the error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Fatal without user action: tear the session down.
    StopTracking,
    /// Transient signal loss: reopen the watch after a delay.
    ReopenAfter { delay_ms: u32 },
    /// The continuous watch retries on its own.
    KeepWatching,
}

pub fn recovery_action(kind: GeoErrorKind) -> RecoveryAction {
    match kind {
        GeoErrorKind::PermissionDenied => RecoveryAction::StopTracking,
        GeoErrorKind::PositionUnavailable => RecoveryAction::ReopenAfter {
            delay_ms: REOPEN_DELAY_MS,
        },
        GeoErrorKind::Timeout | GeoErrorKind::Other => RecoveryAction::KeepWatching,
    }
}

fn error_note(kind: GeoErrorKind) -> &'static str {
    match kind {
        GeoErrorKind::PermissionDenied => {
            "Location access was denied. Enable location services for this site and refresh the page."
        }
        GeoErrorKind::PositionUnavailable => "GPS signal temporarily unavailable, reconnecting",
        GeoErrorKind::Timeout => "Location request timed out, tracking continues",
        GeoErrorKind::Other => "Location service error, tracking continues",
    }
}

/// Milliseconds since the last fix. A stream that has never produced a fix
/// counts as fresh, so startup cannot trip the stall detector.
pub fn stalled_for_ms(last_position_at: Option<f64>, now_ms: f64) -> f64 {
    now_ms - last_position_at.unwrap_or(now_ms)
}

pub fn stream_stalled(last_position_at: Option<f64>, now_ms: f64) -> bool {
    stalled_for_ms(last_position_at, now_ms) > STALL_AFTER_MS
}

/// Whether the self-save net should fire: more than three periods since the
/// last save was issued. Never-saved sessions wait for the change detector.
pub fn save_overdue(last_save_at: Option<f64>, now_ms: f64) -> bool {
    last_save_at.is_some_and(|t| now_ms - t > SELF_SAVE_INTERVAL_MS as f64 * 3.0)
}

struct IntervalBinding {
    window: web_sys::Window,
    interval_id: i32,
    _callback: Closure<dyn Fn()>,
}

thread_local! {
    static SELF_SAVE_BINDING: RefCell<Option<IntervalBinding>> = const { RefCell::new(None) };
    static HEARTBEAT_BINDING: RefCell<Option<IntervalBinding>> = const { RefCell::new(None) };
    static REOPEN_TIMEOUT: RefCell<Option<Timeout>> = const { RefCell::new(None) };
}

fn install_interval(
    slot: &'static LocalKey<RefCell<Option<IntervalBinding>>>,
    period_ms: i32,
    callback: impl Fn() + 'static,
) {
    clear_installed_interval(slot);
    let Some(window) = web_sys::window() else {
        return;
    };
    let cb = Closure::<dyn Fn()>::new(callback);
    let Ok(interval_id) = window
        .set_interval_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), period_ms)
    else {
        return;
    };
    slot.with(|slot| {
        *slot.borrow_mut() = Some(IntervalBinding {
            window: window.clone(),
            interval_id,
            _callback: cb,
        });
    });
}

fn clear_installed_interval(slot: &'static LocalKey<RefCell<Option<IntervalBinding>>>) {
    slot.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            old.window.clear_interval_with_handle(old.interval_id);
        }
    });
}

fn cancel_reopen_timer() {
    REOPEN_TIMEOUT.with(|slot| {
        if let Some(pending) = slot.borrow_mut().take() {
            pending.cancel();
        }
    });
}

/// Persist the active flag so a reload can restore the session.
pub(crate) fn persist_active_flag(active: bool) {
    let _ = gloo_storage::LocalStorage::set(TRACKING_FLAG_KEY, &active);
}

pub(crate) fn stored_active_flag() -> bool {
    gloo_storage::LocalStorage::get(TRACKING_FLAG_KEY).unwrap_or(false)
}

/// Begin tracking. No-op while already active; fails without activating
/// when the browser has no geolocation capability.
pub fn start_tracking(s: SessionHandles) {
    if s.active.get_untracked() {
        return;
    }
    let Some(geolocation) = sensor::geolocation() else {
        show_banner(s.banner, "Geolocation is not supported by this browser");
        return;
    };

    s.active.set(true);
    persist_active_flag(true);

    // Immediate high-accuracy fix so the panel fills in before the watch settles.
    if let Err(e) = sensor::request_single_fix(
        &geolocation,
        move |fix| handle_position(s, fix),
        move |kind| handle_sensor_error(s, kind),
    ) {
        web_sys::console::warn_1(&format!("Initial position request failed: {e}").into());
    }

    if let Err(e) = sensor::open_watch(
        move |fix| handle_position(s, fix),
        move |kind| handle_sensor_error(s, kind),
    ) {
        web_sys::console::warn_1(&format!("Failed to start position watch: {e}").into());
        show_banner(s.banner, "Failed to start location tracking");
        stop_tracking(s);
        return;
    }

    start_self_save(s);
    start_heartbeat(s);
    web_sys::console::info_1(&"Location tracking started".into());
}

/// Stop tracking and cancel every outstanding timer and subscription.
/// Callable from any state.
pub fn stop_tracking(s: SessionHandles) {
    sensor::clear_watch();
    clear_installed_interval(&SELF_SAVE_BINDING);
    clear_installed_interval(&HEARTBEAT_BINDING);
    cancel_reopen_timer();
    map_bridge::cancel_retry();

    s.active.set(false);
    persist_active_flag(false);
    web_sys::console::info_1(&"Location tracking stopped".into());
}

fn handle_position(s: SessionHandles, fix: PositionFix) {
    // A queued callback can still land after stop(); drop it.
    if !s.active.get_untracked() {
        return;
    }

    s.last_position_at.set(Some(fix.observed_at_ms));
    s.current_fix.set(Some(fix));

    map_bridge::push_fix(s, fix);

    if movement::should_save(s.last_saved.get_untracked().as_ref(), fix.point()) {
        s.last_saved.set(Some(fix.point()));
        save_fix(s, fix);
    }
}

fn handle_sensor_error(s: SessionHandles, kind: GeoErrorKind) {
    match recovery_action(kind) {
        RecoveryAction::StopTracking => {
            show_banner(s.banner, error_note(kind));
            stop_tracking(s);
        }
        RecoveryAction::ReopenAfter { delay_ms } => {
            web_sys::console::warn_1(&format!("Sensor: {}", error_note(kind)).into());
            schedule_reopen(s, delay_ms);
        }
        RecoveryAction::KeepWatching => {
            web_sys::console::warn_1(&format!("Sensor: {}", error_note(kind)).into());
        }
    }
}

/// Reopen the continuous watch if it is not running. Shared by the
/// heartbeat, the error handler, and the page-visibility handler;
/// idempotent while a watch is open.
pub(crate) fn reopen_watch(s: SessionHandles) {
    if !s.active.get_untracked() || sensor::watch_open() {
        return;
    }
    match sensor::open_watch(
        move |fix| handle_position(s, fix),
        move |kind| handle_sensor_error(s, kind),
    ) {
        Ok(()) => web_sys::console::info_1(&"Position watch reopened".into()),
        Err(e) => {
            web_sys::console::warn_1(
                &format!("Reopening position watch failed: {e}; retrying in {REOPEN_RETRY_MS}ms")
                    .into(),
            );
            schedule_reopen(s, REOPEN_RETRY_MS);
        }
    }
}

fn schedule_reopen(s: SessionHandles, delay_ms: u32) {
    REOPEN_TIMEOUT.with(|slot| {
        if let Some(pending) = slot.borrow_mut().take() {
            pending.cancel();
        }
        let timeout = Timeout::new(delay_ms, move || {
            reopen_watch(s);
        });
        *slot.borrow_mut() = Some(timeout);
    });
}

/// Persist the latest fix remotely; bookkeeping first so the self-save net
/// does not stampede while the request is in flight.
pub(crate) fn save_fix(s: SessionHandles, fix: PositionFix) {
    s.last_save_at.set(Some(js_sys::Date::now()));
    spawn_local(async move {
        let req = SaveLocationRequest {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy_m,
        };
        match api::save_location(&req).await {
            Ok(()) => {
                s.saved_count.update(|n| *n += 1);
                history_view::record_saved_fix(s.history, &fix);
            }
            Err(e) => {
                // Occasional drops are acceptable; keep them off the banner.
                web_sys::console::warn_1(&format!("Location save failed: {e}").into());
            }
        }
    });
}

fn start_self_save(s: SessionHandles) {
    install_interval(&SELF_SAVE_BINDING, SELF_SAVE_INTERVAL_MS, move || {
        if !s.active.get_untracked() {
            return;
        }
        if let Some(fix) = s.current_fix.get_untracked()
            && save_overdue(s.last_save_at.get_untracked(), js_sys::Date::now())
        {
            save_fix(s, fix);
        }
        // The watch can be lost without an error callback ever firing.
        if !sensor::watch_open() {
            web_sys::console::info_1(&"Health check: position watch lost, reopening".into());
            reopen_watch(s);
        }
    });
}

fn start_heartbeat(s: SessionHandles) {
    install_interval(&HEARTBEAT_BINDING, HEARTBEAT_INTERVAL_MS, move || {
        if !s.active.get_untracked() {
            return;
        }
        let now = js_sys::Date::now();
        if stream_stalled(s.last_position_at.get_untracked(), now) {
            web_sys::console::warn_1(&"Position stream stalled, reopening watch".into());
            sensor::clear_watch();
            reopen_watch(s);
            // Give the new watch a full window before re-arming the stall check.
            s.last_position_at.set(Some(now));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denial_stops_the_session() {
        assert_eq!(
            recovery_action(GeoErrorKind::PermissionDenied),
            RecoveryAction::StopTracking
        );
    }

    #[test]
    fn signal_loss_schedules_a_reopen() {
        assert_eq!(
            recovery_action(GeoErrorKind::PositionUnavailable),
            RecoveryAction::ReopenAfter {
                delay_ms: REOPEN_DELAY_MS
            }
        );
    }

    #[test]
    fn timeouts_and_unknown_errors_keep_watching() {
        assert_eq!(
            recovery_action(GeoErrorKind::Timeout),
            RecoveryAction::KeepWatching
        );
        assert_eq!(
            recovery_action(GeoErrorKind::Other),
            RecoveryAction::KeepWatching
        );
    }

    #[test]
    fn fresh_stream_never_counts_as_stalled() {
        assert_eq!(stalled_for_ms(None, 1_000_000.0), 0.0);
        assert!(!stream_stalled(None, 1_000_000.0));
    }

    #[test]
    fn stall_threshold_is_two_minutes() {
        let last = 1_000_000.0;
        assert!(!stream_stalled(Some(last), last + 119_000.0));
        assert!(!stream_stalled(Some(last), last + 120_000.0));
        assert!(stream_stalled(Some(last), last + 121_000.0));
    }

    #[test]
    fn self_save_waits_for_a_first_save() {
        assert!(!save_overdue(None, 1_000_000.0));
    }

    #[test]
    fn self_save_fires_after_three_quiet_periods() {
        let saved = 1_000_000.0;
        assert!(!save_overdue(Some(saved), saved + 5_000.0));
        assert!(!save_overdue(Some(saved), saved + 9_000.0));
        assert!(save_overdue(Some(saved), saved + 9_001.0));
    }
}
