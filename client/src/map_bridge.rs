use std::cell::RefCell;

use js_sys::{Function, Reflect};
use leptos::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{JsCast, JsValue};

use crate::app::show_banner;
use crate::sensor::PositionFix;
use crate::session::SessionHandles;

/// Consecutive render failures tolerated before falling back.
pub const MAX_RENDER_FAILURES: u32 = 3;
/// Period of the reinitialize-and-redraw retry loop.
pub const RETRY_INTERVAL_MS: i32 = 3_000;

/// Entry points of the page-global map widget. Resolved by probing the
/// window once at wiring time; `showFallbackMap` is an optional capability.
struct MapBridge {
    init: Function,
    update: Function,
    fallback: Option<Function>,
}

impl MapBridge {
    fn resolve() -> Option<Self> {
        let window = web_sys::window()?;
        Some(Self {
            init: global_function(&window, "initMap")?,
            update: global_function(&window, "updateMap")?,
            fallback: global_function(&window, "showFallbackMap"),
        })
    }

    fn draw(&self, latitude: f64, longitude: f64, accuracy_m: f64) -> Result<(), ()> {
        self.update
            .call3(
                &JsValue::NULL,
                &latitude.into(),
                &longitude.into(),
                &accuracy_m.into(),
            )
            .map(|_| ())
            .map_err(|_| ())
    }

    fn reinit(&self) -> Result<(), ()> {
        self.init.call0(&JsValue::NULL).map(|_| ()).map_err(|_| ())
    }

    fn draw_fallback(&self, latitude: f64, longitude: f64) {
        if let Some(fallback) = &self.fallback {
            let _ = fallback.call2(&JsValue::NULL, &latitude.into(), &longitude.into());
        }
    }
}

fn global_function(window: &web_sys::Window, name: &str) -> Option<Function> {
    Reflect::get(window.as_ref(), &JsValue::from_str(name))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

#[derive(Debug, Clone, Copy)]
struct RenderRetryState {
    consecutive_failures: u32,
    gave_up: bool,
}

impl RenderRetryState {
    const fn new() -> Self {
        Self {
            consecutive_failures: 0,
            gave_up: false,
        }
    }
}

/// Step taken after one more render failure, given the updated count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStep {
    KeepRetrying,
    FallBack,
    AlreadyGaveUp,
}

pub fn failure_step(consecutive_failures: u32, gave_up: bool) -> FailureStep {
    if gave_up {
        FailureStep::AlreadyGaveUp
    } else if consecutive_failures >= MAX_RENDER_FAILURES {
        FailureStep::FallBack
    } else {
        FailureStep::KeepRetrying
    }
}

struct RetryIntervalBinding {
    window: web_sys::Window,
    interval_id: i32,
    _callback: Closure<dyn Fn()>,
}

thread_local! {
    static BRIDGE: RefCell<Option<MapBridge>> = const { RefCell::new(None) };
    static RETRY: RefCell<RenderRetryState> = const { RefCell::new(RenderRetryState::new()) };
    static RETRY_INTERVAL: RefCell<Option<RetryIntervalBinding>> = const { RefCell::new(None) };
}

/// Probe the window for the widget entry points. Called once at mount;
/// a widget script that loads late is picked up by the retry loop.
pub(crate) fn wire() {
    let resolved = MapBridge::resolve();
    if resolved.is_none() {
        web_sys::console::info_1(&"Map widget not present at boot".into());
    }
    BRIDGE.with(|slot| *slot.borrow_mut() = resolved);
}

/// Best-effort widget update for one fix. Failures feed the retry loop.
pub(crate) fn push_fix(s: SessionHandles, fix: PositionFix) {
    let drawn = BRIDGE.with(|slot| match &*slot.borrow() {
        Some(bridge) => bridge.draw(fix.latitude, fix.longitude, fix.accuracy_m).is_ok(),
        None => false,
    });
    if drawn {
        note_success();
    } else {
        note_failure(s);
    }
}

/// Recenter the widget on an arbitrary point (center button, history rows).
pub(crate) fn recenter(latitude: f64, longitude: f64, accuracy_m: f64) {
    BRIDGE.with(|slot| {
        if let Some(bridge) = &*slot.borrow() {
            let _ = bridge.draw(latitude, longitude, accuracy_m);
        }
    });
}

/// Cancel a pending retry loop. The failure counter survives; only an
/// explicit render success resets it.
pub(crate) fn cancel_retry() {
    RETRY_INTERVAL.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            old.window.clear_interval_with_handle(old.interval_id);
        }
    });
}

fn note_success() {
    RETRY.with(|state| *state.borrow_mut() = RenderRetryState::new());
    cancel_retry();
}

fn note_failure(s: SessionHandles) {
    let step = RETRY.with(|state| {
        let mut state = state.borrow_mut();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        let step = failure_step(state.consecutive_failures, state.gave_up);
        if step == FailureStep::FallBack {
            state.gave_up = true;
        }
        step
    });

    match step {
        FailureStep::KeepRetrying => ensure_retry_interval(s),
        FailureStep::FallBack => {
            show_banner(s.banner, "Map failed to update, showing fallback display");
            if let Some(fix) = s.current_fix.get_untracked() {
                BRIDGE.with(|slot| {
                    if let Some(bridge) = &*slot.borrow() {
                        bridge.draw_fallback(fix.latitude, fix.longitude);
                    }
                });
            }
            cancel_retry();
        }
        FailureStep::AlreadyGaveUp => {}
    }
}

fn ensure_retry_interval(s: SessionHandles) {
    let running = RETRY_INTERVAL.with(|slot| slot.borrow().is_some());
    if running {
        return;
    }
    let Some(window) = web_sys::window() else {
        return;
    };

    let cb = Closure::<dyn Fn()>::new(move || {
        // The widget script may have loaded after us; probe again.
        let present = BRIDGE.with(|slot| slot.borrow().is_some());
        if !present {
            BRIDGE.with(|slot| *slot.borrow_mut() = MapBridge::resolve());
        }

        let redrawn = BRIDGE.with(|slot| match &*slot.borrow() {
            Some(bridge) => {
                if bridge.reinit().is_err() {
                    return false;
                }
                match s.current_fix.get_untracked() {
                    Some(fix) => bridge.draw(fix.latitude, fix.longitude, fix.accuracy_m).is_ok(),
                    None => false,
                }
            }
            None => false,
        });

        if redrawn {
            note_success();
        }
    });

    let Ok(interval_id) = window.set_interval_with_callback_and_timeout_and_arguments_0(
        cb.as_ref().unchecked_ref(),
        RETRY_INTERVAL_MS,
    ) else {
        return;
    };
    RETRY_INTERVAL.with(|slot| {
        *slot.borrow_mut() = Some(RetryIntervalBinding {
            window: window.clone(),
            interval_id,
            _callback: cb,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_below_the_threshold() {
        assert_eq!(failure_step(1, false), FailureStep::KeepRetrying);
        assert_eq!(failure_step(2, false), FailureStep::KeepRetrying);
    }

    #[test]
    fn falls_back_exactly_at_the_threshold() {
        assert_eq!(failure_step(3, false), FailureStep::FallBack);
    }

    #[test]
    fn stays_quiet_after_giving_up() {
        assert_eq!(failure_step(4, true), FailureStep::AlreadyGaveUp);
        assert_eq!(failure_step(100, true), FailureStep::AlreadyGaveUp);
    }
}
