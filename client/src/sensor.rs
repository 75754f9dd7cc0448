use std::cell::RefCell;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Geolocation, PositionOptions};

use waymark_shared::GeoPoint;

/// How long a single acquisition may take before the sensor reports Timeout.
pub const ACQUIRE_TIMEOUT_MS: u32 = 15_000;
/// Cached fixes up to this age are accepted on the continuous watch.
/// Avoids spurious timeouts on devices with a noisy sensor.
pub const WATCH_MAX_FIX_AGE_MS: u32 = 30_000;

/// One sensor fix, unpacked from the JS position object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    /// Wall-clock ms at which the callback delivered the fix.
    pub observed_at_ms: f64,
}

impl PositionFix {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    fn from_js(pos: &web_sys::Position) -> Self {
        let coords = pos.coords();
        Self {
            latitude: coords.latitude(),
            longitude: coords.longitude(),
            accuracy_m: coords.accuracy(),
            observed_at_ms: js_sys::Date::now(),
        }
    }
}

/// Sensor error classes from `GeolocationPositionError.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Other,
}

impl GeoErrorKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            _ => Self::Other,
        }
    }
}

struct WatchBinding {
    geolocation: Geolocation,
    watch_id: i32,
    _on_position: Closure<dyn Fn(web_sys::Position)>,
    _on_error: Closure<dyn Fn(web_sys::PositionError)>,
}

thread_local! {
    static WATCH_BINDING: RefCell<Option<WatchBinding>> = const { RefCell::new(None) };
}

/// The browser geolocation capability, if this browser exposes one.
pub(crate) fn geolocation() -> Option<Geolocation> {
    web_sys::window()?.navigator().geolocation().ok()
}

fn acquire_options() -> PositionOptions {
    let opts = PositionOptions::new();
    opts.set_enable_high_accuracy(true);
    opts.set_timeout(ACQUIRE_TIMEOUT_MS);
    opts.set_maximum_age(0);
    opts
}

fn watch_options() -> PositionOptions {
    let opts = PositionOptions::new();
    opts.set_enable_high_accuracy(true);
    opts.set_timeout(ACQUIRE_TIMEOUT_MS);
    opts.set_maximum_age(WATCH_MAX_FIX_AGE_MS);
    opts
}

/// Request one immediate high-accuracy fix, rejecting cached positions.
pub(crate) fn request_single_fix(
    geolocation: &Geolocation,
    on_fix: impl Fn(PositionFix) + 'static,
    on_error: impl Fn(GeoErrorKind) + 'static,
) -> Result<(), String> {
    let success = Closure::<dyn Fn(web_sys::Position)>::new(move |pos: web_sys::Position| {
        on_fix(PositionFix::from_js(&pos));
    });
    let failure = Closure::<dyn Fn(web_sys::PositionError)>::new(
        move |err: web_sys::PositionError| {
            on_error(GeoErrorKind::from_code(err.code()));
        },
    );

    geolocation
        .get_current_position_with_error_callback_and_options(
            success.as_ref().unchecked_ref(),
            Some(failure.as_ref().unchecked_ref()),
            &acquire_options(),
        )
        .map_err(|_| "getCurrentPosition rejected".to_string())?;

    // One-shot callbacks: ownership moves to the JS side.
    success.forget();
    failure.forget();
    Ok(())
}

/// Open the continuous watch. No-op when a watch is already registered,
/// so the resubscribe path can call it blindly.
pub(crate) fn open_watch(
    on_fix: impl Fn(PositionFix) + 'static,
    on_error: impl Fn(GeoErrorKind) + 'static,
) -> Result<(), String> {
    if watch_open() {
        return Ok(());
    }
    let Some(geolocation) = geolocation() else {
        return Err("geolocation unavailable".to_string());
    };

    let success = Closure::<dyn Fn(web_sys::Position)>::new(move |pos: web_sys::Position| {
        on_fix(PositionFix::from_js(&pos));
    });
    let failure = Closure::<dyn Fn(web_sys::PositionError)>::new(
        move |err: web_sys::PositionError| {
            on_error(GeoErrorKind::from_code(err.code()));
        },
    );

    let watch_id = geolocation
        .watch_position_with_error_callback_and_options(
            success.as_ref().unchecked_ref(),
            Some(failure.as_ref().unchecked_ref()),
            &watch_options(),
        )
        .map_err(|_| "watchPosition rejected".to_string())?;

    WATCH_BINDING.with(|slot| {
        *slot.borrow_mut() = Some(WatchBinding {
            geolocation,
            watch_id,
            _on_position: success,
            _on_error: failure,
        });
    });
    Ok(())
}

/// Whether a continuous watch is currently registered.
pub(crate) fn watch_open() -> bool {
    WATCH_BINDING.with(|slot| slot.borrow().is_some())
}

/// Clear the active watch and its callbacks. Safe to call repeatedly.
pub(crate) fn clear_watch() {
    WATCH_BINDING.with(|slot| {
        if let Some(binding) = slot.borrow_mut().take() {
            binding.geolocation.clear_watch(binding.watch_id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::GeoErrorKind;

    #[test]
    fn maps_dom_error_codes() {
        assert_eq!(GeoErrorKind::from_code(1), GeoErrorKind::PermissionDenied);
        assert_eq!(GeoErrorKind::from_code(2), GeoErrorKind::PositionUnavailable);
        assert_eq!(GeoErrorKind::from_code(3), GeoErrorKind::Timeout);
    }

    #[test]
    fn unknown_codes_map_to_other() {
        assert_eq!(GeoErrorKind::from_code(0), GeoErrorKind::Other);
        assert_eq!(GeoErrorKind::from_code(42), GeoErrorKind::Other);
    }
}
