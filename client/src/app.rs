use std::cell::RefCell;
use std::thread::LocalKey;

use gloo_storage::Storage;
use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use waymark_shared::GeoPoint;

use crate::api;
use crate::auth;
use crate::history_view::{self, HistoryEntry, HistoryPanel};
use crate::map_bridge;
use crate::sensor::{self, PositionFix};
use crate::session::{self, SessionHandles};
use crate::time_format::format_clock;

const SETTINGS_KEY: &str = "waymark_settings";
const BANNER_HIDE_MS: u32 = 5_000;
/// Grace period between mount and the automatic tracking start, so the
/// map widget script gets a chance to finish loading first.
const AUTO_START_DELAY_MS: u32 = 1_000;

/// Newtype wrappers so same-typed signals stay distinct in Leptos context.
#[derive(Clone, Copy)]
pub(crate) struct ServerReachable(pub RwSignal<bool>);
#[derive(Clone, Copy)]
pub(crate) struct AutoStart(pub RwSignal<bool>);
#[derive(Clone, Copy)]
pub(crate) struct ShowHistory(pub RwSignal<bool>);

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Settings {
    auto_start: bool,
    show_history: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_start: true,
            show_history: true,
        }
    }
}

struct TickIntervalBinding {
    window: web_sys::Window,
    interval_id: i32,
    _callback: Closure<dyn Fn()>,
}

struct DomEventBinding {
    target: web_sys::EventTarget,
    event: &'static str,
    _handler: Closure<dyn Fn()>,
}

thread_local! {
    static TICK_INTERVAL_BINDING: RefCell<Option<TickIntervalBinding>> = const { RefCell::new(None) };
    static VISIBILITY_BINDING: RefCell<Option<DomEventBinding>> = const { RefCell::new(None) };
    static ONLINE_BINDING: RefCell<Option<DomEventBinding>> = const { RefCell::new(None) };
    static OFFLINE_BINDING: RefCell<Option<DomEventBinding>> = const { RefCell::new(None) };
    static BANNER_HIDE: RefCell<Option<Timeout>> = const { RefCell::new(None) };
    static AUTO_START_TIMEOUT: RefCell<Option<Timeout>> = const { RefCell::new(None) };
}

/// Put a message on the banner and (re)schedule its auto-hide.
pub(crate) fn show_banner(banner: RwSignal<Option<String>>, message: &str) {
    banner.set(Some(message.to_string()));
    BANNER_HIDE.with(|slot| {
        if let Some(pending) = slot.borrow_mut().take() {
            pending.cancel();
        }
        let timeout = Timeout::new(BANNER_HIDE_MS, move || {
            banner.set(None);
        });
        *slot.borrow_mut() = Some(timeout);
    });
}

fn replace_listener(
    slot: &'static LocalKey<RefCell<Option<DomEventBinding>>>,
    target: web_sys::EventTarget,
    event: &'static str,
    handler: impl Fn() + 'static,
) {
    slot.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old
                .target
                .remove_event_listener_with_callback(old.event, old._handler.as_ref().unchecked_ref());
        }
    });
    let handler = Closure::<dyn Fn()>::new(handler);
    if target
        .add_event_listener_with_callback(event, handler.as_ref().unchecked_ref())
        .is_ok()
    {
        slot.with(|slot| {
            *slot.borrow_mut() = Some(DomEventBinding {
                target,
                event,
                _handler: handler,
            });
        });
    }
}

fn install_lifecycle_listeners(s: SessionHandles, server_reachable: RwSignal<bool>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };

    // Back to the foreground: reconcile the persisted flag and recover a
    // watch the browser may have dropped while the tab was hidden.
    replace_listener(&VISIBILITY_BINDING, document.into(), "visibilitychange", move || {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        if document.visibility_state() != web_sys::VisibilityState::Visible {
            return;
        }
        if session::stored_active_flag() && !s.active.get_untracked() {
            s.active.set(true);
        }
        if s.active.get_untracked() && !sensor::watch_open() {
            web_sys::console::info_1(&"Page visible again, reopening position watch".into());
            session::reopen_watch(s);
        }
    });

    replace_listener(&ONLINE_BINDING, window.clone().into(), "online", move || {
        spawn_local(async move {
            server_reachable.set(api::health_ok().await);
        });
    });

    let banner = s.banner;
    replace_listener(&OFFLINE_BINDING, window.into(), "offline", move || {
        server_reachable.set(false);
        show_banner(
            banner,
            "Connection lost. Tracking continues but fixes are not being saved.",
        );
    });
}

/// Root application component. Provides global reactive signals via context.
#[component]
pub fn App() -> impl IntoView {
    let active: RwSignal<bool> = RwSignal::new(false);
    let current_fix: RwSignal<Option<PositionFix>> = RwSignal::new(None);
    let last_position_at: RwSignal<Option<f64>> = RwSignal::new(None);
    let last_saved: RwSignal<Option<GeoPoint>> = RwSignal::new(None);
    let last_save_at: RwSignal<Option<f64>> = RwSignal::new(None);
    let saved_count: RwSignal<u32> = RwSignal::new(0);
    let banner: RwSignal<Option<String>> = RwSignal::new(None);
    let history: RwSignal<Vec<HistoryEntry>> = RwSignal::new(Vec::new());
    let server_reachable: RwSignal<bool> = RwSignal::new(true);
    // Epoch-second tick driving the relative times in the history panel
    let tick: RwSignal<i64> = RwSignal::new(chrono::Utc::now().timestamp());

    let saved: Settings = gloo_storage::LocalStorage::get(SETTINGS_KEY).unwrap_or_default();
    let auto_start: RwSignal<bool> = RwSignal::new(saved.auto_start);
    let show_history: RwSignal<bool> = RwSignal::new(saved.show_history);

    let handles = SessionHandles {
        active,
        current_fix,
        last_position_at,
        last_saved,
        last_save_at,
        saved_count,
        banner,
        history,
    };

    provide_context(handles);
    provide_context(history);
    provide_context(tick);
    provide_context(ServerReachable(server_reachable));
    provide_context(AutoStart(auto_start));
    provide_context(ShowHistory(show_history));

    // Persist settings to localStorage on any change
    Effect::new(move || {
        let settings = Settings {
            auto_start: auto_start.get(),
            show_history: show_history.get(),
        };
        let _ = gloo_storage::LocalStorage::set(SETTINGS_KEY, &settings);
    });

    // 1-second interval advancing the tick signal
    Effect::new(move || {
        let Some(window) = web_sys::window() else {
            return;
        };
        TICK_INTERVAL_BINDING.with(|slot| {
            if let Some(old) = slot.borrow_mut().take() {
                old.window.clear_interval_with_handle(old.interval_id);
            }
        });
        let cb = Closure::<dyn Fn()>::new(move || {
            tick.set(chrono::Utc::now().timestamp());
        });
        let Ok(interval_id) = window
            .set_interval_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), 1_000)
        else {
            return;
        };
        TICK_INTERVAL_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(TickIntervalBinding {
                window: window.clone(),
                interval_id,
                _callback: cb,
            });
        });
    });

    // Boot: token check, widget wiring, connectivity probe, history seed,
    // then the automatic tracking start.
    Effect::new(move || {
        if auth::token().is_none() {
            auth::redirect_to_login();
            return;
        }

        map_bridge::wire();

        spawn_local(async move {
            let reachable = api::health_ok().await;
            server_reachable.set(reachable);
            if !reachable {
                show_banner(
                    banner,
                    "Cannot reach the server. Tracking runs but fixes are not being saved.",
                );
            }
        });

        history_view::seed_from_server(history);

        if auto_start.get_untracked() || session::stored_active_flag() {
            AUTO_START_TIMEOUT.with(|slot| {
                if let Some(pending) = slot.borrow_mut().take() {
                    pending.cancel();
                }
                let timeout = Timeout::new(AUTO_START_DELAY_MS, move || {
                    session::start_tracking(handles);
                });
                *slot.borrow_mut() = Some(timeout);
            });
        }
    });

    Effect::new(move || {
        install_lifecycle_listeners(handles, server_reachable);
    });

    view! {
        <div style="max-width: 860px; margin: 0 auto; padding: 16px; font-family: 'Inter', system-ui, sans-serif; color: #e2e0d8;">
            <ErrorBanner />
            <StatusPanel />
            <Controls />
            <SettingsRow />
            {move || {
                if show_history.get() {
                    view! { <HistoryPanel /> }.into_any()
                } else {
                    ().into_any()
                }
            }}
        </div>
    }
}

/// Dismissable error/warning strip at the top of the page.
#[component]
fn ErrorBanner() -> impl IntoView {
    let s: SessionHandles = expect_context();

    view! {
        {move || {
            s.banner.get().map(|message| view! {
                <div style="background: rgba(180,60,60,0.15); border: 1px solid rgba(180,60,60,0.5); border-radius: 6px; color: #e2a0a0; font-size: 0.78rem; padding: 8px 12px; margin-bottom: 10px;">
                    {message}
                </div>
            })
        }}
    }
}

/// Current position, accuracy, and tracking status.
#[component]
fn StatusPanel() -> impl IntoView {
    let s: SessionHandles = expect_context();
    let ServerReachable(server_reachable) = expect_context();

    let latitude = move || {
        s.current_fix
            .get()
            .map(|f| format!("{:.6}", f.latitude))
            .unwrap_or_else(|| "-".to_string())
    };
    let longitude = move || {
        s.current_fix
            .get()
            .map(|f| format!("{:.6}", f.longitude))
            .unwrap_or_else(|| "-".to_string())
    };
    let accuracy = move || {
        s.current_fix
            .get()
            .map(|f| format!("{:.0} m", f.accuracy_m))
            .unwrap_or_else(|| "-".to_string())
    };
    let last_updated = move || {
        s.current_fix
            .get()
            .map(|f| format_clock((f.observed_at_ms / 1000.0) as i64))
            .unwrap_or_else(|| "-".to_string())
    };

    view! {
        <div style="background: #13161f; border: 1px solid #282c3e; border-radius: 6px; padding: 12px 14px;">
            <div style="display: flex; align-items: center; gap: 8px; margin-bottom: 10px;">
                <span style:background=move || if s.active.get() { "#4caf7a" } else { "#5a5860" }
                    style="width: 10px; height: 10px; border-radius: 50%; display: inline-block;" />
                <span style="font-size: 0.82rem;">
                    {move || if s.active.get() { "Tracking" } else { "Not tracking" }}
                </span>
                {move || {
                    (!server_reachable.get()).then(|| view! {
                        <span style="font-size: 0.68rem; color: #f5c542;">"server unreachable"</span>
                    })
                }}
                <span style="margin-left: auto; font-size: 0.72rem; color: #9a9590;">
                    {move || format!("{} saved", s.saved_count.get())}
                </span>
            </div>
            <div style="display: grid; grid-template-columns: repeat(4, 1fr); gap: 8px; font-family: 'JetBrains Mono', monospace; font-size: 0.78rem;">
                <StatusField label="Latitude" value=Signal::derive(latitude) />
                <StatusField label="Longitude" value=Signal::derive(longitude) />
                <StatusField label="Accuracy" value=Signal::derive(accuracy) />
                <StatusField label="Updated" value=Signal::derive(last_updated) />
            </div>
        </div>
    }
}

#[component]
fn StatusField(label: &'static str, value: Signal<String>) -> impl IntoView {
    view! {
        <div>
            <div style="font-size: 0.62rem; color: #5a5860; text-transform: uppercase;">{label}</div>
            <div style="color: #e2e0d8;">{move || value.get()}</div>
        </div>
    }
}

/// Start/stop/center/logout controls with disabled-state sync.
#[component]
fn Controls() -> impl IntoView {
    let s: SessionHandles = expect_context();

    let button_style = "background: #1a1d2a; border: 1px solid #282c3e; border-radius: 6px; color: #e2e0d8; cursor: pointer; font-size: 0.78rem; padding: 6px 14px;";

    view! {
        <div style="display: flex; gap: 8px; margin-top: 12px;">
            <button
                style=button_style
                prop:disabled=move || s.active.get()
                on:click=move |_| session::start_tracking(s)
            >
                "Start tracking"
            </button>
            <button
                style=button_style
                prop:disabled=move || !s.active.get()
                on:click=move |_| session::stop_tracking(s)
            >
                "Stop tracking"
            </button>
            <button
                style=button_style
                prop:disabled=move || !s.active.get()
                on:click=move |_| {
                    if let Some(fix) = s.current_fix.get_untracked() {
                        map_bridge::recenter(fix.latitude, fix.longitude, fix.accuracy_m);
                    }
                }
            >
                "Center map"
            </button>
            <button
                style=format!("{button_style} margin-left: auto;")
                on:click=move |_| {
                    session::stop_tracking(s);
                    auth::logout();
                }
            >
                "Log out"
            </button>
        </div>
    }
}

#[component]
fn SettingsRow() -> impl IntoView {
    let AutoStart(auto_start) = expect_context();
    let ShowHistory(show_history) = expect_context();

    let checkbox = move |signal: RwSignal<bool>| {
        move |e: web_sys::Event| {
            if let Some(input) = e
                .target()
                .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
            {
                signal.set(input.checked());
            }
        }
    };

    view! {
        <div style="display: flex; gap: 16px; margin-top: 10px; font-size: 0.72rem; color: #9a9590;">
            <label style="display: flex; align-items: center; gap: 5px; cursor: pointer;">
                <input type="checkbox" prop:checked=move || auto_start.get() on:change=checkbox(auto_start) />
                "Start tracking on load"
            </label>
            <label style="display: flex; align-items: center; gap: 5px; cursor: pointer;">
                <input type="checkbox" prop:checked=move || show_history.get() on:change=checkbox(show_history) />
                "Show history"
            </label>
        </div>
    }
}
