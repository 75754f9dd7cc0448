mod api;
mod app;
mod auth;
mod history_view;
mod map_bridge;
mod movement;
mod sensor;
mod session;
mod time_format;

use std::any::Any;
use std::cell::RefCell;

use leptos::mount::mount_to;
use wasm_bindgen::JsCast;

thread_local! {
    // Keeps the mount handle alive; a re-entered main() drops the old mount
    // so stale effects can't keep mutating session state.
    static APP_MOUNT_HANDLE: RefCell<Option<Box<dyn Any>>> = RefCell::new(None);
}

fn main() {
    console_error_panic_hook::set_once();

    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let Some(target) = document
        .get_element_by_id("app")
        .and_then(|node| node.dyn_into::<web_sys::HtmlElement>().ok())
        .or_else(|| document.body())
    else {
        return;
    };

    APP_MOUNT_HANDLE.with(move |slot| {
        slot.borrow_mut().take();
        let handle = mount_to(target, app::App);
        *slot.borrow_mut() = Some(Box::new(handle));
    });
}
