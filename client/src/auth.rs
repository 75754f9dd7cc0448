use gloo_storage::Storage;

const TOKEN_KEY: &str = "token";

/// Bearer token from local storage, if the user has logged in.
pub fn token() -> Option<String> {
    gloo_storage::LocalStorage::get(TOKEN_KEY).ok()
}

/// Token check with the page contract of the login flow: a missing token
/// sends the browser to the login page.
pub fn require_token() -> Option<String> {
    let token = token();
    if token.is_none() {
        redirect_to_login();
    }
    token
}

/// Drop the stored token and leave for the login page.
pub fn logout() {
    gloo_storage::LocalStorage::delete(TOKEN_KEY);
    redirect_to_login();
}

pub fn redirect_to_login() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let _ = window.location().set_href("/login.html");
}
