//! Session demo web server.
//!
//! Run with: cargo run -p web-server-demo
//!
//! Then open http://localhost:8080/demo in your browser.
//!
//! Demonstrates session access, creation and removal: logging in creates a
//! session with a constant `username` attribute and a variable `count`
//! attribute, every refresh increments the counter, logging out removes the
//! session and clears the cookie.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    Form, Router,
    extract::State,
    http::HeaderMap,
    response::Html,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use websess_core::{Session, SessionOptions};
use websess_http::{CookieManager, CookieManagerOptions, SessionManager};
use websess_store::MemoryStore;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    manager: Arc<CookieManager<MemoryStore>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DemoForm {
    user_name: String,
    password: String,
    login: String,
    logout: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // For demo purposes cookies are sent over plain HTTP too, so the page
    // works without TLS.
    let manager = Arc::new(CookieManager::with_options(
        MemoryStore::new(),
        CookieManagerOptions {
            allow_http: true,
            ..CookieManagerOptions::default()
        },
    ));

    // Build router
    let app = Router::new()
        .route("/demo", get(demo_handler).post(demo_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager });

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    tracing::info!("Session demo listening on http://{addr}/demo");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Handles everything: page rendering, login form submits, logout submits.
async fn demo_handler(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Form(form): Form<DemoForm>,
) -> (HeaderMap, Html<String>) {
    let mut response_headers = HeaderMap::new();
    let mut invalid_login = false;

    let mut session = match state.manager.get(&request_headers).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("session lookup failed: {e}");
            None
        }
    };

    if let Some(current) = session.take() {
        // Already logged in
        if form.logout.is_empty() {
            let count = current.attr("count").and_then(|v| v.as_i64()).unwrap_or(0);
            current.set_attr("count", count + 1);
            session = Some(current);
        } else if let Err(e) = state.manager.remove(&current, &mut response_headers).await {
            tracing::error!("logout failed: {e}");
        }
    } else if !form.login.is_empty() {
        if !form.user_name.is_empty() && form.password == "a" {
            session = login(&state, &form.user_name, &mut response_headers).await;
        } else {
            invalid_login = true;
        }
    }

    (
        response_headers,
        Html(render_page(session.as_ref(), invalid_login)),
    )
}

/// Successful login: a new session with initial constant and variable
/// attributes, announced to the client via the response headers.
async fn login(
    state: &AppState,
    user_name: &str,
    response_headers: &mut HeaderMap,
) -> Option<Session> {
    let session = match Session::with_options(&SessionOptions {
        cattrs: HashMap::from([("username".to_owned(), json!(user_name))]),
        attrs: HashMap::from([("count".to_owned(), json!(1))]),
        ..SessionOptions::default()
    }) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("session creation failed: {e}");
            return None;
        }
    };

    match state.manager.add(session.clone(), response_headers).await {
        Ok(()) => Some(session),
        Err(e) => {
            tracing::error!("login failed: {e}");
            None
        }
    }
}

fn render_page(session: Option<&Session>, invalid_login: bool) -> String {
    let mut body = String::from("<html><body>\n");

    if invalid_login {
        body.push_str("<p style=\"color:red\">Invalid user name or password!</p>\n");
    }

    if let Some(session) = session {
        let username = session
            .cattr("username")
            .and_then(Value::as_str)
            .unwrap_or("?");
        let count = session.attr("count").and_then(|v| v.as_i64()).unwrap_or(0);
        body.push_str(&format!(
            "<p>Hello <b>{username}</b>! Since login you visited <b>{count}</b> times! \
             <a href=\"/demo\">Refresh!</a></p>\n\
             <form method=\"post\" action=\"/demo\">\
             <input type=\"submit\" name=\"logout\" value=\"Logout\">\
             </form>\n",
        ));
    } else {
        body.push_str(LOGIN_FORM);
    }

    body.push_str("</body></html>");
    body
}

const LOGIN_FORM: &str = r#"<form method="post" action="/demo">
    <label for="user-name" style="width:100px; display:inline-block">User name:</label>
    <input type="text" name="user_name" id="user-name"><br>
    <label for="password" style="width:100px; display:inline-block">Password:</label>
    <input type="password" name="password" id="password">
    <span style="font-style:italic; font-size:90%">Tip: use 'a' to login ;)</span><br>
    <input type="submit" name="login" value="Login">
</form>
"#;
