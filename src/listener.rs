//! One-shot loopback listener for the authorization callback.
//!
//! Interactive flows send the user agent to the authorization endpoint and
//! get the callback delivered to a local redirect URI. The listener serves
//! that URI until the first callback request arrives and hands back its
//! full URL, which the embedder feeds into
//! [`BrowserContext::set_callback_url`](crate::BrowserContext::set_callback_url)
//! before running the next authentication step.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::{Router, routing::get};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use crate::AuthError;

const SUCCESS_HTML: &str = "<!doctype html><html><body><h1>Signed in</h1>\
<p>You can close this tab and return to the application.</p></body></html>";
const ERROR_HTML: &str = "<!doctype html><html><body><h1>Sign-in failed</h1>\
<p>No authorization callback was received here.</p></body></html>";

#[derive(Debug, Clone)]
pub struct CallbackListener {
    host: String,
    port: u16,
    path: String,
    timeout: Option<Duration>,
}

type CaptureSender = Arc<Mutex<Option<oneshot::Sender<Result<Url, AuthError>>>>>;

#[derive(Clone)]
struct ListenerState {
    base: String,
    tx: CaptureSender,
}

impl CallbackListener {
    /// Build a listener for `redirect_uri`. The URI must be plain `http`
    /// with an explicit host, which in practice means a loopback address.
    pub fn new(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" {
            return Err(AuthError::InvalidRedirectUri(
                "redirect uri must use http scheme".to_string(),
            ));
        }
        let host = url.host_str().ok_or_else(|| {
            AuthError::InvalidRedirectUri("redirect uri is missing host".to_string())
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            AuthError::InvalidRedirectUri("redirect uri is missing port".to_string())
        })?;
        Ok(Self {
            host: host.to_string(),
            port,
            path: url.path().to_string(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn bind(&self) -> Result<TcpListener, AuthError> {
        TcpListener::bind((self.host.as_str(), self.port)).map_err(AuthError::from)
    }

    /// Bind and serve until the first callback arrives.
    pub async fn capture(&self) -> Result<Url, AuthError> {
        let listener = self.bind()?;
        self.capture_with(listener).await
    }

    /// Serve `listener` until the first callback arrives and return the
    /// full callback URL. Requests to other paths get a 404; a callback
    /// without query parameters gets a 400 and keeps the listener alive.
    pub async fn capture_with(&self, listener: TcpListener) -> Result<Url, AuthError> {
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = ListenerState {
            base: format!("http://{}:{}{}", self.host, addr.port(), self.path),
            tx: Arc::new(Mutex::new(Some(tx))),
        };

        let app = Router::new()
            .route(&self.path, get(callback_handler))
            .fallback(fallback_handler)
            .with_state(state.clone());

        listener.set_nonblocking(true)?;
        let listener = TokioTcpListener::from_std(listener)?;
        debug!(%addr, "callback listener serving");

        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        let tx_for_server = state.tx.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                deliver(
                    &tx_for_server,
                    Err(AuthError::Listener {
                        message: err.to_string(),
                    }),
                );
            }
        });

        let captured = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| AuthError::ListenerTimeout { timeout })?,
            None => rx.await,
        };

        let _ = shutdown_tx.send(());
        let _ = server_handle.await;

        captured.map_err(|_| AuthError::Listener {
            message: "callback channel closed".to_string(),
        })?
    }
}

fn deliver(tx: &CaptureSender, result: Result<Url, AuthError>) {
    if let Ok(mut guard) = tx.lock() {
        if let Some(sender) = guard.take() {
            let _ = sender.send(result);
        }
    }
}

async fn callback_handler(
    State(state): State<ListenerState>,
    RawQuery(query): RawQuery,
) -> (StatusCode, Html<&'static str>) {
    let query = query.unwrap_or_default();
    if query.is_empty() {
        return (StatusCode::BAD_REQUEST, Html(ERROR_HTML));
    }
    match Url::parse(&format!("{}?{}", state.base, query)) {
        Ok(url) => {
            deliver(&state.tx, Ok(url));
            (StatusCode::OK, Html(SUCCESS_HTML))
        }
        Err(err) => {
            deliver(&state.tx, Err(err.into()));
            (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_HTML))
        }
    }
}

async fn fallback_handler() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(ERROR_HTML))
}

#[cfg(test)]
mod tests {
    use super::CallbackListener;
    use crate::AuthError;

    #[test]
    fn rejects_non_http_redirect_uris() {
        let result = CallbackListener::new("https://localhost:8765/callback");
        assert!(matches!(result, Err(AuthError::InvalidRedirectUri(_))));
    }

    #[test]
    fn parses_the_redirect_target() {
        let listener = CallbackListener::new("http://localhost:8765/callback").unwrap();
        assert_eq!(listener.host, "localhost");
        assert_eq!(listener.port, 8765);
        assert_eq!(listener.path, "/callback");
    }

    #[tokio::test]
    async fn captures_the_first_callback_url() {
        let listener = CallbackListener::new("http://127.0.0.1:0/callback").unwrap();
        let bound = listener.bind().unwrap();
        let port = bound.local_addr().unwrap().port();

        let request = async {
            let url = format!("http://127.0.0.1:{port}/callback?code=abc&state=xyz");
            reqwest::get(&url).await.unwrap().text().await.unwrap()
        };

        let (captured, body) = tokio::join!(listener.capture_with(bound), request);
        let captured = captured.unwrap();
        assert!(body.contains("Signed in"));
        assert_eq!(captured.query(), Some("code=abc&state=xyz"));
        assert_eq!(captured.path(), "/callback");
    }
}
