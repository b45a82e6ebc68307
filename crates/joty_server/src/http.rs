//! HTTP front.
//!
//! Every path accepts GET and POST: the command travels in the query
//! string, the document in the body. The session id comes from a
//! `;jsessionid=` path parameter or the `JSESSIONID` cookie, and the
//! response sets the cookie whenever a session is live.

use crate::error::{ServerError, ServerResult};
use crate::handler::IncomingRequest;
use crate::server::JotyServer;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use joty_protocol::{split_session_path, RequestParams, SESSION_COOKIE};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Builds the router.
pub fn router(server: Arc<JotyServer>) -> Router {
    Router::new().fallback(handle).with_state(server)
}

/// Serves until the listener fails.
pub async fn serve(server: Arc<JotyServer>, addr: SocketAddr) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(server)).await?;
    Ok(())
}

fn cookie_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn incoming(uri: &Uri, headers: &HeaderMap, body: String) -> IncomingRequest {
    let (_, path_session) = split_session_path(uri.path());
    let session = path_session
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .or_else(|| cookie_session(headers));
    let params = RequestParams::parse(uri.query().unwrap_or(""));
    let request = IncomingRequest::new(params, body);
    match session {
        Some(id) => request.with_session(id),
        None => request,
    }
}

async fn handle(
    State(server): State<Arc<JotyServer>>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = incoming(&uri, &headers, body);
    let worker = Arc::clone(&server);
    let response = match tokio::task::spawn_blocking(move || worker.handle(&request)).await {
        Ok(response) => response,
        Err(err) => {
            let err = ServerError::Internal(err.to_string());
            error!(error = %err, "request worker failed");
            let (reason, code) = err.reason();
            joty_protocol::Response::failure(reason, code)
        }
    };

    let session_id = response.session_id.clone();
    let mut http = ([(CONTENT_TYPE, XML_CONTENT_TYPE)], response.encode()).into_response();
    if !session_id.is_empty() {
        let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            http.headers_mut().insert(SET_COOKIE, value);
        }
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthenticator;
    use crate::config::ServerConfig;
    use crate::handler::HandlerContext;
    use crate::memory::MemoryProvider;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use joty_resolver::Accessor;
    use tower::ServiceExt;

    fn app() -> Router {
        let context = HandlerContext::new(
            ServerConfig::default(),
            Arc::new(Accessor::builder().build().unwrap()),
            Arc::new(MemoryProvider::new()),
        )
        .with_authenticator(Arc::new(StaticAuthenticator::new().with_user("ann", "pw")));
        router(Arc::new(JotyServer::new(context)))
    }

    async fn send(app: Router, request: Request<Body>) -> (HeaderMap, joty_protocol::Response) {
        let response = app.oneshot(request).await.unwrap();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        (headers, joty_protocol::Response::decode(&text).unwrap())
    }

    #[test]
    fn session_from_path_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; JSESSIONID=ABC"));
        let uri: Uri = "/joty?command=query".parse().unwrap();
        assert_eq!(incoming(&uri, &headers, String::new()).session_id.as_deref(), Some("ABC"));

        let uri: Uri = "/joty;jsessionid=XYZ?command=query".parse().unwrap();
        assert_eq!(incoming(&uri, &headers, String::new()).session_id.as_deref(), Some("XYZ"));

        let uri: Uri = "/joty?command=query".parse().unwrap();
        assert_eq!(incoming(&uri, &HeaderMap::new(), String::new()).session_id, None);
    }

    #[tokio::test]
    async fn login_sets_the_cookie() {
        let request = Request::builder()
            .method("GET")
            .uri("/joty?command=login&user=ann&pwd=pw")
            .body(Body::empty())
            .unwrap();
        let (headers, response) = send(app(), request).await;
        assert!(response.is_ok());
        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("JSESSIONID={}", response.session_id)));
    }

    #[tokio::test]
    async fn failures_are_documents() {
        let request = Request::builder()
            .method("POST")
            .uri("/joty?command=trans")
            .body(Body::from("<JotyReq/>"))
            .unwrap();
        let (headers, response) = send(app(), request).await;
        assert!(!response.is_ok());
        assert_eq!(response.outcome.reason, "SESSION_EXP");
        assert!(headers.get(SET_COOKIE).is_none());
    }
}
