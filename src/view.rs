//! Page Rendering
//!
//! Handlers describe what to show as a [`Page`] (a component name plus
//! props) and hand it to a [`ViewRenderer`]. The bundled [`PageRenderer`]
//! answers with a JSON page object that a client-side app mounts; an HTML
//! shell renderer can be swapped in behind the same trait.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// A component to render and the props it receives
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub component: String,
    pub props: Map<String, Value>,
    pub url: String,
}

impl Page {
    pub fn new(component: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: Map::new(),
            url: url.into(),
        }
    }

    /// Add a prop, replacing any previous value under `key`
    pub fn with_prop(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.props.insert(key.to_string(), value);
            }
            Err(e) => tracing::error!(error = %e, prop = key, "Failed to serialize page prop"),
        }
        self
    }

    /// Add props shared by every page; props already set win
    pub fn with_shared(mut self, shared: Map<String, Value>) -> Self {
        for (key, value) in shared {
            self.props.entry(key).or_insert(value);
        }
        self
    }
}

/// Turns pages and redirects into HTTP responses
pub trait ViewRenderer: Send + Sync {
    fn render(&self, page: Page) -> Response;

    fn redirect(&self, to: &str) -> Response;
}

/// JSON page object renderer
#[derive(Debug, Clone)]
pub struct PageRenderer {
    version: String,
}

#[derive(Serialize)]
struct PageObject<'a> {
    component: &'a str,
    props: &'a Map<String, Value>,
    url: &'a str,
    version: &'a str,
}

impl PageRenderer {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl ViewRenderer for PageRenderer {
    fn render(&self, page: Page) -> Response {
        let body = PageObject {
            component: &page.component,
            props: &page.props,
            url: &page.url,
            version: &self.version,
        };
        (StatusCode::OK, Json(body)).into_response()
    }

    /// 303 so a POST is followed by a GET
    fn redirect(&self, to: &str) -> Response {
        Redirect::to(to).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_render_page_object() {
        let renderer = PageRenderer::new("7");
        let page = Page::new("Auth/Login", "/login").with_prop("errors", json!({"email": "bad"}));

        let response = renderer.render(page);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "component": "Auth/Login",
                "props": {"errors": {"email": "bad"}},
                "url": "/login",
                "version": "7",
            })
        );
    }

    #[test]
    fn test_redirect_is_see_other() {
        let response = PageRenderer::new("1").redirect("/dashboard");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }

    #[test]
    fn test_shared_props_do_not_override_page_props() {
        let mut shared = Map::new();
        shared.insert("csrf_token".into(), json!("abc"));
        shared.insert("errors".into(), json!({}));

        let page = Page::new("Auth/Login", "/login")
            .with_prop("errors", json!({"email": "bad"}))
            .with_shared(shared);

        assert_eq!(page.props["csrf_token"], "abc");
        assert_eq!(page.props["errors"]["email"], "bad");
    }
}
