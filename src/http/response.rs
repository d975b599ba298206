use crate::encoding::iri_to_uri;
use crate::error::{ShortcutError, ShortcutResult};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Schemes an absolute redirect target may use.
pub const REDIRECT_ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// A rendered text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub content: String,
    pub content_type: String,
    pub status: StatusCode,
}

impl HttpResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            status: StatusCode::OK,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.content).into_response();
        match HeaderValue::from_str(&self.content_type) {
            Ok(value) => {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            Err(_) => {
                warn!(content_type = %self.content_type, "Invalid content type, using text/plain");
            }
        }
        response
    }
}

/// A 302 or 301 redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseRedirect {
    uri: String,
    location: HeaderValue,
    permanent: bool,
}

impl HttpResponseRedirect {
    /// Temporary (302) redirect.
    pub fn new(url: &str) -> ShortcutResult<Self> {
        Self::build(url, false)
    }

    /// Permanent (301) redirect.
    pub fn permanent(url: &str) -> ShortcutResult<Self> {
        Self::build(url, true)
    }

    /// Non-ASCII and unsafe characters in `url` are percent-encoded.
    pub(crate) fn build(url: &str, permanent: bool) -> ShortcutResult<Self> {
        // Relative targets fail to parse and are always allowed
        if let Ok(parsed) = url::Url::parse(url) {
            let scheme = parsed.scheme();
            if !REDIRECT_ALLOWED_SCHEMES.contains(&scheme) {
                return Err(ShortcutError::DisallowedRedirect {
                    scheme: scheme.to_string(),
                });
            }
        }
        let uri = iri_to_uri(url).into_owned();
        let location = HeaderValue::from_str(&uri).map_err(|_| {
            ShortcutError::invalid_input(format!("Redirect target '{}' is not a valid header value", url))
        })?;
        Ok(Self {
            uri,
            location,
            permanent,
        })
    }

    /// The encoded target sent in `Location`.
    pub fn url(&self) -> &str {
        &self.uri
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn status(&self) -> StatusCode {
        if self.permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        }
    }
}

impl IntoResponse for HttpResponseRedirect {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, [(LOCATION, self.location)]).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_defaults() {
        let response = HttpResponse::new("<p>hi</p>");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, DEFAULT_CONTENT_TYPE);

        let response = response.into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_response_overrides() {
        let response = HttpResponse::new("{}")
            .with_content_type("application/json")
            .with_status(StatusCode::CREATED)
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_redirect_status() {
        let temporary = HttpResponseRedirect::new("/next/").unwrap();
        assert_eq!(temporary.status(), StatusCode::FOUND);
        assert_eq!(temporary.url(), "/next/");

        let permanent = HttpResponseRedirect::permanent("https://example.com/").unwrap();
        assert!(permanent.is_permanent());
        let response = permanent.into_response();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "https://example.com/");
    }

    #[test]
    fn test_redirect_scheme_check() {
        for url in ["http://a.test/", "https://a.test/", "ftp://a.test/f", "../up", "?page=2"] {
            assert!(HttpResponseRedirect::new(url).is_ok(), "{url}");
        }
        let err = HttpResponseRedirect::new("javascript:alert(1)").unwrap_err();
        assert!(matches!(err, ShortcutError::DisallowedRedirect { ref scheme } if scheme == "javascript"));
        assert!(HttpResponseRedirect::new("data:text/html,x").is_err());
    }

    #[test]
    fn test_redirect_encodes_header_breaking_url() {
        let redirect = HttpResponseRedirect::new("/a\r\nSet-Cookie: x=1").unwrap();
        assert_eq!(redirect.url(), "/a%0D%0ASet-Cookie:%20x=1");
    }

    #[test]
    fn test_redirect_encodes_non_ascii() {
        let redirect = HttpResponseRedirect::new("/café/").unwrap();
        assert_eq!(redirect.url(), "/caf%C3%A9/");
        let response = redirect.into_response();
        assert_eq!(response.headers()[LOCATION], "/caf%C3%A9/");

        let redirect = HttpResponseRedirect::new("https://example.com/zoë?q=ü").unwrap();
        assert_eq!(redirect.url(), "https://example.com/zo%C3%AB?q=%C3%BC");
    }
}
