//! Named URL patterns and reverse resolution.
//!
//! Patterns use angle-bracket placeholders with an optional converter:
//!
//! ```text
//! articles/<int:year>/<slug:slug>/
//! files/<path:rest>
//! users/<name>/            (no converter means `str`)
//! ```
//!
//! Reversing fills the placeholders and prefixes the script prefix (`/` by
//! default). The same pattern can be mounted on an axum router with
//! [`RouteTable::axum_path`].

use crate::encoding::quote_path;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Reverse resolution failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NoReverseMatch {
    pub lookup: String,
    message: String,
}

impl NoReverseMatch {
    pub fn new(lookup: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            lookup: lookup.into(),
            message: message.into(),
        }
    }

    fn unknown(lookup: &str) -> Self {
        Self::new(
            lookup,
            format!(
                "Reverse for '{}' not found. '{}' is not a valid view function or pattern name.",
                lookup, lookup
            ),
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("URL route '{pattern}' uses invalid converter '{converter}'")]
    UnknownConverter { pattern: String, converter: String },

    #[error("URL route '{pattern}' is malformed: {reason}")]
    Malformed { pattern: String, reason: String },
}

/// Identifies a view function, for reversing without a route name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(&'static str);

impl ViewId {
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What to reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Name(&'a str),
    View(ViewId),
}

impl Lookup<'_> {
    fn label(&self) -> String {
        match self {
            Self::Name(name) => name.to_string(),
            Self::View(view) => view.to_string(),
        }
    }
}

/// Arguments for reversal: positional or named, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlArgs {
    pub args: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
}

impl UrlArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.kwargs.insert(name.into(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Reverse URL lookup.
pub trait UrlResolver: Send + Sync {
    fn reverse(&self, lookup: Lookup<'_>, args: &UrlArgs) -> Result<String, NoReverseMatch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Converter {
    Str,
    Int,
    Slug,
    Uuid,
    Path,
}

impl Converter {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            "slug" => Some(Self::Slug),
            "uuid" => Some(Self::Uuid),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    fn accepts(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        match self {
            Self::Str => !value.contains('/'),
            Self::Int => value.bytes().all(|b| b.is_ascii_digit()),
            Self::Slug => value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            // Canonical lowercase hyphenated form only
            Self::Uuid => {
                value.len() == 36
                    && uuid::Uuid::parse_str(value)
                        .map(|u| u.hyphenated().to_string() == value)
                        .unwrap_or(false)
            }
            Self::Path => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, converter: Converter },
}

#[derive(Debug, Clone)]
struct Route {
    name: Option<String>,
    view: Option<ViewId>,
    pattern: String,
    segments: Vec<Segment>,
}

impl Route {
    fn params(&self) -> impl Iterator<Item = (&str, Converter)> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, converter } => Some((name.as_str(), *converter)),
            Segment::Literal(_) => None,
        })
    }

    /// Fill the placeholders, or `None` if the arguments don't fit.
    fn fill(&self, args: &UrlArgs) -> Option<String> {
        let params: Vec<_> = self.params().collect();
        let values: Vec<&str> = if args.kwargs.is_empty() {
            if args.args.len() != params.len() {
                return None;
            }
            args.args.iter().map(String::as_str).collect()
        } else {
            if args.kwargs.len() != params.len() {
                return None;
            }
            params
                .iter()
                .map(|(name, _)| args.kwargs.get(*name).map(String::as_str))
                .collect::<Option<_>>()?
        };

        let mut values = values.into_iter();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param { converter, .. } => {
                    let value = values.next()?;
                    if !converter.accepts(value) {
                        return None;
                    }
                    out.push_str(value);
                }
            }
        }
        Some(out)
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let malformed = |reason: &str| PatternError::Malformed {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.starts_with('/') {
        return Err(malformed("patterns must not start with '/'"));
    }

    let mut segments = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('<') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after.find('>').ok_or_else(|| malformed("unclosed '<'"))?;
        let spec = &after[..close];
        let (converter, name) = match spec.split_once(':') {
            Some((converter, name)) => (converter, name),
            None => ("str", spec),
        };
        let converter = Converter::parse(converter).ok_or_else(|| PatternError::UnknownConverter {
            pattern: pattern.to_string(),
            converter: converter.to_string(),
        })?;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(malformed("placeholder names must be identifiers"));
        }
        if segments
            .iter()
            .any(|s| matches!(s, Segment::Param { name: existing, .. } if existing == name))
        {
            return Err(malformed("duplicate placeholder name"));
        }
        segments.push(Segment::Param {
            name: name.to_string(),
            converter,
        });
        rest = &after[close + 1..];
    }
    if rest.contains('>') {
        return Err(malformed("unmatched '>'"));
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// Ordered collection of URL patterns.
///
/// When several routes share a name, the first one whose placeholders accept
/// the arguments wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    script_prefix: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            script_prefix: "/".to_string(),
        }
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount every reversed URL under `prefix` instead of `/`.
    pub fn with_script_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        self.script_prefix = prefix;
        self
    }

    pub fn script_prefix(&self) -> &str {
        &self.script_prefix
    }

    /// Add a route. At least one of `name` and `view` should be set for it to
    /// be reversible.
    pub fn add(
        &mut self,
        name: Option<&str>,
        pattern: &str,
        view: Option<ViewId>,
    ) -> Result<&mut Self, PatternError> {
        let segments = parse_pattern(pattern)?;
        self.routes.push(Route {
            name: name.map(str::to_string),
            view,
            pattern: pattern.to_string(),
            segments,
        });
        Ok(self)
    }

    /// Convenience for a named route.
    pub fn route(mut self, name: &str, pattern: &str, view: ViewId) -> Result<Self, PatternError> {
        self.add(Some(name), pattern, Some(view))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The route's pattern in axum syntax, e.g. `/articles/{year}/`.
    pub fn axum_path(&self, name: &str) -> Option<String> {
        let route = self.routes.iter().find(|r| r.name.as_deref() == Some(name))?;
        let mut out = self.script_prefix.clone();
        for segment in &route.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param {
                    name,
                    converter: Converter::Path,
                } => out.push_str(&format!("{{*{}}}", name)),
                Segment::Param { name, .. } => out.push_str(&format!("{{{}}}", name)),
            }
        }
        Some(out)
    }
}

impl UrlResolver for RouteTable {
    fn reverse(&self, lookup: Lookup<'_>, args: &UrlArgs) -> Result<String, NoReverseMatch> {
        let label = lookup.label();
        if !args.args.is_empty() && !args.kwargs.is_empty() {
            return Err(NoReverseMatch::new(
                label,
                "Don't mix *args and **kwargs in call to reverse()!",
            ));
        }

        let candidates: Vec<&Route> = self
            .routes
            .iter()
            .filter(|route| match lookup {
                Lookup::Name(name) => route.name.as_deref() == Some(name),
                Lookup::View(view) => route.view == Some(view),
            })
            .collect();
        if candidates.is_empty() {
            return Err(NoReverseMatch::unknown(&label));
        }

        if let Some(path) = candidates.iter().find_map(|route| route.fill(args)) {
            let url = format!("{}{}", self.script_prefix, path);
            return Ok(quote_path(&url).into_owned());
        }

        let tried: Vec<String> = candidates
            .iter()
            .map(|route| format!("'{}'", route.pattern))
            .collect();
        let described = if args.kwargs.is_empty() {
            format!("arguments '{:?}'", args.args)
        } else {
            format!("keyword arguments '{:?}'", args.kwargs)
        };
        Err(NoReverseMatch::new(
            &label,
            format!(
                "Reverse for '{}' with {} not found. {} pattern(s) tried: [{}]",
                label,
                described,
                candidates.len(),
                tried.join(", ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: ViewId = ViewId::new("blog.views.detail");
    const ARCHIVE: ViewId = ViewId::new("blog.views.archive");

    fn table() -> RouteTable {
        RouteTable::new()
            .route("article-detail", "articles/<int:year>/<slug:slug>/", DETAIL)
            .unwrap()
            .route("archive", "archive/", ARCHIVE)
            .unwrap()
            .route("files", "files/<path:rest>", ViewId::new("files.serve"))
            .unwrap()
    }

    #[test]
    fn test_reverse_positional_and_named() {
        let table = table();
        let url = table
            .reverse(Lookup::Name("article-detail"), &UrlArgs::new().arg(2024).arg("hello-world"))
            .unwrap();
        assert_eq!(url, "/articles/2024/hello-world/");

        let url = table
            .reverse(
                Lookup::Name("article-detail"),
                &UrlArgs::new().kwarg("slug", "intro").kwarg("year", 1999),
            )
            .unwrap();
        assert_eq!(url, "/articles/1999/intro/");
    }

    #[test]
    fn test_reverse_by_view() {
        let url = table().reverse(Lookup::View(ARCHIVE), &UrlArgs::new()).unwrap();
        assert_eq!(url, "/archive/");
    }

    #[test]
    fn test_unknown_name() {
        let err = table()
            .reverse(Lookup::Name("nope"), &UrlArgs::new())
            .unwrap_err();
        assert_eq!(err.lookup, "nope");
        assert!(err.to_string().contains("is not a valid view function or pattern name"));
    }

    #[test]
    fn test_converter_rejects_bad_values() {
        let table = table();
        let err = table
            .reverse(Lookup::Name("article-detail"), &UrlArgs::new().arg("abc").arg("x"))
            .unwrap_err();
        assert!(err.to_string().contains("1 pattern(s) tried"));
        assert!(table
            .reverse(Lookup::Name("article-detail"), &UrlArgs::new().arg(1))
            .is_err());
    }

    #[test]
    fn test_mixed_arguments_rejected() {
        let args = UrlArgs::new().arg(2024).kwarg("slug", "x");
        let err = table()
            .reverse(Lookup::Name("article-detail"), &args)
            .unwrap_err();
        assert!(err.to_string().contains("Don't mix"));
    }

    #[test]
    fn test_path_converter_allows_slashes() {
        let url = table()
            .reverse(Lookup::Name("files"), &UrlArgs::new().arg("a/b/c.txt"))
            .unwrap();
        assert_eq!(url, "/files/a/b/c.txt");
    }

    #[test]
    fn test_reverse_quotes_arguments() {
        let mut table = RouteTable::new();
        table.add(Some("user"), "users/<name>/", None).unwrap();
        let reverse = |name: &str| {
            table
                .reverse(Lookup::Name("user"), &UrlArgs::new().arg(name))
                .unwrap()
        };
        assert_eq!(reverse("zoë"), "/users/zo%C3%AB/");
        assert_eq!(reverse("a b"), "/users/a%20b/");
        assert_eq!(reverse("50%"), "/users/50%25/");
    }

    #[test]
    fn test_uuid_converter() {
        let mut table = RouteTable::new();
        table.add(Some("doc"), "docs/<uuid:id>/", None).unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(
            table.reverse(Lookup::Name("doc"), &UrlArgs::new().arg(&id)).unwrap(),
            format!("/docs/{}/", id)
        );
        assert!(table
            .reverse(Lookup::Name("doc"), &UrlArgs::new().arg(id.to_uppercase()))
            .is_err());
    }

    #[test]
    fn test_first_matching_route_wins() {
        let mut table = RouteTable::new();
        table.add(Some("page"), "pages/", None).unwrap();
        table.add(Some("page"), "pages/<int:n>/", None).unwrap();
        assert_eq!(
            table.reverse(Lookup::Name("page"), &UrlArgs::new()).unwrap(),
            "/pages/"
        );
        assert_eq!(
            table.reverse(Lookup::Name("page"), &UrlArgs::new().arg(3)).unwrap(),
            "/pages/3/"
        );
    }

    #[test]
    fn test_script_prefix() {
        let table = table().with_script_prefix("app");
        assert_eq!(
            table.reverse(Lookup::View(ARCHIVE), &UrlArgs::new()).unwrap(),
            "/app/archive/"
        );
    }

    #[test]
    fn test_axum_path() {
        let table = table();
        assert_eq!(
            table.axum_path("article-detail").unwrap(),
            "/articles/{year}/{slug}/"
        );
        assert_eq!(table.axum_path("files").unwrap(), "/files/{*rest}");
        assert!(table.axum_path("missing").is_none());
    }

    #[test]
    fn test_bad_patterns() {
        let mut table = RouteTable::new();
        assert!(matches!(
            table.add(Some("x"), "a/<float:f>/", None),
            Err(PatternError::UnknownConverter { .. })
        ));
        assert!(table.add(Some("x"), "a/<int:f/", None).is_err());
        assert!(table.add(Some("x"), "/leading/", None).is_err());
        assert!(table.add(Some("x"), "<a>/<a>/", None).is_err());
        assert!(table.is_empty());
    }
}
