//! Template lookup and rendering.
//!
//! Templates are askama structs that also implement `Deserialize`. A
//! [`TemplateRegistry`] maps template names to such structs; rendering builds
//! the struct from the JSON context and calls askama on it. Several registries
//! can be grouped under aliases in [`TemplateEngines`], selected with `using`.

use crate::http::RequestInfo;
use askama::Template;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Template variables.
pub type Context = Map<String, Value>;

/// Engine alias used when `using` is not given.
pub const DEFAULT_ENGINE: &str = "default";

/// Context key the request is exposed under.
pub const REQUEST_CONTEXT_KEY: &str = "request";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("TemplateDoesNotExist: {}", tried.join(", "))]
    DoesNotExist { tried: Vec<String> },

    #[error("Could not find config for '{alias}' in TEMPLATES")]
    UnknownEngine { alias: String },

    #[error("Context for template '{template}' is invalid: {source}")]
    Context {
        template: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to render template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: askama::Error,
    },
}

/// One template name, or candidates tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNames<'a>(Vec<&'a str>);

impl<'a> TemplateNames<'a> {
    pub fn as_slice(&self) -> &[&'a str] {
        &self.0
    }
}

impl<'a> From<&'a str> for TemplateNames<'a> {
    fn from(name: &'a str) -> Self {
        Self(vec![name])
    }
}

impl<'a> From<&'a [&'a str]> for TemplateNames<'a> {
    fn from(names: &'a [&'a str]) -> Self {
        Self(names.to_vec())
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for TemplateNames<'a> {
    fn from(names: [&'a str; N]) -> Self {
        Self(names.to_vec())
    }
}

impl<'a> From<Vec<&'a str>> for TemplateNames<'a> {
    fn from(names: Vec<&'a str>) -> Self {
        Self(names)
    }
}

/// Deprecated rendering arguments.
#[derive(Debug, Clone, Default)]
pub struct LegacyOptions {
    /// Base context; `dictionary` and the call's context are layered on top.
    pub context_instance: Option<Context>,
    /// Directory prefixes tried before the bare template name.
    pub dirs: Vec<String>,
    pub dictionary: Option<Context>,
}

impl LegacyOptions {
    pub fn is_empty(&self) -> bool {
        self.context_instance.is_none() && self.dirs.is_empty() && self.dictionary.is_none()
    }
}

/// Renders named templates.
pub trait TemplateEngine: Send + Sync {
    fn render_to_string(
        &self,
        names: &[&str],
        context: Context,
        request: Option<&RequestInfo>,
        using: Option<&str>,
    ) -> Result<String, TemplateError>;

    fn render_legacy(
        &self,
        names: &[&str],
        context: Context,
        legacy: &LegacyOptions,
        request: Option<&RequestInfo>,
        using: Option<&str>,
    ) -> Result<String, TemplateError>;
}

type Renderer = Arc<dyn Fn(Context) -> Result<String, TemplateError> + Send + Sync>;

/// Named askama templates.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Renderer>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`. The context must deserialize into `T`.
    pub fn register<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: Template + DeserializeOwned + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let renderer: Renderer = Arc::new(move |context: Context| {
            let template: T =
                serde_json::from_value(Value::Object(context)).map_err(|source| {
                    TemplateError::Context {
                        template: label.clone(),
                        source,
                    }
                })?;
            template.render().map_err(|source| TemplateError::Render {
                template: label.clone(),
                source,
            })
        });
        self.templates.insert(name, renderer);
        self
    }

    pub fn with<T>(mut self, name: impl Into<String>) -> Self
    where
        T: Template + DeserializeOwned + 'static,
    {
        self.register::<T>(name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// First candidate that exists, trying each name under every `dirs`
    /// prefix before the bare name.
    fn select(&self, names: &[&str], dirs: &[String]) -> Result<(String, &Renderer), TemplateError> {
        let mut tried = Vec::new();
        for name in names {
            let prefixed = dirs
                .iter()
                .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), name));
            for candidate in prefixed.chain(std::iter::once(name.to_string())) {
                if let Some(renderer) = self.templates.get(&candidate) {
                    return Ok((candidate, renderer));
                }
                tried.push(candidate);
            }
        }
        Err(TemplateError::DoesNotExist { tried })
    }

    fn render(
        &self,
        names: &[&str],
        dirs: &[String],
        mut context: Context,
        request: Option<&RequestInfo>,
    ) -> Result<String, TemplateError> {
        let (name, renderer) = self.select(names, dirs)?;
        if let Some(request) = request {
            if !context.contains_key(REQUEST_CONTEXT_KEY) {
                let value = serde_json::to_value(request).map_err(|source| TemplateError::Context {
                    template: name.clone(),
                    source,
                })?;
                context.insert(REQUEST_CONTEXT_KEY.to_string(), value);
            }
        }
        debug!(template = %name, keys = context.len(), "Rendering template");
        renderer(context)
    }
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.templates.keys().collect();
        names.sort();
        f.debug_struct("TemplateRegistry")
            .field("templates", &names)
            .finish()
    }
}

/// Registries grouped by engine alias.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngines {
    engines: HashMap<String, TemplateRegistry>,
}

impl TemplateEngines {
    /// A set holding `registry` as the default engine.
    pub fn new(registry: TemplateRegistry) -> Self {
        Self::default().with_engine(DEFAULT_ENGINE, registry)
    }

    pub fn with_engine(mut self, alias: impl Into<String>, registry: TemplateRegistry) -> Self {
        self.engines.insert(alias.into(), registry);
        self
    }

    pub fn engine(&self, using: Option<&str>) -> Result<&TemplateRegistry, TemplateError> {
        let alias = using.unwrap_or(DEFAULT_ENGINE);
        self.engines
            .get(alias)
            .ok_or_else(|| TemplateError::UnknownEngine {
                alias: alias.to_string(),
            })
    }
}

impl TemplateEngine for TemplateEngines {
    fn render_to_string(
        &self,
        names: &[&str],
        context: Context,
        request: Option<&RequestInfo>,
        using: Option<&str>,
    ) -> Result<String, TemplateError> {
        self.engine(using)?.render(names, &[], context, request)
    }

    fn render_legacy(
        &self,
        names: &[&str],
        context: Context,
        legacy: &LegacyOptions,
        request: Option<&RequestInfo>,
        using: Option<&str>,
    ) -> Result<String, TemplateError> {
        let mut merged = legacy.context_instance.clone().unwrap_or_default();
        if let Some(dictionary) = &legacy.dictionary {
            merged.extend(dictionary.clone());
        }
        merged.extend(context);
        self.engine(using)?
            .render(names, &legacy.dirs, merged, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Template, Deserialize)]
    #[template(source = "Hello {{ name }}!", ext = "txt")]
    struct Greeting {
        name: String,
    }

    #[derive(Template, Deserialize)]
    #[template(source = "{{ title }} by {{ author }}", ext = "txt")]
    struct Byline {
        title: String,
        author: String,
    }

    #[derive(Template, Deserialize)]
    #[template(
        source = "{% if let Some(req) = request %}{{ req.path }}{% else %}none{% endif %}",
        ext = "txt"
    )]
    struct WherePage {
        request: Option<RequestInfo>,
    }

    fn context(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    fn engines() -> TemplateEngines {
        TemplateEngines::new(
            TemplateRegistry::new()
                .with::<Greeting>("greeting.txt")
                .with::<Byline>("shop/byline.txt")
                .with::<WherePage>("where.txt"),
        )
        .with_engine(
            "plain",
            TemplateRegistry::new().with::<Byline>("byline.txt"),
        )
    }

    #[test]
    fn test_render_by_name() {
        let out = engines()
            .render_to_string(&["greeting.txt"], context(json!({"name": "Ada"})), None, None)
            .unwrap();
        assert_eq!(out, "Hello Ada!");
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let out = engines()
            .render_to_string(
                &["missing.txt", "greeting.txt"],
                context(json!({"name": "Bo"})),
                None,
                None,
            )
            .unwrap();
        assert_eq!(out, "Hello Bo!");
    }

    #[test]
    fn test_missing_template() {
        let err = engines()
            .render_to_string(&["a.txt", "b.txt"], Context::new(), None, None)
            .unwrap_err();
        assert_eq!(err.to_string(), "TemplateDoesNotExist: a.txt, b.txt");
    }

    #[test]
    fn test_using_selects_engine() {
        let ctx = context(json!({"title": "T", "author": "A"}));
        let out = engines()
            .render_to_string(&["byline.txt"], ctx.clone(), None, Some("plain"))
            .unwrap();
        assert_eq!(out, "T by A");

        assert!(matches!(
            engines().render_to_string(&["byline.txt"], ctx.clone(), None, None),
            Err(TemplateError::DoesNotExist { .. })
        ));
        assert!(matches!(
            engines().render_to_string(&["byline.txt"], ctx, None, Some("jinja2")),
            Err(TemplateError::UnknownEngine { .. })
        ));
    }

    #[test]
    fn test_bad_context_is_reported() {
        let err = engines()
            .render_to_string(&["greeting.txt"], Context::new(), None, None)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Context { .. }));
    }

    #[test]
    fn test_request_is_exposed() {
        let request = RequestInfo::new("r1", "GET", "/here/");
        let out = engines()
            .render_to_string(&["where.txt"], Context::new(), Some(&request), None)
            .unwrap();
        assert_eq!(out, "/here/");

        let out = engines()
            .render_to_string(&["where.txt"], Context::new(), None, None)
            .unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn test_legacy_dirs_and_merge_order() {
        let legacy = LegacyOptions {
            context_instance: Some(context(json!({"title": "base", "author": "base"}))),
            dirs: vec!["shop/".to_string()],
            dictionary: Some(context(json!({"author": "dict"}))),
        };
        let out = engines()
            .render_legacy(
                &["byline.txt"],
                context(json!({"title": "ctx"})),
                &legacy,
                None,
                None,
            )
            .unwrap();
        assert_eq!(out, "ctx by dict");
        assert!(!legacy.is_empty());
        assert!(LegacyOptions::default().is_empty());
    }
}
