//! View helpers that tie templates, URL reversal and the query layer together.
//!
//! Every helper returns [`ShortcutResult`], and [`ShortcutError`] converts into
//! an HTTP response, so handlers can use `?` and let a missing object become a
//! 404.
//!
//! ```ignore
//! async fn detail(
//!     State(app): State<AppState>,
//!     Path(slug): Path<String>,
//! ) -> ShortcutResult<HttpResponse> {
//!     let article = get_object_or_404(Article::class(&app.db), [("slug", slug)]).await?;
//!     render_to_response(&app.templates, "article.html", article_context(&article), RenderOptions::new())
//! }
//! ```

use crate::error::{ShortcutError, ShortcutResult};
use crate::http::{HttpResponse, HttpResponseRedirect, RequestInfo};
use crate::orm::{Filters, IntoQuerySet, Model, QuerySet};
use crate::template::{Context, LegacyOptions, TemplateEngine, TemplateNames};
use crate::urls::{Lookup, UrlArgs, UrlResolver, ViewId};
use axum::http::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Objects that know their own canonical URL.
pub trait AbsoluteUrl {
    fn get_absolute_url(&self) -> String;
}

/// A string computed on first use.
#[derive(Clone)]
pub struct LazyStr(Arc<dyn Fn() -> String + Send + Sync>);

impl LazyStr {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn force(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for LazyStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyStr(..)")
    }
}

/// Where [`resolve_url`] and [`redirect`] should point.
pub enum UrlTarget<'a> {
    /// Uses the object's absolute URL.
    Model(&'a dyn AbsoluteUrl),
    Lazy(LazyStr),
    /// Reversed by view; failure is always an error.
    View(ViewId),
    /// A relative path, a route name or a URL.
    Str(String),
}

impl<'a> UrlTarget<'a> {
    pub fn model<T: AbsoluteUrl>(object: &'a T) -> Self {
        Self::Model(object)
    }
}

impl fmt::Debug for UrlTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(object) => write!(f, "Model({})", object.get_absolute_url()),
            Self::Lazy(lazy) => lazy.fmt(f),
            Self::View(view) => write!(f, "View({})", view),
            Self::Str(s) => write!(f, "Str({:?})", s),
        }
    }
}

impl From<&str> for UrlTarget<'_> {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for UrlTarget<'_> {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ViewId> for UrlTarget<'_> {
    fn from(view: ViewId) -> Self {
        Self::View(view)
    }
}

impl From<LazyStr> for UrlTarget<'_> {
    fn from(lazy: LazyStr) -> Self {
        Self::Lazy(lazy)
    }
}

/// Turn a redirect target into a URL.
///
/// Tried in order: the object's absolute URL, a relative `./` or `../` path
/// as-is, reverse resolution, and finally the string itself. A failed reversal
/// is an error for views, and for strings that contain neither `/` nor `.`.
pub fn resolve_url<'a>(
    resolver: &dyn UrlResolver,
    to: impl Into<UrlTarget<'a>>,
    args: &UrlArgs,
) -> ShortcutResult<String> {
    let s = match to.into() {
        UrlTarget::Model(object) => return Ok(object.get_absolute_url()),
        UrlTarget::View(view) => return Ok(resolver.reverse(Lookup::View(view), args)?),
        UrlTarget::Lazy(lazy) => lazy.force(),
        UrlTarget::Str(s) => s,
    };

    if s.starts_with("./") || s.starts_with("../") {
        return Ok(s);
    }
    match resolver.reverse(Lookup::Name(&s), args) {
        Ok(url) => Ok(url),
        Err(err) if !s.contains('/') && !s.contains('.') => Err(err.into()),
        Err(_) => {
            debug!(to = %s, "No route matched, using target as URL");
            Ok(s)
        }
    }
}

/// Redirect to whatever `to` resolves to: 301 when `permanent`, 302 otherwise.
pub fn redirect<'a>(
    resolver: &dyn UrlResolver,
    to: impl Into<UrlTarget<'a>>,
    args: &UrlArgs,
    permanent: bool,
) -> ShortcutResult<HttpResponseRedirect> {
    let url = resolve_url(resolver, to, args)?;
    HttpResponseRedirect::build(&url, permanent)
}

/// Queryset for a model class, manager or queryset.
pub fn get_queryset<M, S>(source: S) -> ShortcutResult<QuerySet<M>>
where
    M: Model,
    S: IntoQuerySet<M>,
{
    Ok(source.into_queryset()?)
}

/// The one object matching `filters`, or a 404.
///
/// More than one match is not a 404: `MultipleObjectsReturned` is passed on.
pub async fn get_object_or_404<M, S>(source: S, filters: impl Into<Filters>) -> ShortcutResult<M>
where
    M: Model,
    S: IntoQuerySet<M>,
{
    let queryset = get_queryset(source)?;
    Ok(queryset.get(filters).await?)
}

/// Every object matching `filters`, or a 404 if there are none.
pub async fn get_list_or_404<M, S>(source: S, filters: impl Into<Filters>) -> ShortcutResult<Vec<M>>
where
    M: Model,
    S: IntoQuerySet<M>,
{
    let queryset = get_queryset(source)?;
    let objects = queryset.filter(filters).fetch().await?;
    if objects.is_empty() {
        return Err(ShortcutError::not_found(format!(
            "No {} matches the given query.",
            M::OBJECT_NAME
        )));
    }
    Ok(objects)
}

/// Optional arguments of [`render`] and [`render_to_response`].
///
/// `context_instance`, `dirs`, `dictionary` and `current_app` are deprecated;
/// setting any of them switches to the legacy rendering path.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub content_type: Option<String>,
    pub status: Option<StatusCode>,
    pub using: Option<String>,
    pub context_instance: Option<Context>,
    pub dirs: Option<Vec<String>>,
    pub dictionary: Option<Context>,
    pub current_app: Option<String>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn using(mut self, using: impl Into<String>) -> Self {
        self.using = Some(using.into());
        self
    }

    pub fn context_instance(mut self, context: Context) -> Self {
        self.context_instance = Some(context);
        self
    }

    pub fn dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirs = Some(dirs.into_iter().map(Into::into).collect());
        self
    }

    pub fn dictionary(mut self, dictionary: Context) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn current_app(mut self, current_app: impl Into<String>) -> Self {
        self.current_app = Some(current_app.into());
        self
    }

    fn uses_legacy(&self) -> bool {
        self.context_instance.is_some() || self.dirs.is_some() || self.dictionary.is_some()
    }

    fn legacy(&mut self) -> LegacyOptions {
        LegacyOptions {
            context_instance: self.context_instance.take(),
            dirs: self.dirs.take().unwrap_or_default(),
            dictionary: self.dictionary.take(),
        }
    }

    fn response(&self, content: String) -> HttpResponse {
        let mut response = HttpResponse::new(content);
        if let Some(content_type) = &self.content_type {
            response = response.with_content_type(content_type.clone());
        }
        if let Some(status) = self.status {
            response = response.with_status(status);
        }
        response
    }
}

/// Render a template into a response, without request data.
pub fn render_to_response<'a>(
    engine: &dyn TemplateEngine,
    names: impl Into<TemplateNames<'a>>,
    context: Context,
    mut options: RenderOptions,
) -> ShortcutResult<HttpResponse> {
    if options.current_app.is_some() {
        return Err(ShortcutError::invalid_input(
            "render_to_response() does not accept current_app; use render()",
        ));
    }
    let names = names.into();
    let using = options.using.clone();

    let content = if options.uses_legacy() {
        let legacy = options.legacy();
        engine.render_legacy(names.as_slice(), context, &legacy, None, using.as_deref())?
    } else {
        engine.render_to_string(names.as_slice(), context, None, using.as_deref())?
    };
    Ok(options.response(content))
}

/// Render a template into a response, exposing `request` to the template.
pub fn render<'a>(
    engine: &dyn TemplateEngine,
    request: &RequestInfo,
    names: impl Into<TemplateNames<'a>>,
    context: Context,
    mut options: RenderOptions,
) -> ShortcutResult<HttpResponse> {
    let names = names.into();
    let using = options.using.clone();

    if !options.uses_legacy() && options.current_app.is_none() {
        let content =
            engine.render_to_string(names.as_slice(), context, Some(request), using.as_deref())?;
        return Ok(options.response(content));
    }

    // A supplied context_instance replaces the request context
    let request = if options.context_instance.is_some() {
        if options.current_app.is_some() {
            return Err(ShortcutError::invalid_input(
                "If you provide a context_instance you must set its current_app before calling render()",
            ));
        }
        None
    } else {
        let mut request = request.clone();
        if let Some(current_app) = options.current_app.take() {
            warn!(
                current_app = %current_app,
                "The current_app argument of render is deprecated. Set the current_app attribute of request instead."
            );
            request.current_app = Some(current_app);
        }
        Some(request)
    };

    let legacy = options.legacy();
    let content = engine.render_legacy(
        names.as_slice(),
        context,
        &legacy,
        request.as_ref(),
        using.as_deref(),
    )?;
    Ok(options.response(content))
}
