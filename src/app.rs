//! Demo blog served by the binary.

use askama::Template;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use portico::db::ConnectionHandler;
use portico::error::{ShortcutError, ShortcutResult};
use portico::http::{HttpResponse, HttpResponseRedirect, RequestInfo, with_request_lifecycle};
use portico::models::{DatabaseType, QueryParam, QueryRecord};
use portico::orm::Model;
use portico::shortcuts::{
    AbsoluteUrl, RenderOptions, UrlTarget, get_list_or_404, get_object_or_404, redirect, render,
    render_to_response,
};
use portico::signals::RequestSignals;
use portico::template::{Context, TemplateEngines, TemplateRegistry};
use portico::urls::{PatternError, RouteTable, UrlArgs, ViewId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub published: i64,
}

impl Model for Article {
    const TABLE: &'static str = "articles";
    const OBJECT_NAME: &'static str = "Article";
}

impl AbsoluteUrl for Article {
    fn get_absolute_url(&self) -> String {
        format!("/articles/{}/", self.slug)
    }
}

#[derive(Template, Deserialize)]
#[template(path = "article_list.html")]
struct ArticleListPage {
    articles: Vec<Article>,
    #[serde(default)]
    request: Option<RequestInfo>,
}

#[derive(Template, Deserialize)]
#[template(path = "article_detail.html")]
struct ArticleDetailPage {
    article: Article,
}

const ARTICLE_LIST: ViewId = ViewId::new("blog.article_list");
const ARTICLE_DETAIL: ViewId = ViewId::new("blog.article_detail");
const ARTICLE_BY_ID: ViewId = ViewId::new("blog.article_by_id");
const LATEST: ViewId = ViewId::new("blog.latest");
const QUERIES: ViewId = ViewId::new("blog.queries");

#[derive(Clone)]
pub struct AppState {
    db: Arc<ConnectionHandler>,
    templates: Arc<TemplateEngines>,
    routes: Arc<RouteTable>,
    content_type: String,
}

impl AppState {
    pub fn new(db: Arc<ConnectionHandler>, content_type: String) -> Result<Self, PatternError> {
        let templates = TemplateRegistry::new()
            .with::<ArticleListPage>("article_list.html")
            .with::<ArticleDetailPage>("article_detail.html");
        Ok(Self {
            db,
            templates: Arc::new(TemplateEngines::new(templates)),
            routes: Arc::new(routes()?),
            content_type,
        })
    }
}

fn routes() -> Result<RouteTable, PatternError> {
    RouteTable::new()
        .route("article-list", "", ARTICLE_LIST)?
        .route("article-detail", "articles/<slug:slug>/", ARTICLE_DETAIL)?
        .route("article-by-id", "articles/id/<int:id>/", ARTICLE_BY_ID)?
        .route("latest", "latest/", LATEST)?
        .route("queries", "debug/queries/", QUERIES)
}

pub fn router(state: AppState, signals: Arc<RequestSignals>) -> Result<Router, String> {
    let path = |name: &str| {
        state
            .routes
            .axum_path(name)
            .ok_or_else(|| format!("Route '{}' is not defined", name))
    };
    let router = Router::new()
        .route(&path("article-list")?, get(article_list))
        .route(&path("article-detail")?, get(article_detail))
        .route(&path("article-by-id")?, get(article_by_id))
        .route(&path("latest")?, get(latest))
        .route(&path("queries")?, get(queries))
        .with_state(state);
    Ok(with_request_lifecycle(router, signals))
}

fn context_with<T: Serialize>(key: &str, value: &T) -> ShortcutResult<Context> {
    let value = serde_json::to_value(value).map_err(|e| ShortcutError::invalid_input(e.to_string()))?;
    let mut context = Context::new();
    context.insert(key.to_string(), value);
    Ok(context)
}

async fn article_list(
    State(app): State<AppState>,
    request: RequestInfo,
) -> ShortcutResult<HttpResponse> {
    let published = Article::objects(&app.db).all().order_by(["-id"]);
    let articles: Vec<Article> = get_list_or_404(published, [("published", 1)]).await?;
    render(
        app.templates.as_ref(),
        &request,
        "article_list.html",
        context_with("articles", &articles)?,
        RenderOptions::new().content_type(app.content_type.clone()),
    )
}

async fn article_detail(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> ShortcutResult<HttpResponse> {
    let article: Article = get_object_or_404(Article::class(&app.db), [("slug", slug)]).await?;
    render_to_response(
        app.templates.as_ref(),
        "article_detail.html",
        context_with("article", &article)?,
        RenderOptions::new().content_type(app.content_type.clone()),
    )
}

async fn article_by_id(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> ShortcutResult<HttpResponseRedirect> {
    let article: Article = get_object_or_404(Article::objects(&app.db), [("id", id)]).await?;
    redirect(
        app.routes.as_ref(),
        UrlTarget::model(&article),
        &UrlArgs::new(),
        true,
    )
}

async fn latest(State(app): State<AppState>) -> ShortcutResult<HttpResponseRedirect> {
    redirect(app.routes.as_ref(), "article-list", &UrlArgs::new(), false)
}

#[derive(Serialize)]
struct QueryReport {
    articles: u64,
    queries: Vec<QueryRecord>,
}

/// Queries run on the default connection during this request.
async fn queries(State(app): State<AppState>) -> ShortcutResult<Json<QueryReport>> {
    let articles = Article::objects(&app.db).all().count().await?;
    let queries = app.db.default_connection().await?.queries_log().snapshot();
    Ok(Json(QueryReport { articles, queries }))
}

/// Create the articles table and seed it when empty.
pub async fn prepare_database(db: &Arc<ConnectionHandler>) -> Result<(), Box<dyn Error>> {
    let conn = db.default_connection().await?;
    let db_type = conn.settings().db_type;
    let ddl = match db_type {
        DatabaseType::SQLite => {
            "CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL,
                published INTEGER NOT NULL DEFAULT 1
            )"
        }
        DatabaseType::PostgreSQL => {
            "CREATE TABLE IF NOT EXISTS articles (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL,
                published BIGINT NOT NULL DEFAULT 1
            )"
        }
        DatabaseType::MySQL => {
            "CREATE TABLE IF NOT EXISTS articles (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                body TEXT NOT NULL,
                published BIGINT NOT NULL DEFAULT 1
            )"
        }
    };
    conn.execute(ddl, &[]).await?;

    if Article::objects(db).all().count().await? > 0 {
        return Ok(());
    }

    let insert = format!(
        "INSERT INTO articles (title, slug, body) VALUES ({}, {}, {})",
        db_type.placeholder(1),
        db_type.placeholder(2),
        db_type.placeholder(3)
    );
    let seed = [
        ("Hello, world", "hello-world", "The first article."),
        ("Connection lifetimes", "connection-lifetimes", "Connections close when a request ends unless conn_max_age says otherwise."),
    ];
    for (title, slug, body) in seed {
        let params: [QueryParam; 3] = [title.into(), slug.into(), body.into()];
        conn.execute(&insert, &params).await?;
    }
    info!(count = seed.len(), "Seeded articles table");
    Ok(())
}
