use crate::db::{ConnectionHandler, JsonRow};
use crate::error::DbError;
use crate::models::{DatabaseType, QueryParam};
use crate::orm::error::{MAX_GET_RESULTS, OrmError, OrmResult};
use crate::orm::model::Model;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Equality conditions, ANDed together in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    conditions: Vec<(String, QueryParam)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = value`. A null value matches with `IS NULL`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParam)> {
        self.conditions.iter().map(|(c, v)| (c.as_str(), v))
    }

    fn extend(&mut self, other: Filters) {
        self.conditions.extend(other.conditions);
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Filters
where
    K: Into<String>,
    V: Into<QueryParam>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs
            .into_iter()
            .fold(Filters::new(), |filters, (k, v)| filters.eq(k, v))
    }
}

/// ASCII identifier: a letter or underscore, then letters, digits or underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_column(column: &str) -> OrmResult<()> {
    if is_identifier(column) {
        Ok(())
    } else {
        Err(OrmError::invalid_input(format!(
            "Invalid column name '{}'",
            column
        )))
    }
}

/// A lazy, cloneable query over one model's table.
///
/// Nothing touches the database until [`get`](Self::get), [`fetch`](Self::fetch)
/// or [`count`](Self::count) is awaited.
pub struct QuerySet<M> {
    handler: Arc<ConnectionHandler>,
    alias: String,
    filters: Filters,
    ordering: Vec<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for QuerySet<M> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            alias: self.alias.clone(),
            filters: self.filters.clone(),
            ordering: self.ordering.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("alias", &self.alias)
            .field("filters", &self.filters)
            .field("ordering", &self.ordering)
            .finish()
    }
}

impl<M: Model> QuerySet<M> {
    pub(crate) fn new(handler: Arc<ConnectionHandler>, alias: String) -> Self {
        Self {
            handler,
            alias,
            filters: Filters::new(),
            ordering: Vec::new(),
            _model: PhantomData,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// A copy of this queryset.
    pub fn all(&self) -> Self {
        self.clone()
    }

    /// Narrow the queryset. Conditions accumulate across calls.
    pub fn filter(&self, filters: impl Into<Filters>) -> Self {
        let mut next = self.clone();
        next.filters.extend(filters.into());
        next
    }

    /// Replace the ordering. A leading `-` sorts descending.
    pub fn order_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.ordering = fields.into_iter().map(Into::into).collect();
        next
    }

    /// Run against another connection alias.
    pub fn using(&self, alias: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.alias = alias.into();
        next
    }

    /// The single row matching `filters`.
    ///
    /// Reads at most [`MAX_GET_RESULTS`] rows so a loose filter on a large
    /// table stays cheap.
    pub async fn get(&self, filters: impl Into<Filters>) -> OrmResult<M> {
        let qs = self.filter(filters);
        let mut rows = qs.fetch_limited(Some(MAX_GET_RESULTS)).await?;
        match rows.len() {
            0 => Err(OrmError::does_not_exist(M::OBJECT_NAME)),
            1 => Ok(rows.remove(0)),
            n => Err(OrmError::multiple_objects(M::OBJECT_NAME, n)),
        }
    }

    /// Every matching row.
    pub async fn fetch(&self) -> OrmResult<Vec<M>> {
        self.fetch_limited(None).await
    }

    pub async fn count(&self) -> OrmResult<u64> {
        let wrapper = self.handler.get(&self.alias).await?;
        let (sql, params) = self.build_sql(wrapper.settings().db_type, "COUNT(*) AS n", None)?;
        let rows = wrapper.fetch_json(&sql, &params, Some(1)).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(count)
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        let wrapper = self.handler.get(&self.alias).await?;
        let (sql, params) = self.build_sql(wrapper.settings().db_type, "1 AS present", Some(1))?;
        Ok(!wrapper.fetch_json(&sql, &params, Some(1)).await?.is_empty())
    }

    async fn fetch_limited(&self, limit: Option<usize>) -> OrmResult<Vec<M>> {
        let wrapper = self.handler.get(&self.alias).await?;
        let (sql, params) = self.build_sql(wrapper.settings().db_type, "*", limit)?;
        let rows = wrapper.fetch_json(&sql, &params, limit).await?;
        debug!(model = M::OBJECT_NAME, alias = %self.alias, rows = rows.len(), "Fetched rows");
        rows.into_iter().map(decode_row::<M>).collect()
    }

    /// SQL text plus bound parameters, in placeholder order.
    pub(crate) fn build_sql(
        &self,
        db_type: DatabaseType,
        columns: &str,
        limit: Option<usize>,
    ) -> OrmResult<(String, Vec<QueryParam>)> {
        if !is_identifier(M::TABLE) {
            return Err(OrmError::invalid_input(format!(
                "Invalid table name '{}' for {}",
                M::TABLE,
                M::OBJECT_NAME
            )));
        }

        let mut sql = format!("SELECT {} FROM {}", columns, db_type.quote_ident(M::TABLE));
        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.filters.len());

        for (column, value) in self.filters.iter() {
            check_column(column)?;
            let column = db_type.quote_ident(column);
            if matches!(value, QueryParam::Null) {
                clauses.push(format!("{} IS NULL", column));
            } else {
                params.push(value.clone());
                clauses.push(format!("{} = {}", column, db_type.placeholder(params.len())));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.ordering.is_empty() {
            let mut terms = Vec::with_capacity(self.ordering.len());
            for field in &self.ordering {
                let (column, direction) = match field.strip_prefix('-') {
                    Some(column) => (column, "DESC"),
                    None => (field.as_str(), "ASC"),
                };
                check_column(column)?;
                terms.push(format!("{} {}", db_type.quote_ident(column), direction));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok((sql, params))
    }
}

fn decode_row<M: Model>(row: JsonRow) -> OrmResult<M> {
    serde_json::from_value(Value::Object(row)).map_err(|e| {
        OrmError::Database(DbError::internal(format!(
            "Failed to decode {} row: {}",
            M::OBJECT_NAME,
            e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Book {
        #[allow(dead_code)]
        id: i64,
    }

    impl Model for Book {
        const TABLE: &'static str = "books";
        const OBJECT_NAME: &'static str = "Book";
    }

    fn books() -> QuerySet<Book> {
        Book::objects(&Arc::new(ConnectionHandler::new())).all()
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("title"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("name; DROP TABLE books"));
        assert!(!is_identifier("a.b"));
    }

    #[test]
    fn test_sql_without_filters() {
        let (sql, params) = books().build_sql(DatabaseType::SQLite, "*", None).unwrap();
        assert_eq!(sql, "SELECT * FROM \"books\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_sql_with_filters_and_null() {
        let qs = books()
            .filter(Filters::new().eq("author", "Le Guin"))
            .filter([("deleted_at", QueryParam::Null)])
            .filter([("year", 1969)]);
        let (sql, params) = qs
            .build_sql(DatabaseType::PostgreSQL, "*", Some(MAX_GET_RESULTS))
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"books\" WHERE \"author\" = $1 AND \"deleted_at\" IS NULL AND \"year\" = $2 LIMIT 21"
        );
        assert_eq!(
            params,
            vec![QueryParam::Text("Le Guin".into()), QueryParam::Int(1969)]
        );
    }

    #[test]
    fn test_sql_ordering_mysql() {
        let qs = books().order_by(["-year", "title"]);
        let (sql, _) = qs.build_sql(DatabaseType::MySQL, "*", None).unwrap();
        assert_eq!(sql, "SELECT * FROM `books` ORDER BY `year` DESC, `title` ASC");
    }

    #[test]
    fn test_invalid_column_rejected() {
        let qs = books().filter([("title OR 1=1", "x")]);
        let err = qs.build_sql(DatabaseType::SQLite, "*", None).unwrap_err();
        assert!(matches!(err, OrmError::InvalidInput { .. }));

        let qs = books().order_by(["-"]);
        assert!(qs.build_sql(DatabaseType::SQLite, "*", None).is_err());
    }

    #[test]
    fn test_filter_does_not_mutate_original() {
        let base = books();
        let narrowed = base.filter([("id", 1)]);
        assert!(base.filters().is_empty());
        assert_eq!(narrowed.filters().len(), 1);
        assert_eq!(narrowed.using("replica").alias(), "replica");
        assert_eq!(base.alias(), "default");
    }

    #[tokio::test]
    async fn test_unknown_alias_is_database_error() {
        let err = books().fetch().await.unwrap_err();
        assert!(matches!(
            err,
            OrmError::Database(DbError::ConnectionNotFound { .. })
        ));
    }
}
