use crate::db::{ConnectionHandler, DEFAULT_DB_ALIAS};
use crate::orm::error::{OrmError, OrmResult};
use crate::orm::queryset::{QuerySet, is_identifier};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// A table-backed record type.
///
/// Rows are decoded column-by-column into JSON and then deserialized, so the
/// struct's field names must match the column names.
pub trait Model: DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Human-readable name used in error messages.
    const OBJECT_NAME: &'static str;
    /// Connection alias the default manager queries.
    const CONNECTION: &'static str = DEFAULT_DB_ALIAS;

    /// The model class itself, for helpers that accept "a model".
    fn class(handler: &Arc<ConnectionHandler>) -> ModelClass<Self>
    where
        Self: Sized,
    {
        ModelClass::new(Arc::clone(handler))
    }

    /// The default manager.
    fn objects(handler: &Arc<ConnectionHandler>) -> Manager<Self>
    where
        Self: Sized,
    {
        Manager::new(Arc::clone(handler))
    }
}

/// Stands in for a model class: resolves to the model's default manager.
pub struct ModelClass<M> {
    handler: Arc<ConnectionHandler>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelClass<M> {
    pub fn new(handler: Arc<ConnectionHandler>) -> Self {
        Self {
            handler,
            _model: PhantomData,
        }
    }

    pub fn default_manager(&self) -> Manager<M> {
        Manager::new(Arc::clone(&self.handler))
    }
}

impl<M> Clone for ModelClass<M> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            _model: PhantomData,
        }
    }
}

/// Entry point for querying a model on one connection alias.
pub struct Manager<M> {
    handler: Arc<ConnectionHandler>,
    alias: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Manager<M> {
    pub fn new(handler: Arc<ConnectionHandler>) -> Self {
        Self {
            handler,
            alias: M::CONNECTION.to_string(),
            _model: PhantomData,
        }
    }

    /// A manager bound to another connection alias.
    pub fn db_manager(&self, alias: impl Into<String>) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            alias: alias.into(),
            _model: PhantomData,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Unfiltered queryset over the model's table.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new(Arc::clone(&self.handler), self.alias.clone())
    }
}

impl<M> Clone for Manager<M> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            alias: self.alias.clone(),
            _model: PhantomData,
        }
    }
}

/// Anything the get-or-404 helpers accept: a model class, a manager, or a queryset.
pub trait IntoQuerySet<M: Model> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>>;
}

fn check_model<M: Model>() -> OrmResult<()> {
    if is_identifier(M::TABLE) {
        Ok(())
    } else {
        Err(OrmError::invalid_input(format!(
            "Object is of type '{}', but must be a Model, Manager, or QuerySet",
            M::OBJECT_NAME
        )))
    }
}

impl<M: Model> IntoQuerySet<M> for QuerySet<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        check_model::<M>()?;
        Ok(self)
    }
}

impl<M: Model> IntoQuerySet<M> for &QuerySet<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        self.clone().into_queryset()
    }
}

impl<M: Model> IntoQuerySet<M> for Manager<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        check_model::<M>()?;
        Ok(self.all())
    }
}

impl<M: Model> IntoQuerySet<M> for &Manager<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        check_model::<M>()?;
        Ok(self.all())
    }
}

impl<M: Model> IntoQuerySet<M> for ModelClass<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        self.default_manager().into_queryset()
    }
}

impl<M: Model> IntoQuerySet<M> for &ModelClass<M> {
    fn into_queryset(self) -> OrmResult<QuerySet<M>> {
        self.default_manager().into_queryset()
    }
}
