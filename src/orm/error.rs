use crate::error::DbError;
use thiserror::Error;

/// Rows fetched by `get()` before it gives up counting duplicates.
pub const MAX_GET_RESULTS: usize = 21;

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("{model} matching query does not exist.")]
    DoesNotExist { model: &'static str },

    #[error("get() returned more than one {model} -- it returned {count}!")]
    MultipleObjectsReturned { model: &'static str, count: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl OrmError {
    pub fn does_not_exist(model: &'static str) -> Self {
        Self::DoesNotExist { model }
    }

    /// `found` is the number of rows fetched, capped at [`MAX_GET_RESULTS`].
    pub fn multiple_objects(model: &'static str, found: usize) -> Self {
        let count = if found >= MAX_GET_RESULTS {
            format!("more than {}", MAX_GET_RESULTS - 1)
        } else {
            found.to_string()
        };
        Self::MultipleObjectsReturned { model, count }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

pub type OrmResult<T> = Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_objects_count() {
        let err = OrmError::multiple_objects("Article", 2);
        assert_eq!(
            err.to_string(),
            "get() returned more than one Article -- it returned 2!"
        );

        let err = OrmError::multiple_objects("Article", MAX_GET_RESULTS);
        assert_eq!(
            err.to_string(),
            "get() returned more than one Article -- it returned more than 20!"
        );
    }

    #[test]
    fn test_does_not_exist_message() {
        assert_eq!(
            OrmError::does_not_exist("Article").to_string(),
            "Article matching query does not exist."
        );
    }
}
