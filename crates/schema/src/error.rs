use keepsake_persist::PersistError;

/// Declaration mistakes caught when a schema is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("field name must not be empty")]
    EmptyFieldName,
    #[error("field {0:?} is declared more than once")]
    DuplicateField(String),
    #[error("value field {0:?} has no default")]
    MissingDefault(String),
    #[error("value field {0:?} declares more than one default")]
    ConflictingDefault(String),
    #[error("collection field {0:?} cannot declare a default; it starts empty")]
    DefaultOnCollection(String),
    #[error("default for field {field:?} is a {found}, but the field holds {declared}")]
    DefaultType {
        field: String,
        declared: &'static str,
        found: &'static str,
    },
}

/// Errors from opening or accessing a composite object.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("no field named {0:?}")]
    UnknownField(String),
    #[error("field {field:?} holds {declared}, not {requested}")]
    FieldType {
        field: String,
        declared: &'static str,
        requested: &'static str,
    },
}
