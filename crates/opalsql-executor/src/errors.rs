use opalsql_storage::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    TableNotFound(String),
    ColumnNotFound(String),
    AmbiguousColumn(String),
    InvalidValue { parameter: String, value: String },
    WithTiesWithoutOrderBy,
    UnsupportedFeature(String),
    TypeMismatch { left: String, op: String, right: String },
    DivisionByZero,
    ParameterNotSet(usize),
    QueryCanceled,
    LockConflict { table: String },
    Internal(String),
    Storage(StorageError),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::TableNotFound(name) => write!(f, "Table or view '{}' not found", name),
            ExecutorError::ColumnNotFound(name) => write!(f, "Column '{}' not found", name),
            ExecutorError::AmbiguousColumn(name) => write!(f, "Column '{}' is ambiguous", name),
            ExecutorError::InvalidValue { parameter, value } => {
                write!(f, "Invalid value '{}' for {}", value, parameter)
            }
            ExecutorError::WithTiesWithoutOrderBy => {
                write!(f, "WITH TIES requires ORDER BY")
            }
            ExecutorError::UnsupportedFeature(msg) => write!(f, "Unsupported feature: {}", msg),
            ExecutorError::TypeMismatch { left, op, right } => {
                write!(f, "Type mismatch: {} {} {}", left, op, right)
            }
            ExecutorError::DivisionByZero => write!(f, "Division by zero"),
            ExecutorError::ParameterNotSet(index) => {
                write!(f, "Parameter ?{} is not set", index + 1)
            }
            ExecutorError::QueryCanceled => write!(f, "Query canceled"),
            ExecutorError::LockConflict { table } => {
                write!(f, "Could not lock table '{}'", table)
            }
            ExecutorError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ExecutorError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<StorageError> for ExecutorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TableNotFound(name) => ExecutorError::TableNotFound(name),
            StorageError::ColumnNotFound(name) => ExecutorError::ColumnNotFound(name),
            StorageError::LockConflict { table } => ExecutorError::LockConflict { table },
            other => ExecutorError::Storage(other),
        }
    }
}
