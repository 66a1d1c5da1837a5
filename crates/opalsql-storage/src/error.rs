#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    TableNotFound(String),
    TableAlreadyExists(String),
    ColumnNotFound(String),
    IndexNotFound(String),
    IndexAlreadyExists(String),
    RowArityMismatch { expected: usize, actual: usize },
    LockConflict { table: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::TableNotFound(name) => write!(f, "Table '{}' not found", name),
            StorageError::TableAlreadyExists(name) => {
                write!(f, "Table '{}' already exists", name)
            }
            StorageError::ColumnNotFound(name) => write!(f, "Column '{}' not found", name),
            StorageError::IndexNotFound(name) => write!(f, "Index '{}' not found", name),
            StorageError::IndexAlreadyExists(name) => {
                write!(f, "Index '{}' already exists", name)
            }
            StorageError::RowArityMismatch { expected, actual } => {
                write!(f, "Row has {} values, table has {} columns", actual, expected)
            }
            StorageError::LockConflict { table } => {
                write!(f, "Concurrent lock conflict on table '{}'", table)
            }
        }
    }
}

impl std::error::Error for StorageError {}
