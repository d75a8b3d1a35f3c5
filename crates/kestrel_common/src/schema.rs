use serde::{Deserialize, Serialize};

use crate::types::{ColumnId, DataType, TableId};

/// Column definition in a table schema. Immutable after table init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Table schema metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// False for purely in-memory tables; selects the buffered index build
    /// strategy instead of block merge.
    #[serde(default = "default_true")]
    pub persist_data: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub temporary: bool,
    /// Only meaningful for temporary tables: visible to all sessions.
    #[serde(default)]
    pub global_temporary: bool,
}

fn default_true() -> bool {
    true
}

impl TableSchema {
    /// True for temporary tables scoped to a single session. Their indexes
    /// are not registered as schema objects.
    pub fn is_session_temporary(&self) -> bool {
        self.temporary && !self.global_temporary
    }
}

/// Per-column sort direction inside an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One column of an index definition: the table column position and the
/// sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub column: usize,
    pub sort: SortOrder,
}

impl IndexColumn {
    pub fn asc(column: usize) -> Self {
        Self { column, sort: SortOrder::Ascending }
    }

    pub fn desc(column: usize) -> Self {
        Self { column, sort: SortOrder::Descending }
    }
}
