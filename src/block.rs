//! Data blocks: the unit of columnar transfer.
//!
//! A block is an ordered set of named columns with one shared row count.
//! Query results arrive as a sequence of blocks; bulk inserts send them.

use std::sync::Arc;

use crate::column::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::{Error, Result};

/// Block-level metadata carried on the wire.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    /// Set when the block carries GROUP BY overflow rows.
    pub is_overflows: bool,
    /// Two-level aggregation bucket, -1 when unused.
    pub bucket_num: i32,
}

impl BlockInfo {
    /// The default info carried on ordinary blocks.
    pub fn new() -> Self {
        Self { is_overflows: false, bucket_num: -1 }
    }
}

struct NamedColumn {
    name: String,
    column: ColumnRef,
}

/// An ordered collection of equally sized named columns.
pub struct Block {
    columns: Vec<NamedColumn>,
    rows: usize,
    info: BlockInfo,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("columns", &self.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>())
            .field("rows", &self.rows)
            .field("info", &self.info)
            .finish()
    }
}

impl Block {
    /// An empty block (also the query/insert terminator on the wire).
    pub fn new() -> Self {
        Self { columns: Vec::new(), rows: 0, info: BlockInfo::new() }
    }

    /// Append a named column. The first column fixes the row count; later
    /// columns must match it.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        column: ColumnRef,
    ) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::Internal(format!(
                "column '{name}' has {} rows, block has {}",
                column.len(),
                self.rows
            )));
        }
        self.columns.push(NamedColumn { name, column });
        Ok(())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows (shared by every column).
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// True when the block carries no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    /// Column handle by position.
    pub fn column(&self, index: usize) -> Option<ColumnRef> {
        self.columns.get(index).map(|c| c.column.clone())
    }

    /// Column handle by name.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnRef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column.clone())
    }

    /// Column name by position.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    /// Block-level metadata.
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Replace the block-level metadata.
    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Iterate `(name, type, column)` triples in declaration order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&str, &Arc<TypeNode>, &ColumnRef)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.column.type_node(), &c.column))
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnString, ColumnUInt64};

    fn uint64(values: &[u64]) -> ColumnRef {
        Arc::new(ColumnUInt64::from_values(
            TypeNode::parse("UInt64").unwrap(),
            values.to_vec(),
        ))
    }

    #[test]
    fn first_column_fixes_row_count() {
        let mut block = Block::new();
        block.add_column("id", uint64(&[1, 2, 3])).unwrap();
        assert_eq!(block.row_count(), 3);
        assert_eq!(block.column_count(), 1);

        let mismatched = uint64(&[1, 2]);
        assert!(block.add_column("bad", mismatched).is_err());
    }

    #[test]
    fn lookup_by_name_and_index() {
        let mut block = Block::new();
        block.add_column("id", uint64(&[7])).unwrap();
        let names = Arc::new(ColumnString::from_values(
            TypeNode::parse("String").unwrap(),
            ["seven"],
        ));
        block.add_column("name", names).unwrap();

        assert_eq!(block.column_name(1), Some("name"));
        assert!(block.column_by_name("name").is_some());
        assert!(block.column_by_name("missing").is_none());
        assert_eq!(block.column(0).unwrap().len(), 1);

        let collected: Vec<&str> =
            block.iter().map(|(name, _, _)| name).collect();
        assert_eq!(collected, ["id", "name"]);
    }

    #[test]
    fn empty_block() {
        let block = Block::new();
        assert!(block.is_empty());
        assert_eq!(block.row_count(), 0);
    }
}
