//! Sampled table statistics. Triggered adaptively by the table after
//! mutations; results feed planner cardinality estimates.

use std::collections::HashSet;
use std::sync::Arc;

use kestrel_common::datum::{encode_datum, Datum};
use kestrel_common::error::DbResult;
use kestrel_common::types::TableId;

use crate::session::Session;
use crate::table::Table;

/// Per-column statistics from the last analyze run.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub column: usize,
    pub name: String,
    pub null_count: u64,
    /// Distinct non-null values among the sampled rows.
    pub distinct_count: u64,
    pub min: Option<Datum>,
    pub max: Option<Datum>,
    /// Average encoded width in bytes.
    pub avg_width: u32,
}

/// Per-table statistics from the last analyze run.
#[derive(Debug, Clone)]
pub struct TableStatistics {
    pub table: TableId,
    pub sampled_rows: u64,
    pub columns: Vec<ColumnStats>,
}

struct ColumnAcc {
    nulls: u64,
    distinct: HashSet<Vec<u8>>,
    min: Option<Datum>,
    max: Option<Datum>,
    total_width: u64,
}

/// Sample up to `sample_rows` rows from the scan index (0 = all) and
/// replace the table's statistics.
pub fn analyze_table(session: &Arc<Session>, table: &Table, sample_rows: u64) -> DbResult<()> {
    let scan = table.get_scan_index()?;
    let mut cursor = scan.find(session, None, None)?;

    let column_count = table.schema().columns.len();
    let mut accs: Vec<ColumnAcc> = (0..column_count)
        .map(|_| ColumnAcc {
            nulls: 0,
            distinct: HashSet::new(),
            min: None,
            max: None,
            total_width: 0,
        })
        .collect();

    let mut rows = 0u64;
    while cursor.next()? {
        let Some(row) = cursor.get() else { break };
        for (i, acc) in accs.iter_mut().enumerate() {
            let value = row.get(i);
            if value.is_null() {
                acc.nulls += 1;
                continue;
            }
            let mut encoded = Vec::new();
            encode_datum(value, &mut encoded);
            acc.total_width += encoded.len() as u64;
            acc.distinct.insert(encoded);
            if acc.min.as_ref().map_or(true, |m| value.cmp_total(m).is_lt()) {
                acc.min = Some(value.clone());
            }
            if acc.max.as_ref().map_or(true, |m| value.cmp_total(m).is_gt()) {
                acc.max = Some(value.clone());
            }
        }
        rows += 1;
        if sample_rows > 0 && rows >= sample_rows {
            break;
        }
    }

    let columns = table
        .schema()
        .columns
        .iter()
        .zip(accs)
        .enumerate()
        .map(|(i, (def, acc))| {
            let non_null = rows.saturating_sub(acc.nulls);
            ColumnStats {
                column: i,
                name: def.name.clone(),
                null_count: acc.nulls,
                distinct_count: acc.distinct.len() as u64,
                min: acc.min,
                max: acc.max,
                avg_width: if non_null == 0 { 0 } else { (acc.total_width / non_null) as u32 },
            }
        })
        .collect();

    table.set_statistics(TableStatistics {
        table: table.id(),
        sampled_rows: rows,
        columns,
    });
    tracing::debug!("analyze {}: sampled {} rows", table.name(), rows);
    Ok(())
}
