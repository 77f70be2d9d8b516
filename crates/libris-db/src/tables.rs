use redb::TableDefinition;

/// Table holding every library table as one row.
/// Key: library table name (e.g. "borrowRecords")
/// Value: JSON array of that table's records
pub const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
