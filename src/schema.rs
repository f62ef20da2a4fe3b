//! DDL for the table records are persisted into.
//!
//! Run once in the Supabase SQL editor (or `psql`). `incomecheck
//! --print-schema` prints it with the configured table name.

/// `CREATE TABLE` statement for the default `income_data` table.
pub const CREATE_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS income_data (
    id BIGSERIAL PRIMARY KEY,
    raw_text TEXT NOT NULL,
    income_info TEXT,
    compliance_status TEXT NOT NULL,
    extracted_at TIMESTAMP WITH TIME ZONE NOT NULL,
    file_name TEXT,
    applicant_id TEXT,
    batch_id TEXT,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_income_data_applicant_id ON income_data(applicant_id);
CREATE INDEX IF NOT EXISTS idx_income_data_compliance_status ON income_data(compliance_status);
CREATE INDEX IF NOT EXISTS idx_income_data_created_at ON income_data(created_at);
"#;

/// The DDL with `income_data` replaced by `table`.
pub fn create_table_sql(table: &str) -> String {
    CREATE_TABLE_SQL.replace("income_data", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_table_and_indexes() {
        let sql = create_table_sql("applicant_income");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS applicant_income ("));
        assert!(sql.contains("idx_applicant_income_applicant_id ON applicant_income(applicant_id)"));
        assert!(!sql.contains("income_data"));
    }

    #[test]
    fn required_columns_are_not_null() {
        for column in ["raw_text TEXT NOT NULL", "compliance_status TEXT NOT NULL"] {
            assert!(CREATE_TABLE_SQL.contains(column), "missing {column}");
        }
    }
}
