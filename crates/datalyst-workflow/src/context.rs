use datalyst_core::types::{Intent, QueryOutcome, Row};

/// The mutable per-run record threaded through every stage.
///
/// Created fresh for each incoming question, exclusively owned by one
/// in-flight run, and discarded after the final answer is read.
#[derive(Debug, Clone, Default)]
pub struct AnalystContext {
    /// The raw user question. Immutable once set.
    pub question: String,
    /// Classification produced by the router; set exactly once per run.
    pub intent: Option<Intent>,
    /// Question with fuzzy references rewritten to exact indexed values.
    /// Equals `question` when no entities resolved.
    pub mapped_question: String,
    /// Newline-joined candidate strings from the entity index, retained
    /// for traceability. Not reused computationally downstream.
    pub potential_entities: String,
    /// The latest generated query. Overwritten on each retry.
    pub generated_sql: String,
    /// Rows from the last successful execution. Absent iff `sql_error`
    /// is present.
    pub sql_result: Option<Vec<Row>>,
    /// Error text from the last failed execution. Mutually exclusive
    /// with `sql_result`.
    pub sql_error: Option<String>,
    /// Failed execution attempts this run. Monotone within a run; reset
    /// by the router.
    pub error_count: u32,
    /// Terminal field; presence signals completion.
    pub final_answer: String,
}

impl AnalystContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Merge a stage's partial update into the context. Only fields the
    /// stage actually produced are overwritten; everything else is
    /// preserved.
    pub fn apply(&mut self, update: ContextUpdate) {
        if update.reset_error_count {
            self.error_count = 0;
        }
        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        if let Some(mapped) = update.mapped_question {
            self.mapped_question = mapped;
        }
        if let Some(entities) = update.potential_entities {
            self.potential_entities = entities;
        }
        if let Some(sql) = update.generated_sql {
            self.generated_sql = sql;
        }
        if let Some(outcome) = update.sql_outcome {
            match outcome {
                QueryOutcome::Rows(rows) => {
                    self.sql_result = Some(rows);
                    self.sql_error = None;
                }
                QueryOutcome::SqlError(error) => {
                    self.sql_result = None;
                    self.sql_error = Some(error);
                    self.error_count += 1;
                }
            }
        }
        if let Some(answer) = update.final_answer {
            self.final_answer = answer;
        }
    }
}

/// Partial update returned by a stage.
///
/// The SQL outcome is carried as a single [`QueryOutcome`] so that
/// `sql_result` and `sql_error` can never both be set after a merge —
/// the mutual exclusion holds by construction.
#[derive(Debug, Default)]
pub struct ContextUpdate {
    pub intent: Option<Intent>,
    pub mapped_question: Option<String>,
    pub potential_entities: Option<String>,
    pub generated_sql: Option<String>,
    pub sql_outcome: Option<QueryOutcome>,
    pub reset_error_count: bool,
    pub final_answer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_preserves_unrelated_fields() {
        let mut ctx = AnalystContext::new("total revenue?");
        ctx.apply(ContextUpdate {
            mapped_question: Some("total Revenue for Acme Corp?".into()),
            potential_entities: Some("Company_Name: Acme Corp".into()),
            ..Default::default()
        });
        ctx.apply(ContextUpdate {
            generated_sql: Some("SELECT 1".into()),
            ..Default::default()
        });

        assert_eq!(ctx.question, "total revenue?");
        assert_eq!(ctx.mapped_question, "total Revenue for Acme Corp?");
        assert_eq!(ctx.potential_entities, "Company_Name: Acme Corp");
        assert_eq!(ctx.generated_sql, "SELECT 1");
    }

    #[test]
    fn test_sql_outcome_exclusivity() {
        let mut ctx = AnalystContext::new("q");
        ctx.apply(ContextUpdate {
            sql_outcome: Some(QueryOutcome::SqlError("no such column".into())),
            ..Default::default()
        });
        assert!(ctx.sql_result.is_none());
        assert_eq!(ctx.sql_error.as_deref(), Some("no such column"));
        assert_eq!(ctx.error_count, 1);

        ctx.apply(ContextUpdate {
            sql_outcome: Some(QueryOutcome::Rows(vec![])),
            ..Default::default()
        });
        assert!(ctx.sql_result.is_some());
        assert!(ctx.sql_error.is_none());
        // Success does not touch the counter
        assert_eq!(ctx.error_count, 1);
    }

    #[test]
    fn test_error_count_monotone_then_reset() {
        let mut ctx = AnalystContext::new("q");
        for expected in 1..=3 {
            ctx.apply(ContextUpdate {
                sql_outcome: Some(QueryOutcome::SqlError("boom".into())),
                ..Default::default()
            });
            assert_eq!(ctx.error_count, expected);
        }

        ctx.apply(ContextUpdate {
            reset_error_count: true,
            ..Default::default()
        });
        assert_eq!(ctx.error_count, 0);
    }

    #[test]
    fn test_generated_sql_last_write_wins() {
        let mut ctx = AnalystContext::new("q");
        ctx.apply(ContextUpdate {
            generated_sql: Some("SELECT broken".into()),
            ..Default::default()
        });
        ctx.apply(ContextUpdate {
            generated_sql: Some("SELECT fixed".into()),
            ..Default::default()
        });
        assert_eq!(ctx.generated_sql, "SELECT fixed");
    }
}
