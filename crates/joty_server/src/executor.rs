//! Batch executor for `trans` and `exec`.
//!
//! Statements run one at a time, in submission order, on one connection.
//!
//! # Invariants
//!
//! - The forward pass stops at the first failing statement; nothing after
//!   it is attempted
//! - A statement tagged `Compensation(k)` never runs in the forward pass. It
//!   runs once, after the forward pass, only if the batch failed and some
//!   statement tagged `Forward(k)` had succeeded
//! - `'<GenIDn>'` in a statement is replaced by the n-th value returned so
//!   far in the batch
//! - The connection is released whatever the outcome

use crate::db::{Connection, ConnectionProvider};
use crate::error::{ServerError, ServerResult};
use crate::method::MethodRegistry;
use crate::validator::Validator;
use joty_protocol::{substitute_gen_ids, ParamContext, PostStatement, RollbackTag};
use joty_resolver::Accessor;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Generated ids and method results, in the order produced.
    pub returned: Vec<String>,
    /// Indices of statements that ran successfully in the forward pass.
    pub executed: Vec<usize>,
    /// Indices of compensation statements that ran.
    pub compensated: Vec<usize>,
    /// The failure that stopped the batch.
    pub failure: Option<ServerError>,
}

impl BatchOutcome {
    /// Returns true if every statement succeeded.
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    /// Converts into the returned values or the failure.
    pub fn into_result(self) -> ServerResult<Vec<String>> {
        match self.failure {
            None => Ok(self.returned),
            Some(err) => Err(err),
        }
    }
}

/// Runs statement batches.
pub struct BatchExecutor<'a> {
    accessor: &'a Accessor,
    methods: &'a MethodRegistry,
    validator: Option<&'a dyn Validator>,
    allow_literal_sql: bool,
}

impl<'a> BatchExecutor<'a> {
    /// Creates an executor over a catalog and a method registry.
    pub fn new(accessor: &'a Accessor, methods: &'a MethodRegistry) -> Self {
        Self {
            accessor,
            methods,
            validator: None,
            allow_literal_sql: true,
        }
    }

    /// Sets the validator for verify expressions.
    pub fn with_validator(mut self, validator: Option<&'a dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Sets whether SQL outside the catalog may run.
    pub fn with_literal_sql(mut self, allow: bool) -> Self {
        self.allow_literal_sql = allow;
        self
    }

    /// Runs a batch. With `transactional` set the batch is committed on
    /// success and rolled back on failure; otherwise each statement stands
    /// on its own.
    pub fn execute(
        &self,
        provider: &dyn ConnectionProvider,
        transactional: bool,
        statements: &[PostStatement],
        binaries: &[Vec<u8>],
        params: &mut ParamContext,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut conn = match provider.acquire() {
            Ok(conn) => conn,
            Err(err) => {
                outcome.failure = Some(err.into());
                return outcome;
            }
        };
        if transactional {
            if let Err(err) = conn.begin() {
                outcome.failure = Some(err.into());
                return outcome;
            }
        }

        let mut succeeded_tags = BTreeSet::new();
        for (index, stmt) in statements.iter().enumerate() {
            if !stmt.rollback.runs_forward() {
                continue;
            }
            match self.run_statement(conn.as_mut(), stmt, binaries, params, &mut outcome.returned) {
                Ok(()) => {
                    outcome.executed.push(index);
                    if let RollbackTag::Forward(k) = stmt.rollback {
                        succeeded_tags.insert(k);
                    }
                }
                Err(err) => {
                    warn!(index, error = %err, "statement failed, batch stopped");
                    outcome.failure = Some(err);
                    break;
                }
            }
        }

        if outcome.failure.is_some() && !succeeded_tags.is_empty() {
            self.compensate(
                conn.as_mut(),
                statements,
                binaries,
                params,
                &succeeded_tags,
                &mut outcome,
            );
        }

        if transactional {
            if outcome.failure.is_none() {
                if let Err(err) = conn.commit() {
                    outcome.failure = Some(err.into());
                }
            }
            if outcome.failure.is_some() {
                if let Err(err) = conn.rollback() {
                    warn!(error = %err, "rollback failed");
                }
            }
        }
        info!(
            statements = statements.len(),
            executed = outcome.executed.len(),
            compensated = outcome.compensated.len(),
            ok = outcome.is_ok(),
            "batch finished"
        );
        outcome
    }

    fn compensate(
        &self,
        conn: &mut dyn Connection,
        statements: &[PostStatement],
        binaries: &[Vec<u8>],
        params: &mut ParamContext,
        succeeded_tags: &BTreeSet<u32>,
        outcome: &mut BatchOutcome,
    ) {
        // Compensation results are not part of the batch's returned values.
        let mut scratch = outcome.returned.clone();
        for (index, stmt) in statements.iter().enumerate() {
            let RollbackTag::Compensation(k) = stmt.rollback else {
                continue;
            };
            if !succeeded_tags.contains(&k) {
                continue;
            }
            debug!(index, tag = k, "compensating");
            match self.run_statement(conn, stmt, binaries, params, &mut scratch) {
                Ok(()) => outcome.compensated.push(index),
                Err(err) => warn!(index, tag = k, error = %err, "compensation failed"),
            }
        }
    }

    fn run_statement(
        &self,
        conn: &mut dyn Connection,
        stmt: &PostStatement,
        binaries: &[Vec<u8>],
        params: &mut ParamContext,
        returned: &mut Vec<String>,
    ) -> ServerResult<()> {
        params.bind_items(&stmt.items);
        if self.is_method_call(stmt) {
            return self.methods.invoke(stmt, params, conn, returned);
        }

        let sql = self.resolve(stmt, params)?;
        let sql = substitute_gen_ids(&sql, returned)?;
        debug!(sql = %sql, "statement");

        if !stmt.auto_id_field.is_empty() {
            let id = if stmt.gen_table.is_empty() {
                conn.insert_returning_key(&sql, binaries)?
            } else {
                conn.execute(&sql, binaries)?;
                conn.fetch_generated_id(&stmt.gen_table, &stmt.auto_id_field)?
            };
            match id.parse::<i64>() {
                Ok(n) => params.set_num(&stmt.auto_id_field, n),
                Err(_) => params.set_str(&stmt.auto_id_field, id.clone()),
            }
            returned.push(id);
            return Ok(());
        }

        if !stmt.verify_expr.is_empty() {
            self.validate(conn, stmt, params, returned)?;
        }
        conn.execute(&sql, binaries)?;
        Ok(())
    }

    /// A method name selects a catalog definition when no method of that
    /// name is registered; otherwise it is a method call.
    fn is_method_call(&self, stmt: &PostStatement) -> bool {
        stmt.is_method_call()
            && (self.methods.get(&stmt.method).is_some()
                || self.accessor.statement_def(&stmt.method).is_none())
    }

    fn resolve(&self, stmt: &PostStatement, params: &ParamContext) -> ServerResult<String> {
        let resolved = self
            .accessor
            .resolve_detailed(stmt, params)?
            .ok_or_else(|| ServerError::Unresolved(describe(stmt)))?;
        if resolved.def.is_none() && !self.allow_literal_sql {
            return Err(ServerError::Unresolved(describe(stmt)));
        }
        Ok(resolved.sql)
    }

    fn validate(
        &self,
        conn: &mut dyn Connection,
        stmt: &PostStatement,
        params: &ParamContext,
        returned: &[String],
    ) -> ServerResult<()> {
        let Some(validator) = self.validator else {
            debug!(expr = %stmt.verify_expr, "no validator configured, skipping");
            return Ok(());
        };
        let check = PostStatement::sql(stmt.verify_expr.clone());
        let expr = self.resolve(&check, params)?;
        let expr = substitute_gen_ids(&expr, returned)?;
        validator
            .validate(&expr, conn)
            .map_err(ServerError::Validation)
    }
}

fn describe(stmt: &PostStatement) -> String {
    if stmt.has_coordinates() {
        format!(
            "{}[{}] {} {}",
            stmt.access_context, stmt.panel_index, stmt.term_name, stmt.sql
        )
    } else {
        stmt.sql.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use crate::memory::{single_column, MemoryEvent, MemoryProvider};
    use crate::method::{MethodOutput, MethodSpec};
    use crate::validator::EmptyResultValidator;
    use joty_resolver::DataDef;
    use joty_protocol::{Item, ItemType, OutParams};
    use proptest::prelude::*;

    fn run(
        provider: &MemoryProvider,
        transactional: bool,
        statements: &[PostStatement],
    ) -> BatchOutcome {
        let accessor = Accessor::builder().build().unwrap();
        let methods = MethodRegistry::new();
        let mut params = ParamContext::new();
        BatchExecutor::new(&accessor, &methods).execute(
            provider,
            transactional,
            statements,
            &[],
            &mut params,
        )
    }

    #[test]
    fn generated_ids_propagate() {
        let provider = MemoryProvider::starting_at(7);
        let batch = vec![
            PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("ID"),
            PostStatement::sql("INSERT INTO t2(tid) VALUES('<GenID1>')"),
        ];
        let outcome = run(&provider, true, &batch);
        assert!(outcome.is_ok());
        assert_eq!(outcome.returned, vec!["7"]);
        assert_eq!(
            provider.executed(),
            vec![
                "INSERT INTO t(name) VALUES('a')",
                "INSERT INTO t2(tid) VALUES(7)"
            ]
        );
        assert_eq!(provider.events().last(), Some(&MemoryEvent::Release));
        assert!(provider.events().contains(&MemoryEvent::Commit));
    }

    #[test]
    fn gen_table_path_fetches_the_id() {
        let provider = MemoryProvider::starting_at(40);
        let batch = vec![PostStatement::sql("INSERT INTO t(name) VALUES('a')")
            .with_auto_id("id")
            .with_gen_table("t")];
        let outcome = run(&provider, false, &batch);
        assert_eq!(outcome.returned, vec!["40"]);
        assert!(provider
            .events()
            .contains(&MemoryEvent::Query("generated t.id".into())));
    }

    #[test]
    fn failure_stops_and_compensates() {
        let provider = MemoryProvider::new();
        provider.fail_on("fails", DbError::new("no such table: fails", 1));
        let batch = vec![
            PostStatement::sql("CREATE LOGIN ann").with_rollback(RollbackTag::Forward(1)),
            PostStatement::sql("INSERT INTO fails VALUES(1)"),
            PostStatement::sql("DROP LOGIN ann").with_rollback(RollbackTag::Compensation(1)),
            PostStatement::sql("INSERT INTO never VALUES(1)"),
        ];
        let outcome = run(&provider, true, &batch);
        assert!(!outcome.is_ok());
        assert_eq!(outcome.executed, vec![0]);
        assert_eq!(outcome.compensated, vec![2]);
        assert_eq!(
            provider.executed(),
            vec![
                "CREATE LOGIN ann",
                "INSERT INTO fails VALUES(1)",
                "DROP LOGIN ann"
            ]
        );
        let events = provider.events();
        assert!(events.contains(&MemoryEvent::Rollback));
        assert!(!events.contains(&MemoryEvent::Commit));
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.reason(), ("no such table: fails".to_string(), Some(1)));
    }

    #[test]
    fn compensation_skipped_on_success() {
        let provider = MemoryProvider::new();
        let batch = vec![
            PostStatement::sql("CREATE LOGIN ann").with_rollback(RollbackTag::Forward(1)),
            PostStatement::sql("DROP LOGIN ann").with_rollback(RollbackTag::Compensation(1)),
        ];
        let outcome = run(&provider, true, &batch);
        assert!(outcome.is_ok());
        assert_eq!(provider.executed(), vec!["CREATE LOGIN ann"]);
    }

    #[test]
    fn compensation_requires_successful_forward() {
        let provider = MemoryProvider::new();
        provider.fail_on("CREATE LOGIN", DbError::message("denied"));
        let batch = vec![
            PostStatement::sql("CREATE LOGIN ann").with_rollback(RollbackTag::Forward(1)),
            PostStatement::sql("DROP LOGIN ann").with_rollback(RollbackTag::Compensation(1)),
        ];
        let outcome = run(&provider, true, &batch);
        assert!(outcome.compensated.is_empty());
        assert_eq!(provider.executed(), vec!["CREATE LOGIN ann"]);
    }

    #[test]
    fn compensation_failure_keeps_original_error() {
        let provider = MemoryProvider::new();
        provider.fail_on("boom", DbError::new("boom", 19));
        provider.fail_on("DROP", DbError::new("cannot drop", 5));
        let batch = vec![
            PostStatement::sql("CREATE LOGIN ann").with_rollback(RollbackTag::Forward(2)),
            PostStatement::sql("boom"),
            PostStatement::sql("DROP LOGIN ann").with_rollback(RollbackTag::Compensation(2)),
        ];
        let err = run(&provider, true, &batch).into_result().unwrap_err();
        assert_eq!(err.reason().1, Some(19));
    }

    #[test]
    fn exec_does_not_open_a_transaction() {
        let provider = MemoryProvider::new();
        let outcome = run(&provider, false, &[PostStatement::sql("UPDATE t SET a = 1")]);
        assert!(outcome.is_ok());
        let events = provider.events();
        assert!(!events.contains(&MemoryEvent::Begin));
        assert!(!events.contains(&MemoryEvent::Commit));
    }

    #[test]
    fn unavailable_database() {
        let provider = MemoryProvider::new();
        provider.set_unavailable(Some(DbError::new("unable to open database file", 14)));
        let err = run(&provider, true, &[PostStatement::sql("SELECT 1")])
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ServerError::Database(_)));
    }

    #[test]
    fn methods_and_ids_share_the_returned_list() {
        let provider = MemoryProvider::starting_at(5);
        let accessor = Accessor::builder().build().unwrap();
        let methods = MethodRegistry::new()
            .with(
                "double",
                MethodSpec::new(vec![ItemType::Long], |call| {
                    Ok(MethodOutput::returning((call.long(0).unwrap_or(0) * 2).to_string()))
                })
                .returning(),
            )
            .unwrap();
        let mut call = PostStatement::new().with_item(Item::long("n", 21));
        call.set_method("double", Some(OutParams::new(2, 0).with_return()));
        let batch = vec![
            PostStatement::sql("INSERT INTO t VALUES(1)").with_auto_id("id"),
            call,
            PostStatement::sql("UPDATE t SET a = '<GenID2>' WHERE id = '<GenID1>'"),
        ];
        let mut params = ParamContext::new();
        let outcome = BatchExecutor::new(&accessor, &methods).execute(
            &provider,
            true,
            &batch,
            &[],
            &mut params,
        );
        assert_eq!(outcome.returned, vec!["5", "42"]);
        assert_eq!(params.get("id"), "5");
        assert_eq!(provider.executed()[1], "UPDATE t SET a = 42 WHERE id = 5");
    }

    #[test]
    fn method_name_can_select_a_definition() {
        let provider = MemoryProvider::new();
        let accessor = Accessor::builder()
            .statement(DataDef::literal("customers", "customers").with_updatable_set("customers"))
            .build()
            .unwrap();
        let methods = MethodRegistry::new();
        let mut stmt = PostStatement::sql("DELETE FROM <JOTY_CTX> WHERE id = 3");
        stmt.set_method("customers", None);
        let outcome = BatchExecutor::new(&accessor, &methods).execute(
            &provider,
            true,
            &[stmt],
            &[],
            &mut ParamContext::new(),
        );
        assert!(outcome.is_ok());
        assert_eq!(provider.executed(), vec!["DELETE FROM customers WHERE id = 3"]);
    }

    #[test]
    fn validator_rejects_conflicts() {
        let provider = MemoryProvider::new();
        provider.with_rows("name = 'dup'", single_column("id", &["1"]));
        let accessor = Accessor::builder().build().unwrap();
        let methods = MethodRegistry::new();
        let validator = EmptyResultValidator;
        let batch = vec![PostStatement::sql("INSERT INTO t(name) VALUES('dup')")
            .with_verify("SELECT id FROM t WHERE name = 'dup'")];
        let outcome = BatchExecutor::new(&accessor, &methods)
            .with_validator(Some(&validator))
            .execute(&provider, true, &batch, &[], &mut ParamContext::new());
        assert!(matches!(outcome.failure, Some(ServerError::Validation(_))));
        assert!(provider.executed().is_empty());
    }

    #[test]
    fn catalog_only_rejects_literal_sql() {
        let provider = MemoryProvider::new();
        let accessor = Accessor::builder().build().unwrap();
        let methods = MethodRegistry::new();
        let outcome = BatchExecutor::new(&accessor, &methods)
            .with_literal_sql(false)
            .execute(
                &provider,
                true,
                &[PostStatement::sql("DELETE FROM t")],
                &[],
                &mut ParamContext::new(),
            );
        assert!(matches!(outcome.failure, Some(ServerError::Unresolved(_))));
    }

    #[derive(Debug, Clone)]
    enum Kind {
        Plain,
        Forward(u32),
        Compensation(u32),
    }

    fn kind() -> impl Strategy<Value = Kind> {
        prop_oneof![
            Just(Kind::Plain),
            (1u32..3).prop_map(Kind::Forward),
            (1u32..3).prop_map(Kind::Compensation),
        ]
    }

    proptest! {
        #[test]
        fn compensation_runs_once_in_batch_order(
            kinds in prop::collection::vec(kind(), 1..8),
            fail_at in 0usize..8,
        ) {
            let provider = MemoryProvider::new();
            provider.fail_on("FAIL", DbError::message("fail"));
            let batch: Vec<PostStatement> = kinds
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    let sql = if i == fail_at { format!("FAIL {i}") } else { format!("S {i}") };
                    let tag = match k {
                        Kind::Plain => RollbackTag::None,
                        Kind::Forward(n) => RollbackTag::Forward(*n),
                        Kind::Compensation(n) => RollbackTag::Compensation(*n),
                    };
                    PostStatement::sql(sql).with_rollback(tag)
                })
                .collect();

            let outcome = run(&provider, true, &batch);

            let forward: Vec<usize> = (0..batch.len())
                .filter(|&i| batch[i].rollback.runs_forward())
                .collect();
            let failed_at = forward.iter().copied().find(|&i| i == fail_at);
            let expected_executed: Vec<usize> = forward
                .iter()
                .copied()
                .take_while(|&i| Some(i) != failed_at)
                .collect();
            prop_assert_eq!(&outcome.executed, &expected_executed);
            prop_assert_eq!(outcome.is_ok(), failed_at.is_none());

            let tags: BTreeSet<u32> = expected_executed
                .iter()
                .filter_map(|&i| match batch[i].rollback {
                    RollbackTag::Forward(k) => Some(k),
                    _ => None,
                })
                .collect();
            let expected_comp: Vec<usize> = if failed_at.is_some() {
                (0..batch.len())
                    .filter(|&i| matches!(batch[i].rollback, RollbackTag::Compensation(k) if tags.contains(&k)))
                    .collect()
            } else {
                Vec::new()
            };
            // A compensation statement may itself hit the failure pattern.
            let expected_comp: Vec<usize> =
                expected_comp.into_iter().filter(|&i| i != fail_at).collect();
            prop_assert_eq!(&outcome.compensated, &expected_comp);
        }
    }
}
