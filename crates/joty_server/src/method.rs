//! Method bridge.
//!
//! A statement naming a method runs a registered handler instead of SQL.
//! Handlers are registered by name with their argument shape at startup;
//! calls are checked against that shape before the handler runs.
//!
//! # Invariants
//!
//! - A declared first out position equals the number of values already
//!   returned by the batch plus one
//! - On success the outs are appended in order, then the return value if
//!   one is expected
//! - A failing or panicking handler is a batch failure, never a crash

use crate::db::Connection;
use crate::error::{ServerError, ServerResult};
use joty_protocol::{ItemType, ItemValue, ParamContext, PostStatement};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Arguments handed to a method handler.
pub struct MethodCall<'a> {
    /// Typed arguments, one per statement item.
    pub args: &'a [ItemValue],
    /// The batch's parameter context.
    pub params: &'a ParamContext,
    /// The batch's connection.
    pub conn: &'a mut dyn Connection,
}

impl MethodCall<'_> {
    /// Argument `i` as text.
    pub fn text(&self, i: usize) -> Option<String> {
        self.args.get(i).map(ItemValue::literal)
    }

    /// Argument `i` as an integer.
    pub fn long(&self, i: usize) -> Option<i64> {
        match self.args.get(i)? {
            ItemValue::Long(n) => Some(*n),
            _ => None,
        }
    }
}

/// Values produced by a method handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodOutput {
    /// Out-parameter values, in declaration order.
    pub outs: Vec<String>,
    /// The method's own return value.
    pub ret: Option<String>,
}

impl MethodOutput {
    /// No outs and no return value.
    pub fn none() -> Self {
        Self::default()
    }

    /// Only a return value.
    pub fn returning(value: impl Into<String>) -> Self {
        Self {
            outs: Vec::new(),
            ret: Some(value.into()),
        }
    }

    /// Only out values.
    pub fn outs(outs: Vec<String>) -> Self {
        Self { outs, ret: None }
    }
}

/// A method handler.
pub type MethodHandler =
    Arc<dyn Fn(&mut MethodCall<'_>) -> Result<MethodOutput, String> + Send + Sync>;

/// A registered method.
#[derive(Clone)]
pub struct MethodSpec {
    /// Expected item types, in order.
    pub arg_types: Vec<ItemType>,
    /// Number of out-parameters the handler fills.
    pub out_count: u32,
    /// Whether the handler returns a value.
    pub returns_value: bool,
    handler: MethodHandler,
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("arg_types", &self.arg_types)
            .field("out_count", &self.out_count)
            .field("returns_value", &self.returns_value)
            .finish_non_exhaustive()
    }
}

impl MethodSpec {
    /// Creates a spec with no outs and no return value.
    pub fn new<F>(arg_types: Vec<ItemType>, handler: F) -> Self
    where
        F: Fn(&mut MethodCall<'_>) -> Result<MethodOutput, String> + Send + Sync + 'static,
    {
        Self {
            arg_types,
            out_count: 0,
            returns_value: false,
            handler: Arc::new(handler),
        }
    }

    /// Declares `count` out-parameters.
    pub fn with_outs(mut self, count: u32) -> Self {
        self.out_count = count;
        self
    }

    /// Declares a return value.
    pub fn returning(mut self) -> Self {
        self.returns_value = true;
        self
    }
}

/// Registry of callable methods, built at startup.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodSpec>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method. Names are unique.
    pub fn register(&mut self, name: impl Into<String>, spec: MethodSpec) -> ServerResult<()> {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(ServerError::Method(format!("{name} registered twice")));
        }
        self.methods.insert(name, spec);
        Ok(())
    }

    /// Registers a method, builder style.
    pub fn with(mut self, name: impl Into<String>, spec: MethodSpec) -> ServerResult<Self> {
        self.register(name, spec)?;
        Ok(self)
    }

    /// Looks a method up.
    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Runs the method a statement names and appends its results to
    /// `returned`.
    pub fn invoke(
        &self,
        stmt: &PostStatement,
        params: &ParamContext,
        conn: &mut dyn Connection,
        returned: &mut Vec<String>,
    ) -> ServerResult<()> {
        let result = self.try_invoke(stmt, params, conn, returned);
        if let Err(err) = &result {
            error!(method = %stmt.method, error = %err, "method call failed");
        }
        result
    }

    fn try_invoke(
        &self,
        stmt: &PostStatement,
        params: &ParamContext,
        conn: &mut dyn Connection,
        returned: &mut Vec<String>,
    ) -> ServerResult<()> {
        let name = stmt.method.as_str();
        let spec = self
            .get(name)
            .ok_or_else(|| ServerError::Method(format!("unknown method {name}")))?;

        let args = stmt
            .items
            .iter()
            .map(|item| item.value())
            .collect::<Result<Vec<_>, _>>()?;
        let found: Vec<ItemType> = args.iter().map(ItemValue::item_type).collect();
        if found != spec.arg_types {
            return Err(ServerError::Method(format!(
                "{name} takes {:?}, called with {found:?}",
                spec.arg_types
            )));
        }

        let declared = stmt.out_params.unwrap_or_default();
        if declared.count != spec.out_count {
            return Err(ServerError::Method(format!(
                "{name} fills {} out-parameters, {} declared",
                spec.out_count, declared.count
            )));
        }
        if declared.method_return_expected && !spec.returns_value {
            return Err(ServerError::Method(format!("{name} returns no value")));
        }
        if let Some(first) = declared.first_pos {
            let next = returned.len() + 1;
            if first as usize != next {
                return Err(ServerError::Method(format!(
                    "{name} expected to write at position {first}, next position is {next}"
                )));
            }
        }

        debug!(method = name, args = args.len(), "invoking method");
        let mut call = MethodCall {
            args: &args,
            params,
            conn,
        };
        let output = catch_unwind(AssertUnwindSafe(|| (spec.handler)(&mut call)))
            .map_err(|_| ServerError::Method(format!("{name} panicked")))?
            .map_err(|msg| ServerError::Method(format!("{name}: {msg}")))?;

        if output.outs.len() != declared.count as usize {
            return Err(ServerError::Method(format!(
                "{name} produced {} out values, {} declared",
                output.outs.len(),
                declared.count
            )));
        }
        if output.ret.is_some() != declared.method_return_expected {
            let state = if declared.method_return_expected {
                "expected but missing"
            } else {
                "present but not expected"
            };
            return Err(ServerError::Method(format!("{name}: return value {state}")));
        }

        returned.extend(output.outs);
        returned.extend(output.ret);
        Ok(())
    }
}
