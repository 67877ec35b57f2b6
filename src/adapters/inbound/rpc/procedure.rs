use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Deserializer};
use serde_json::{Map as JsonMap, Value};
use std::{collections::BTreeMap, future::Future, sync::Arc};
use tracing::{debug, error};
use validator::{Validate, ValidationErrors};

use super::{
    error::{ProcedureError, RpcErrorCode},
    transformer::RichValue,
};

/// Whether a procedure reads (`GET`) or writes (`POST`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProcedureKind {
    Query,
    Mutation,
}

pub type ProcedureResult = Result<RichValue, ProcedureError>;

type Handler<C> = Arc<dyn Fn(C, RichValue) -> BoxFuture<'static, ProcedureResult> + Send + Sync>;

struct Procedure<C> {
    kind: ProcedureKind,
    handler: Handler<C>,
}

impl<C> Clone for Procedure<C> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Input type for procedures that take no arguments; accepts anything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInput;

impl<'de> Deserialize<'de> for NoInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(NoInput)
    }
}

impl Validate for NoInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Decode a transformer value into a validated procedure input
pub fn decode_input<I>(input: RichValue) -> Result<I, ProcedureError>
where
    I: DeserializeOwned + Validate,
{
    let json = match input.into_plain_json() {
        Value::Null => Value::Object(JsonMap::new()),
        other => other,
    };
    let input: I = serde_json::from_value(json)?;
    input.validate()?;
    Ok(input)
}

/// Procedures keyed by dotted path (`user.byEmail`)
pub struct ProcedureRouter<C> {
    procedures: BTreeMap<String, Procedure<C>>,
}

impl<C> Default for ProcedureRouter<C> {
    fn default() -> Self {
        Self {
            procedures: BTreeMap::new(),
        }
    }
}

impl<C> std::fmt::Debug for ProcedureRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.procedures.iter().map(|(path, p)| (path, p.kind)))
            .finish()
    }
}

impl<C: Send + 'static> ProcedureRouter<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query<I, F, Fut>(self, path: &str, handler: F) -> Self
    where
        I: DeserializeOwned + Validate + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult> + Send + 'static,
    {
        self.register(path, ProcedureKind::Query, handler)
    }

    pub fn mutation<I, F, Fut>(self, path: &str, handler: F) -> Self
    where
        I: DeserializeOwned + Validate + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult> + Send + 'static,
    {
        self.register(path, ProcedureKind::Mutation, handler)
    }

    fn register<I, F, Fut>(mut self, path: &str, kind: ProcedureKind, handler: F) -> Self
    where
        I: DeserializeOwned + Validate + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler<C> = Arc::new(
            move |ctx: C, input: RichValue| -> BoxFuture<'static, ProcedureResult> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let input = decode_input::<I>(input)?;
                    handler(ctx, input).await
                })
            },
        );

        self.procedures.insert(
            path.to_string(),
            Procedure {
                kind,
                handler: erased,
            },
        );
        self
    }

    /// Mount every procedure of `other` under `prefix.`
    pub fn merge(mut self, prefix: &str, other: ProcedureRouter<C>) -> Self {
        for (path, procedure) in other.procedures {
            let path = if prefix.is_empty() {
                path
            } else {
                format!("{}.{}", prefix, path)
            };
            self.procedures.insert(path, procedure);
        }
        self
    }

    pub fn kind(&self, path: &str) -> Option<ProcedureKind> {
        self.procedures.get(path).map(|p| p.kind)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    /// Dispatch one call
    ///
    /// Unknown paths fail with `NOT_FOUND`; calling a query as a mutation (or
    /// the reverse) fails with `METHOD_NOT_SUPPORTED`.
    pub async fn call(
        &self,
        path: &str,
        kind: ProcedureKind,
        ctx: C,
        input: RichValue,
    ) -> ProcedureResult {
        let procedure = self.procedures.get(path).cloned().ok_or_else(|| {
            ProcedureError::not_found(format!("No procedure found on path \"{}\"", path))
        })?;

        if procedure.kind != kind {
            return Err(ProcedureError::new(
                RpcErrorCode::MethodNotSupported,
                format!(
                    "Unsupported {} call to {} procedure \"{}\"",
                    kind, procedure.kind, path
                ),
            ));
        }

        debug!(path = %path, kind = %kind, "Calling procedure");
        let result = (procedure.handler)(ctx, input).await;

        if let Err(err) = &result {
            if err.code == RpcErrorCode::InternalServerError {
                error!(path = %path, error = %err, "Procedure failed");
            } else {
                debug!(path = %path, code = %err.code, "Procedure rejected call");
            }
        }
        result
    }
}
