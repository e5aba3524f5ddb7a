//! Service descriptors and functions.
//!
//! A [`ServiceDescriptor`] pairs a [`ServiceIdentifier`] with its callable
//! [`ServiceFunction`]s. Descriptors are assembled with an explicit builder;
//! each function closure captures the service instance it calls into.
//!
//! ## Parameters
//!
//! Arguments arrive as a positional JSON array. A [`Param::Caller`] slot is
//! never read from the payload: the runtime fills it with the calling
//! [`Participant`] (or `null` when the sender is unknown).
//!
//! ## Results
//!
//! Every function produces a [`FunctionOutput`]: a single value or a stream
//! of values. Synchronous, asynchronous and streaming closures all map onto
//! it through [`ServiceFunction::blocking`], [`ServiceFunction::unary`] and
//! [`ServiceFunction::streaming`].

use crate::domain::identifier::ServiceIdentifier;
use crate::error::DescriptorError;
use continuum_types::Participant;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type returned by service code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stream of results produced by a streaming function.
pub type ValueStream = BoxStream<'static, Result<Value, BoxError>>;

type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<FunctionOutput, BoxError>> + Send + Sync>;

/// Declared kind of one positional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Read from the request payload.
    Value,
    /// Supplied by the runtime with the calling participant.
    Caller,
}

/// What a function invocation produced.
pub enum FunctionOutput {
    Value(Value),
    Stream(ValueStream),
}

impl fmt::Debug for FunctionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A named, invocable operation of a service.
#[derive(Clone)]
pub struct ServiceFunction {
    name: String,
    params: Vec<Param>,
    handler: Handler,
}

impl ServiceFunction {
    /// Function over raw resolved arguments.
    pub fn new<F, Fut>(name: impl Into<String>, params: impl IntoIterator<Item = Param>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FunctionOutput, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }

    /// Asynchronous function returning one value.
    pub fn unary<F, Fut, T, E>(name: impl Into<String>, params: impl IntoIterator<Item = Param>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(name, params, move |args| {
            let fut = f(args);
            async move {
                let value = fut.await.map_err(Into::<BoxError>::into)?;
                Ok(FunctionOutput::Value(serde_json::to_value(value)?))
            }
        })
    }

    /// Synchronous function returning one value.
    pub fn blocking<F, T, E>(name: impl Into<String>, params: impl IntoIterator<Item = Param>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(name, params, move |args| {
            let result: Result<FunctionOutput, BoxError> = f(args)
                .map_err(Into::<BoxError>::into)
                .and_then(|value| serde_json::to_value(value).map_err(Into::<BoxError>::into))
                .map(FunctionOutput::Value);
            futures::future::ready(result)
        })
    }

    /// Function returning a stream of values.
    pub fn streaming<F, S, T, E>(name: impl Into<String>, params: impl IntoIterator<Item = Param>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(name, params, move |args| {
            let stream = f(args)
                .map(|item| {
                    item.map_err(Into::<BoxError>::into)
                        .and_then(|value| serde_json::to_value(value).map_err(Into::<BoxError>::into))
                })
                .boxed();
            futures::future::ready(Ok(FunctionOutput::Stream(stream)))
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Number of arguments read from the payload.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.iter().filter(|p| **p == Param::Value).count()
    }

    /// Merge payload arguments with runtime-supplied caller slots.
    ///
    /// Returns `None` when the payload count does not match [`arity`](Self::arity).
    #[must_use]
    pub fn resolve_args(&self, payload: Vec<Value>, caller: Option<&Participant>) -> Option<Vec<Value>> {
        if payload.len() != self.arity() {
            return None;
        }
        let caller = caller
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or(Value::Null);
        let mut payload = payload.into_iter();
        self.params
            .iter()
            .map(|param| match param {
                Param::Value => payload.next(),
                Param::Caller => Some(caller.clone()),
            })
            .collect()
    }

    /// Invoke with fully resolved arguments.
    pub fn invoke(&self, args: Vec<Value>) -> BoxFuture<'static, Result<FunctionOutput, BoxError>> {
        (self.handler)(args)
    }
}

impl fmt::Debug for ServiceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Decode positional argument `index` into `T`.
///
/// # Errors
///
/// Fails when the argument is missing or has the wrong shape.
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, BoxError> {
    let value = args
        .get(index)
        .ok_or_else(|| format!("missing argument {index}"))?;
    Ok(serde_json::from_value(value.clone())?)
}

/// Identifier plus its functions. Immutable once built.
#[derive(Clone)]
pub struct ServiceDescriptor {
    identifier: ServiceIdentifier,
    functions: BTreeMap<String, ServiceFunction>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn builder(identifier: ServiceIdentifier) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            identifier,
            functions: Vec::new(),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&ServiceFunction> {
        self.functions.get(name)
    }

    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("identifier", &self.identifier.cri().raw())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ServiceDescriptor`].
pub struct ServiceDescriptorBuilder {
    identifier: ServiceIdentifier,
    functions: Vec<ServiceFunction>,
}

impl ServiceDescriptorBuilder {
    #[must_use]
    pub fn function(mut self, function: ServiceFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::BlankFunctionName`] for a blank name.
    /// - [`DescriptorError::Identifier`] when a name cannot be a single CRI path segment.
    /// - [`DescriptorError::DuplicateFunction`] when two functions share a name.
    pub fn build(self) -> Result<ServiceDescriptor, DescriptorError> {
        let service = self.identifier.to_string();
        let mut functions = BTreeMap::new();

        for function in self.functions {
            if function.name.trim().is_empty() {
                return Err(DescriptorError::BlankFunctionName { service });
            }
            if function.name.contains('/') {
                return Err(DescriptorError::Identifier(continuum_types::CriError::Malformed {
                    raw: format!("{service}/{}", function.name),
                    reason: "function name must be a single path segment".to_string(),
                }));
            }
            self.identifier.function_cri(&function.name)?;

            if functions.contains_key(&function.name) {
                return Err(DescriptorError::DuplicateFunction {
                    service,
                    function: function.name,
                });
            }
            functions.insert(function.name.clone(), function);
        }

        Ok(ServiceDescriptor {
            identifier: self.identifier,
            functions,
        })
    }
}
