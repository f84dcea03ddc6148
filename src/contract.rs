use crate::{
    signature::{Signature, SignatureError},
    types::{Output, Params},
};
use std::{fmt, marker::PhantomData};
use thiserror::Error;

/// One operation of a service contract.
///
/// Declared once (usually as a `const`) and shared by the code that serves the
/// operation and the code that calls it, so both sides agree on its shape.
///
/// ```
/// use quickrpc::Method;
///
/// const ADD: Method<(i64, i64), Result<i64, String>> = Method::with_context("Add");
/// assert_eq!(ADD.name(), "Add");
/// ```
pub struct Method<P, O> {
    name: &'static str,
    has_context: bool,
    _marker: PhantomData<fn(P) -> O>,
}

impl<P, O> Method<P, O> {
    /// An operation whose handler does not take the request context.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            has_context: false,
            _marker: PhantomData,
        }
    }

    /// An operation whose handler receives the request context first.
    pub const fn with_context(name: &'static str) -> Self {
        Self {
            name,
            has_context: true,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_context(&self) -> bool {
        self.has_context
    }
}

impl<P, O> Method<P, O>
where
    P: Params,
    O: Output,
{
    /// Validates the name and builds the signature. Runs once at bind time.
    pub(crate) fn bind(&self, namespace: &str) -> Result<(String, Signature), BindError> {
        for part in [namespace, self.name] {
            if part.is_empty() || part.contains('.') {
                return Err(BindError::InvalidName(part.to_owned()));
            }
        }
        let qualified = format!("{namespace}.{}", self.name);
        let signature =
            Signature::of::<P, O>(self.has_context).map_err(|source| BindError::Signature {
                method: qualified.clone(),
                source,
            })?;
        Ok((qualified, signature))
    }
}

impl<P, O> Clone for Method<P, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, O> Copy for Method<P, O> {}

impl<P, O> fmt::Debug for Method<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("has_context", &self.has_context)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("invalid method or namespace name {0:?}")]
    InvalidName(String),

    #[error("method {0} registered twice")]
    Duplicate(String),

    #[error("method {method}: {source}")]
    Signature {
        method: String,
        #[source]
        source: SignatureError,
    },
}
