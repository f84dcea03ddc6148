use crate::types::{Output, ParamType, Params, Slot};
use serde::Serialize;
use thiserror::Error;

/// Which outputs an operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    None,
    Value,
    Error,
    ValueAndError,
}

impl OutputKind {
    /// Classifies an ordered list of output slots.
    ///
    /// At most one value followed by at most one error is accepted.
    pub fn classify(slots: &[Slot]) -> Result<Self, SignatureError> {
        match slots {
            [] => Ok(Self::None),
            [Slot::Error] => Ok(Self::Error),
            [Slot::Value(_)] => Ok(Self::Value),
            [Slot::Value(_), Slot::Error] => Ok(Self::ValueAndError),
            [Slot::Error, Slot::Error] => Err(SignatureError::MultipleErrors),
            [_, Slot::Value(name)] => Err(SignatureError::SecondOutputNotError(*name)),
            _ => Err(SignatureError::TooManyOutputs(slots.len())),
        }
    }

    pub fn has_value(self) -> bool {
        matches!(self, Self::Value | Self::ValueAndError)
    }

    pub fn has_error(self) -> bool {
        matches!(self, Self::Error | Self::ValueAndError)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("too many outputs: {0}")]
    TooManyOutputs(usize),

    #[error("expected error as second output, found {0}")]
    SecondOutputNotError(&'static str),

    #[error("more than one error output")]
    MultipleErrors,
}

/// The bind-time shape of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub has_context: bool,
    pub params: Vec<ParamType>,
    pub output: OutputKind,
}

impl Signature {
    pub fn new(
        has_context: bool,
        params: Vec<ParamType>,
        outputs: &[Slot],
    ) -> Result<Self, SignatureError> {
        Ok(Self {
            has_context,
            params,
            output: OutputKind::classify(outputs)?,
        })
    }

    /// Derives the signature from the parameter tuple and output types.
    pub fn of<P: Params, O: Output>(has_context: bool) -> Result<Self, SignatureError> {
        Self::new(has_context, P::param_types(), &O::output_slots())
    }
}
