use serde::{de::DeserializeOwned, Serialize};
use serde_json::value::RawValue;
use std::{
    any::{type_name, TypeId},
    convert::Infallible,
    fmt,
};
use thiserror::Error;

/// One positional parameter as seen by the wire: its Rust type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamType {
    name: &'static str,
}

impl ParamType {
    pub fn of<T: ?Sized>() -> Self {
        Self {
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An ordered parameter list, encoded and decoded one element at a time.
///
/// Implemented for tuples of up to eight elements. Each element travels as its
/// own JSON value so the receiving side can decode it once the expected type is
/// known and report exactly which position failed.
pub trait Params: Sized + Send + 'static {
    const ARITY: usize;

    fn param_types() -> Vec<ParamType>;
    fn encode(&self) -> Result<Vec<Box<RawValue>>, ParamError>;
    fn decode(raw: &[Box<RawValue>]) -> Result<Self, ParamError>;
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("wrong param count: expected {expected}, got {got}")]
    Count { expected: usize, got: usize },

    #[error("param {index}: {source}")]
    Codec {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn encode_param<T: Serialize>(index: usize, value: &T) -> Result<Box<RawValue>, ParamError> {
    serde_json::value::to_raw_value(value).map_err(|source| ParamError::Codec { index, source })
}

fn decode_param<T: DeserializeOwned>(index: usize, raw: &RawValue) -> Result<T, ParamError> {
    serde_json::from_str(raw.get()).map_err(|source| ParamError::Codec { index, source })
}

macro_rules! one {
    ($ty:ident) => {
        1
    };
}

macro_rules! impl_params {
    ($($ty:ident $idx:tt),*) => {
        impl<$($ty),*> Params for ($($ty,)*)
        where
            $($ty: Serialize + DeserializeOwned + Send + 'static,)*
        {
            const ARITY: usize = 0 $(+ one!($ty))*;

            fn param_types() -> Vec<ParamType> {
                vec![$(ParamType::of::<$ty>()),*]
            }

            fn encode(&self) -> Result<Vec<Box<RawValue>>, ParamError> {
                Ok(vec![$(encode_param($idx, &self.$idx)?),*])
            }

            fn decode(raw: &[Box<RawValue>]) -> Result<Self, ParamError> {
                if raw.len() != Self::ARITY {
                    return Err(ParamError::Count {
                        expected: Self::ARITY,
                        got: raw.len(),
                    });
                }
                Ok(($(decode_param::<$ty>($idx, &raw[$idx])?,)*))
            }
        }
    };
}

impl_params!();
impl_params!(A 0);
impl_params!(A 0, B 1);
impl_params!(A 0, B 1, C 2);
impl_params!(A 0, B 1, C 2, D 3);
impl_params!(A 0, B 1, C 2, D 3, E 4);
impl_params!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_params!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_params!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// One output position of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Value(&'static str),
    Error,
}

/// What a handler produces once it finishes.
#[derive(Debug)]
pub struct Reply<T> {
    pub value: Option<T>,
    pub error: Option<String>,
}

/// The output side of an operation.
///
/// `()` has no outputs. `Result<T, E>` has a value slot unless `T` is `()` and
/// an error slot unless `E` is [`Infallible`].
pub trait Output: Send + 'static {
    /// Type the client decodes the `result` field into.
    type Value: Serialize + DeserializeOwned + Send + 'static;

    fn output_slots() -> Vec<Slot>;
    fn into_reply(self) -> Reply<Self::Value>;
}

impl Output for () {
    type Value = ();

    fn output_slots() -> Vec<Slot> {
        Vec::new()
    }

    fn into_reply(self) -> Reply<()> {
        Reply {
            value: None,
            error: None,
        }
    }
}

impl<T, E> Output for Result<T, E>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    type Value = T;

    fn output_slots() -> Vec<Slot> {
        let mut slots = Vec::with_capacity(2);
        if TypeId::of::<T>() != TypeId::of::<()>() {
            slots.push(Slot::Value(type_name::<T>()));
        }
        if TypeId::of::<E>() != TypeId::of::<Infallible>() {
            slots.push(Slot::Error);
        }
        slots
    }

    fn into_reply(self) -> Reply<T> {
        match self {
            Ok(value) => Reply {
                value: Some(value),
                error: None,
            },
            Err(err) => Reply {
                value: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_owned()).unwrap()
    }

    #[test]
    fn params_are_encoded_one_by_one() {
        let encoded = (7i64, "seven".to_string(), vec![1u8, 2]).encode().unwrap();
        let texts: Vec<&str> = encoded.iter().map(|r| r.get()).collect();
        assert_eq!(texts, ["7", "\"seven\"", "[1,2]"]);
        assert_eq!(<(i64, String, Vec<u8>)>::ARITY, 3);
        assert_eq!(<()>::ARITY, 0);
    }

    #[test]
    fn decode_reports_failing_position() {
        let err = <(i64, i64)>::decode(&[raw("1"), raw("\"two\"")]).unwrap_err();
        assert!(matches!(err, ParamError::Codec { index: 1, .. }), "{err}");

        let err = <(i64,)>::decode(&[]).unwrap_err();
        assert!(matches!(err, ParamError::Count { expected: 1, got: 0 }));

        let (a, b) = <(i64, Option<String>)>::decode(&[raw("4"), raw("null")]).unwrap();
        assert_eq!((a, b), (4, None));
    }

    #[test]
    fn output_slots_follow_types() {
        assert!(<()>::output_slots().is_empty());
        assert_eq!(<Result<(), String>>::output_slots(), [Slot::Error]);
        assert_eq!(
            <Result<i64, Infallible>>::output_slots(),
            [Slot::Value("i64")]
        );
        assert_eq!(
            <Result<String, String>>::output_slots(),
            [Slot::Value(type_name::<String>()), Slot::Error]
        );
        assert!(<Result<(), Infallible>>::output_slots().is_empty());
    }

    #[test]
    fn reply_carries_error_text_only() {
        let reply = Err::<i64, _>("boom").into_reply();
        assert!(reply.value.is_none());
        assert_eq!(reply.error.as_deref(), Some("boom"));
    }
}
