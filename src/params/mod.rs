// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Start parameters and their conversion into engine-native arguments.
//!
//! Remote callers send typed key/value pairs with the start request. Before
//! the graph's entry runs they are converted into [`GraphArgs`], an ordered
//! list of [`EngineArg`] values the engine can read. The conversion happens
//! inside an engine job, so it shares the engine's error type.
//!
//! Keys keep request order. When a key repeats, the last value wins.

use crate::errors::{EngineError, EngineResult};
use crate::proto::flowstream_v1::{start_flowgraph_request, value::Val, Complex, Value};

/// A typed parameter value as sent by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Integer(i32),
    Long(i64),
    Float(f64),
    Complex { real: f64, imag: f64 },
}

/// A caller-supplied parameter. `value` is `None` when the request carried
/// no value, or a value of a kind this server does not understand.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: String,
    pub value: Option<ParamValue>,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: ParamValue) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }
}

impl From<start_flowgraph_request::Parameter> for Parameter {
    fn from(param: start_flowgraph_request::Parameter) -> Self {
        let value = param.value.and_then(|v| v.val).map(|val| match val {
            Val::StringValue(s) => ParamValue::String(s),
            Val::IntegerValue(i) => ParamValue::Integer(i),
            Val::LongValue(l) => ParamValue::Long(l),
            Val::FloatValue(f) => ParamValue::Float(f),
            Val::ComplexValue(Complex {
                real_value,
                imaginary_value,
            }) => ParamValue::Complex {
                real: real_value,
                imag: imaginary_value,
            },
        });
        Parameter {
            key: param.key,
            value,
        }
    }
}

impl From<Parameter> for start_flowgraph_request::Parameter {
    fn from(param: Parameter) -> Self {
        let val = param.value.map(|value| match value {
            ParamValue::String(s) => Val::StringValue(s),
            ParamValue::Integer(i) => Val::IntegerValue(i),
            ParamValue::Long(l) => Val::LongValue(l),
            ParamValue::Float(f) => Val::FloatValue(f),
            ParamValue::Complex { real, imag } => Val::ComplexValue(Complex {
                real_value: real,
                imaginary_value: imag,
            }),
        });
        start_flowgraph_request::Parameter {
            key: param.key,
            value: val.map(|val| Value { val: Some(val) }),
        }
    }
}

/// Engine-native argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineArg {
    I32(i32),
    I64(i64),
    F64(f64),
    C128 { re: f64, im: f64 },
    Utf8(Vec<u8>),
}

impl EngineArg {
    /// Integer view used by engines that only expose one integer width.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EngineArg::I32(v) => Some(i64::from(*v)),
            EngineArg::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EngineArg::I32(v) => Some(f64::from(*v)),
            EngineArg::I64(v) => Some(*v as f64),
            EngineArg::F64(v) => Some(*v),
            EngineArg::C128 { re, .. } => Some(*re),
            EngineArg::Utf8(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<(f64, f64)> {
        match self {
            EngineArg::C128 { re, im } => Some((*re, *im)),
            other => other.as_f64().map(|re| (re, 0.0)),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            EngineArg::Utf8(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Ordered keyword arguments for a graph's entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphArgs {
    entries: Vec<(String, EngineArg)>,
}

impl GraphArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, arg: EngineArg) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = arg,
            None => self.entries.push((key, arg)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EngineArg> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EngineArg)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Converts caller parameters into engine arguments.
///
/// Fails with [`EngineError::UnsupportedParameter`] on the first parameter
/// without a usable value.
pub fn marshal_parameters(params: &[Parameter]) -> EngineResult<GraphArgs> {
    let mut args = GraphArgs::new();
    for param in params {
        let arg = match &param.value {
            Some(ParamValue::String(s)) => EngineArg::Utf8(s.as_bytes().to_vec()),
            Some(ParamValue::Integer(i)) => EngineArg::I32(*i),
            Some(ParamValue::Long(l)) => EngineArg::I64(*l),
            Some(ParamValue::Float(f)) => EngineArg::F64(*f),
            Some(ParamValue::Complex { real, imag }) => EngineArg::C128 {
                re: *real,
                im: *imag,
            },
            None => {
                return Err(EngineError::UnsupportedParameter {
                    key: param.key.clone(),
                })
            }
        };
        args.insert(param.key.clone(), arg);
    }
    Ok(args)
}
