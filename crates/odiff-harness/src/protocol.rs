//! Wire protocol between the proxy and the worker process
//!
//! One JSON document per line over the worker's stdin (requests) and stdout
//! (hello, then one response per request). Arrays travel column-major as hex
//! of little-endian `f64`, floats as raw IEEE-754 bits, so every value
//! crosses the boundary bit for bit.

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use odiff_model::{AttrValue, ModelError, RoutineArgs, Scalar};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Decoding failure of a wire value or message
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Malformed JSON or unexpected message
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Array payload is not valid hex
    #[error("array payload: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Payload length disagrees with the declared shape
    #[error("array of shape {shape:?} needs {expected} bytes, got {found}")]
    Length {
        /// Declared shape
        shape: Vec<usize>,
        /// Bytes implied by the shape
        expected: usize,
        /// Bytes received
        found: usize,
    },
}

/// Scalar on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireScalar {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float as `f64::to_bits`
    Float(u64),
    /// Text
    Text(String),
}

impl From<&Scalar> for WireScalar {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int(v) => Self::Int(*v),
            Scalar::Float(v) => Self::Float(v.to_bits()),
            Scalar::Text(v) => Self::Text(v.clone()),
        }
    }
}

impl From<WireScalar> for Scalar {
    fn from(value: WireScalar) -> Self {
        match value {
            WireScalar::Bool(v) => Self::Bool(v),
            WireScalar::Int(v) => Self::Int(v),
            WireScalar::Float(bits) => Self::Float(f64::from_bits(bits)),
            WireScalar::Text(v) => Self::Text(v),
        }
    }
}

/// Element order of an encoded array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Row-major
    C,
    /// Column-major
    F,
}

/// Attribute value on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireValue {
    /// Scalar value
    Scalar {
        /// The scalar
        scalar: WireScalar,
    },
    /// Array value
    Array {
        /// Logical shape
        shape: Vec<usize>,
        /// Order of `data`
        order: Order,
        /// Hex of little-endian `f64` elements
        data: String,
    },
}

impl From<&AttrValue> for WireValue {
    fn from(value: &AttrValue) -> Self {
        match value {
            AttrValue::Scalar(s) => Self::Scalar { scalar: s.into() },
            AttrValue::Array(a) => {
                let bytes: Vec<u8> = a.t().iter().flat_map(|x| x.to_le_bytes()).collect();
                Self::Array {
                    shape: a.shape().to_vec(),
                    order: Order::F,
                    data: hex::encode(bytes),
                }
            }
        }
    }
}

impl TryFrom<WireValue> for AttrValue {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Scalar { scalar } => Ok(Self::Scalar(scalar.into())),
            WireValue::Array { shape, order, data } => {
                let bytes = hex::decode(data)?;
                let expected = shape.iter().product::<usize>() * 8;
                if bytes.len() != expected {
                    return Err(WireError::Length {
                        shape,
                        expected,
                        found: bytes.len(),
                    });
                }
                let elements: Vec<f64> = bytes
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut buf = [0_u8; 8];
                        buf.copy_from_slice(chunk);
                        f64::from_le_bytes(buf)
                    })
                    .collect();
                let dim = IxDyn(&shape);
                let array = match order {
                    Order::C => ArrayD::from_shape_vec(dim, elements),
                    Order::F => ArrayD::from_shape_vec(dim.f(), elements),
                };
                array.map(Self::Array).map_err(|_| WireError::Length {
                    shape,
                    expected,
                    found: expected,
                })
            }
        }
    }
}

/// Routine arguments on the wire; keyword order is preserved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireArgs {
    /// Positional arguments
    #[serde(default)]
    pub positional: Vec<WireValue>,
    /// Keyword arguments
    #[serde(default)]
    pub keyword: Vec<(String, WireValue)>,
}

impl From<&RoutineArgs> for WireArgs {
    fn from(args: &RoutineArgs) -> Self {
        Self {
            positional: args.positional.iter().map(WireValue::from).collect(),
            keyword: args
                .keyword
                .iter()
                .map(|(k, v)| (k.clone(), WireValue::from(v)))
                .collect(),
        }
    }
}

impl TryFrom<WireArgs> for RoutineArgs {
    type Error = WireError;

    fn try_from(args: WireArgs) -> Result<Self, Self::Error> {
        let mut out = RoutineArgs::new();
        for value in args.positional {
            out.positional.push(AttrValue::try_from(value)?);
        }
        for (name, value) in args.keyword {
            out.keyword.insert(name, AttrValue::try_from(value)?);
        }
        Ok(out)
    }
}

/// First line written by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hello", rename_all = "snake_case")]
pub enum Hello {
    /// Legacy instance constructed
    Ready {
        /// Library it was loaded from
        library: String,
        /// Named setup, for run-to-completion mode
        setup: Option<String>,
        /// Worker process id
        pid: u32,
    },
    /// Construction failed; the worker exits after sending this
    StartupFailed {
        /// Reason
        message: String,
    },
}

/// Request from proxy to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Read an attribute
    GetAttribute {
        /// Attribute name
        name: String,
    },
    /// Assign an attribute
    SetAttribute {
        /// Attribute name
        name: String,
        /// New value
        value: WireValue,
    },
    /// Invoke a routine
    CallRoutine {
        /// Routine name
        name: String,
        /// Arguments
        #[serde(default)]
        args: WireArgs,
    },
    /// Set up the bound configuration
    Setup,
    /// Run for the configured run length
    Run,
    /// Exit the serve loop
    Shutdown,
}

/// Category of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Attribute not addressable
    Attribute,
    /// Routine absent
    RoutineNotFound,
    /// Model raised
    Model,
    /// Request could not be decoded
    Protocol,
}

impl From<&ModelError> for FailureKind {
    fn from(error: &ModelError) -> Self {
        match error {
            ModelError::UnknownAttribute(_) => Self::Attribute,
            ModelError::UnknownRoutine(_) => Self::RoutineNotFound,
            _ => Self::Model,
        }
    }
}

/// Worker reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Attribute value or routine result; `None` means absent / no result
    Value {
        /// The value
        value: Option<WireValue>,
    },
    /// Request completed without a value
    Done,
    /// Request failed
    Failed {
        /// Category
        kind: FailureKind,
        /// Message
        message: String,
    },
}

impl Response {
    /// Reply for a model error
    #[must_use]
    pub fn failure(error: &ModelError) -> Self {
        Self::Failed {
            kind: error.into(),
            message: error.to_string(),
        }
    }
}

/// Write `message` as one JSON line and flush
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Parse one line
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, WireError> {
    Ok(serde_json::from_str(line.trim_end())?)
}
