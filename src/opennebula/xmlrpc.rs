//! # XML-RPC Codec
//!
//! Request encoding and response decoding for the subset of XML-RPC that
//! OpenNebula uses.
//!
//! Every OpenNebula call answers with an array: a boolean success flag,
//! then either the payload (string or integer) or an error message, then an
//! error code:
//!
//! ```xml
//! <methodResponse><params><param><value><array><data>
//!   <value><boolean>0</boolean></value>
//!   <value><string>[one.user.addgroup] User is already in this group</string></value>
//!   <value><i4>2048</i4></value>
//! </data></array></value></param></params></methodResponse>
//! ```

use xot::Node;

use super::xml::{escape, XmlDocument};
use crate::error::{Error, ProviderError, ProviderErrorKind, Result};

/// A parameter of a method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

/// A decoded XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Nil,
}

impl Value {
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Error::protocol(format!("expected a string, got {:?}", other))),
        }
    }

    pub fn into_int(self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(i),
            other => Err(Error::protocol(format!("expected an integer, got {:?}", other))),
        }
    }
}

/// Serializes a method call.
pub fn encode_call(method: &str, params: &[Param]) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?>\n<methodCall>");
    body.push_str(&format!("<methodName>{}</methodName><params>", escape(method)));
    for param in params {
        let value = match param {
            Param::Str(s) => format!("<string>{}</string>", escape(s)),
            Param::Int(i) => format!("<i4>{}</i4>", i),
            Param::Bool(b) => format!("<boolean>{}</boolean>", u8::from(*b)),
        };
        body.push_str(&format!("<param><value>{}</value></param>", value));
    }
    body.push_str("</params></methodCall>");
    body
}

/// Decodes a response body into the call's payload.
///
/// A failed call becomes `Error::Provider` tagged with `method`.
pub fn decode_response(method: &str, body: &str) -> Result<Value> {
    let doc = XmlDocument::parse(body)?;
    let root = doc.root();
    if doc.name(root) != Some("methodResponse") {
        return Err(Error::protocol("missing <methodResponse>"));
    }

    if let Some(fault) = doc.child(root, "fault") {
        let message = match value_of(&doc, fault)? {
            Value::Struct(members) => members
                .into_iter()
                .find(|(name, _)| name == "faultString")
                .map(|(_, value)| match value {
                    Value::Str(message) => message,
                    other => format!("{:?}", other),
                })
                .unwrap_or_else(|| "unknown fault".to_string()),
            other => format!("{:?}", other),
        };
        return Err(Error::provider(
            method,
            ProviderError::new(ProviderErrorKind::XmlRpcApi, message),
        ));
    }

    let param = doc
        .child(root, "params")
        .and_then(|params| doc.child(params, "param"))
        .ok_or_else(|| Error::protocol("missing <params><param>"))?;

    let mut items = match value_of(&doc, param)? {
        Value::Array(items) => items.into_iter(),
        other => return Err(Error::protocol(format!("expected an array, got {:?}", other))),
    };

    match items.next() {
        Some(Value::Bool(true)) => items
            .next()
            .ok_or_else(|| Error::protocol("successful response without payload")),
        Some(Value::Bool(false)) => {
            let message = match items.next() {
                Some(Value::Str(message)) => message,
                Some(other) => format!("{:?}", other),
                None => String::new(),
            };
            let code = match items.next() {
                Some(Value::Int(code)) => code,
                _ => -1,
            };
            Err(Error::provider(
                method,
                ProviderError::new(ProviderErrorKind::from_code(code), message),
            ))
        }
        other => Err(Error::protocol(format!(
            "expected a success flag, got {:?}",
            other
        ))),
    }
}

/// Decodes the `<value>` child of `node`.
fn value_of(doc: &XmlDocument, node: Node) -> Result<Value> {
    let value = doc
        .child(node, "value")
        .ok_or_else(|| Error::protocol("missing <value>"))?;
    decode_value(doc, value)
}

fn decode_value(doc: &XmlDocument, value: Node) -> Result<Value> {
    let typed = match doc.elements(value).next() {
        Some(typed) => typed,
        // an untyped value is a string
        None => return Ok(Value::Str(doc.text(value))),
    };

    let text = doc.text(typed);
    let kind = doc.name(typed).unwrap_or_default();
    match kind {
        "string" => Ok(Value::Str(text)),
        "i4" | "i8" | "int" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| Error::protocol(format!("bad integer {:?}", text))),
        "boolean" => match text.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(Error::protocol(format!("bad boolean {:?}", other))),
        },
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| Error::protocol(format!("bad double {:?}", text))),
        "nil" => Ok(Value::Nil),
        "array" => {
            let data = doc
                .child(typed, "data")
                .ok_or_else(|| Error::protocol("array without <data>"))?;
            doc.children_named(data, "value")
                .map(|item| decode_value(doc, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        "struct" => doc
            .children_named(typed, "member")
            .map(|member| {
                let name = doc.required_text(member, "name")?;
                Ok((name, value_of(doc, member)?))
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Struct),
        other => Err(Error::protocol(format!("unsupported value type <{}>", other))),
    }
}
