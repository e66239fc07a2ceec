//! # Serializer
//!
//! The translation layer between `Value` and the wire markup.
//!
//! ## Invariants
//! - **Recursion Safety**: All recursive operations are bounded by `MAX_RECURSION_DEPTH`.
//! - **Closed Set**: Anything without a wire form fails with `UnsupportedValueType`
//!   before a single byte of it is written.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::escape;

use crate::date;
use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::value::Value;

/// The maximum number of nested values, counting the outermost one.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Closes the `params` list and the `methodCall` envelope.
pub const CALL_EPILOGUE: &str = "</params></methodCall>";

/// Opens the `methodCall` envelope up to the first `param`.
pub fn call_preamble(method: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodCall><methodName>{}</methodName><params>",
        escape(method)
    )
}

/// Serializes a value as `<value>...</value>`.
pub fn encode_value(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Serializes a value as `<param><value>...</value></param>`.
pub fn encode_param(value: &Value) -> Result<String> {
    let mut out = String::from("<param>");
    write_value(&mut out, value)?;
    out.push_str("</param>");
    Ok(out)
}

/// Serializes a complete, buffered `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String> {
    let mut out = call_preamble(method);
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param)?;
        out.push_str("</param>");
    }
    out.push_str(CALL_EPILOGUE);
    Ok(out)
}

/// Serializes a successful `methodResponse` document carrying one value.
pub fn encode_response(value: &Value) -> Result<String> {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><params><param>");
    write_value(&mut out, value)?;
    out.push_str("</param></params></methodResponse>");
    Ok(out)
}

/// Serializes a fault `methodResponse` document.
pub fn encode_fault(fault: &Fault) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>",
            "<member><name>faultCode</name><value><int>{}</int></value></member>",
            "<member><name>faultString</name><value><string>{}</string></value></member>",
            "</struct></value></fault></methodResponse>",
        ),
        fault.code,
        escape(fault.message.as_str())
    )
}

/// Appends the markup for `value` to `out`.
///
/// On error `out` may hold a partial fragment; callers discard it.
///
/// # Errors
/// Returns `Error::RecursionLimitExceeded` if the value is too deeply nested, and
/// `Error::UnsupportedValueType` for doubles that are NaN or infinite.
pub fn write_value(out: &mut String, value: &Value) -> Result<()> {
    write_value_impl(out, value, 0)
}

fn write_value_impl(out: &mut String, value: &Value, depth: usize) -> Result<()> {
    if depth >= MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    out.push_str("<value>");
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" });
        }
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Double(d) => {
            if !d.is_finite() {
                return Err(Error::UnsupportedValueType(format!("non-finite double {}", d)));
            }
            // `Display` for f64 never switches to exponent form
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::DateTime(d) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&date::encode(d));
            out.push_str("</dateTime.iso8601>");
        }
        Value::Base64(bytes) => {
            out.push_str("<base64>");
            STANDARD.encode_string(bytes, out);
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value_impl(out, item, depth + 1)?;
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members.iter() {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value_impl(out, member, depth + 1)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}
