//! Runtime values as the tracer reports them.
//!
//! Two closed sum types cover everything on the wire: [`Value`] for the
//! primitives that live directly in a stack frame (or inside a heap object),
//! and [`HeapObject`] for the structured objects in the per-element heap
//! table. A `ref` value carries only an address and resolves against the
//! heap table of the *same* trace element; addresses may be reused by later
//! elements.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One primitive (stack-resident) value.
///
/// Wire shape: `{"type": <tag>, "value": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int(i64),
    Float(FloatRepr),
    Str(String),
    Bool(bool),
    None,
    Type(String),
    Function(String),
    Ref(u64),
}

/// A value with the variable name it is bound to in a stack frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(flatten)]
    pub value: Value,
}

/// One structured object from the heap table.
///
/// Wire shape: `{"type": <tag>, "value": ...}` plus `keys` for dicts and
/// `name` for instances. Dicts carry parallel key/value tables under the
/// same key strings: entry *k* pairs `keys[k]` with `value[k]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HeapObject {
    List { value: Vec<Value> },
    Tuple { value: Vec<Value> },
    Set { value: Vec<Value> },
    Dict {
        keys: IndexMap<String, Value>,
        value: IndexMap<String, Value>,
    },
    Instance {
        name: String,
        value: IndexMap<String, Value>,
    },
}

/// An `f64` that round-trips the tracer's wire encoding.
///
/// JSON has no NaN or infinities, so the tracer sends them as the strings
/// `"NaN"`, `"Infinity"` and `"Negative Infinity"`; everything else is a
/// plain number. Equality is bitwise so that NaN compares equal to itself
/// (cache round-trip comparisons rely on this).
#[derive(Debug, Clone, Copy)]
pub struct FloatRepr(pub f64);

impl PartialEq for FloatRepr {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 || self.0.to_bits() == other.0.to_bits()
    }
}

impl fmt::Display for FloatRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            write!(f, "NaN")
        } else if self.0 == f64::INFINITY {
            write!(f, "Infinity")
        } else if self.0 == f64::NEG_INFINITY {
            write!(f, "Negative Infinity")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for FloatRepr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_str(&self.to_string())
        }
    }
}

impl<'de> Deserialize<'de> for FloatRepr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FloatReprVisitor;

        impl<'de> Visitor<'de> for FloatReprVisitor {
            type Value = FloatRepr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number, \"NaN\", \"Infinity\" or \"Negative Infinity\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FloatRepr, E> {
                match v {
                    "NaN" => Ok(FloatRepr(f64::NAN)),
                    "Infinity" => Ok(FloatRepr(f64::INFINITY)),
                    "Negative Infinity" => Ok(FloatRepr(f64::NEG_INFINITY)),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(FloatReprVisitor)
    }
}

impl Value {
    pub fn text_repr(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(text) => {
                format!("\"{}\"", text)
            }
            Value::Bool(b) => {
                if *b {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Value::None => "None".to_string(),
            Value::Type(name) => name.clone(),
            Value::Function(desc) => desc.clone(),
            Value::Ref(address) => {
                format!("*{}", address)
            }
        }
    }
}

impl HeapObject {
    fn list_repr(elements: &[Value]) -> String {
        let mut res: String = Default::default();
        for (i, element) in elements.iter().enumerate() {
            res += &element.text_repr();
            if i < elements.len() - 1 {
                res += ", "
            }
        }
        res
    }

    pub fn text_repr(&self) -> String {
        match self {
            HeapObject::List { value } => {
                format!("[{}]", Self::list_repr(value))
            }
            HeapObject::Tuple { value } => {
                format!("({})", Self::list_repr(value))
            }
            HeapObject::Set { value } => {
                format!("{{{}}}", Self::list_repr(value))
            }
            HeapObject::Dict { keys, value } => {
                let mut res: String = "{".to_string();
                for (i, (slot, key)) in keys.iter().enumerate() {
                    res += &key.text_repr();
                    res += ": ";
                    match value.get(slot) {
                        Some(entry) => res += &entry.text_repr(),
                        Option::None => res += "?",
                    }
                    if i < keys.len() - 1 {
                        res += ", "
                    }
                }
                res += "}";
                res
            }
            HeapObject::Instance { name, value } => {
                let mut res: String = name.clone();
                res += "(";
                for (i, (field, entry)) in value.iter().enumerate() {
                    res += field;
                    res += "=";
                    res += &entry.text_repr();
                    if i < value.len() - 1 {
                        res += ", "
                    }
                }
                res += ")";
                res
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_value_wire_shapes() {
        let cases = vec![
            (json!({"type": "int", "value": 42}), Value::Int(42)),
            (json!({"type": "str", "value": "hi"}), Value::Str("hi".to_string())),
            (json!({"type": "bool", "value": true}), Value::Bool(true)),
            (json!({"type": "none", "value": null}), Value::None),
            (
                json!({"type": "type", "value": "<class 'list'>"}),
                Value::Type("<class 'list'>".to_string()),
            ),
            (
                json!({"type": "function", "value": "<function f>"}),
                Value::Function("<function f>".to_string()),
            ),
            (json!({"type": "ref", "value": 140230}), Value::Ref(140230)),
        ];
        for (wire, expected) in cases {
            let parsed: Value = serde_json::from_value(wire).unwrap();
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn test_float_specials_round_trip() {
        for wire in ["NaN", "Infinity", "Negative Infinity"] {
            let parsed: Value = serde_json::from_value(json!({"type": "float", "value": wire})).unwrap();
            let back = serde_json::to_value(&parsed).unwrap();
            assert_eq!(back, json!({"type": "float", "value": wire}));
        }

        let parsed: Value = serde_json::from_value(json!({"type": "float", "value": 1.5})).unwrap();
        assert_eq!(parsed, Value::Float(FloatRepr(1.5)));
    }

    #[test]
    fn test_nan_compares_equal_to_itself() {
        assert_eq!(Value::Float(FloatRepr(f64::NAN)), Value::Float(FloatRepr(f64::NAN)));
    }

    #[test]
    fn test_named_value_flattens() {
        let wire = json!({"name": "x", "type": "int", "value": 7});
        let parsed: NamedValue = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(parsed.name, "x");
        assert_eq!(parsed.value, Value::Int(7));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), wire);
    }

    #[test]
    fn test_heap_object_dict_parallel_tables() {
        let wire = json!({
            "type": "dict",
            "keys": {"140001": {"type": "str", "value": "a"}},
            "value": {"140001": {"type": "int", "value": 1}},
        });
        let parsed: HeapObject = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.text_repr(), "{\"a\": 1}");
    }

    #[test]
    fn test_heap_object_instance() {
        let wire = json!({
            "type": "instance",
            "name": "Point",
            "value": {
                "x": {"type": "int", "value": 1},
                "y": {"type": "ref", "value": 99},
            },
        });
        let parsed: HeapObject = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.text_repr(), "Point(x=1, y=*99)");
    }

    #[test]
    fn test_collection_reprs() {
        let list: HeapObject = serde_json::from_value(json!({
            "type": "list",
            "value": [
                {"type": "int", "value": 1},
                {"type": "none", "value": null},
                {"type": "bool", "value": false},
            ],
        }))
        .unwrap();
        assert_eq!(list.text_repr(), "[1, None, false]");

        let tuple = HeapObject::Tuple {
            value: vec![Value::Str("a".to_string())],
        };
        assert_eq!(tuple.text_repr(), "(\"a\")");
    }
}
