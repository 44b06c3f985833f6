//! Column types and their document representation.
//!
//! The type attribute set is part of the on-disk contract: two version
//! documents hash equal exactly when every column serializes the same
//! attributes in the same order.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::xml::XmlNode;

/// One member of an enum column type. Members serialize in ascending
/// numeric-value order regardless of declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    /// Member name.
    pub name: SmolStr,
    /// Stable numeric value.
    pub value: i64,
}

/// A column type with its type-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColumnType {
    BigInteger,
    Boolean {
        #[serde(default)]
        create_constraint: bool,
    },
    Date,
    DateTime {
        #[serde(default)]
        timezone: bool,
    },
    Enum {
        enum_name: SmolStr,
        members: Vec<EnumMember>,
    },
    Float {
        #[serde(default)]
        asdecimal: bool,
    },
    Integer,
    Interval {
        #[serde(default)]
        native: bool,
        #[serde(default)]
        second_precision: Option<u32>,
        #[serde(default)]
        day_precision: Option<u32>,
    },
    LargeBinary {
        #[serde(default)]
        length: Option<u32>,
    },
    Numeric {
        #[serde(default)]
        precision: Option<u32>,
        #[serde(default)]
        scale: Option<u32>,
        #[serde(default = "default_true")]
        asdecimal: bool,
    },
    SmallInteger,
    String {
        length: u32,
        #[serde(default)]
        collation: Option<SmolStr>,
    },
    Text {
        #[serde(default)]
        length: Option<u32>,
        #[serde(default)]
        collation: Option<SmolStr>,
    },
    Time {
        #[serde(default)]
        timezone: bool,
    },
    Unicode {
        length: u32,
    },
    UnicodeText {
        #[serde(default)]
        length: Option<u32>,
    },
}

fn default_true() -> bool {
    true
}

/// Format a boolean the way documents spell it.
pub fn bool_text(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Parse a document boolean.
pub fn parse_bool(attribute: &str, text: &str) -> SchemaResult<bool> {
    match text {
        "True" => Ok(true),
        "False" => Ok(false),
        _ => Err(SchemaError::invalid_attribute(attribute, text)),
    }
}

fn parse_u32(attribute: &str, text: &str) -> SchemaResult<u32> {
    text.parse::<u32>()
        .map_err(|_| SchemaError::invalid_attribute(attribute, text))
}

fn parse_i64(attribute: &str, text: &str) -> SchemaResult<i64> {
    text.parse::<i64>()
        .map_err(|_| SchemaError::invalid_attribute(attribute, text))
}

impl ColumnType {
    /// The document name of this type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::BigInteger => "BigInteger",
            Self::Boolean { .. } => "Boolean",
            Self::Date => "Date",
            Self::DateTime { .. } => "DateTime",
            Self::Enum { .. } => "Enum",
            Self::Float { .. } => "Float",
            Self::Integer => "Integer",
            Self::Interval { .. } => "Interval",
            Self::LargeBinary { .. } => "LargeBinary",
            Self::Numeric { .. } => "Numeric",
            Self::SmallInteger => "SmallInteger",
            Self::String { .. } => "String",
            Self::Text { .. } => "Text",
            Self::Time { .. } => "Time",
            Self::Unicode { .. } => "Unicode",
            Self::UnicodeText { .. } => "UnicodeText",
        }
    }

    /// Whether values of this type are quoted in SQL literals.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Date
                | Self::DateTime { .. }
                | Self::Enum { .. }
                | Self::LargeBinary { .. }
                | Self::String { .. }
                | Self::Text { .. }
                | Self::Time { .. }
                | Self::Unicode { .. }
                | Self::UnicodeText { .. }
        )
    }

    /// The enum type name, for types that declare one.
    pub fn enum_name(&self) -> Option<&SmolStr> {
        match self {
            Self::Enum { enum_name, .. } => Some(enum_name),
            _ => None,
        }
    }

    /// Write the `type` attribute plus any type-specific attributes and
    /// child elements onto a column element.
    pub fn save_to_node(&self, node: &mut XmlNode) {
        node.set_attr("type", self.type_name());
        match self {
            Self::BigInteger | Self::Date | Self::Integer | Self::SmallInteger => {}
            Self::Boolean { create_constraint } => {
                if *create_constraint {
                    node.set_attr("create_constraint", bool_text(true));
                }
            }
            Self::DateTime { timezone } | Self::Time { timezone } => {
                if *timezone {
                    node.set_attr("timezone", bool_text(true));
                }
            }
            Self::Enum { enum_name, members } => {
                node.set_attr("enum_name", enum_name.as_str());
                let mut sorted: Vec<&EnumMember> = members.iter().collect();
                sorted.sort_by_key(|member| member.value);
                for member in sorted {
                    let mut child = XmlNode::new("EnumValue");
                    child.set_attr("name", member.name.as_str());
                    child.set_attr("value", member.value.to_string());
                    node.children.push(child);
                }
            }
            Self::Float { asdecimal } => {
                if *asdecimal {
                    node.set_attr("asdecimal", bool_text(true));
                }
            }
            Self::Interval {
                native,
                second_precision,
                day_precision,
            } => {
                if *native {
                    node.set_attr("native", bool_text(true));
                }
                if let Some(precision) = second_precision {
                    node.set_attr("second_precision", precision.to_string());
                }
                if let Some(precision) = day_precision {
                    node.set_attr("day_precision", precision.to_string());
                }
            }
            Self::LargeBinary { length } => {
                if let Some(length) = length {
                    node.set_attr("length", length.to_string());
                }
            }
            Self::Numeric {
                precision,
                scale,
                asdecimal,
            } => {
                if let Some(precision) = precision {
                    node.set_attr("precision", precision.to_string());
                }
                if let Some(scale) = scale {
                    node.set_attr("scale", scale.to_string());
                }
                if !*asdecimal {
                    node.set_attr("asdecimal", bool_text(false));
                }
            }
            Self::String { length, collation } => {
                node.set_attr("length", length.to_string());
                if let Some(collation) = collation {
                    node.set_attr("collation", collation.as_str());
                }
            }
            Self::Text { length, collation } => {
                if let Some(length) = length {
                    node.set_attr("length", length.to_string());
                }
                if let Some(collation) = collation {
                    node.set_attr("collation", collation.as_str());
                }
            }
            Self::Unicode { length } => {
                node.set_attr("length", length.to_string());
            }
            Self::UnicodeText { length } => {
                if let Some(length) = length {
                    node.set_attr("length", length.to_string());
                }
            }
        }
    }

    /// Reconstruct a type from a column element.
    pub fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        let type_name = node.require_attr("type")?;
        let parsed = match type_name {
            "BigInteger" => Self::BigInteger,
            "Boolean" => Self::Boolean {
                create_constraint: match node.attr("create_constraint") {
                    Some(text) => parse_bool("create_constraint", text)?,
                    None => false,
                },
            },
            "Date" => Self::Date,
            "DateTime" => Self::DateTime {
                timezone: match node.attr("timezone") {
                    Some(text) => parse_bool("timezone", text)?,
                    None => false,
                },
            },
            "Enum" => {
                let enum_name = SmolStr::new(node.require_attr("enum_name")?);
                let mut members = Vec::new();
                for child in node.children_named("EnumValue") {
                    members.push(EnumMember {
                        name: SmolStr::new(child.require_attr("name")?),
                        value: parse_i64("value", child.require_attr("value")?)?,
                    });
                }
                Self::Enum { enum_name, members }
            }
            "Float" => Self::Float {
                asdecimal: match node.attr("asdecimal") {
                    Some(text) => parse_bool("asdecimal", text)?,
                    None => false,
                },
            },
            "Integer" => Self::Integer,
            "Interval" => Self::Interval {
                native: match node.attr("native") {
                    Some(text) => parse_bool("native", text)?,
                    None => false,
                },
                second_precision: node
                    .attr("second_precision")
                    .map(|text| parse_u32("second_precision", text))
                    .transpose()?,
                day_precision: node
                    .attr("day_precision")
                    .map(|text| parse_u32("day_precision", text))
                    .transpose()?,
            },
            "LargeBinary" => Self::LargeBinary {
                length: node
                    .attr("length")
                    .map(|text| parse_u32("length", text))
                    .transpose()?,
            },
            "Numeric" => Self::Numeric {
                precision: node
                    .attr("precision")
                    .map(|text| parse_u32("precision", text))
                    .transpose()?,
                scale: node
                    .attr("scale")
                    .map(|text| parse_u32("scale", text))
                    .transpose()?,
                asdecimal: match node.attr("asdecimal") {
                    Some(text) => parse_bool("asdecimal", text)?,
                    None => true,
                },
            },
            "SmallInteger" => Self::SmallInteger,
            "String" => Self::String {
                length: parse_u32("length", node.require_attr("length")?)?,
                collation: node.attr("collation").map(SmolStr::new),
            },
            "Text" => Self::Text {
                length: node
                    .attr("length")
                    .map(|text| parse_u32("length", text))
                    .transpose()?,
                collation: node.attr("collation").map(SmolStr::new),
            },
            "Time" => Self::Time {
                timezone: match node.attr("timezone") {
                    Some(text) => parse_bool("timezone", text)?,
                    None => false,
                },
            },
            "Unicode" => Self::Unicode {
                length: parse_u32("length", node.require_attr("length")?)?,
            },
            "UnicodeText" => Self::UnicodeText {
                length: node
                    .attr("length")
                    .map(|text| parse_u32("length", text))
                    .transpose()?,
            },
            other => return Err(SchemaError::UnknownColumnType(other.to_string())),
        };
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ty: &ColumnType) -> ColumnType {
        let mut node = XmlNode::new("Column");
        node.set_attr("name", "c");
        ty.save_to_node(&mut node);
        ColumnType::from_node(&node).unwrap()
    }

    #[test]
    fn test_plain_types_round_trip() {
        for ty in [
            ColumnType::BigInteger,
            ColumnType::Integer,
            ColumnType::SmallInteger,
            ColumnType::Date,
        ] {
            assert_eq!(round_trip(&ty), ty);
        }
    }

    #[test]
    fn test_string_round_trip() {
        let ty = ColumnType::String {
            length: 64,
            collation: Some(SmolStr::new("C")),
        };
        assert_eq!(round_trip(&ty), ty);
    }

    #[test]
    fn test_enum_members_sorted_by_value() {
        let ty = ColumnType::Enum {
            enum_name: SmolStr::new("state"),
            members: vec![
                EnumMember {
                    name: SmolStr::new("late"),
                    value: 2,
                },
                EnumMember {
                    name: SmolStr::new("early"),
                    value: 1,
                },
            ],
        };
        let mut node = XmlNode::new("Column");
        ty.save_to_node(&mut node);
        let values: Vec<&str> = node
            .children_named("EnumValue")
            .map(|child| child.attr("name").unwrap())
            .collect();
        assert_eq!(values, ["early", "late"]);
    }

    #[test]
    fn test_numeric_defaults() {
        let ty = ColumnType::Numeric {
            precision: Some(10),
            scale: Some(2),
            asdecimal: true,
        };
        let mut node = XmlNode::new("Column");
        ty.save_to_node(&mut node);
        // asdecimal defaults to true and is omitted from the document.
        assert_eq!(node.attr("asdecimal"), None);
        assert_eq!(round_trip(&ty), ty);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut node = XmlNode::new("Column");
        node.set_attr("type", "Blob");
        assert!(matches!(
            ColumnType::from_node(&node),
            Err(SchemaError::UnknownColumnType(_))
        ));
    }

    #[test]
    fn test_bool_text_round_trip() {
        assert!(parse_bool("x", bool_text(true)).unwrap());
        assert!(!parse_bool("x", bool_text(false)).unwrap());
        assert!(parse_bool("x", "yes").is_err());
    }
}
