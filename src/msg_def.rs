//! Parser for the message definitions stored in connection records
//!
//! Connection records carry the full text of the message definition,
//! including every nested type after `MSG:` headers, so messages can be
//! decoded without any `.msg` files on disk. See http://wiki.ros.org/msg.

use crate::error::{BagError, Result};
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::fmt;

#[derive(Parser)]
#[grammar = "msg_def.pest"]
struct MsgDefParser;

const STD_MSGS_PREFIX: &str = "std_msgs/";

/// Built-in field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    String,
    Time,
    Duration,
}

impl PrimitiveType {
    /// Look up a primitive by its definition name, `None` for complex types
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int8" | "byte" => Self::Int8,
            "uint8" | "char" => Self::Uint8,
            "int16" => Self::Int16,
            "uint16" => Self::Uint16,
            "int32" => Self::Int32,
            "uint32" => Self::Uint32,
            "int64" => Self::Int64,
            "uint64" => Self::Uint64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            "time" => Self::Time,
            "duration" => Self::Duration,
            _ => return None,
        })
    }

    /// Encoded size for fixed-width types, `None` for strings
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::Uint8 => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Int32 | Self::Uint32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::Time | Self::Duration => Some(8),
            Self::String => None,
        }
    }
}

/// Array arity of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySize {
    /// Not an array
    Scalar,
    /// `type[n]`
    Fixed(usize),
    /// `type[]`, length prefixed on the wire
    Dynamic,
}

impl ArraySize {
    /// Legacy encoding: 0 for scalars, n for fixed arrays, -1 for dynamic arrays
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Scalar => 0,
            Self::Fixed(n) => *n as i32,
            Self::Dynamic => -1,
        }
    }

    /// Whether the field is an array of any kind
    pub fn is_array(&self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// `type[n] name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Element type without the array suffix
    pub type_name: String,
    pub array_size: ArraySize,
    pub field_name: String,
}

impl FieldDef {
    /// The primitive element type, `None` for complex fields
    pub fn primitive(&self) -> Option<PrimitiveType> {
        PrimitiveType::parse(&self.type_name)
    }
}

/// `type NAME=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDef {
    pub type_name: String,
    pub constant_name: String,
    pub value: String,
}

/// One line of a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Field(FieldDef),
    Constant(ConstantDef),
}

impl Member {
    /// The field, if this member is one
    pub fn as_field(&self) -> Option<&FieldDef> {
        match self {
            Member::Field(field) => Some(field),
            Member::Constant(_) => None,
        }
    }
}

/// A nested type introduced by a `MSG:` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedMsgDef {
    /// Type name with any `std_msgs/` prefix removed
    pub type_name: String,
    pub members: Vec<Member>,
}

impl EmbeddedMsgDef {
    /// Package of this type, used to resolve its own unqualified fields
    pub fn scope(&self) -> &str {
        self.type_name
            .split_once('/')
            .map(|(scope, _)| scope)
            .unwrap_or("")
    }

    /// Field members in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.members.iter().filter_map(Member::as_field)
    }
}

/// A parsed top-level definition plus all of its embedded types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgDef {
    pub members: Vec<Member>,
    pub embedded_types: Vec<EmbeddedMsgDef>,
}

impl MsgDef {
    /// Parse definition text
    pub fn parse(text: &str) -> Result<Self> {
        let pairs = MsgDefParser::parse(Rule::definition, text).map_err(syntax_error)?;
        let mut def = MsgDef::default();

        for pair in pairs.flat_map(Pair::into_inner) {
            let member = match pair.as_rule() {
                Rule::msg_header => {
                    def.embedded_types.push(EmbeddedMsgDef {
                        type_name: strip_std_msgs(pair.into_inner().as_str()).to_string(),
                        members: Vec::new(),
                    });
                    continue;
                }
                Rule::field => Member::Field(parse_field(pair)?),
                Rule::constant | Rule::string_constant => Member::Constant(parse_constant(pair)),
                _ => continue,
            };

            match def.embedded_types.last_mut() {
                Some(embedded) => embedded.members.push(member),
                None => def.members.push(member),
            }
        }

        Ok(def)
    }

    /// Top-level fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.members.iter().filter_map(Member::as_field)
    }

    /// Resolve the embedded definition of a complex field.
    ///
    /// Unqualified names are looked up relative to `scope` first and then
    /// globally.
    pub fn embedded_type(&self, scope: &str, field: &FieldDef) -> Result<&EmbeddedMsgDef> {
        self.resolve(scope, &field.type_name)
            .ok_or_else(|| BagError::message_type_not_found(&field.type_name))
    }

    fn resolve(&self, scope: &str, type_name: &str) -> Option<&EmbeddedMsgDef> {
        let find = |name: &str| self.embedded_types.iter().find(|e| e.type_name == name);

        if type_name.contains('/') {
            return find(type_name);
        }
        if !scope.is_empty() {
            if let Some(found) = find(&format!("{scope}/{type_name}")) {
                return Some(found);
            }
        }
        find(type_name)
    }
}

fn strip_std_msgs(name: &str) -> &str {
    name.strip_prefix(STD_MSGS_PREFIX).unwrap_or(name)
}

fn syntax_error(err: pest::error::Error<Rule>) -> BagError {
    let line = match err.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    BagError::msg_def_parse(line, format!("{}: '{}'", err.variant.message(), err.line().trim()))
}

fn parse_field(pair: Pair<'_, Rule>) -> Result<FieldDef> {
    let (line, _) = pair.as_span().start_pos().line_col();
    let mut field = FieldDef {
        type_name: String::new(),
        array_size: ArraySize::Scalar,
        field_name: String::new(),
    };

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::type_name => field.type_name = strip_std_msgs(inner.as_str()).to_string(),
            Rule::array => field.array_size = parse_array(inner, line)?,
            Rule::identifier => field.field_name = inner.as_str().to_string(),
            _ => {}
        }
    }

    Ok(field)
}

fn parse_array(pair: Pair<'_, Rule>, line: usize) -> Result<ArraySize> {
    let Some(size) = pair.into_inner().next() else {
        return Ok(ArraySize::Dynamic);
    };
    size.as_str()
        .parse()
        .map(ArraySize::Fixed)
        .map_err(|_| BagError::msg_def_parse(line, format!("invalid array size '{}'", size.as_str())))
}

fn parse_constant(pair: Pair<'_, Rule>) -> ConstantDef {
    let mut constant = ConstantDef {
        type_name: String::new(),
        constant_name: String::new(),
        value: String::new(),
    };

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::type_name | Rule::string_type => {
                constant.type_name = strip_std_msgs(inner.as_str()).to_string()
            }
            Rule::identifier => constant.constant_name = inner.as_str().to_string(),
            Rule::constant_value | Rule::string_value => {
                constant.value = inner.as_str().trim_end().to_string()
            }
            _ => {}
        }
    }

    constant
}

impl fmt::Display for ArraySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => Ok(()),
            Self::Fixed(n) => write!(f, "[{n}]"),
            Self::Dynamic => f.write_str("[]"),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Field(field) => {
                write!(f, "{}{} {}", field.type_name, field.array_size, field.field_name)
            }
            Member::Constant(constant) => write!(
                f,
                "{} {}={}",
                constant.type_name, constant.constant_name, constant.value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LASER_SCAN: &str = r#"# Single scan from a planar laser range-finder

Header header            # timestamp in the header is the acquisition time of
                         # the first ray in the scan.
float32 angle_min        # start angle of the scan [rad]
float32 angle_max        # end angle of the scan [rad]
float32[] ranges         # range data [m]
uint8[4] flags

================================================================================
MSG: std_msgs/Header
# Standard metadata for higher-level stamped data types.
uint32 seq
#Two-integer timestamp that is expressed as:
time stamp
#Frame this data is associated with
string frame_id
"#;

    fn field_names(fields: impl Iterator<Item = FieldDef>) -> Vec<(String, String)> {
        fields.map(|f| (f.field_name, f.type_name)).collect()
    }

    #[test]
    fn test_parse_fields_and_embedded() {
        let def = MsgDef::parse(LASER_SCAN).unwrap();

        assert_eq!(
            field_names(def.fields().cloned()),
            vec![
                ("header".to_string(), "Header".to_string()),
                ("angle_min".to_string(), "float32".to_string()),
                ("angle_max".to_string(), "float32".to_string()),
                ("ranges".to_string(), "float32".to_string()),
                ("flags".to_string(), "uint8".to_string()),
            ]
        );

        let ranges = def.fields().nth(3).unwrap();
        assert_eq!(ranges.array_size, ArraySize::Dynamic);
        assert_eq!(ranges.array_size.as_i32(), -1);
        assert_eq!(def.fields().nth(4).unwrap().array_size, ArraySize::Fixed(4));

        assert_eq!(def.embedded_types.len(), 1);
        let header = def.embedded_type("", def.fields().next().unwrap()).unwrap();
        assert_eq!(header.type_name, "Header");
        assert_eq!(
            field_names(header.fields().cloned()),
            vec![
                ("seq".to_string(), "uint32".to_string()),
                ("stamp".to_string(), "time".to_string()),
                ("frame_id".to_string(), "string".to_string()),
            ]
        );
    }

    #[test]
    fn test_constants() {
        let def = MsgDef::parse(
            "uint8 DEBUG=1 # debug level\nstring NAME = hello # not a comment\nint32  X =  -3\nuint8 level\n",
        )
        .unwrap();

        assert_eq!(def.members.len(), 4);
        assert_eq!(
            def.members[0],
            Member::Constant(ConstantDef {
                type_name: "uint8".to_string(),
                constant_name: "DEBUG".to_string(),
                value: "1".to_string(),
            })
        );
        match &def.members[1] {
            Member::Constant(c) => assert_eq!(c.value, "hello # not a comment"),
            other => panic!("expected constant, got {other:?}"),
        }
        match &def.members[2] {
            Member::Constant(c) => assert_eq!(c.value, "-3"),
            other => panic!("expected constant, got {other:?}"),
        }
        assert_eq!(def.fields().count(), 1);
    }

    #[test]
    fn test_scope_resolution() {
        let def = MsgDef::parse(
            "geometry_msgs/Pose pose\n\
             ====\n\
             MSG: geometry_msgs/Pose\n\
             Point position\n\
             ====\n\
             MSG: geometry_msgs/Point\n\
             float64 x\n",
        )
        .unwrap();

        let pose_field = def.fields().next().unwrap();
        let pose = def.embedded_type("nav_msgs", pose_field).unwrap();
        assert_eq!(pose.scope(), "geometry_msgs");

        let position = pose.fields().next().unwrap();
        let point = def.embedded_type(pose.scope(), position).unwrap();
        assert_eq!(point.type_name, "geometry_msgs/Point");

        let missing = FieldDef {
            type_name: "Missing".to_string(),
            array_size: ArraySize::Scalar,
            field_name: "m".to_string(),
        };
        assert!(matches!(
            def.embedded_type("geometry_msgs", &missing),
            Err(BagError::MessageTypeNotFound { .. })
        ));
    }

    #[test]
    fn test_std_msgs_prefix_stripped() {
        let def = MsgDef::parse("std_msgs/String label\nMSG: std_msgs/String\nstring data\n").unwrap();
        let label = def.fields().next().unwrap();
        assert_eq!(label.type_name, "String");
        assert_eq!(def.embedded_type("my_msgs", label).unwrap().type_name, "String");
    }

    #[test]
    fn test_parse_errors() {
        let err = MsgDef::parse("uint32 seq\nfloat32\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 2, .. }));

        let err = MsgDef::parse("float32[x] values\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 1, .. }));

        let err = MsgDef::parse("float32 a b\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 1, .. }));
    }

    #[test]
    fn test_grammar_edge_cases() {
        let def = MsgDef::parse(
            "  # leading comment\r\n\tuint8\tlevel   # tabbed\r\n===\r\nMSG: pkg/Empty\r\n",
        )
        .unwrap();
        assert_eq!(def.fields().count(), 1);
        assert_eq!(def.fields().next().unwrap().field_name, "level");
        assert_eq!(def.embedded_types[0].type_name, "pkg/Empty");
        assert!(def.embedded_types[0].members.is_empty());

        assert_eq!(MsgDef::parse("").unwrap(), MsgDef::default());

        let err = MsgDef::parse("uint8 a\nMSG:\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 2, .. }));

        let err = MsgDef::parse("uint8[2] A=1\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 1, .. }));

        let err = MsgDef::parse("int32 X=   # no value\n").unwrap_err();
        assert!(matches!(err, BagError::MsgDefParse { line: 1, .. }));

        let err = MsgDef::parse("float64[99999999999999999999999] big\n").unwrap_err();
        match err {
            BagError::MsgDefParse { line, reason } => {
                assert_eq!(line, 1);
                assert!(reason.contains("invalid array size"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_primitive_aliases() {
        assert_eq!(PrimitiveType::parse("byte"), Some(PrimitiveType::Int8));
        assert_eq!(PrimitiveType::parse("char"), Some(PrimitiveType::Uint8));
        assert_eq!(PrimitiveType::parse("Header"), None);
        assert_eq!(PrimitiveType::Time.fixed_size(), Some(8));
        assert_eq!(PrimitiveType::String.fixed_size(), None);
    }

    #[test]
    fn test_member_display() {
        let def = MsgDef::parse("float64[36] covariance\nint8 FOO=2\n").unwrap();
        assert_eq!(def.members[0].to_string(), "float64[36] covariance");
        assert_eq!(def.members[1].to_string(), "int8 FOO=2");
    }
}
