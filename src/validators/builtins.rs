//! XSD built-in types
//!
//! The primitive and derived types of the XML Schema namespace that
//! simple type definitions and attribute declarations can refer to.

use crate::error::{Error, Result, ValidationError};
use crate::names::{is_valid_name, is_valid_ncname, is_valid_nmtoken, is_valid_qname};
use crate::validators::facets::WhiteSpace;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap()
});

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d{4,}-\d{2}-\d{2})(Z|[+-]\d{2}:\d{2})?$").unwrap());

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}:\d{2}:\d{2}(\.\d+)?)(Z|[+-]\d{2}:\d{2})?$").unwrap());

static GYEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap());

static GYEAR_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{4,}-(0[1-9]|1[0-2])(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

static GMONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--(0[1-9]|1[0-2])(Z|[+-]\d{2}:\d{2})?$").unwrap());

static GMONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

static GDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^---(0[1-9]|[12]\d|3[01])(Z|[+-]\d{2}:\d{2})?$").unwrap());

// =============================================================================
// XSD Value Representation
// =============================================================================

/// A parsed atomic value, used for enumeration and bound comparisons
#[derive(Debug, Clone, PartialEq)]
pub enum XsdValue {
    /// String-like value
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Decimal value
    Decimal(Decimal),
    /// Integer value
    Integer(i128),
    /// Float or double value
    Double(f64),
    /// Date/time value, normalized to UTC when a timezone is given
    DateTime(NaiveDateTime),
    /// Date value
    Date(NaiveDate),
    /// Time value
    Time(NaiveTime),
    /// Binary value
    Binary(Vec<u8>),
    /// Whitespace separated list
    List(Vec<String>),
}

impl XsdValue {
    /// Order two values of the same kind; `None` when they cannot be ordered
    pub fn compare(&self, other: &XsdValue) -> Option<Ordering> {
        match (self, other) {
            (XsdValue::Decimal(a), XsdValue::Decimal(b)) => Some(a.cmp(b)),
            (XsdValue::Integer(a), XsdValue::Integer(b)) => Some(a.cmp(b)),
            (XsdValue::Double(a), XsdValue::Double(b)) => a.partial_cmp(b),
            (XsdValue::DateTime(a), XsdValue::DateTime(b)) => Some(a.cmp(b)),
            (XsdValue::Date(a), XsdValue::Date(b)) => Some(a.cmp(b)),
            (XsdValue::Time(a), XsdValue::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for XsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XsdValue::String(s) => write!(f, "{}", s),
            XsdValue::Boolean(b) => write!(f, "{}", b),
            XsdValue::Decimal(d) => write!(f, "{}", d),
            XsdValue::Integer(i) => write!(f, "{}", i),
            XsdValue::Double(d) => write!(f, "{}", d),
            XsdValue::DateTime(dt) => write!(f, "{}", dt),
            XsdValue::Date(d) => write!(f, "{}", d),
            XsdValue::Time(t) => write!(f, "{}", t),
            XsdValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
            XsdValue::List(items) => write!(f, "{}", items.join(" ")),
        }
    }
}

// =============================================================================
// Built-in Types
// =============================================================================

/// A built-in type of the XML Schema namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BuiltinType {
    AnyType,
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Boolean,
    Decimal,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Duration,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
    Notation,
}

const ALL_BUILTINS: &[(&str, BuiltinType)] = &[
    ("anyType", BuiltinType::AnyType),
    ("anySimpleType", BuiltinType::AnySimpleType),
    ("string", BuiltinType::String),
    ("normalizedString", BuiltinType::NormalizedString),
    ("token", BuiltinType::Token),
    ("language", BuiltinType::Language),
    ("Name", BuiltinType::Name),
    ("NCName", BuiltinType::NCName),
    ("ID", BuiltinType::Id),
    ("IDREF", BuiltinType::IdRef),
    ("IDREFS", BuiltinType::IdRefs),
    ("ENTITY", BuiltinType::Entity),
    ("ENTITIES", BuiltinType::Entities),
    ("NMTOKEN", BuiltinType::NmToken),
    ("NMTOKENS", BuiltinType::NmTokens),
    ("boolean", BuiltinType::Boolean),
    ("decimal", BuiltinType::Decimal),
    ("integer", BuiltinType::Integer),
    ("long", BuiltinType::Long),
    ("int", BuiltinType::Int),
    ("short", BuiltinType::Short),
    ("byte", BuiltinType::Byte),
    ("nonNegativeInteger", BuiltinType::NonNegativeInteger),
    ("positiveInteger", BuiltinType::PositiveInteger),
    ("nonPositiveInteger", BuiltinType::NonPositiveInteger),
    ("negativeInteger", BuiltinType::NegativeInteger),
    ("unsignedLong", BuiltinType::UnsignedLong),
    ("unsignedInt", BuiltinType::UnsignedInt),
    ("unsignedShort", BuiltinType::UnsignedShort),
    ("unsignedByte", BuiltinType::UnsignedByte),
    ("float", BuiltinType::Float),
    ("double", BuiltinType::Double),
    ("duration", BuiltinType::Duration),
    ("dateTime", BuiltinType::DateTime),
    ("date", BuiltinType::Date),
    ("time", BuiltinType::Time),
    ("gYear", BuiltinType::GYear),
    ("gYearMonth", BuiltinType::GYearMonth),
    ("gMonth", BuiltinType::GMonth),
    ("gMonthDay", BuiltinType::GMonthDay),
    ("gDay", BuiltinType::GDay),
    ("hexBinary", BuiltinType::HexBinary),
    ("base64Binary", BuiltinType::Base64Binary),
    ("anyURI", BuiltinType::AnyUri),
    ("QName", BuiltinType::QName),
    ("NOTATION", BuiltinType::Notation),
];

impl BuiltinType {
    /// Look up a type by its local name in the XSD namespace
    pub fn from_local_name(name: &str) -> Option<Self> {
        ALL_BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
    }

    /// Local name in the XSD namespace
    pub fn name(&self) -> &'static str {
        ALL_BUILTINS
            .iter()
            .find(|(_, t)| t == self)
            .map_or("anyType", |(n, _)| *n)
    }

    /// White space handling applied before validation
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            BuiltinType::String | BuiltinType::AnySimpleType | BuiltinType::AnyType => {
                WhiteSpace::Preserve
            }
            BuiltinType::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Type this one is derived from; `None` only for anyType
    pub fn base(&self) -> Option<BuiltinType> {
        use BuiltinType::*;
        let base = match self {
            AnyType => return None,
            AnySimpleType => AnyType,
            NormalizedString => String,
            Token => NormalizedString,
            Language | Name | NmToken => Token,
            NCName => Name,
            Id | IdRef | Entity => NCName,
            Integer => Decimal,
            Long | NonNegativeInteger | NonPositiveInteger => Integer,
            Int => Long,
            Short => Int,
            Byte => Short,
            PositiveInteger | UnsignedLong => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            NegativeInteger => NonPositiveInteger,
            _ => AnySimpleType,
        };
        Some(base)
    }

    /// True when this type is `other` or derived from it
    pub fn derives_from(&self, other: BuiltinType) -> bool {
        let mut current = Some(*self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.base();
        }
        false
    }

    /// True for list types whose length is counted in items
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            BuiltinType::IdRefs | BuiltinType::Entities | BuiltinType::NmTokens
        )
    }

    /// True for binary types whose length is counted in octets
    pub fn is_binary(&self) -> bool {
        matches!(self, BuiltinType::HexBinary | BuiltinType::Base64Binary)
    }

    /// Normalize and validate a lexical value
    pub fn validate(&self, value: &str) -> Result<XsdValue> {
        let normalized = self.white_space().normalize(value);
        let value = normalized.as_str();
        match self {
            BuiltinType::AnyType | BuiltinType::AnySimpleType | BuiltinType::String => {
                Ok(XsdValue::String(value.to_string()))
            }
            BuiltinType::NormalizedString | BuiltinType::Token | BuiltinType::AnyUri => {
                Ok(XsdValue::String(value.to_string()))
            }
            BuiltinType::Language => matching(&LANGUAGE, value, "language"),
            BuiltinType::Name => lexical(is_valid_name(value), value, "Name"),
            BuiltinType::NCName | BuiltinType::Id | BuiltinType::IdRef | BuiltinType::Entity => {
                lexical(is_valid_ncname(value), value, self.name())
            }
            BuiltinType::NmToken => lexical(is_valid_nmtoken(value), value, "NMTOKEN"),
            BuiltinType::IdRefs | BuiltinType::Entities => list_of(value, self.name(), is_valid_ncname),
            BuiltinType::NmTokens => list_of(value, "NMTOKENS", is_valid_nmtoken),
            BuiltinType::QName | BuiltinType::Notation => {
                lexical(is_valid_qname(value), value, self.name())
            }
            BuiltinType::Boolean => match value {
                "true" | "1" => Ok(XsdValue::Boolean(true)),
                "false" | "0" => Ok(XsdValue::Boolean(false)),
                _ => Err(invalid(value, "boolean")),
            },
            BuiltinType::Decimal => validate_decimal(value),
            BuiltinType::Float | BuiltinType::Double => validate_double(value, self.name()),
            BuiltinType::Duration => validate_duration(value),
            BuiltinType::DateTime => validate_datetime(value),
            BuiltinType::Date => validate_date(value),
            BuiltinType::Time => validate_time(value),
            BuiltinType::GYear => matching(&GYEAR, value, "gYear"),
            BuiltinType::GYearMonth => matching(&GYEAR_MONTH, value, "gYearMonth"),
            BuiltinType::GMonth => matching(&GMONTH, value, "gMonth"),
            BuiltinType::GMonthDay => matching(&GMONTH_DAY, value, "gMonthDay"),
            BuiltinType::GDay => matching(&GDAY, value, "gDay"),
            BuiltinType::HexBinary => validate_hex_binary(value),
            BuiltinType::Base64Binary => validate_base64_binary(value),
            _ => self.validate_integer(value),
        }
    }

    fn validate_integer(&self, value: &str) -> Result<XsdValue> {
        let i: i128 = value.parse().map_err(|_| invalid(value, self.name()))?;
        let (min, max): (i128, i128) = match self {
            BuiltinType::Long => (i64::MIN as i128, i64::MAX as i128),
            BuiltinType::Int => (i32::MIN as i128, i32::MAX as i128),
            BuiltinType::Short => (i16::MIN as i128, i16::MAX as i128),
            BuiltinType::Byte => (i8::MIN as i128, i8::MAX as i128),
            BuiltinType::NonNegativeInteger => (0, i128::MAX),
            BuiltinType::PositiveInteger => (1, i128::MAX),
            BuiltinType::NonPositiveInteger => (i128::MIN, 0),
            BuiltinType::NegativeInteger => (i128::MIN, -1),
            BuiltinType::UnsignedLong => (0, u64::MAX as i128),
            BuiltinType::UnsignedInt => (0, u32::MAX as i128),
            BuiltinType::UnsignedShort => (0, u16::MAX as i128),
            BuiltinType::UnsignedByte => (0, u8::MAX as i128),
            _ => (i128::MIN, i128::MAX),
        };
        if i < min || i > max {
            return Err(Error::Validation(
                ValidationError::new(format!("value '{}' is out of range for xs:{}", value, self.name()))
                    .with_reason(format!("must be {} <= x <= {}", min, max)),
            ));
        }
        Ok(XsdValue::Integer(i))
    }
}

// =============================================================================
// Validator Functions
// =============================================================================

fn invalid(value: &str, type_name: &str) -> Error {
    Error::Validation(ValidationError::new(format!(
        "'{}' is not a valid value of xs:{}",
        value, type_name
    )))
}

fn lexical(ok: bool, value: &str, type_name: &str) -> Result<XsdValue> {
    if ok {
        Ok(XsdValue::String(value.to_string()))
    } else {
        Err(invalid(value, type_name))
    }
}

fn matching(re: &Regex, value: &str, type_name: &str) -> Result<XsdValue> {
    lexical(re.is_match(value), value, type_name)
}

fn list_of(value: &str, type_name: &str, item_ok: fn(&str) -> bool) -> Result<XsdValue> {
    let items: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if items.is_empty() || !items.iter().all(|item| item_ok(item)) {
        return Err(invalid(value, type_name));
    }
    Ok(XsdValue::List(items))
}

fn validate_decimal(value: &str) -> Result<XsdValue> {
    // Decimal's parser also accepts exponents, which xs:decimal does not
    if value.contains(['e', 'E']) {
        return Err(invalid(value, "decimal"));
    }
    value
        .parse::<Decimal>()
        .map(XsdValue::Decimal)
        .map_err(|_| invalid(value, "decimal"))
}

fn validate_double(value: &str, type_name: &str) -> Result<XsdValue> {
    let parsed = match value {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ if value.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => {
            return Err(invalid(value, type_name));
        }
        _ => value.parse().map_err(|_| invalid(value, type_name))?,
    };
    Ok(XsdValue::Double(parsed))
}

fn validate_duration(value: &str) -> Result<XsdValue> {
    let body = value.trim_start_matches('-');
    if !DURATION.is_match(value) || body == "P" || body.ends_with('T') {
        return Err(invalid(value, "duration"));
    }
    Ok(XsdValue::String(value.to_string()))
}

fn validate_datetime(value: &str) -> Result<XsdValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(XsdValue::DateTime(dt.naive_utc()));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(XsdValue::DateTime)
        .map_err(|_| invalid(value, "dateTime"))
}

fn validate_date(value: &str) -> Result<XsdValue> {
    let caps = DATE.captures(value).ok_or_else(|| invalid(value, "date"))?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
        .map(XsdValue::Date)
        .map_err(|_| invalid(value, "date"))
}

fn validate_time(value: &str) -> Result<XsdValue> {
    let caps = TIME.captures(value).ok_or_else(|| invalid(value, "time"))?;
    NaiveTime::parse_from_str(&caps[1], "%H:%M:%S%.f")
        .map(XsdValue::Time)
        .map_err(|_| invalid(value, "time"))
}

fn validate_hex_binary(value: &str) -> Result<XsdValue> {
    if value.len() % 2 != 0 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(value, "hexBinary"));
    }
    let bytes = (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| invalid(value, "hexBinary"))?;
    Ok(XsdValue::Binary(bytes))
}

fn validate_base64_binary(value: &str) -> Result<XsdValue> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(XsdValue::Binary)
        .map_err(|_| invalid(value, "base64Binary"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(t: BuiltinType, v: &str) -> bool {
        t.validate(v).is_ok()
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(BuiltinType::from_local_name("int"), Some(BuiltinType::Int));
        assert_eq!(BuiltinType::from_local_name("ID"), Some(BuiltinType::Id));
        assert_eq!(BuiltinType::from_local_name("nope"), None);
        assert_eq!(BuiltinType::UnsignedShort.name(), "unsignedShort");
    }

    #[test]
    fn test_builtin_derivation() {
        assert!(BuiltinType::UnsignedByte.derives_from(BuiltinType::Integer));
        assert!(BuiltinType::Id.derives_from(BuiltinType::Token));
        assert!(BuiltinType::Date.derives_from(BuiltinType::AnyType));
        assert!(BuiltinType::Decimal.derives_from(BuiltinType::Decimal));
        assert!(!BuiltinType::Decimal.derives_from(BuiltinType::Integer));
        assert!(!BuiltinType::NmTokens.derives_from(BuiltinType::NmToken));
        assert_eq!(BuiltinType::AnyType.base(), None);
    }

    #[test]
    fn test_string_types() {
        assert!(ok(BuiltinType::String, "  any\ttext "));
        assert!(ok(BuiltinType::Token, "  collapsed   text "));
        assert!(ok(BuiltinType::Language, "en-US"));
        assert!(ok(BuiltinType::Language, "english-language-tag"));
        assert!(!ok(BuiltinType::Language, "englishlanguage"));
        assert!(ok(BuiltinType::NCName, "valid_name"));
        assert!(!ok(BuiltinType::NCName, "in:valid"));
        assert!(ok(BuiltinType::QName, "xs:string"));
        assert!(ok(BuiltinType::NmTokens, "a b  c"));
        assert!(!ok(BuiltinType::NmTokens, "   "));
    }

    #[test]
    fn test_numeric_types() {
        assert!(ok(BuiltinType::Integer, " 42 "));
        assert!(ok(BuiltinType::Integer, "+7"));
        assert!(!ok(BuiltinType::Integer, "4.2"));
        assert!(ok(BuiltinType::Byte, "-128"));
        assert!(!ok(BuiltinType::Byte, "128"));
        assert!(!ok(BuiltinType::PositiveInteger, "0"));
        assert!(ok(BuiltinType::UnsignedLong, "18446744073709551615"));
        assert!(ok(BuiltinType::Decimal, "-12.50"));
        assert!(!ok(BuiltinType::Decimal, "1e5"));
        assert!(ok(BuiltinType::Double, "1.5E3"));
        assert!(ok(BuiltinType::Float, "-INF"));
        assert!(!ok(BuiltinType::Float, "infinity"));
        assert!(ok(BuiltinType::Boolean, "1"));
        assert!(!ok(BuiltinType::Boolean, "yes"));
    }

    #[test]
    fn test_date_time_types() {
        assert!(ok(BuiltinType::Date, "2024-02-29"));
        assert!(!ok(BuiltinType::Date, "2023-02-29"));
        assert!(ok(BuiltinType::Date, "2024-01-01Z"));
        assert!(ok(BuiltinType::DateTime, "2024-01-01T10:00:00"));
        assert!(ok(BuiltinType::DateTime, "2024-01-01T10:00:00.5+02:00"));
        assert!(!ok(BuiltinType::DateTime, "2024-01-01"));
        assert!(ok(BuiltinType::Time, "23:59:59"));
        assert!(ok(BuiltinType::Duration, "P1Y2MT3H"));
        assert!(!ok(BuiltinType::Duration, "P"));
        assert!(!ok(BuiltinType::Duration, "P1T"));
        assert!(ok(BuiltinType::GYearMonth, "2024-12"));
        assert!(!ok(BuiltinType::GMonth, "--13"));
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(
            BuiltinType::HexBinary.validate("0aFF").unwrap(),
            XsdValue::Binary(vec![0x0a, 0xff])
        );
        assert!(!ok(BuiltinType::HexBinary, "abc"));
        assert_eq!(
            BuiltinType::Base64Binary.validate("aGVs bG8=").unwrap(),
            XsdValue::Binary(b"hello".to_vec())
        );
        assert!(!ok(BuiltinType::Base64Binary, "***"));
    }

    #[test]
    fn test_compare_values() {
        let a = BuiltinType::Decimal.validate("1.5").unwrap();
        let b = BuiltinType::Decimal.validate("10").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Less));

        let d1 = BuiltinType::Date.validate("2024-01-01").unwrap();
        let d2 = BuiltinType::Date.validate("2023-12-31").unwrap();
        assert_eq!(d1.compare(&d2), Some(Ordering::Greater));

        assert_eq!(a.compare(&d1), None);
    }
}
