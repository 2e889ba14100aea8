//! Field descriptor engine.
//!
//! Every concrete type publishes a static, ordered table of
//! [`FieldDescriptor`]s describing the attributes of its private state, and
//! every class state publishes one for the class block. Generic code reads and
//! writes those attributes by name through [`FieldAccess`], without knowing the
//! concrete type and without any downcast.
//!
//! # Layout
//!
//! ```text
//! describe(type) = RECORD_FIELDS ++ class table ++ type table
//!                  (name, class..)   (MotorState)   (SoftMotor)
//! ```
//!
//! Array fields have rank 1 or 2. Each dimension is either fixed or sized at
//! run time by another integer field of the same record ("varargs"); the
//! length field is always resolved before the array it sizes is touched.
//!
//! # Accessors
//!
//! Descriptor tables are plain `const` data. The matching `get_field` /
//! `set_field` arms are generated by [`field_accessors!`](crate::field_accessors)
//! from a `"name" => member` list, and [`validate_table`] checks at
//! registration time that every descriptor is served by its block.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, MxError, Result};
use crate::record::RecordRef;
use crate::types::{RecordClass, RecordId, Superclass};

// =============================================================================
// Flags
// =============================================================================

/// Behavioral flags of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u32);

impl FieldFlags {
    /// Printed by `print_structure`.
    pub const IN_DESCRIPTION: FieldFlags = FieldFlags(0x1);
    /// Printed by the one-line summary.
    pub const IN_SUMMARY: FieldFlags = FieldFlags(0x2);
    /// Readable but not writable at run time.
    pub const READ_ONLY: FieldFlags = FieldFlags(0x4);
    /// Neither readable nor writable at run time.
    pub const NO_ACCESS: FieldFlags = FieldFlags(0x8);
    /// At least one dimension is sized by another field.
    pub const VARARGS: FieldFlags = FieldFlags(0x10);

    pub const NONE: FieldFlags = FieldFlags(0);

    pub const fn union(self, other: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        self.union(rhs)
    }
}

// =============================================================================
// Reference requirements
// =============================================================================

/// What a reference field requires of the record it points at.
///
/// An empty `classes` slice accepts any class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefRequirement {
    pub superclass: Option<Superclass>,
    pub classes: &'static [RecordClass],
    pub type_name: Option<&'static str>,
}

impl RefRequirement {
    pub const ANY: RefRequirement = RefRequirement {
        superclass: None,
        classes: &[],
        type_name: None,
    };

    pub const fn superclass(superclass: Superclass) -> Self {
        Self {
            superclass: Some(superclass),
            classes: &[],
            type_name: None,
        }
    }

    pub const fn class(superclass: Superclass, classes: &'static [RecordClass]) -> Self {
        Self {
            superclass: Some(superclass),
            classes,
            type_name: None,
        }
    }

    pub const fn with_type(mut self, type_name: &'static str) -> Self {
        self.type_name = Some(type_name);
        self
    }

    /// Checks a target record, describing the first violation found.
    pub fn check(
        &self,
        superclass: Superclass,
        class: RecordClass,
        type_name: &str,
    ) -> std::result::Result<(), String> {
        if let Some(expected) = self.superclass {
            if expected != superclass {
                return Err(format!(
                    "expected superclass {}, actual superclass {}",
                    expected, superclass
                ));
            }
        }
        if !self.classes.is_empty() && !self.classes.contains(&class) {
            let expected: Vec<&str> = self.classes.iter().map(|c| c.name()).collect();
            return Err(format!(
                "expected class {}, actual class {}",
                expected.join(" or "),
                class
            ));
        }
        if let Some(expected) = self.type_name {
            if expected != type_name {
                return Err(format!(
                    "expected type {}, actual type {}",
                    expected, type_name
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    UInt,
    /// Unsigned integer shown in hexadecimal.
    Hex,
    Float,
    Bool,
    Str,
    /// Name of another record, resolved to a [`RecordId`] while linking.
    Record(RefRequirement),
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::UInt => "uint",
            FieldKind::Hex => "hex",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Str => "string",
            FieldKind::Record(_) => "record",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::UInt | FieldKind::Hex)
    }
}

/// One array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    /// Length read at run time from the named integer field.
    Varargs(&'static str),
}

/// Which private-state block holds the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldBlock {
    Record,
    Class,
    Type,
}

/// Static description of one introspectable attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub dims: &'static [Dim],
    pub block: FieldBlock,
    flags: FieldFlags,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind, block: FieldBlock) -> Self {
        Self {
            name,
            kind,
            dims: &[],
            block,
            flags: FieldFlags::NONE,
        }
    }

    pub const fn dims(mut self, dims: &'static [Dim]) -> Self {
        self.dims = dims;
        self
    }

    pub const fn flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_varargs(&self) -> bool {
        self.dims.iter().any(|d| matches!(d, Dim::Varargs(_)))
    }

    /// Declared flags plus `VARARGS` when a dimension is sized at run time.
    pub fn field_flags(&self) -> FieldFlags {
        if self.is_varargs() {
            self.flags | FieldFlags::VARARGS
        } else {
            self.flags
        }
    }

    pub fn has(&self, flag: FieldFlags) -> bool {
        self.field_flags().contains(flag)
    }
}

/// Fields every record publishes, ahead of its class and type blocks.
pub static RECORD_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", FieldKind::Str, FieldBlock::Record).flags(
        FieldFlags::IN_DESCRIPTION
            .union(FieldFlags::IN_SUMMARY)
            .union(FieldFlags::READ_ONLY),
    ),
    FieldDescriptor::new("superclass", FieldKind::Str, FieldBlock::Record)
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::READ_ONLY)),
    FieldDescriptor::new("class", FieldKind::Str, FieldBlock::Record)
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::READ_ONLY)),
    FieldDescriptor::new("type", FieldKind::Str, FieldBlock::Record).flags(
        FieldFlags::IN_DESCRIPTION
            .union(FieldFlags::IN_SUMMARY)
            .union(FieldFlags::READ_ONLY),
    ),
    FieldDescriptor::new("state", FieldKind::Str, FieldBlock::Record)
        .flags(FieldFlags::READ_ONLY),
];

// =============================================================================
// Values
// =============================================================================

/// A typed field value, independent of where it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Int(i64),
    /// Unsigned value above `i64::MAX`; smaller unsigned values read as `Int`.
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Name of a referenced record.
    Record(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    FloatMatrix(Vec<Vec<f64>>),
}

impl FieldValue {
    pub fn label(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::UInt(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::Str(_) => "string",
            FieldValue::Record(_) => "record",
            FieldValue::IntArray(_) => "int array",
            FieldValue::FloatArray(_) => "float array",
            FieldValue::FloatMatrix(_) => "float matrix",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::UInt(v) => i64::try_from(*v).ok(),
            FieldValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Bool(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    /// Any scalar integer, widened so that both signed and unsigned
    /// values survive.
    fn as_wide_integer(&self) -> Option<i128> {
        match self {
            FieldValue::Int(v) => Some(i128::from(*v)),
            FieldValue::UInt(v) => Some(i128::from(*v)),
            FieldValue::Bool(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            FieldValue::Int(v) => Some(*v != 0),
            FieldValue::UInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) | FieldValue::Record(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value can be stored in a field of the given kind and rank.
    pub fn fits(&self, kind: &FieldKind, rank: usize) -> bool {
        match (rank, self) {
            (0, FieldValue::Int(_)) => kind.is_integer() || *kind == FieldKind::Float,
            (0, FieldValue::UInt(_)) => {
                matches!(kind, FieldKind::UInt | FieldKind::Hex | FieldKind::Float)
            }
            (0, FieldValue::Float(_)) => *kind == FieldKind::Float,
            (0, FieldValue::Bool(_)) => *kind == FieldKind::Bool,
            (0, FieldValue::Str(_)) => matches!(kind, FieldKind::Str | FieldKind::Record(_)),
            (0, FieldValue::Record(_)) => matches!(kind, FieldKind::Record(_)),
            (1, FieldValue::IntArray(_)) => kind.is_integer() || *kind == FieldKind::Float,
            (1, FieldValue::FloatArray(_)) => *kind == FieldKind::Float,
            (2, FieldValue::FloatMatrix(_)) => *kind == FieldKind::Float,
            _ => false,
        }
    }
}

fn wrong_kind(field: &str, expected: &str, value: &FieldValue) -> MxError {
    MxError::illegal_argument(
        "set_field",
        format!(
            "field '{}' expects {}, got {}",
            field,
            expected,
            value.label()
        ),
    )
}

/// Error for a name that the accessor list does not serve.
pub fn unknown_field(owner: &str, field: &str) -> MxError {
    MxError::not_found("field", format!("{} has no field named '{}'", owner, field))
}

// =============================================================================
// Typed conversion
// =============================================================================

/// Conversion between a Rust member and a [`FieldValue`].
pub trait FieldType: Sized {
    fn to_value(&self) -> FieldValue;

    fn from_value(value: FieldValue, field: &str) -> Result<Self>;

    /// Stores a resolved record id; only reference members accept one.
    fn bind(&mut self, _id: RecordId, field: &str) -> Result<()> {
        Err(MxError::corrupt_state(
            "bind_reference",
            format!("field '{}' is not a record reference", field),
        ))
    }
}

fn integer_from_value<T: TryFrom<i128>>(value: FieldValue, field: &str) -> Result<T> {
    let raw = value
        .as_wide_integer()
        .ok_or_else(|| wrong_kind(field, "an integer", &value))?;
    T::try_from(raw).map_err(|_| {
        MxError::illegal_argument(
            "set_field",
            format!("value {} does not fit field '{}'", raw, field),
        )
    })
}

macro_rules! signed_field_type {
    ($($ty:ty),*) => {
        $(
            impl FieldType for $ty {
                fn to_value(&self) -> FieldValue {
                    FieldValue::Int(i64::from(*self))
                }

                fn from_value(value: FieldValue, field: &str) -> Result<Self> {
                    integer_from_value(value, field)
                }
            }
        )*
    };
}

macro_rules! unsigned_field_type {
    ($($ty:ty),*) => {
        $(
            impl FieldType for $ty {
                fn to_value(&self) -> FieldValue {
                    // Widening an unsigned integer to u128 is lossless.
                    let wide = *self as u128;
                    match i64::try_from(wide) {
                        Ok(v) => FieldValue::Int(v),
                        Err(_) => FieldValue::UInt(u64::try_from(wide).unwrap_or(u64::MAX)),
                    }
                }

                fn from_value(value: FieldValue, field: &str) -> Result<Self> {
                    integer_from_value(value, field)
                }
            }
        )*
    };
}

signed_field_type!(i32, i64);
unsigned_field_type!(u8, u16, u32, u64, usize);

impl FieldType for f64 {
    fn to_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| wrong_kind(field, "a number", &value))
    }
}

impl FieldType for bool {
    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| wrong_kind(field, "a boolean", &value))
    }
}

impl FieldType for String {
    fn to_value(&self) -> FieldValue {
        FieldValue::Str(self.clone())
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        match value {
            FieldValue::Str(s) => Ok(s),
            other => Err(wrong_kind(field, "a string", &other)),
        }
    }
}

impl FieldType for RecordRef {
    fn to_value(&self) -> FieldValue {
        FieldValue::Record(self.name().to_string())
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        match value {
            FieldValue::Record(name) | FieldValue::Str(name) => Ok(RecordRef::unresolved(name)),
            other => Err(wrong_kind(field, "a record name", &other)),
        }
    }

    fn bind(&mut self, id: RecordId, _field: &str) -> Result<()> {
        self.resolve(id);
        Ok(())
    }
}

impl FieldType for Vec<f64> {
    fn to_value(&self) -> FieldValue {
        FieldValue::FloatArray(self.clone())
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        match value {
            FieldValue::FloatArray(v) => Ok(v),
            FieldValue::IntArray(v) => Ok(v.into_iter().map(|x| x as f64).collect()),
            other => Err(wrong_kind(field, "a float array", &other)),
        }
    }
}

impl FieldType for Vec<i64> {
    fn to_value(&self) -> FieldValue {
        FieldValue::IntArray(self.clone())
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        match value {
            FieldValue::IntArray(v) => Ok(v),
            other => Err(wrong_kind(field, "an integer array", &other)),
        }
    }
}

impl FieldType for Vec<Vec<f64>> {
    fn to_value(&self) -> FieldValue {
        FieldValue::FloatMatrix(self.clone())
    }

    fn from_value(value: FieldValue, field: &str) -> Result<Self> {
        match value {
            FieldValue::FloatMatrix(v) => Ok(v),
            other => Err(wrong_kind(field, "a float matrix", &other)),
        }
    }
}

// =============================================================================
// Access
// =============================================================================

/// Name-based access to the members of one private-state block.
///
/// Implemented with [`field_accessors!`](crate::field_accessors).
pub trait FieldAccess {
    fn get_field(&self, name: &str) -> Result<FieldValue>;

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()>;

    fn bind_reference(&mut self, name: &str, id: RecordId) -> Result<()>;
}

/// Generates a [`FieldAccess`] impl from a `"field" => member` list.
///
/// ```rust,ignore
/// field_accessors!(SoftMotor {
///     "speed" => speed,
///     "simulated_position" => simulated_position,
/// });
/// ```
#[macro_export]
macro_rules! field_accessors {
    ($ty:ty { $($name:literal => $member:ident),* $(,)? }) => {
        impl $crate::field::FieldAccess for $ty {
            fn get_field(&self, name: &str) -> $crate::error::Result<$crate::field::FieldValue> {
                match name {
                    $($name => Ok($crate::field::FieldType::to_value(&self.$member)),)*
                    _ => Err($crate::field::unknown_field(stringify!($ty), name)),
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::field::FieldValue,
            ) -> $crate::error::Result<()> {
                let _ = &value;
                match name {
                    $($name => {
                        self.$member = $crate::field::FieldType::from_value(value, name)?;
                        Ok(())
                    })*
                    _ => Err($crate::field::unknown_field(stringify!($ty), name)),
                }
            }

            fn bind_reference(
                &mut self,
                name: &str,
                id: $crate::types::RecordId,
            ) -> $crate::error::Result<()> {
                let _ = id;
                match name {
                    $($name => $crate::field::FieldType::bind(&mut self.$member, id, name),)*
                    _ => Err($crate::field::unknown_field(stringify!($ty), name)),
                }
            }
        }
    };
}

// =============================================================================
// Table checks and array shaping
// =============================================================================

/// Checks one type's concatenated descriptor table.
///
/// `serves` reports whether the block named by a descriptor answers to the
/// descriptor's name; it is the safe counterpart of an offset-in-bounds check.
pub fn validate_table<'a>(
    type_name: &str,
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    serves: impl Fn(&FieldDescriptor) -> bool,
) -> Result<()> {
    const OP: &str = "validate_table";
    let mut seen: Vec<&FieldDescriptor> = Vec::new();

    for field in fields {
        if seen.iter().any(|f| f.name == field.name) {
            return Err(MxError::illegal_argument(
                OP,
                format!("type '{}' declares field '{}' twice", type_name, field.name),
            ));
        }
        if field.rank() > 2 {
            return Err(MxError::illegal_argument(
                OP,
                format!(
                    "field '{}' of type '{}' has rank {}, at most 2 is supported",
                    field.name,
                    type_name,
                    field.rank()
                ),
            ));
        }
        if matches!(field.kind, FieldKind::Record(_)) && field.rank() != 0 {
            return Err(MxError::illegal_argument(
                OP,
                format!(
                    "reference field '{}' of type '{}' must be a scalar",
                    field.name, type_name
                ),
            ));
        }
        for dim in field.dims {
            if let Dim::Varargs(source) = dim {
                let length = seen.iter().find(|f| f.name == *source).ok_or_else(|| {
                    MxError::illegal_argument(
                        OP,
                        format!(
                            "field '{}' of type '{}' is sized by '{}', which is not declared before it",
                            field.name, type_name, source
                        ),
                    )
                })?;
                if !length.kind.is_integer() || length.rank() != 0 {
                    return Err(MxError::illegal_argument(
                        OP,
                        format!(
                            "length field '{}' of type '{}' must be a scalar integer",
                            source, type_name
                        ),
                    ));
                }
            }
        }
        if field.block != FieldBlock::Record && !serves(field) {
            return Err(MxError::corrupt_state(
                OP,
                format!(
                    "field '{}' of type '{}' is not served by its {:?} block",
                    field.name, type_name, field.block
                ),
            ));
        }
        seen.push(field);
    }
    Ok(())
}

/// Shapes an array value written to a field with run-time lengths `lengths`.
///
/// Longer input is rejected with `OutOfRange`; shorter input is zero-filled.
pub fn fit_array(field: &FieldDescriptor, value: FieldValue, lengths: &[usize]) -> Result<FieldValue> {
    let too_long = |got: usize, max: usize| {
        MxError::out_of_range(
            "write_field",
            format!(
                "{} elements written to field '{}', whose length is {}",
                got, field.name, max
            ),
        )
    };

    match (value, lengths) {
        (FieldValue::FloatArray(mut v), [len]) => {
            if v.len() > *len {
                return Err(too_long(v.len(), *len));
            }
            v.resize(*len, 0.0);
            Ok(FieldValue::FloatArray(v))
        }
        (FieldValue::IntArray(v), [len]) if field.kind == FieldKind::Float => {
            fit_array(
                field,
                FieldValue::FloatArray(v.into_iter().map(|x| x as f64).collect()),
                &[*len],
            )
        }
        (FieldValue::IntArray(mut v), [len]) => {
            if v.len() > *len {
                return Err(too_long(v.len(), *len));
            }
            v.resize(*len, 0);
            Ok(FieldValue::IntArray(v))
        }
        (FieldValue::FloatMatrix(mut rows), [nrows, ncols]) => {
            if rows.len() > *nrows {
                return Err(too_long(rows.len(), *nrows));
            }
            for row in rows.iter_mut() {
                if row.len() > *ncols {
                    return Err(too_long(row.len(), *ncols));
                }
                row.resize(*ncols, 0.0);
            }
            rows.resize(*nrows, vec![0.0; *ncols]);
            Ok(FieldValue::FloatMatrix(rows))
        }
        (other, _) => Err(MxError::new(
            ErrorKind::IllegalArgument,
            "write_field",
            format!(
                "field '{}' is a rank {} {} array, got {}",
                field.name,
                field.rank(),
                field.kind.label(),
                other.label()
            ),
        )),
    }
}

/// Trims or pads a stored array to the run-time lengths before it is returned.
pub fn view_array(value: FieldValue, lengths: &[usize]) -> FieldValue {
    match (value, lengths) {
        (FieldValue::FloatArray(mut v), [len]) => {
            v.resize(*len, 0.0);
            FieldValue::FloatArray(v)
        }
        (FieldValue::IntArray(mut v), [len]) => {
            v.resize(*len, 0);
            FieldValue::IntArray(v)
        }
        (FieldValue::FloatMatrix(mut rows), [nrows, ncols]) => {
            for row in rows.iter_mut() {
                row.resize(*ncols, 0.0);
            }
            rows.resize(*nrows, vec![0.0; *ncols]);
            FieldValue::FloatMatrix(rows)
        }
        (other, _) => other,
    }
}

/// Human-readable rendering of a value, honouring `Hex`.
pub fn format_value(field: &FieldDescriptor, value: &FieldValue) -> String {
    match value {
        FieldValue::Int(v) if field.kind == FieldKind::Hex => format!("{:#x}", v),
        FieldValue::Int(v) => v.to_string(),
        FieldValue::UInt(v) if field.kind == FieldKind::Hex => format!("{:#x}", v),
        FieldValue::UInt(v) => v.to_string(),
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Str(s) => format!("\"{}\"", s),
        FieldValue::Record(name) => name.clone(),
        FieldValue::IntArray(v) => {
            let items: Vec<String> = v
                .iter()
                .map(|x| {
                    if field.kind == FieldKind::Hex {
                        format!("{:#x}", x)
                    } else {
                        x.to_string()
                    }
                })
                .collect();
            format!("[{}]", items.join(", "))
        }
        FieldValue::FloatArray(v) => {
            let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        FieldValue::FloatMatrix(rows) => format!(
            "<{} x {} matrix>",
            rows.len(),
            rows.first().map_or(0, Vec::len)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        count: u32,
        gain: f64,
        label: String,
        data: Vec<f64>,
        target: RecordRef,
    }

    crate::field_accessors!(Sample {
        "count" => count,
        "gain" => gain,
        "label" => label,
        "data" => data,
        "target" => target,
    });

    static SAMPLE_FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::new("count", FieldKind::UInt, FieldBlock::Type),
        FieldDescriptor::new("gain", FieldKind::Float, FieldBlock::Type),
        FieldDescriptor::new("label", FieldKind::Str, FieldBlock::Type),
        FieldDescriptor::new("data", FieldKind::Float, FieldBlock::Type)
            .dims(&[Dim::Varargs("count")]),
        FieldDescriptor::new("target", FieldKind::Record(RefRequirement::ANY), FieldBlock::Type),
    ];

    fn sample() -> Sample {
        Sample {
            count: 4,
            gain: 1.0,
            label: String::new(),
            data: Vec::new(),
            target: RecordRef::default(),
        }
    }

    #[test]
    fn test_accessors_round_trip_scalars() {
        let mut s = sample();
        s.set_field("gain", FieldValue::Float(2.5)).unwrap();
        s.set_field("label", FieldValue::Str("x".into())).unwrap();
        s.set_field("count", FieldValue::Int(7)).unwrap();
        assert_eq!(s.get_field("gain").unwrap(), FieldValue::Float(2.5));
        assert_eq!(s.get_field("label").unwrap(), FieldValue::Str("x".into()));
        assert_eq!(s.get_field("count").unwrap(), FieldValue::Int(7));
    }

    #[test]
    fn test_accessors_reject_wrong_kind_and_unknown_name() {
        let mut s = sample();
        let err = s.set_field("gain", FieldValue::Str("loud".into())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        let err = s.get_field("volume").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = s.set_field("count", FieldValue::Int(-1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn test_bind_only_accepts_references() {
        let mut s = sample();
        s.set_field("target", FieldValue::Record("motor1".into())).unwrap();
        s.bind_reference("target", RecordId(3)).unwrap();
        assert_eq!(s.target.resolved(), Some(RecordId(3)));
        let err = s.bind_reference("gain", RecordId(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
    }

    #[test]
    fn test_validate_table_accepts_sample() {
        let s = sample();
        validate_table("sample", SAMPLE_FIELDS, |f| s.get_field(f.name).is_ok()).unwrap();
    }

    #[test]
    fn test_validate_table_rejects_bad_tables() {
        static DUPLICATE: &[FieldDescriptor] = &[
            FieldDescriptor::new("a", FieldKind::Int, FieldBlock::Type),
            FieldDescriptor::new("a", FieldKind::Int, FieldBlock::Type),
        ];
        static LATE_LENGTH: &[FieldDescriptor] = &[
            FieldDescriptor::new("data", FieldKind::Float, FieldBlock::Type)
                .dims(&[Dim::Varargs("n")]),
            FieldDescriptor::new("n", FieldKind::Int, FieldBlock::Type),
        ];
        static FLOAT_LENGTH: &[FieldDescriptor] = &[
            FieldDescriptor::new("n", FieldKind::Float, FieldBlock::Type),
            FieldDescriptor::new("data", FieldKind::Float, FieldBlock::Type)
                .dims(&[Dim::Varargs("n")]),
        ];
        assert!(validate_table("t", DUPLICATE, |_| true).is_err());
        assert!(validate_table("t", LATE_LENGTH, |_| true).is_err());
        assert!(validate_table("t", FLOAT_LENGTH, |_| true).is_err());

        let err = validate_table("t", SAMPLE_FIELDS, |f| f.name != "label").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
    }

    #[test]
    fn test_fit_array_zero_fills_and_rejects_overflow() {
        let field = &SAMPLE_FIELDS[3];
        let fitted = fit_array(field, FieldValue::FloatArray(vec![1.0, 2.0]), &[4]).unwrap();
        assert_eq!(fitted, FieldValue::FloatArray(vec![1.0, 2.0, 0.0, 0.0]));

        let err = fit_array(field, FieldValue::FloatArray(vec![0.0; 5]), &[4]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn test_fit_matrix_pads_rows_and_columns() {
        static MATRIX: FieldDescriptor = FieldDescriptor::new("m", FieldKind::Float, FieldBlock::Class)
            .dims(&[Dim::Fixed(2), Dim::Fixed(3)]);
        let fitted = fit_array(&MATRIX, FieldValue::FloatMatrix(vec![vec![1.0]]), &[2, 3]).unwrap();
        assert_eq!(
            fitted,
            FieldValue::FloatMatrix(vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]])
        );
    }

    #[test]
    fn test_varargs_flag_is_derived() {
        assert!(SAMPLE_FIELDS[3].has(FieldFlags::VARARGS));
        assert!(!SAMPLE_FIELDS[0].has(FieldFlags::VARARGS));
    }

    #[test]
    fn test_requirement_check_messages() {
        let req = RefRequirement::class(Superclass::Interface, &[RecordClass::Generic]);
        let msg = req
            .check(Superclass::Interface, RecordClass::Controller, "soft_dio_controller")
            .unwrap_err();
        assert!(msg.contains("generic"));
        assert!(msg.contains("controller"));
        assert!(req
            .check(Superclass::Interface, RecordClass::Generic, "mc6821")
            .is_ok());
    }

    #[test]
    fn test_format_hex() {
        let field = FieldDescriptor::new("base", FieldKind::Hex, FieldBlock::Type);
        assert_eq!(format_value(&field, &FieldValue::Int(255)), "0xff");
        assert_eq!(
            format_value(&field, &FieldValue::UInt(u64::MAX)),
            "0xffffffffffffffff"
        );
    }

    #[test]
    fn test_unsigned_values_above_signed_range_keep_their_magnitude() {
        assert_eq!(u64::MAX.to_value(), FieldValue::UInt(u64::MAX));
        assert_eq!((1u64 << 63).to_value(), FieldValue::UInt(1 << 63));
        assert_eq!(42u64.to_value(), FieldValue::Int(42));

        assert_eq!(u64::from_value(FieldValue::UInt(u64::MAX), "mask").unwrap(), u64::MAX);
        assert_eq!(u64::from_value(FieldValue::Int(42), "mask").unwrap(), 42);

        let err = i64::from_value(FieldValue::UInt(u64::MAX), "offset").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        let err = u32::from_value(FieldValue::UInt(1 << 40), "count").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        let err = u64::from_value(FieldValue::Int(-1), "mask").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn test_unsigned_value_fits_only_unsigned_kinds() {
        let value = FieldValue::UInt(u64::MAX);
        assert!(value.fits(&FieldKind::UInt, 0));
        assert!(value.fits(&FieldKind::Hex, 0));
        assert!(!value.fits(&FieldKind::Int, 0));
        assert_eq!(value.as_i64(), None);
        assert_eq!(value.as_u64(), Some(u64::MAX));
    }
}
