use crate::error::{DbError, DbResult};

/// Maximum payload of a string field. Strings are stored fixed-width so
/// the slotted-page arithmetic stays exact: 4 length bytes + this many
/// payload bytes.
pub const STRING_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Bool,
    Int64,
    Float64,
    String,
}

impl Type {
    /// On-page width of a field of this type, in bytes.
    pub fn get_size(&self) -> usize {
        match self {
            Type::Bool => 1,
            Type::Int64 => 8,
            Type::Float64 => 8,
            Type::String => 4 + STRING_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub t: Type,
}

impl Field {
    pub fn new(name: &str, t: Type) -> Self {
        Self {
            name: name.to_string(),
            t,
        }
    }

    pub fn get_type(&self) -> Type {
        self.t
    }
}

/// Ordered field list of a table; the unit the page codec sizes tuples by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// A schema of `columns` int fields, named `c0..cN`. Used heavily by
    /// the tests.
    pub fn small_int(columns: usize) -> Self {
        let fields = (0..columns)
            .map(|i| Field::new(&format!("c{}", i), Type::Int64))
            .collect();
        Self { fields }
    }

    pub fn get_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_field(&self, i: usize) -> DbResult<&Field> {
        self.fields
            .get(i)
            .ok_or_else(|| DbError::invalid_argument(format!("no field {}", i)))
    }

    /// On-page width of one tuple under this schema, in bytes.
    pub fn get_size(&self) -> usize {
        self.fields.iter().map(|f| f.t.get_size()).sum()
    }
}
