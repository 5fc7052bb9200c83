use std::{cmp::Ordering, io::Read};

use crate::{
    error::{DbError, DbResult},
    io::{read_exact, read_into, TinyWriter},
    storage::schema::{Type, STRING_LEN},
};

/// A single field value. Cells are encoded fixed-width according to the
/// field's declared `Type` so tuples keep a constant on-page size.
#[derive(Debug, Clone)]
pub enum Cell {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl Cell {
    pub fn new_bool(v: bool) -> Self {
        Cell::Bool(v)
    }

    pub fn new_int64(v: i64) -> Self {
        Cell::Int64(v)
    }

    pub fn new_float64(v: f64) -> Self {
        Cell::Float64(v)
    }

    pub fn new_string(v: &str) -> Self {
        Cell::String(v.to_string())
    }

    pub fn get_type(&self) -> Type {
        match self {
            Cell::Bool(_) => Type::Bool,
            Cell::Int64(_) => Type::Int64,
            Cell::Float64(_) => Type::Float64,
            Cell::String(_) => Type::String,
        }
    }

    pub fn get_bool(&self) -> DbResult<bool> {
        match self {
            Cell::Bool(v) => Ok(*v),
            _ => Err(DbError::invalid_argument(format!("not a bool: {:?}", self))),
        }
    }

    pub fn get_int64(&self) -> DbResult<i64> {
        match self {
            Cell::Int64(v) => Ok(*v),
            _ => Err(DbError::invalid_argument(format!("not an int: {:?}", self))),
        }
    }

    pub fn get_float64(&self) -> DbResult<f64> {
        match self {
            Cell::Float64(v) => Ok(*v),
            _ => Err(DbError::invalid_argument(format!("not a float: {:?}", self))),
        }
    }

    pub fn get_string(&self) -> DbResult<String> {
        match self {
            Cell::String(v) => Ok(v.clone()),
            _ => Err(DbError::invalid_argument(format!(
                "not a string: {:?}",
                self
            ))),
        }
    }

    /// Fixed-width encoding: strings are a 4-byte length followed by the
    /// payload padded with zeros to `STRING_LEN`.
    pub fn write_to(&self, writer: &mut TinyWriter) {
        match self {
            Cell::Bool(v) => writer.write(v),
            Cell::Int64(v) => writer.write(v),
            Cell::Float64(v) => writer.write(v),
            Cell::String(v) => {
                let bytes = v.as_bytes();
                writer.write(&(bytes.len() as u32));

                let mut payload = bytes.to_vec();
                payload.resize(STRING_LEN, 0);
                writer.write_bytes(&payload);
            }
        }
    }

    pub fn read_from<R: Read>(reader: &mut R, t: &Type) -> DbResult<Self> {
        match t {
            Type::Bool => Ok(Cell::Bool(read_into(reader)?)),
            Type::Int64 => Ok(Cell::Int64(read_into(reader)?)),
            Type::Float64 => Ok(Cell::Float64(read_into(reader)?)),
            Type::String => {
                let len: u32 = read_into(reader)?;
                if len as usize > STRING_LEN {
                    return Err(DbError::invalid_argument(format!(
                        "string length {} exceeds {}",
                        len, STRING_LEN
                    )));
                }

                let payload = read_exact(reader, STRING_LEN)?;
                let v = String::from_utf8(payload[..len as usize].to_vec())
                    .map_err(|e| DbError::invalid_argument(format!("invalid utf8: {}", e)))?;
                Ok(Cell::String(v))
            }
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            (Cell::Int64(a), Cell::Int64(b)) => a == b,
            (Cell::Float64(a), Cell::Float64(b)) => a == b,
            (Cell::String(a), Cell::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a.partial_cmp(b),
            (Cell::Int64(a), Cell::Int64(b)) => a.partial_cmp(b),
            (Cell::Float64(a), Cell::Float64(b)) => a.partial_cmp(b),
            (Cell::String(a), Cell::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
