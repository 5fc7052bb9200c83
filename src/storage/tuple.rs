use std::{fmt, io::Read};

use crate::{
    error::{DbError, DbResult},
    heap::HeapPageID,
    io::TinyWriter,
    storage::{cell::Cell, schema::Schema},
};

/// The physical address of a tuple: the page it lives on and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordID {
    pub pid: HeapPageID,
    pub slot: usize,
}

impl RecordID {
    pub fn new(pid: HeapPageID, slot: usize) -> Self {
        Self { pid, slot }
    }
}

/// An ordered row of cells. The record id is present only while the tuple
/// is resident on a page; it is stamped on insert and by the page
/// iterator.
#[derive(Clone)]
pub struct Tuple {
    cells: Vec<Cell>,
    record_id: Option<RecordID>,
}

impl Tuple {
    pub fn new(cells: &[Cell]) -> Self {
        Self {
            cells: cells.to_vec(),
            record_id: None,
        }
    }

    /// A tuple of `columns` identical int cells; test helper.
    pub fn new_int_tuples(value: i64, columns: usize) -> Self {
        let cells = vec![Cell::Int64(value); columns];
        Self::new(&cells)
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    pub fn get_cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get_record_id(&self) -> Option<RecordID> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordID>) {
        self.record_id = rid;
    }

    /// Check that the cells line up with `schema`, position by position.
    pub fn check_schema(&self, schema: &Schema) -> DbResult<()> {
        if self.cells.len() != schema.fields_count() {
            return Err(DbError::storage(format!(
                "tuple has {} cells, schema has {} fields",
                self.cells.len(),
                schema.fields_count()
            )));
        }

        for (i, cell) in self.cells.iter().enumerate() {
            let expect = schema.get_field(i)?.get_type();
            if cell.get_type() != expect {
                return Err(DbError::storage(format!(
                    "field {} is {:?}, schema expects {:?}",
                    i,
                    cell.get_type(),
                    expect
                )));
            }

            // strings are stored fixed-width; an oversized one cannot be
            // represented
            if let Cell::String(v) = cell {
                if v.len() > crate::storage::schema::STRING_LEN {
                    return Err(DbError::storage(format!(
                        "field {} is {} bytes, strings are capped at {}",
                        i,
                        v.len(),
                        crate::storage::schema::STRING_LEN
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn write_to(&self, writer: &mut TinyWriter) {
        for cell in &self.cells {
            cell.write_to(writer);
        }
    }

    pub fn read_from<R: Read>(reader: &mut R, schema: &Schema) -> DbResult<Self> {
        let mut cells = Vec::with_capacity(schema.fields_count());
        for field in schema.get_fields() {
            cells.push(Cell::read_from(reader, &field.get_type())?);
        }
        Ok(Self::new(&cells))
    }
}

impl PartialEq for Tuple {
    /// Record ids are deliberately ignored: two tuples are equal when
    /// their cells are.
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut content = "{".to_owned();
        for cell in &self.cells {
            content.push_str(&format!("{:?}, ", cell));
        }
        if content.len() > 1 {
            content.truncate(content.len() - 2);
        }
        content.push('}');
        write!(f, "{}", content)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
