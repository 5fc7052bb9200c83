use std::io::Cursor;

use bit_vec::BitVec;

use crate::{
    error::{DbError, DbResult},
    heap::{buffer_pool::BufferPool, page_id::HeapPageID},
    io::TinyWriter,
    storage::{RecordID, Schema, Tuple},
    transaction::TransactionID,
};

/// Registry of concrete page variants, keyed by the class names stored in
/// UPDATE records. Only heap pages exist today; recovery refuses names it
/// does not know instead of reflecting on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Heap,
}

impl PageKind {
    pub fn page_name(&self) -> &'static str {
        match self {
            PageKind::Heap => "HeapPage",
        }
    }

    pub fn id_name(&self) -> &'static str {
        match self {
            PageKind::Heap => "HeapPageID",
        }
    }

    pub fn from_names(page_name: &str, id_name: &str) -> DbResult<Self> {
        match (page_name, id_name) {
            ("HeapPage", "HeapPageID") => Ok(PageKind::Heap),
            _ => Err(DbError::invalid_argument(format!(
                "unknown page variant: {} / {}",
                page_name, id_name
            ))),
        }
    }

    pub fn construct_pid(&self, args: &[i32]) -> DbResult<HeapPageID> {
        match self {
            PageKind::Heap => HeapPageID::from_args(args),
        }
    }
}

/// A fixed-size slotted page.
///
/// On disk: a `⌈slot_count/8⌉`-byte occupancy bitmap (bit i set = slot i
/// holds a tuple), then `slot_count` fixed-width tuple records, then zero
/// padding up to the page size. `slot_count` is chosen so that each tuple
/// plus its header bit fits: `⌊page_size·8 / (tuple_size·8 + 1)⌋`.
pub struct HeapPage {
    pid: HeapPageID,
    schema: Schema,

    slot_count: usize,

    // indicate slots' status: true means occupied, false means empty
    header: BitVec,

    tuples: Vec<Option<Tuple>>,

    // snapshot taken at load time and re-taken after each commit of this
    // page; the undo half of every UPDATE record
    before_image: Vec<u8>,

    // id of the transaction that most recently mutated this page under
    // an exclusive lock, if any
    dirtier: Option<TransactionID>,
}

impl HeapPage {
    pub fn new(pid: &HeapPageID, bytes: &[u8], schema: &Schema) -> DbResult<Self> {
        let page_size = BufferPool::get_page_size();
        if bytes.len() != page_size {
            return Err(DbError::invalid_argument(format!(
                "page {} has {} bytes, expected {}",
                pid,
                bytes.len(),
                page_size
            )));
        }

        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);
        let tuple_size = schema.get_size();

        let header = BitVec::from_bytes(&bytes[..header_size]);

        let mut tuples = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            if header.get(i).unwrap_or(false) {
                let start = header_size + i * tuple_size;
                let mut reader = Cursor::new(&bytes[start..start + tuple_size]);
                let mut tuple = Tuple::read_from(&mut reader, schema)?;
                tuple.set_record_id(Some(RecordID::new(*pid, i)));
                tuples.push(Some(tuple));
            } else {
                tuples.push(None);
            }
        }

        Ok(Self {
            pid: *pid,
            schema: schema.clone(),
            slot_count,
            header,
            tuples,
            before_image: bytes.to_vec(),
            dirtier: None,
        })
    }

    pub fn empty_page_data() -> Vec<u8> {
        vec![0; BufferPool::get_page_size()]
    }

    /// Maximum number of tuples a page can hold under `schema`: each
    /// tuple costs its fixed width plus one header bit.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_tuple = schema.get_size() * 8 + 1;
        BufferPool::get_page_size() * 8 / bits_per_tuple
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        (slot_count + 7) / 8
    }

    pub fn get_pid(&self) -> HeapPageID {
        self.pid
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header.get(slot).unwrap_or(false)
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count)
            .filter(|i| !self.is_slot_used(*i))
            .count()
    }

    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Serialize the page. Free slots are written as zeros, so a
    /// re-encoded page always round-trips byte-for-byte.
    pub fn get_page_data(&self) -> Vec<u8> {
        let page_size = BufferPool::get_page_size();
        let tuple_size = self.schema.get_size();

        let mut writer = TinyWriter::new();
        writer.write_bytes(&self.header.to_bytes()[..Self::calculate_header_size(self.slot_count)]);

        let zeros = vec![0u8; tuple_size];
        for slot in &self.tuples {
            match slot {
                Some(tuple) => tuple.write_to(&mut writer),
                None => writer.write_bytes(&zeros),
            }
        }

        writer.to_padded_bytes(page_size)
    }

    /// Place `tuple` in the first free slot, stamping its record id.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> DbResult<RecordID> {
        tuple.check_schema(&self.schema)?;

        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                let rid = RecordID::new(self.pid, i);

                let mut stored = tuple.clone();
                stored.set_record_id(Some(rid));

                self.header.set(i, true);
                self.tuples[i] = Some(stored);
                return Ok(rid);
            }
        }

        Err(DbError::storage(format!("page {} is full", self.pid)))
    }

    /// Clear the slot; the tuple's bytes become garbage.
    pub fn delete_tuple(&mut self, slot: usize) -> DbResult<()> {
        if slot >= self.slot_count {
            return Err(DbError::invalid_argument(format!(
                "slot {} out of range (page has {})",
                slot, self.slot_count
            )));
        }
        if !self.is_slot_used(slot) {
            return Err(DbError::storage(format!(
                "slot {} of {} is already empty",
                slot, self.pid
            )));
        }

        self.header.set(slot, false);
        self.tuples[slot] = None;
        Ok(())
    }

    /// Occupied tuples in slot order, record ids attached.
    pub fn iter(&self) -> impl Iterator<Item = Tuple> + '_ {
        self.tuples.iter().filter_map(|slot| slot.clone())
    }

    pub fn set_before_image(&mut self) {
        self.before_image = self.get_page_data();
    }

    pub fn get_before_image(&self) -> Vec<u8> {
        self.before_image.clone()
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionID>) {
        self.dirtier = tid;
    }

    pub fn dirtied_by(&self) -> Option<TransactionID> {
        self.dirtier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Cell, Field, Type};

    fn int_string_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Type::Int64),
            Field::new("name", Type::String),
        ])
    }

    #[test]
    fn test_slot_count_math() {
        // 2 ints = 16 bytes = 128 bits; plus the header bit -> 129 bits
        // per tuple; 4096 * 8 / 129 = 254
        let schema = Schema::small_int(2);
        assert_eq!(HeapPage::calculate_slots_count(&schema), 254);
        assert_eq!(HeapPage::calculate_header_size(254), 32);
        assert_eq!(HeapPage::calculate_header_size(8), 1);
        assert_eq!(HeapPage::calculate_header_size(9), 2);
    }

    #[test]
    fn test_codec_round_trip() {
        let schema = int_string_schema();
        let pid = HeapPageID::new(1, 0);

        let mut page = HeapPage::new(&pid, &HeapPage::empty_page_data(), &schema).unwrap();
        page.insert_tuple(&Tuple::new(&[Cell::new_int64(1), Cell::new_string("a")]))
            .unwrap();
        page.insert_tuple(&Tuple::new(&[Cell::new_int64(2), Cell::new_string("b")]))
            .unwrap();

        let data = page.get_page_data();
        let reloaded = HeapPage::new(&pid, &data, &schema).unwrap();

        assert_eq!(reloaded.tuples_count(), 2);
        assert_eq!(reloaded.get_page_data(), data);

        let rows: Vec<Tuple> = reloaded.iter().collect();
        assert_eq!(rows[0].get_cell(0).get_int64().unwrap(), 1);
        assert_eq!(rows[1].get_cell(1).get_string().unwrap(), "b");
        assert_eq!(rows[1].get_record_id().unwrap().slot, 1);
    }

    #[test]
    fn test_delete_clears_slot() {
        let schema = Schema::small_int(2);
        let pid = HeapPageID::new(1, 0);

        let mut page = HeapPage::new(&pid, &HeapPage::empty_page_data(), &schema).unwrap();
        let rid = page.insert_tuple(&Tuple::new_int_tuples(7, 2)).unwrap();
        assert_eq!(page.tuples_count(), 1);

        page.delete_tuple(rid.slot).unwrap();
        assert_eq!(page.tuples_count(), 0);
        assert!(page.delete_tuple(rid.slot).is_err());

        // the freed slot is reused by the next insert
        let rid2 = page.insert_tuple(&Tuple::new_int_tuples(8, 2)).unwrap();
        assert_eq!(rid2.slot, rid.slot);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let schema = Schema::small_int(2);
        let pid = HeapPageID::new(1, 0);

        let mut page = HeapPage::new(&pid, &HeapPage::empty_page_data(), &schema).unwrap();
        let bad = Tuple::new(&[Cell::new_int64(1), Cell::new_string("a")]);
        assert!(page.insert_tuple(&bad).is_err());
    }

    #[test]
    fn test_page_kind_registry() {
        let kind = PageKind::from_names("HeapPage", "HeapPageID").unwrap();
        assert_eq!(kind, PageKind::Heap);
        assert!(PageKind::from_names("BTreeLeafPage", "BTreePageID").is_err());

        let pid = kind.construct_pid(&[3, 5]).unwrap();
        assert_eq!(pid, HeapPageID::new(3, 5));
        assert!(kind.construct_pid(&[1]).is_err());
    }
}
