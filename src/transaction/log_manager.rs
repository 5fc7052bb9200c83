use std::{
    collections::HashMap,
    fs::File,
    io::{Read, SeekFrom},
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    heap::{BufferPool, HeapPage, HeapPageID, PageKind},
    io::{read_exact, read_into, Decodeable, Encodeable, TinyFile},
    transaction::{Transaction, TransactionID},
    utils::HandyRwLock,
    Database,
};

const LOG_HEADER_SIZE: u64 = 8;

/// Sentinel stored in the log header when no checkpoint exists.
const NO_CHECKPOINT: i64 = -1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum RecordType {
    Abort = 1,
    Commit = 2,
    Update = 3,
    Begin = 4,
    Checkpoint = 5,
}

impl Encodeable for RecordType {
    fn encode(&self) -> Vec<u8> {
        (*self as i32).encode()
    }
}

impl Decodeable for RecordType {
    fn decode<R: Read>(reader: &mut R) -> DbResult<Self> {
        match i32::decode(reader)? {
            1 => Ok(RecordType::Abort),
            2 => Ok(RecordType::Commit),
            3 => Ok(RecordType::Update),
            4 => Ok(RecordType::Begin),
            5 => Ok(RecordType::Checkpoint),
            v => Err(DbError::invalid_argument(format!(
                "invalid log record type: {}",
                v
            ))),
        }
    }
}

/// The write-ahead log.
///
/// On-disk layout: an 8-byte big-endian offset of the most recent
/// checkpoint (or -1), followed by variable-length records. Every record
/// is `<type:i32><tid:i64><payload><start_offset:i64>`; the trailing
/// start offset is a back pointer that makes reverse traversal possible.
/// UPDATE payloads hold a before and an after page image, each framed
/// with the page/id variant names so recovery can reconstruct them
/// through the `PageKind` registry.
///
/// Writing the WAL record and forcing it before the page itself is the
/// buffer pool's duty (`flush_page`); this type only guarantees that
/// COMMIT and ABORT are durable before they return.
pub struct LogManager {
    /// Offset of each live transaction's BEGIN record. Inserted on
    /// BEGIN, dropped on COMMIT/ABORT, rebuilt from the checkpoint
    /// during recovery.
    tx_start_position: HashMap<TransactionID, u64>,

    file: TinyFile,
    file_path: PathBuf,

    /// The append cursor: everything before it is well-formed records.
    current_offset: u64,

    total_records: usize,

    /// True until the first append or `recover` call decides whether
    /// the existing log file content matters. The first append wins by
    /// discarding it.
    recovery_undecided: bool,
}

impl LogManager {
    pub fn new<P: AsRef<Path>>(file_path: P) -> DbResult<Self> {
        let mut file = TinyFile::open(&file_path)?;

        let size = file.get_size()?;
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            tx_start_position: HashMap::new(),
            file,
            file_path: file_path.as_ref().to_path_buf(),
            current_offset: size,
            total_records: 0,
            recovery_undecided: true,
        })
    }

    /// Truncate the log and forget all state; test bootstrap.
    pub fn reset(&mut self) -> DbResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;

        self.tx_start_position.clear();
        self.current_offset = 0;
        self.total_records = 0;
        self.recovery_undecided = true;
        Ok(())
    }

    pub fn records_count(&self) -> usize {
        self.total_records
    }

    // About to append. If we were not sure whether the caller wanted
    // recovery, we are now -- it didn't, so throw out the old content
    // and start a fresh log.
    fn pre_append(&mut self) -> DbResult<()> {
        self.total_records += 1;

        if self.recovery_undecided {
            self.recovery_undecided = false;
            self.file.set_len(0)?;
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write(&NO_CHECKPOINT)?;
            self.current_offset = self.file.get_current_position()?;
        }

        self.file.seek(SeekFrom::Start(self.current_offset))?;
        Ok(())
    }

    /// Append a BEGIN record and remember its offset; rollback and
    /// recovery both navigate by it.
    pub fn log_begin(&mut self, tx: &Transaction) -> DbResult<()> {
        if self.tx_start_position.contains_key(&tx.get_id()) {
            return Err(DbError::storage(format!("duplicate BEGIN for {}", tx)));
        }

        self.pre_append()?;

        let start = self.current_offset;
        self.file.write(&RecordType::Begin)?;
        self.file.write(&(tx.get_id() as i64))?;
        self.file.write(&(start as i64))?;

        self.tx_start_position.insert(tx.get_id(), start);
        self.current_offset = self.file.get_current_position()?;
        Ok(())
    }

    /// Append an UPDATE record with the page's before image and its
    /// current content. Not forced here: the caller must `force` before
    /// the page itself is written out.
    pub fn log_update(&mut self, tid: TransactionID, page: &HeapPage) -> DbResult<()> {
        self.pre_append()?;

        let start = self.current_offset;
        let pid = page.get_pid();

        self.file.write(&RecordType::Update)?;
        self.file.write(&(tid as i64))?;
        Self::write_page_image(&mut self.file, &pid, &page.get_before_image())?;
        Self::write_page_image(&mut self.file, &pid, &page.get_page_data())?;
        self.file.write(&(start as i64))?;

        self.current_offset = self.file.get_current_position()?;
        Ok(())
    }

    /// Append a COMMIT record and force it to disk. Returns only once
    /// the record is durable.
    pub fn log_commit(&mut self, tx: &Transaction) -> DbResult<()> {
        self.pre_append()?;

        let start = self.current_offset;
        self.file.write(&RecordType::Commit)?;
        self.file.write(&(tx.get_id() as i64))?;
        self.file.write(&(start as i64))?;

        self.current_offset = self.file.get_current_position()?;
        self.force()?;
        self.tx_start_position.remove(&tx.get_id());
        Ok(())
    }

    /// Roll the transaction back, then append a forced ABORT record.
    /// The caller must already hold the buffer-pool guard; rollback
    /// installs pages into it.
    pub fn log_abort(&mut self, tx: &Transaction, buffer_pool: &mut BufferPool) -> DbResult<()> {
        self.pre_append()?;

        self.rollback(tx, buffer_pool)?;
        self.file.seek(SeekFrom::Start(self.current_offset))?;

        let start = self.current_offset;
        self.file.write(&RecordType::Abort)?;
        self.file.write(&(tx.get_id() as i64))?;
        self.file.write(&(start as i64))?;

        self.current_offset = self.file.get_current_position()?;
        self.force()?;
        self.tx_start_position.remove(&tx.get_id());
        Ok(())
    }

    /// Restore the pre-update state of every page `tx` touched, walking
    /// the log backward from the tail to the transaction's BEGIN record
    /// via the trailing back pointers.
    ///
    /// Each before image is written through to the heap file as well as
    /// installed in the pool: a checkpoint may have stolen the page to
    /// disk, and a later reload must not resurrect the aborted version.
    pub fn rollback(&mut self, tx: &Transaction, buffer_pool: &mut BufferPool) -> DbResult<()> {
        let tid = tx.get_id();
        let begin_offset = *self
            .tx_start_position
            .get(&tid)
            .ok_or_else(|| DbError::not_found(format!("{} is unknown to the log", tx)))?;

        let mut offset = self.current_offset;
        while offset != begin_offset {
            self.file.seek(SeekFrom::Start(offset - 8))?;
            let start: i64 = self.file.read()?;
            let start = start as u64;

            self.file.seek(SeekFrom::Start(start))?;
            let record_type: RecordType = self.file.read()?;
            let record_tid: i64 = self.file.read()?;

            if record_type == RecordType::Update && record_tid as u64 == tid {
                let (pid, before) = Self::read_page_image(&mut self.file)?;
                debug!("{}: rolling back {}", tx, pid);

                buffer_pool.discard_page(&pid);

                let table_pod = Database::catalog().get_table(&pid.table_id)?;
                table_pod.rl().write_page_to_disk(&pid, &before)?;

                let mut page = Self::make_page(&pid, &before)?;
                page.mark_dirty(Some(tid));
                buffer_pool.install_page(page);
            }

            offset = start;
        }

        Ok(())
    }

    /// Flush the pool (appending UPDATE records with genuine before
    /// images), append a CHECKPOINT record carrying the set of live
    /// transactions, point the header at it, and truncate the prefix
    /// the next recovery will never read.
    pub fn log_checkpoint(&mut self, buffer_pool: &mut BufferPool) -> DbResult<()> {
        self.pre_append()?;
        self.force()?;

        buffer_pool.flush_all_pages(self)?;

        let start = self.current_offset;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write(&RecordType::Checkpoint)?;
        self.file.write(&NO_CHECKPOINT)?; // no tid, but keep the frame uniform

        self.file.write(&(self.tx_start_position.len() as i32))?;
        for (tid, first_offset) in &self.tx_start_position {
            self.file.write(&(*tid as i64))?;
            self.file.write(&(*first_offset as i64))?;
        }

        self.file.write(&(start as i64))?;
        self.current_offset = self.file.get_current_position()?;

        // only now may the header point at the new checkpoint
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write(&(start as i64))?;
        self.force()?;
        self.file.seek(SeekFrom::Start(self.current_offset))?;

        self.log_truncate()
    }

    /// Drop every record before `min(checkpoint, first record of any
    /// live transaction)` by streaming the survivors into a fresh file
    /// with all recorded offsets rebased, then renaming it into place.
    /// The new file is synced before the rename and the directory after
    /// it, so a crash in between leaves one intact log, never half of
    /// each.
    pub fn log_truncate(&mut self) -> DbResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let cp: i64 = self.file.read()?;
        if cp == NO_CHECKPOINT {
            return Ok(());
        }
        let cp = cp as u64;

        let mut min_log_record = cp;
        {
            self.file.seek(SeekFrom::Start(cp))?;
            let record_type: RecordType = self.file.read()?;
            if record_type != RecordType::Checkpoint {
                return Err(DbError::storage(
                    "log header does not point at a checkpoint record",
                ));
            }

            let _tid: i64 = self.file.read()?;
            let count: i32 = self.file.read()?;
            for _ in 0..count {
                let _tid: i64 = self.file.read()?;
                let first: i64 = self.file.read()?;
                if (first as u64) < min_log_record {
                    min_log_record = first as u64;
                }
            }
        }

        let tmp_path = self.file_path.with_extension("log.tmp");
        let mut new_file = TinyFile::open(&tmp_path)?;
        new_file.set_len(0)?;
        new_file.seek(SeekFrom::Start(0))?;
        new_file.write(&((cp - min_log_record + LOG_HEADER_SIZE) as i64))?;

        self.file.seek(SeekFrom::Start(min_log_record))?;
        let file_size = self.file.get_size()?;

        // offsets change, so every surviving record is re-framed
        while self.file.get_current_position()? < file_size {
            let record_type: RecordType = self.file.read()?;
            let record_tid: i64 = self.file.read()?;
            let new_start = new_file.get_current_position()?;

            new_file.write(&record_type)?;
            new_file.write(&record_tid)?;

            match record_type {
                RecordType::Update => {
                    let (before_pid, before) = Self::read_page_image(&mut self.file)?;
                    let (after_pid, after) = Self::read_page_image(&mut self.file)?;
                    Self::write_page_image(&mut new_file, &before_pid, &before)?;
                    Self::write_page_image(&mut new_file, &after_pid, &after)?;
                }
                RecordType::Checkpoint => {
                    let count: i32 = self.file.read()?;
                    new_file.write(&count)?;
                    for _ in 0..count {
                        let tid: i64 = self.file.read()?;
                        let first: i64 = self.file.read()?;
                        new_file.write(&tid)?;
                        new_file
                            .write(&((first as u64 - min_log_record + LOG_HEADER_SIZE) as i64))?;
                    }
                }
                RecordType::Begin => {
                    // rebase the live transaction's first-record offset;
                    // completed transactions stay forgotten
                    if let Some(first) = self.tx_start_position.get_mut(&(record_tid as u64)) {
                        *first = new_start;
                    }
                }
                RecordType::Abort | RecordType::Commit => {}
            }

            new_file.write(&(new_start as i64))?;
            let _old_start: i64 = self.file.read()?;
        }

        new_file.sync_all()?;
        drop(new_file);

        std::fs::rename(&tmp_path, &self.file_path)?;
        if let Some(dir) = self.file_path.parent() {
            File::open(dir)?.sync_all()?;
        }

        self.file = TinyFile::open(&self.file_path)?;
        self.current_offset = self.file.get_size()?;
        self.file.seek(SeekFrom::End(0))?;

        debug!(
            "log truncated: dropped {} bytes, new length {}",
            min_log_record - LOG_HEADER_SIZE,
            self.current_offset
        );
        Ok(())
    }

    /// Recover the database after a crash: ensure every committed
    /// transaction's updates are installed and no loser's are.
    ///
    /// 1. Seed the live-transaction map from the last checkpoint.
    /// 2. REDO: scan forward to the end of the log, installing each
    ///    UPDATE's after image and tracking BEGIN/COMMIT/ABORT, which
    ///    leaves exactly the losers in the map.
    /// 3. UNDO: for each loser, scan forward from its first record and
    ///    install every before image, on disk as well as in the pool.
    ///
    /// Running it twice is the same as running it once: nothing is
    /// appended, and the installs are deterministic.
    pub fn recover(&mut self, buffer_pool: &mut BufferPool) -> DbResult<()> {
        self.recovery_undecided = false;
        self.tx_start_position.clear();

        let file_size = self.file.get_size()?;
        if file_size < LOG_HEADER_SIZE {
            // nothing to recover; lay down a fresh header so appends
            // land after it
            self.file.set_len(0)?;
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write(&NO_CHECKPOINT)?;
            self.current_offset = self.file.get_current_position()?;
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(0))?;
        let cp: i64 = self.file.read()?;

        if cp != NO_CHECKPOINT {
            self.file.seek(SeekFrom::Start(cp as u64))?;
            let record_type: RecordType = self.file.read()?;
            if record_type != RecordType::Checkpoint {
                return Err(DbError::storage(
                    "log header does not point at a checkpoint record",
                ));
            }

            let _tid: i64 = self.file.read()?;
            let count: i32 = self.file.read()?;
            for _ in 0..count {
                let tid: i64 = self.file.read()?;
                let first: i64 = self.file.read()?;
                self.tx_start_position.insert(tid as u64, first as u64);
            }
            let _start: i64 = self.file.read()?;
        }

        // redo: repeat history from the checkpoint (or the header) on
        while self.file.get_current_position()? < file_size {
            let record_type: RecordType = self.file.read()?;
            let record_tid: i64 = self.file.read()?;

            match record_type {
                RecordType::Begin => {
                    let start: i64 = self.file.read()?;
                    self.tx_start_position
                        .insert(record_tid as u64, start as u64);
                }
                RecordType::Commit | RecordType::Abort => {
                    let _start: i64 = self.file.read()?;
                    self.tx_start_position.remove(&(record_tid as u64));
                }
                RecordType::Update => {
                    let (_before_pid, _before) = Self::read_page_image(&mut self.file)?;
                    let (after_pid, after) = Self::read_page_image(&mut self.file)?;
                    let _start: i64 = self.file.read()?;

                    debug!("redo: installing after image of {}", after_pid);
                    buffer_pool.discard_page(&after_pid);
                    let page = Self::make_page(&after_pid, &after)?;
                    buffer_pool.install_page(page);
                }
                RecordType::Checkpoint => {
                    let count: i32 = self.file.read()?;
                    let _ = read_exact(&mut self.file, count as usize * 16)?;
                    let _start: i64 = self.file.read()?;
                }
            }
        }

        // undo: whoever is still in the map never completed
        let losers: Vec<(TransactionID, u64)> = self.tx_start_position.drain().collect();
        for (tid, first) in losers {
            debug!("undo: rolling back loser tx_{}", tid);
            self.file.seek(SeekFrom::Start(first))?;

            while self.file.get_current_position()? < file_size {
                let record_type: RecordType = self.file.read()?;
                let record_tid: i64 = self.file.read()?;

                match record_type {
                    RecordType::Update => {
                        let (before_pid, before) = Self::read_page_image(&mut self.file)?;
                        let (after_pid, _after) = Self::read_page_image(&mut self.file)?;
                        let _start: i64 = self.file.read()?;

                        if record_tid as u64 == tid {
                            buffer_pool.discard_page(&after_pid);

                            let table_pod = Database::catalog().get_table(&before_pid.table_id)?;
                            table_pod.rl().write_page_to_disk(&before_pid, &before)?;

                            let page = Self::make_page(&before_pid, &before)?;
                            buffer_pool.install_page(page);
                        }
                    }
                    RecordType::Checkpoint => {
                        let count: i32 = self.file.read()?;
                        let _ = read_exact(&mut self.file, count as usize * 16)?;
                        let _start: i64 = self.file.read()?;
                    }
                    RecordType::Abort | RecordType::Commit | RecordType::Begin => {
                        let _start: i64 = self.file.read()?;
                    }
                }
            }
        }

        self.current_offset = file_size;
        self.file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// fsync; the durability point for COMMIT/ABORT and for the WAL
    /// rule in `flush_page`.
    pub fn force(&mut self) -> DbResult<()> {
        self.file.sync_all()
    }

    /// Page image frame: variant names, id arguments, then the raw
    /// bytes. The names go through `PageKind` on the way back in.
    fn write_page_image(file: &mut TinyFile, pid: &HeapPageID, data: &[u8]) -> DbResult<()> {
        let kind = PageKind::Heap;
        file.write(&kind.page_name().to_string())?;
        file.write(&kind.id_name().to_string())?;

        let args = pid.serialize();
        file.write(&(args.len() as i32))?;
        for arg in args {
            file.write(&arg)?;
        }

        file.write(&(data.len() as i32))?;
        file.write_bytes(data)?;
        Ok(())
    }

    fn read_page_image<R: Read>(reader: &mut R) -> DbResult<(HeapPageID, Vec<u8>)> {
        let page_name: String = read_into(reader)?;
        let id_name: String = read_into(reader)?;
        let kind = PageKind::from_names(&page_name, &id_name)?;

        let arg_count: i32 = read_into(reader)?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(read_into::<i32, _>(reader)?);
        }
        let pid = kind.construct_pid(&args)?;

        let len: i32 = read_into(reader)?;
        let data = read_exact(reader, len as usize)?;
        Ok((pid, data))
    }

    fn make_page(pid: &HeapPageID, data: &[u8]) -> DbResult<HeapPage> {
        let table_pod = Database::catalog().get_table(&pid.table_id)?;
        let schema = table_pod.rl().get_schema().clone();
        HeapPage::new(pid, data, &schema)
    }

    /// Debug dump of the whole log, record by record.
    pub fn show_log_contents(&mut self) -> DbResult<()> {
        let original_offset = self.file.get_current_position()?;
        let file_size = self.file.get_size()?;
        let mut depiction = String::new();

        self.file.seek(SeekFrom::Start(0))?;
        if file_size < LOG_HEADER_SIZE {
            debug!("log content: <empty>");
            return Ok(());
        }

        let cp: i64 = self.file.read()?;
        if cp == NO_CHECKPOINT {
            depiction.push_str("├── [8 bytes] no checkpoint\n");
        } else {
            depiction.push_str(&format!("├── [8 bytes] last checkpoint: {}\n", cp));
        }

        while self.file.get_current_position()? < file_size {
            let pos = self.file.get_current_position()?;
            let record_type: RecordType = self.file.read()?;
            let tid: i64 = self.file.read()?;

            match record_type {
                RecordType::Update => {
                    let (before_pid, before) = Self::read_page_image(&mut self.file)?;
                    let (_, after) = Self::read_page_image(&mut self.file)?;
                    let start: i64 = self.file.read()?;
                    depiction.push_str(&format!(
                        "├── [pos {}] UPDATE tid: {}, pid: {}, images: {}/{} bytes, start: {}\n",
                        pos,
                        tid,
                        before_pid,
                        before.len(),
                        after.len(),
                        start,
                    ));
                }
                RecordType::Checkpoint => {
                    let count: i32 = self.file.read()?;
                    let mut active = Vec::new();
                    for _ in 0..count {
                        let tid: i64 = self.file.read()?;
                        let first: i64 = self.file.read()?;
                        active.push((tid, first));
                    }
                    let start: i64 = self.file.read()?;
                    depiction.push_str(&format!(
                        "├── [pos {}] CHECKPOINT active: {:?}, start: {}\n",
                        pos, active, start,
                    ));
                }
                _ => {
                    let start: i64 = self.file.read()?;
                    depiction.push_str(&format!(
                        "├── [pos {}] {:?} tid: {}, start: {}\n",
                        pos, record_type, tid, start,
                    ));
                }
            }
        }

        debug!("log content: \n{}", depiction);
        self.file.seek(SeekFrom::Start(original_offset))?;
        Ok(())
    }
}
