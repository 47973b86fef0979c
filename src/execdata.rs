//! Execution-data codec.
//!
//! Reads and writes the block stream produced by the coverage agent: a
//! header block followed by session-info and per-class execution blocks,
//! optionally interleaved with remote-control command blocks. All
//! multi-byte primitives are big-endian.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::error::{CoverageError, Result};

pub const BLOCK_HEADER: u8 = 0x01;
pub const BLOCK_SESSION_INFO: u8 = 0x10;
pub const BLOCK_EXECUTION_DATA: u8 = 0x11;
pub const BLOCK_CMD_OK: u8 = 0x20;
pub const BLOCK_CMD_DUMP: u8 = 0x40;

pub const MAGIC_NUMBER: u16 = 0xC0C0;
pub const FORMAT_VERSION: u16 = 0x1007;

/// Longest var-int the format can carry (5 groups of 7 bits).
const MAX_VAR_INT_SHIFT: u32 = 28;

/// Metadata about one agent session contained in a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    /// Session start, epoch milliseconds.
    pub start: i64,
    /// Time of the dump, epoch milliseconds.
    pub dump: i64,
}

impl SessionInfo {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start).single()
    }

    pub fn dump_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.dump).single()
    }
}

/// Probe hit vector of one instrumented class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    id: u64,
    name: String,
    probes: Vec<bool>,
}

impl ExecutionRecord {
    pub fn new(id: u64, name: impl Into<String>, probes: Vec<bool>) -> Self {
        Self {
            id,
            name: name.into(),
            probes,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probes(&self) -> &[bool] {
        &self.probes
    }

    /// Whether probe `index` was hit. Out-of-range probes count as not hit.
    pub fn is_hit(&self, index: usize) -> bool {
        self.probes.get(index).copied().unwrap_or(false)
    }

    pub fn hit_count(&self) -> usize {
        self.probes.iter().filter(|&&p| p).count()
    }

    /// ORs `other` into this record. Both must describe the same class.
    fn merge(&mut self, other: &ExecutionRecord) -> Result<()> {
        if self.name != other.name {
            return Err(CoverageError::Decode(format!(
                "Different class names {} and {} for id {:016x}",
                self.name, other.name, self.id
            )));
        }
        if self.probes.len() != other.probes.len() {
            return Err(CoverageError::Decode(format!(
                "Incompatible execution data for class {} with id {:016x}",
                self.name, self.id
            )));
        }
        for (mine, theirs) in self.probes.iter_mut().zip(&other.probes) {
            *mine |= *theirs;
        }
        Ok(())
    }
}

/// Execution records keyed by class id, plus the sessions they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionDataStore {
    records: BTreeMap<u64, ExecutionRecord>,
    sessions: Vec<SessionInfo>,
}

impl ExecutionDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, merging it into an existing record with the same id.
    pub fn put(&mut self, record: ExecutionRecord) -> Result<()> {
        match self.records.get_mut(&record.id) {
            Some(existing) => existing.merge(&record),
            None => {
                self.records.insert(record.id, record);
                Ok(())
            }
        }
    }

    pub fn add_session(&mut self, session: SessionInfo) {
        self.sessions.push(session);
    }

    pub fn get(&self, id: u64) -> Option<&ExecutionRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.values()
    }

    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    /// Marks every probe as not hit. Records and sessions are kept.
    pub fn reset_probes(&mut self) {
        for record in self.records.values_mut() {
            record.probes.iter_mut().for_each(|p| *p = false);
        }
    }
}

/// One decoded block of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header { version: u16 },
    SessionInfo(SessionInfo),
    Execution(ExecutionRecord),
    DumpCommand { dump: bool, reset: bool },
    CommandOk,
}

/// Failure while pulling blocks off a stream.
///
/// Kept separate from [`CoverageError`] so that callers can tell a broken
/// transport apart from a malformed payload.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("stream truncated inside a block")]
    Truncated,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Format(String),
}

impl From<ReadError> for CoverageError {
    fn from(e: ReadError) -> Self {
        CoverageError::Decode(e.to_string())
    }
}

type ReadResult<T> = std::result::Result<T, ReadError>;

/// Pull parser over an execution-data stream.
pub struct ExecDataReader<R> {
    input: R,
    first_block: bool,
}

impl<R: Read> ExecDataReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            first_block: true,
        }
    }

    /// Reads the next block. `Ok(None)` signals a clean end of stream
    /// between blocks.
    pub fn next_block(&mut self) -> ReadResult<Option<Block>> {
        let block_type = match self.read_type_byte()? {
            Some(b) => b,
            None => return Ok(None),
        };

        if self.first_block && block_type != BLOCK_HEADER {
            return Err(ReadError::Format("Invalid execution data file".into()));
        }
        self.first_block = false;

        let block = match block_type {
            BLOCK_HEADER => self.read_header()?,
            BLOCK_SESSION_INFO => Block::SessionInfo(SessionInfo {
                id: self.read_utf()?,
                start: self.read_i64()?,
                dump: self.read_i64()?,
            }),
            BLOCK_EXECUTION_DATA => {
                let id = self.read_i64()? as u64;
                let name = self.read_utf()?;
                let probes = self.read_boolean_array()?;
                Block::Execution(ExecutionRecord { id, name, probes })
            }
            BLOCK_CMD_DUMP => Block::DumpCommand {
                dump: self.read_bool()?,
                reset: self.read_bool()?,
            },
            BLOCK_CMD_OK => Block::CommandOk,
            other => {
                return Err(ReadError::Format(format!(
                    "Unknown block type {other:#04x}"
                )))
            }
        };
        Ok(Some(block))
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    fn read_type_byte(&mut self) -> ReadResult<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::Io(e)),
            }
        }
    }

    fn read_header(&mut self) -> ReadResult<Block> {
        let magic = self.read_u16()?;
        if magic != MAGIC_NUMBER {
            return Err(ReadError::Format("Invalid execution data file".into()));
        }
        let version = self.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(ReadError::Format(format!(
                "Incompatible execution data version {version:#06x}, expected {FORMAT_VERSION:#06x}"
            )));
        }
        Ok(Block::Header { version })
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8]) -> ReadResult<()> {
        self.input.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ReadError::Truncated,
            _ => ReadError::Io(e),
        })
    }

    fn read_u8(&mut self) -> ReadResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_or_truncated(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool(&mut self) -> ReadResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_u16(&mut self) -> ReadResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_or_truncated(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> ReadResult<i64> {
        let mut buf = [0u8; 8];
        self.read_exact_or_truncated(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_var_int(&mut self) -> ReadResult<u32> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > MAX_VAR_INT_SHIFT {
                return Err(ReadError::Format("Var-int too long".into()));
            }
        }
    }

    fn read_bytes(&mut self, len: usize) -> ReadResult<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.input)
            .take(len as u64)
            .read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(ReadError::Truncated);
        }
        Ok(buf)
    }

    fn read_utf(&mut self) -> ReadResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        decode_modified_utf8(&bytes)
    }

    fn read_boolean_array(&mut self) -> ReadResult<Vec<bool>> {
        let len = self.read_var_int()? as usize;
        let packed = self.read_bytes(len.div_ceil(8))?;
        Ok((0..len)
            .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }
}

/// Decodes a complete execution-data stream into a store.
///
/// Decoding stops at the end of input or at a command acknowledgement.
pub fn decode(bytes: &[u8]) -> Result<ExecutionDataStore> {
    let mut reader = ExecDataReader::new(bytes);
    let mut store = ExecutionDataStore::new();

    while let Some(block) = reader.next_block()? {
        match block {
            Block::Header { .. } | Block::DumpCommand { .. } => {}
            Block::SessionInfo(session) => store.add_session(session),
            Block::Execution(record) => store.put(record)?,
            Block::CommandOk => break,
        }
    }
    Ok(store)
}

/// Writer for the same block format. The header is emitted on construction.
pub struct ExecDataWriter<W: Write> {
    out: W,
}

impl<W: Write> ExecDataWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(&[BLOCK_HEADER])?;
        out.write_all(&MAGIC_NUMBER.to_be_bytes())?;
        out.write_all(&FORMAT_VERSION.to_be_bytes())?;
        Ok(Self { out })
    }

    pub fn write_session_info(&mut self, session: &SessionInfo) -> io::Result<()> {
        self.out.write_all(&[BLOCK_SESSION_INFO])?;
        self.write_utf(&session.id)?;
        self.out.write_all(&session.start.to_be_bytes())?;
        self.out.write_all(&session.dump.to_be_bytes())
    }

    pub fn write_execution_record(&mut self, record: &ExecutionRecord) -> io::Result<()> {
        self.out.write_all(&[BLOCK_EXECUTION_DATA])?;
        self.out.write_all(&record.id.to_be_bytes())?;
        self.write_utf(&record.name)?;
        self.write_boolean_array(&record.probes)
    }

    pub fn write_dump_command(&mut self, dump: bool, reset: bool) -> io::Result<()> {
        self.out
            .write_all(&[BLOCK_CMD_DUMP, u8::from(dump), u8::from(reset)])
    }

    pub fn write_command_ok(&mut self) -> io::Result<()> {
        self.out.write_all(&[BLOCK_CMD_OK])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_utf(&mut self, value: &str) -> io::Result<()> {
        let bytes = encode_modified_utf8(value);
        let len = u16::try_from(bytes.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "string too long for UTF block")
        })?;
        self.out.write_all(&len.to_be_bytes())?;
        self.out.write_all(&bytes)
    }

    fn write_var_int(&mut self, mut value: u32) -> io::Result<()> {
        while value & !0x7F != 0 {
            self.out.write_all(&[0x80 | (value & 0x7F) as u8])?;
            value >>= 7;
        }
        self.out.write_all(&[value as u8])
    }

    fn write_boolean_array(&mut self, values: &[bool]) -> io::Result<()> {
        let len = u32::try_from(values.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "probe array too long"))?;
        self.write_var_int(len)?;
        for chunk in values.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &hit)| if hit { acc | (1 << i) } else { acc });
            self.out.write_all(&[byte])?;
        }
        Ok(())
    }
}

/// Serializes a store (sessions first, then records by id).
pub fn encode(store: &ExecutionDataStore) -> io::Result<Vec<u8>> {
    let mut writer = ExecDataWriter::new(Vec::new())?;
    for session in store.sessions() {
        writer.write_session_info(session)?;
    }
    for record in store.records() {
        writer.write_execution_record(record)?;
    }
    Ok(writer.into_inner())
}

fn decode_modified_utf8(bytes: &[u8]) -> ReadResult<String> {
    // Plain ASCII/UTF-8 covers nearly every class name.
    if let Ok(s) = std::str::from_utf8(bytes) {
        if !s.contains('\u{0}') {
            return Ok(s.to_string());
        }
    }

    let malformed = || ReadError::Format("Malformed UTF string".into());
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = u16::from(bytes[i]);
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = u16::from(*bytes.get(i + 1).ok_or_else(malformed)?);
            units.push(((a & 0x1F) << 6) | (b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = u16::from(*bytes.get(i + 1).ok_or_else(malformed)?);
            let c = u16::from(*bytes.get(i + 2).ok_or_else(malformed)?);
            units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
            i += 3;
        } else {
            return Err(malformed());
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

const CRC64_POLY_REVERSED: u64 = 0xD800_0000_0000_0000;

const CRC64_TABLE: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut v = i as u64;
        let mut j = 0;
        while j < 8 {
            v = if v & 1 == 1 {
                (v >> 1) ^ CRC64_POLY_REVERSED
            } else {
                v >> 1
            };
            j += 1;
        }
        table[i] = v;
        i += 1;
    }
    table
};

/// Stable class identity: CRC-64 over the class file bytes, matching the
/// ids the agent writes into execution blocks.
pub fn class_id(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |sum, &b| {
        (sum >> 8) ^ CRC64_TABLE[((sum as u8) ^ b) as usize]
    })
}
