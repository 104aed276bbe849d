//! The `table` module defines the fixed-layout record of each database table, together with
//! the memory-mapped read view and the buffered writer the indexing pipeline emits into.
//!
//! Every table file is a tightly packed array of one record type. Integers are little-endian
//! two's complement; text fields are fixed-width ascii, zero-padded on the right. Record
//! layouts are part of the on-disk ABI: a file whose length is not a whole number of records
//! is corrupt.
use crate::error::{GeocodeError, GeocodeResult};
use derive_new::new;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

/// The `Record` trait gives each table row a fixed byte size and a pair of codecs. `decode`
/// expects a buffer of exactly `SIZE` bytes; `encode` appends exactly `SIZE` bytes.
pub trait Record: Sized {
    /// Record size in bytes.
    const SIZE: usize;
    /// Reads one record from a `SIZE`-byte buffer.
    fn decode(buf: &[u8]) -> Self;
    /// Appends the record's `SIZE` bytes to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);
}

/// The `fixed` function packs normalized ascii text into a zero-padded fixed-width field,
/// truncating at the field width.
pub fn fixed<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let bytes = text.as_bytes();
    let len = bytes.len().min(N);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// The `text` function reads a zero-padded fixed-width field back as a string slice.
pub fn text(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

struct Decoder<'a>(&'a [u8]);

impl<'a> Decoder<'a> {
    fn array<const N: usize>(&mut self) -> [u8; N] {
        let (head, tail) = self.0.split_at(N);
        self.0 = tail;
        let mut field = [0u8; N];
        field.copy_from_slice(head);
        field
    }

    fn i8(&mut self) -> i8 {
        self.array::<1>()[0] as i8
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.array())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }
}

/// The `Departement` record spans a row range of the postal table. The code is the 2- or
/// 3-character department name from the raw file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Departement {
    /// Department code, e.g. `91` or `2A` or `974`.
    pub code: [u8; 3],
    /// First row of this department in the postal table.
    pub start: i32,
    /// One past the last row of this department in the postal table.
    pub end: i32,
}

impl Record for Departement {
    const SIZE: usize = 11;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        Departement {
            code: d.array(),
            start: d.i32(),
            end: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.code);
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.end.to_le_bytes());
    }
}

/// The `Postal` record spans a row range of the commune table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Postal {
    /// The postal code.
    pub code: i32,
    /// First row of this postal code in the commune table.
    pub start: i32,
    /// One past the last row of this postal code in the commune table.
    pub end: i32,
    /// Row of the parent department.
    pub ref_id: i32,
}

impl Record for Postal {
    const SIZE: usize = 16;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        Postal {
            code: d.i32(),
            start: d.i32(),
            end: d.i32(),
            ref_id: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.code.to_le_bytes());
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.end.to_le_bytes());
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
    }
}

/// The `Commune` record spans a row range of the voie table and carries the aggregate
/// coordinates of the city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Commune {
    /// Comparable form of the city name.
    pub normalise: [u8; 32],
    /// Display form of the city name.
    pub nom: [u8; 32],
    /// INSEE municipality code.
    pub code_insee: [u8; 5],
    /// Scaled aggregate longitude.
    pub longitude: i32,
    /// Scaled aggregate latitude.
    pub latitude: i32,
    /// First row of this commune in the voie table.
    pub start: i32,
    /// One past the last row of this commune in the voie table.
    pub end: i32,
    /// Row of the parent postal code.
    pub ref_id: i32,
}

impl Record for Commune {
    const SIZE: usize = 89;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        Commune {
            normalise: d.array(),
            nom: d.array(),
            code_insee: d.array(),
            longitude: d.i32(),
            latitude: d.i32(),
            start: d.i32(),
            end: d.i32(),
            ref_id: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.normalise);
        buf.extend_from_slice(&self.nom);
        buf.extend_from_slice(&self.code_insee);
        buf.extend_from_slice(&self.longitude.to_le_bytes());
        buf.extend_from_slice(&self.latitude.to_le_bytes());
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.end.to_le_bytes());
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
    }
}

/// The `Voie` record spans a row range of the localisation table and carries the aggregate
/// coordinates of the street.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Voie {
    /// Comparable form of the street name.
    pub normalise: [u8; 47],
    /// Display form of the street name.
    pub nom: [u8; 65],
    /// Scaled aggregate longitude.
    pub longitude: i32,
    /// Scaled aggregate latitude.
    pub latitude: i32,
    /// First row of this street in the localisation table.
    pub start: i32,
    /// One past the last row of this street in the localisation table.
    pub end: i32,
    /// Row of the parent commune.
    pub ref_id: i32,
}

impl Record for Voie {
    const SIZE: usize = 132;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        Voie {
            normalise: d.array(),
            nom: d.array(),
            longitude: d.i32(),
            latitude: d.i32(),
            start: d.i32(),
            end: d.i32(),
            ref_id: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.normalise);
        buf.extend_from_slice(&self.nom);
        buf.extend_from_slice(&self.longitude.to_le_bytes());
        buf.extend_from_slice(&self.latitude.to_le_bytes());
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.end.to_le_bytes());
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
    }
}

/// The `Localisation` record is one numbered point along a street.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Localisation {
    /// The street number.
    pub numero: i16,
    /// Repetition marker, e.g. `BIS` or `T`.
    pub repetition: [u8; 3],
    /// Scaled longitude of the point.
    pub longitude: i32,
    /// Scaled latitude of the point.
    pub latitude: i32,
    /// Row of the parent voie.
    pub ref_id: i32,
}

impl Record for Localisation {
    const SIZE: usize = 17;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        Localisation {
            numero: d.i16(),
            repetition: d.array(),
            longitude: d.i32(),
            latitude: d.i32(),
            ref_id: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.numero.to_le_bytes());
        buf.extend_from_slice(&self.repetition);
        buf.extend_from_slice(&self.longitude.to_le_bytes());
        buf.extend_from_slice(&self.latitude.to_le_bytes());
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
    }
}

/// The `KdNode` record is one node of the packed k-d tree: the point it splits on, the region
/// its subtree is confined to, the split axis, the child node ids and the localisation row it
/// stands for. Absent children are encoded as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct KdNode {
    /// Scaled longitude of the split point.
    pub longitude: i32,
    /// Scaled latitude of the split point.
    pub latitude: i32,
    /// Western bound of the node region, scaled.
    pub limit_left: i32,
    /// Eastern bound of the node region, scaled.
    pub limit_right: i32,
    /// Southern bound of the node region, scaled.
    pub limit_bottom: i32,
    /// Northern bound of the node region, scaled.
    pub limit_top: i32,
    /// Split axis: 0 for longitude, 1 for latitude.
    pub dimension: i8,
    /// Node id of the left child, `-1` when absent.
    pub left: i32,
    /// Node id of the right child, `-1` when absent.
    pub right: i32,
    /// Row of the localisation this node stands for.
    pub ref_id: i32,
}

impl Record for KdNode {
    const SIZE: usize = 37;

    fn decode(buf: &[u8]) -> Self {
        let mut d = Decoder(buf);
        KdNode {
            longitude: d.i32(),
            latitude: d.i32(),
            limit_left: d.i32(),
            limit_right: d.i32(),
            limit_bottom: d.i32(),
            limit_top: d.i32(),
            dimension: d.i8(),
            left: d.i32(),
            right: d.i32(),
            ref_id: d.i32(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.longitude.to_le_bytes());
        buf.extend_from_slice(&self.latitude.to_le_bytes());
        buf.extend_from_slice(&self.limit_left.to_le_bytes());
        buf.extend_from_slice(&self.limit_right.to_le_bytes());
        buf.extend_from_slice(&self.limit_bottom.to_le_bytes());
        buf.extend_from_slice(&self.limit_top.to_le_bytes());
        buf.push(self.dimension as u8);
        buf.extend_from_slice(&self.left.to_le_bytes());
        buf.extend_from_slice(&self.right.to_le_bytes());
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
    }
}

/// The sort-index tables are arrays of row indices into their content table.
impl Record for i32 {
    const SIZE: usize = 4;

    fn decode(buf: &[u8]) -> Self {
        Decoder(buf).i32()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

/// The `Table` struct is a read-only memory-mapped view over one table file. Concurrent
/// queries share the same view; nothing is locked on the read path.
#[derive(Debug)]
pub struct Table<T: Record> {
    // Zero-length files cannot be mapped, so an empty table holds no map at all.
    map: Option<Mmap>,
    len: usize,
    record: PhantomData<T>,
}

impl<T: Record> Table<T> {
    /// The `open` method memory-maps the table file at `path`, validating that the file holds
    /// a whole number of records.
    pub fn open<P: AsRef<Path>>(path: P) -> GeocodeResult<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len as usize % T::SIZE != 0 {
            return Err(GeocodeError::CorruptTable {
                path: path.as_ref().to_path_buf(),
                len,
                record: T::SIZE,
            });
        }
        let map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Table {
            map,
            len: len as usize / T::SIZE,
            record: PhantomData,
        })
    }

    /// The `len` method returns the number of records in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The `is_empty` method reports whether the table holds no record.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `get` method decodes the record at `row`. Rows are addressed with `i32` because
    /// that is the width of every `ref_id` and sort-index entry in the database.
    ///
    /// Panics if `row` is out of range; row indices come from validated tables.
    pub fn get(&self, row: i32) -> T {
        let offset = row as usize * T::SIZE;
        let bytes = self.map.as_deref().unwrap_or(&[]);
        T::decode(&bytes[offset..offset + T::SIZE])
    }

    /// The `iter` method walks every record of the table in row order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(|row| self.get(row as i32))
    }
}

/// The `TableWriter` struct appends records to a table file through a buffered writer. The
/// pipeline owns all writers during construction; once finished, tables are immutable.
#[derive(Debug)]
pub struct TableWriter<T: Record> {
    writer: BufWriter<File>,
    buf: Vec<u8>,
    count: usize,
    record: PhantomData<T>,
}

impl<T: Record> TableWriter<T> {
    /// The `create` method opens the table file at `path` for writing, truncating any
    /// previous content.
    pub fn create<P: AsRef<Path>>(path: P) -> GeocodeResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(TableWriter {
            writer: BufWriter::new(file),
            buf: Vec::with_capacity(T::SIZE),
            count: 0,
            record: PhantomData,
        })
    }

    /// The `push` method appends one record.
    pub fn push(&mut self, record: &T) -> GeocodeResult<()> {
        self.buf.clear();
        record.encode(&mut self.buf);
        self.writer.write_all(&self.buf)?;
        self.count += 1;
        Ok(())
    }

    /// The `count` method returns the number of records written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The `finish` method flushes the writer and returns the final record count.
    pub fn finish(mut self) -> GeocodeResult<usize> {
        self.writer.flush()?;
        Ok(self.count)
    }
}
