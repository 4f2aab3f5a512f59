//!
//! The image file format.
//!
//! Every word is written in the native endianness of the machine:
//!
//! ```text
//! [symbols][nil][allocation serial][table count][table ids...][object count][objects...]
//! ```
//!
//! where every object is a `{handle, class, signed size}` descriptor followed by its
//! payload, rounded up to whole allocation units.
//!

use std::fmt;
use std::io::{self, Read, Write};

use crate::error::ImageError;
use crate::memory::{units_for_size, ObjectHeader, ObjectMemory, Payload, UNIT_BYTES};
use crate::oop::Oop;

/// The identifier of a primitive table, recorded in images so that a loader can tell
/// which primitive families the image expects.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveTableId(pub [u8; 16]);

impl PrimitiveTableId {
    /// Builds an identifier from its 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for PrimitiveTableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, byte) in self.0.iter().enumerate() {
            if matches!(idx, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PrimitiveTableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PrimitiveTableId({})", self)
    }
}

/// What an image header says beyond the objects themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// The primitive tables the image was written with.
    pub primitive_tables: Vec<PrimitiveTableId>,
    /// The allocation serial at the time the image was written.
    pub allocation_serial: i64,
    /// The number of object records.
    pub object_count: usize,
}

// Sanity bounds for header fields, past which the input is not an image.
const MAX_PRIMITIVE_TABLES: u64 = 1 << 12;
const MAX_OBJECT_BYTES: u64 = 1 << 40;

fn write_word<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

fn write_count<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

fn read_exact<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), ImageError> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => ImageError::Truncated { what },
        _ => ImageError::Io(err),
    })
}

fn read_word<R: Read>(reader: &mut R, what: &'static str) -> Result<i64, ImageError> {
    let mut buf = [0; 8];
    read_exact(reader, &mut buf, what)?;
    Ok(i64::from_ne_bytes(buf))
}

fn read_count<R: Read>(reader: &mut R, what: &'static str) -> Result<u64, ImageError> {
    let mut buf = [0; 8];
    read_exact(reader, &mut buf, what)?;
    Ok(u64::from_ne_bytes(buf))
}

impl ObjectMemory {
    /// Writes every live object to `writer`.
    ///
    /// A full collection runs first, even when collections are disabled, so that exactly
    /// the reachable objects are written.
    pub fn write_image<W: Write>(
        &mut self,
        writer: &mut W,
        primitive_tables: &[PrimitiveTableId],
    ) -> Result<(), ImageError> {
        self.mark_and_sweep();

        write_word(writer, self.symbols.raw())?;
        write_word(writer, Oop::NIL.raw())?;
        write_word(writer, self.allocation_serial)?;
        write_count(writer, primitive_tables.len() as u64)?;
        for table in primitive_tables {
            writer.write_all(&table.0)?;
        }

        let live: Vec<usize> = (0..self.objects.len())
            .filter(|&index| self.objects[index].reference_count > 0)
            .collect();
        write_count(writer, live.len() as u64)?;

        for index in live {
            let header = &self.objects[index];
            write_count(writer, index as u64)?;
            write_word(writer, header.class.raw())?;
            write_word(writer, header.size)?;
            match &header.payload {
                Payload::Words(words) => {
                    for word in words {
                        write_word(writer, word.raw())?;
                    }
                }
                Payload::Bytes(bytes) => writer.write_all(bytes)?,
            }
        }

        writer.flush()?;
        log::debug!("image written ({} objects)", self.object_count());
        Ok(())
    }

    /// Replaces the whole object table with the content of an image.
    ///
    /// Any guard taken before loading refers to stale objects afterwards.
    pub fn read_image<R: Read>(&mut self, reader: &mut R) -> Result<ImageInfo, ImageError> {
        self.reset_table();
        self.active_stack = Oop::NIL;

        let symbols = read_word(reader, "symbol table")?;
        if read_word(reader, "nil object")? != Oop::NIL.raw() {
            return Err(ImageError::Malformed("nil is not object 0"));
        }
        let allocation_serial = read_word(reader, "allocation serial")?;

        let table_count = read_count(reader, "primitive table count")?;
        if table_count > MAX_PRIMITIVE_TABLES {
            return Err(ImageError::Malformed("too many primitive tables"));
        }
        let mut primitive_tables = Vec::with_capacity(table_count as usize);
        for _ in 0..table_count {
            let mut id = [0; 16];
            read_exact(reader, &mut id, "primitive table id")?;
            primitive_tables.push(PrimitiveTableId(id));
        }

        let object_count = read_count(reader, "object count")?;
        for _ in 0..object_count {
            let handle = read_word(reader, "object descriptor")?;
            let class = Oop::from_raw(read_word(reader, "object descriptor")?);
            let size = read_word(reader, "object descriptor")?;

            let invalid = ImageError::InvalidRecord { handle, size };
            let index = match usize::try_from(handle) {
                Ok(index) if index < self.params.max_size => index,
                _ => return Err(invalid),
            };
            if size.unsigned_abs() > MAX_OBJECT_BYTES {
                return Err(invalid);
            }
            if let Some(class_index) = class.index() {
                if class_index >= self.params.max_size {
                    return Err(invalid);
                }
                self.ensure_index(class_index);
            }
            self.ensure_index(index);

            let units = units_for_size(size);
            let payload = if size >= 0 {
                let mut words = Vec::new();
                for _ in 0..units {
                    words.push(Oop::from_raw(read_word(reader, "object payload")?));
                }
                Payload::Words(words)
            } else {
                let len = units * UNIT_BYTES;
                let mut bytes = Vec::new();
                reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
                if bytes.len() != len {
                    return Err(ImageError::Truncated {
                        what: "object payload",
                    });
                }
                Payload::Bytes(bytes)
            };

            self.objects[index] = ObjectHeader {
                class,
                // anything non-zero keeps the slot out of the free lists
                reference_count: 666,
                size,
                payload,
            };
        }

        self.objects[0].reference_count = 1;
        self.symbols = Oop::from_raw(symbols);
        self.allocation_serial = allocation_serial;
        self.set_free_lists();

        log::debug!(
            "image read: {} objects in a table of {} entries",
            object_count,
            self.objects.len()
        );
        Ok(ImageInfo {
            primitive_tables,
            allocation_serial,
            object_count: object_count as usize,
        })
    }

    /// Grows the table so that `index` is a valid entry, with some room to spare.
    fn ensure_index(&mut self, index: usize) {
        if index >= self.objects.len() {
            self.extend_table(index - self.objects.len() + 500);
        }
    }
}
