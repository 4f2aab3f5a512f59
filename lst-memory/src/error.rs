use std::io;

/// Reports an unrecoverable virtual machine error and aborts.
///
/// Every fatal condition of the machine (out-of-range accesses, corrupted objects,
/// invalid bytecodes, unknown primitives...) is funneled through here.
pub fn sys_error(context: &str, detail: &str) -> ! {
    log::error!("{}: {}", context, detail);
    panic!("{}: {}", context, detail);
}

/// An error that occured while reading or writing an image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The underlying reader or writer failed.
    #[error("image I/O error: {0}")]
    Io(#[source] io::Error),
    /// The image ended in the middle of a record.
    #[error("truncated image: missing {what}")]
    Truncated {
        /// What was being read when the input ran out.
        what: &'static str,
    },
    /// A record describes an object that cannot exist.
    #[error("invalid image record for object #{handle} (size {size})")]
    InvalidRecord {
        /// The object table index of the record.
        handle: i64,
        /// The signed size of the record.
        size: i64,
    },
    /// The image header is not one this machine writes.
    #[error("malformed image header: {0}")]
    Malformed(&'static str),
}

impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
