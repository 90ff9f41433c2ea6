//! Embedded bitcode container.
//!
//! Each module is stored in the library file as one record:
//!
//! ```text
//! MAGIC | name (u8 len + bytes) | kind (u8) | payload len (u32 le)
//!       | export count (u32 le) + names | import count (u32 le) + names | payload
//! ```
//!
//! Records may sit anywhere in the file; the reader scans for the magic and skips
//! candidates that do not parse.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use bitlink_symbol::{IrKind, Module};
use memmap2::Mmap;
use tracing::debug;

use crate::error::ContainerError;

pub const MAGIC: [u8; 8] = [0xB1, b'T', b'L', b'K', b'I', b'R', 0x00, 0x01];

/// Extract every module embedded in the file at `path`.
pub fn extract_modules(path: &Path) -> Result<Vec<Module>, ContainerError> {
    let io_err = |source| ContainerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the mapping is read-only and dropped before returning; modules copy
    // everything they keep out of it.
    let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;
    Ok(parse_modules(&map))
}

/// Parse every well-formed record found in `data`.
pub fn parse_modules(data: &[u8]) -> Vec<Module> {
    let mut modules = Vec::new();
    let mut offset = 0;

    while let Some(found) = find_magic(&data[offset..]) {
        let start = offset + found;
        let mut reader = Reader::new(data, start + MAGIC.len());
        match reader.read_module() {
            Ok(module) => {
                modules.push(module);
                offset = reader.pos;
            }
            Err(err) => {
                debug!(offset = start, error = %err, "skipping bitcode candidate");
                offset = start + 1;
            }
        }
    }

    modules
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MAGIC.len())
        .position(|window| window == MAGIC)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ContainerError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ContainerError::Truncated { offset: self.pos })?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ContainerError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ContainerError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_name(&mut self) -> Result<String, ContainerError> {
        let offset = self.pos;
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ContainerError::InvalidName { offset })
    }

    fn read_names(&mut self) -> Result<Vec<String>, ContainerError> {
        let count = self.read_u32()?;
        let mut names = Vec::new();
        for _ in 0..count {
            names.push(self.read_name()?);
        }
        Ok(names)
    }

    fn read_module(&mut self) -> Result<Module, ContainerError> {
        let name = self.read_name()?;
        let offset = self.pos;
        let byte = self.read_u8()?;
        let kind = IrKind::from_byte(byte).ok_or(ContainerError::InvalidKind { byte, offset })?;
        let payload_len = self.read_u32()? as usize;
        let exports = self.read_names()?;
        let imports = self.read_names()?;
        let payload = self.read_bytes(payload_len)?.to_vec();
        Ok(Module::new(name, kind, exports, imports, payload))
    }
}

fn push_name(buf: &mut Vec<u8>, name: &str) -> Result<(), ContainerError> {
    let len = u8::try_from(name.len()).map_err(|_| ContainerError::NameTooLong {
        name: name.to_string(),
    })?;
    buf.push(len);
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}

fn push_names(buf: &mut Vec<u8>, names: &[String]) -> Result<(), ContainerError> {
    let count = u32::try_from(names.len()).map_err(|_| ContainerError::NameTooLong {
        name: format!("<{} names>", names.len()),
    })?;
    buf.extend_from_slice(&count.to_le_bytes());
    for name in names {
        push_name(buf, name)?;
    }
    Ok(())
}

/// Encode one module as a container record.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, ContainerError> {
    let payload_len =
        u32::try_from(module.payload().len()).map_err(|_| ContainerError::PayloadTooLarge {
            module: module.name().to_string(),
        })?;

    let mut buf = Vec::with_capacity(MAGIC.len() + module.payload().len() + 64);
    buf.extend_from_slice(&MAGIC);
    push_name(&mut buf, module.name())?;
    buf.push(module.kind().as_byte());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    push_names(&mut buf, module.exports())?;
    push_names(&mut buf, module.imports())?;
    buf.extend_from_slice(module.payload());
    Ok(buf)
}

/// Builds library images carrying embedded modules.
#[derive(Debug, Default)]
pub struct ContainerWriter {
    buf: Vec<u8>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes placed before the next record, e.g. the native part of a library.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn module(&mut self, module: &Module) -> Result<&mut Self, ContainerError> {
        let record = encode_module(module)?;
        self.buf.extend_from_slice(&record);
        Ok(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ContainerError> {
        fs::write(path, &self.buf).map_err(|source| ContainerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Append the records to an existing file, creating it if needed.
    pub fn append_to(&self, path: &Path) -> Result<(), ContainerError> {
        let io_err = |source| ContainerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        file.write_all(&self.buf).map_err(io_err)
    }
}
