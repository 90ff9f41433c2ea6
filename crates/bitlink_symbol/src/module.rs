use core::fmt;

/// Encoding of a module's IR payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrKind {
    Text = 0,
    Binary = 1,
}

impl IrKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(IrKind::Text),
            1 => Some(IrKind::Binary),
            _ => None,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for IrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrKind::Text => write!(f, "text"),
            IrKind::Binary => write!(f, "binary"),
        }
    }
}

/// One translation unit of bitcode extracted from a library file.
///
/// Modules are immutable once loaded and are shared between contexts through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    kind: IrKind,
    exports: Vec<String>,
    imports: Vec<String>,
    payload: Vec<u8>,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        kind: IrKind,
        exports: Vec<String>,
        imports: Vec<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            exports,
            imports,
            payload,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IrKind {
        self.kind
    }

    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn exports_symbol(&self, symbol: &str) -> bool {
        self.exports.iter().any(|export| export == symbol)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} ({}, {} bytes, {} exports, {} imports)",
            self.name,
            self.kind,
            self.payload.len(),
            self.exports.len(),
            self.imports.len()
        )
    }
}
