use nix;

pub type Result<T> = ::std::result::Result<T, HwError>;

/// Errors surfaced by the driver, PMON facade, and command-entry procedures.
///
/// Every variant carries enough context to reconstruct the failing access
/// without re-deriving it from a wrapped error.
#[derive(Debug, Fail)]
pub enum HwError {
    #[fail(display = "{} not present", path)]
    NotPresent { path: String },

    #[fail(display = "transport failure at {} (offset {:#x}): {}", node, offset, inner)]
    Transport {
        node: String,
        offset: u32,
        inner: String,
    },

    #[fail(display = "malformed dump at line {}: {}", line, reason)]
    MalformedDump { line: usize, reason: String },

    #[fail(display = "bad arguments: {}", reason)]
    BadArguments { reason: String },

    #[fail(display = "unknown command: {}", name)]
    UnknownCommand { name: String },

    #[fail(display = "offset {:#x} + width {} exceeds config space", offset, width)]
    OutOfRange { offset: u16, width: u16 },
}

impl From<::std::io::Error> for HwError {
    fn from(inner: ::std::io::Error) -> Self {
        HwError::Transport {
            node: String::new(),
            offset: 0,
            inner: inner.to_string(),
        }
    }
}

impl From<nix::Error> for HwError {
    fn from(inner: nix::Error) -> Self {
        HwError::Transport {
            node: String::new(),
            offset: 0,
            inner: inner.to_string(),
        }
    }
}

impl HwError {
    /// Re-tags an I/O failure with the node and offset that produced it.
    pub fn transport(node: impl Into<String>, offset: u32, inner: impl ToString) -> Self {
        HwError::Transport {
            node: node.into(),
            offset,
            inner: inner.to_string(),
        }
    }

    pub fn not_present(path: impl Into<String>) -> Self {
        HwError::NotPresent { path: path.into() }
    }
}
