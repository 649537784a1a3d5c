use rusqlite::OpenFlags;
use serde::Deserialize;

use crate::connection::Connection;
use crate::error::Error;

/// Access mode used when opening a database file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum OpenMode {
    /// Read-write, creating the file if it does not exist.
    #[default]
    #[serde(rename = "rwc")]
    ReadWriteCreate,
    /// Read-write; the file must already exist.
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}

/// Options for opening a connection.
///
/// Deserializable so Lua callers can pass `{ mode = "ro", uri = true }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenOptions {
    pub mode: OpenMode,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
}

impl OpenOptions {
    #[must_use]
    pub fn builder() -> OpenOptionsBuilder {
        OpenOptionsBuilder::default()
    }

    /// Native `SQLITE_OPEN_*` flags for these options.
    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        let mut flags = match self.mode {
            OpenMode::ReadWriteCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        if self.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        flags
    }
}

/// Fluent builder for [`OpenOptions`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptionsBuilder {
    opts: OpenOptions,
}

impl OpenOptionsBuilder {
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.opts.mode = mode;
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: bool) -> Self {
        self.opts.uri = uri;
        self
    }

    #[must_use]
    pub fn finish(self) -> OpenOptions {
        self.opts
    }

    /// Open `path` with the built options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the native open fails.
    pub fn open(self, path: impl AsRef<[u8]>) -> Result<Connection, Error> {
        Connection::open_with(path, &self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_creates_read_write() {
        let flags = OpenOptions::default().flags();
        assert_eq!(
            flags,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        );
    }

    #[test]
    fn builder_sets_mode_and_uri() {
        let opts = OpenOptions::builder()
            .mode(OpenMode::ReadOnly)
            .uri(true)
            .finish();
        assert_eq!(
            opts.flags(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI
        );
    }
}
