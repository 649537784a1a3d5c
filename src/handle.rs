//! Status-tracked ownership of native resources.
//!
//! A [`Handle`] pairs one native resource with its status. Releasing it is
//! idempotent: the resource is dropped (closed or finalized) the first time,
//! and every later release is a no-op. Dropping the handle releases it too,
//! which is how the host's garbage collector tears resources down.

use std::fmt;

/// Which kind of native resource a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Connection,
    Statement,
}

impl HandleKind {
    /// Name shown to host code, e.g. in `tostring(db)`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Connection => "database",
            HandleKind::Statement => "statement",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native resource that can live inside a [`Handle`].
///
/// Implementors release their resource in `Drop`.
pub trait Resource {
    const KIND: HandleKind;

    /// Native address, for display only.
    fn address(&self) -> *const ();
}

/// Lifecycle status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The native resource is live and usable.
    Ok,
    /// The resource was closed or finalized; permanent.
    Released,
}

pub struct Handle<R: Resource> {
    resource: Option<R>,
    status: Status,
}

impl<R: Resource> Handle<R> {
    pub(crate) fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
            status: Status::Ok,
        }
    }

    #[must_use]
    pub fn kind(&self) -> HandleKind {
        R::KIND
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The live resource, or `None` once released.
    pub(crate) fn get(&self) -> Option<&R> {
        match self.status {
            Status::Ok => self.resource.as_ref(),
            Status::Released => None,
        }
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut R> {
        match self.status {
            Status::Ok => self.resource.as_mut(),
            Status::Released => None,
        }
    }

    /// Release the native resource.
    ///
    /// Returns `true` only for the call that actually released it.
    pub fn release(&mut self) -> bool {
        self.status = Status::Released;
        self.resource.take().is_some()
    }
}

impl<R: Resource> fmt::Display for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self
            .resource
            .as_ref()
            .map_or(std::ptr::null(), Resource::address);
        write!(f, "{}: {address:p}", R::KIND)
    }
}

impl<R: Resource> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &R::KIND)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
