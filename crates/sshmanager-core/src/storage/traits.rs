//! Connection storage trait definition.
//!
//! `ConnectionStorage` is the contract consumed by import, restore and the
//! command layer. Implementations own locking and persistence; callers only
//! see whole documents.

use crate::error::Result;
use crate::model::ConnectionStoreDocument;

/// Persistent home of a [`ConnectionStoreDocument`].
///
/// All implementations must ensure:
/// - Data is encrypted at rest
/// - A reader never observes a partially written document
/// - Concurrent `update` calls are serialized with no lost updates
/// - Document invariants (unique IDs, unique aliases, non-blank version)
///   hold after every successful call
pub trait ConnectionStorage: Send + Sync {
    /// Read the current document.
    ///
    /// A document that needed ID repair is persisted before it is returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Authentication` if the document fails to decrypt,
    /// `StoreError::Parse` if it has an unsupported shape, and key errors from
    /// key loading.
    fn load(&self) -> Result<ConnectionStoreDocument>;

    /// Replace the stored document with `document`.
    fn save(&self, document: ConnectionStoreDocument) -> Result<()>;

    /// Load, mutate, and persist the document as one serialized step.
    ///
    /// The value returned by `mutator` is passed through. If `mutator`
    /// returns an error nothing is written and that error is returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` if the mutation lock cannot be
    /// acquired, or any error from loading, the mutator, or persisting.
    fn update<T, F>(&self, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut ConnectionStoreDocument) -> Result<T>;
}
