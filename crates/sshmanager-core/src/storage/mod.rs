//! Storage abstraction for the connection document.
//!
//! The `ConnectionStorage` trait is what import, restore and command code
//! program against. `ConnectionStore` is the encrypted single-file backend.
//!
//! ## Security
//!
//! The backend is responsible for:
//! - Encryption at rest (no plaintext modes)
//! - Key loading and first-use key creation
//! - Atomic writes to prevent corruption
//! - Serializing writers through the mutation lock

pub mod encrypted_file;
pub mod traits;

pub use encrypted_file::ConnectionStore;
pub use traits::ConnectionStorage;
