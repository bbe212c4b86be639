//! Audio vault: authenticated encryption followed by blob storage

pub mod cipher;
pub mod storage;

pub use cipher::{generate_key, rotate_key, AudioCipher, CipherError};
pub use storage::{BlobStore, StorageError, StorageRouter};
