/// At-rest encryption for artifact content

pub mod cipher;

pub use cipher::{CipherError, ContentCipher};
