//! Symmetric cipher for record fields, plus the keyed blind index used to
//! look up enciphered emails.
//!
//! Sealed values travel as
//!
//! ```text
//! v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! Nothing here knows about records, stores or HTTP.

pub mod cipher;

pub use cipher::{Cipher, CipherError};
