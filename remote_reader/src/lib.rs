//! Signed proxy for remote images.
//!
//! A client can only make the server fetch a remote URL if the host was
//! signed with a server-held key or is on the allowlist, so the proxy is
//! neither an open redirect nor an SSRF vector. [`RemoteReaderService`]
//! plugs into a [`blob_store::ProviderRegistry`] like any other provider.

mod allowlist;
mod config;
mod service;
mod signature_cache;
mod signer;

pub use allowlist::DomainAllowlist;
pub use config::RemoteReaderConfig;
pub use service::RemoteReaderService;
pub use signature_cache::{SignatureCache, DEFAULT_SIGNATURE_CACHE_CAPACITY};
pub use signer::{
    token_len,
    SignedReference,
    SigningKey,
    UrlSigner,
    DEFAULT_SIGNATURE_BYTES,
    MAX_SIGNATURE_BYTES,
};
