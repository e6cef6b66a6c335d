//! Source document retrieval.
//!
//! The changelog is fetched over HTTP(S) and consumed as a stream of lines,
//! so memory use is bounded by the records kept, not by the document size.
//!
//! # Sources
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Marketplace changelog | [`changelog`] | Streaming `GET`, split into lines |

pub mod changelog;
