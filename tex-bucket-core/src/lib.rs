#![doc = "tex-bucket-core: core logic library for tex-bucket."]

//! This crate contains the reconstruction pipeline for preprint source buckets:
//! splitting a bucket tarball into per-document payloads, sniffing and unpacking
//! each payload, stripping comments from every source file, resolving the
//! inclusion graph and merging the document into one source text.
//!
//! # Usage
//! Add this as a dependency for all pipeline, processing and config code. The
//! `tex-bucket` binary crate is only CLI glue around [`pipeline`].

pub mod bucket;
pub mod config;
pub mod contract;
pub mod convert;
pub mod download;
pub mod error;
pub mod graph;
pub mod merge;
pub mod pipeline;
pub mod sniff;
pub mod sources;
pub mod tokenizer;
pub mod unpack;

pub use error::{ConvertError, PipelineError, StructureError};
