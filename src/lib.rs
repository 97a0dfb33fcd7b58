//! archive-bridge - Migrates records out of a legacy archive store
//!
//! Two transformations sit at the core. Stand-off annotations (tag plus
//! character offsets) are rebuilt into properly nested markup, reopening
//! ranges that overlap. Typed references between records are linearized so
//! that every record can be created after the records it points at, reversing
//! the references that close short cycles.

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{
    linearize, reconstruct, AnnotatedText, AnnotationRange, EditList, Migration, RecordId,
    ReferenceGraph, ReferenceKind, Tag,
};
