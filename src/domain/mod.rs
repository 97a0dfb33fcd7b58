//! Domain models for archive-bridge
//!
//! Contains the core migration logic without any I/O concerns.

mod id;
mod markup;
mod graph;
mod linearize;
mod migration;

pub use id::{IdError, RecordId, ReferenceKind};
pub use markup::{
    escape_markup, reconstruct, AnnotatedText, AnnotationRange, LegacyAnnotation, MarkupError,
    MarkupResult, Payload, Tag, TextAttributes, TieBreak,
};
pub use graph::{Edge, EditList, GraphError, HasReferences, Record, ReferenceGraph, ReferenceSet};
pub use linearize::{
    linearize, LinearizeConfig, LinearizeError, Linearization, UnresolvedCycles,
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_PASSES,
};
pub use migration::{
    Encoding, LegacyProperty, LegacyRecord, LegacyValue, Migration, MigrationConfig,
    MigrationError, MigrationOutput, MigrationReport, OutputValue, RejectedRecord,
    StageOutcome, StagedRecord,
};
