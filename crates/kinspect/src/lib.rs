//! # kinspect
//!
//! Post-mortem inspector for kernel memory images.
//!
//! This crate provides:
//! - Typed reads over a captured kernel image (raw dump + segment map)
//! - Symbol and struct-layout tables loaded from versioned JSON
//! - Per-CPU address classification and translation
//! - Task and character-device enumeration
//!
//! ## Feature Flags
//!
//! - `debug-tools`: status and statistics helpers for CLI tooling.
//!   Intended for the command-line frontend, not for library consumers.

pub mod chardev;
#[cfg(feature = "debug-tools")]
pub mod debug;
pub mod error;
pub mod image;
pub mod lists;
pub mod percpu;
pub mod session;
pub mod symbols;
pub mod tasks;

pub use chardev::{CharDev, chardevs};
pub use error::{Error, Result};
pub use image::{CoreImage, ReadImage, SegmentDesc, SegmentMap};
pub use lists::{ListCursor, list_entries};
pub use percpu::{Interval, OffsetTable, PerCpu, PerCpuRef, StaticRegion};
pub use session::Session;
pub use symbols::{Field, StructLayout, Symbol, SymbolTable, TypeInfo, Value};
pub use tasks::{Task, TaskCache, TaskState};

#[cfg(feature = "debug-tools")]
pub use debug::{
    ImageStats, Requirement, RequirementKind, SymbolStats, check_requirements, image_stats,
    symbol_stats,
};
