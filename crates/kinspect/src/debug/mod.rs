//! Status utilities for CLI tooling.
//!
//! This module provides:
//! - Image and symbol-table statistics (`ImageStats`, `SymbolStats`)
//! - Per-subsystem symbol requirement checks (`Requirement`)

use std::fmt;

use crate::image::CoreImage;
use crate::symbols::SymbolTable;
use crate::{chardev, percpu, tasks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub segments: usize,
    pub mapped_bytes: u64,
}

pub fn image_stats(image: &CoreImage) -> ImageStats {
    ImageStats {
        segments: image.segments().count(),
        mapped_bytes: image.mapped_bytes(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolStats {
    pub version: String,
    pub symbols: usize,
    pub structs: usize,
}

pub fn symbol_stats(symbols: &SymbolTable) -> SymbolStats {
    SymbolStats {
        version: symbols.version.clone(),
        symbols: symbols.symbol_count(),
        structs: symbols.struct_count(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Symbol,
    Struct,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            RequirementKind::Symbol => "symbol",
            RequirementKind::Struct => "struct",
        })
    }
}

/// One symbol or layout a subsystem binds against, and whether the
/// current table can satisfy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub subsystem: &'static str,
    pub kind: RequirementKind,
    pub name: &'static str,
    pub ready: bool,
}

/// Check every subsystem's requirements against the current table.
pub fn check_requirements(symbols: &SymbolTable) -> Vec<Requirement> {
    let percpu_symbols = [
        percpu::REGION_SYMBOLS,
        percpu::OFFSET_SYMBOLS,
        percpu::CHUNK_SYMBOLS,
    ]
    .concat();
    let subsystems: [(&'static str, &[&'static str], &[&'static str]); 3] = [
        ("percpu", &percpu_symbols, percpu::REQUIRED_STRUCTS),
        ("tasks", tasks::REQUIRED_SYMBOLS, tasks::REQUIRED_STRUCTS),
        (
            "chardev",
            chardev::REQUIRED_SYMBOLS,
            chardev::REQUIRED_STRUCTS,
        ),
    ];

    let mut out = Vec::new();
    for &(subsystem, syms, structs) in &subsystems {
        for &name in syms {
            out.push(Requirement {
                subsystem,
                kind: RequirementKind::Symbol,
                name,
                ready: symbols.has_symbol(name),
            });
        }
        for &name in structs {
            out.push(Requirement {
                subsystem,
                kind: RequirementKind::Struct,
                name,
                ready: symbols.has_struct(name),
            });
        }
    }
    out
}
