//! One inspection session over a frozen kernel image.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::chardev::{self, CharDev};
use crate::error::Result;
use crate::image::{CoreImage, ReadImage};
use crate::percpu::{PerCpu, PerCpuRef};
use crate::symbols::{SymbolTable, Value};
use crate::tasks::{Task, TaskCache};

/// A loaded kernel image plus every per-session cache.
///
/// The image is treated as a frozen snapshot: caches are built at most
/// once and never invalidated. To inspect the same system again after it
/// has run, open a new session.
pub struct Session<R> {
    image: R,
    symbols: SymbolTable,
    percpu: PerCpu,
    tasks: TaskCache,
}

impl Session<CoreImage> {
    /// Open a session from a raw dump, its segment map, and a symbol file.
    pub fn open(image: &Path, map: &Path, symbols: &Path) -> Result<Self> {
        let symbols = SymbolTable::load(symbols)?;
        let image = CoreImage::load(image, map)?;
        info!("session open: kernel {}", symbols.version);
        Ok(Self::new(image, symbols))
    }
}

impl<R: ReadImage> Session<R> {
    pub fn new(image: R, symbols: SymbolTable) -> Self {
        Self {
            image,
            symbols,
            percpu: PerCpu::new(),
            tasks: TaskCache::default(),
        }
    }

    pub fn image(&self) -> &R {
        &self.image
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Merge later-arriving symbols (module tables, a second extraction
    /// pass). Queries that failed with a pending error can then succeed.
    pub fn extend_symbols(&mut self, more: SymbolTable) {
        self.symbols.extend(more);
    }

    pub fn nr_cpus(&self) -> Result<u32> {
        self.percpu.nr_cpus(&self.image, &self.symbols)
    }

    /// Does this variable or address live in per-CPU storage?
    pub fn is_percpu_var<'a>(&self, var: impl Into<PerCpuRef<'a>>) -> Result<bool> {
        self.percpu
            .is_percpu_var(&self.image, &self.symbols, var.into())
    }

    /// Resolve one CPU's instance of a per-CPU variable.
    pub fn get_percpu_var<'a>(&self, var: impl Into<PerCpuRef<'a>>, cpu: u32) -> Result<Value> {
        self.percpu
            .get_percpu_var(&self.image, &self.symbols, var.into(), cpu)
    }

    /// Resolve every CPU's instance of a per-CPU variable.
    pub fn get_percpu_var_all<'a>(
        &self,
        var: impl Into<PerCpuRef<'a>>,
    ) -> Result<BTreeMap<u32, Value>> {
        self.percpu
            .get_percpu_var_all(&self.image, &self.symbols, var.into())
    }

    pub fn task_by_pid(&self, pid: i32) -> Result<Task> {
        self.tasks.by_pid(&self.image, &self.symbols, pid)
    }

    /// Every task in the image, in pid order.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        self.tasks.all(&self.image, &self.symbols)
    }

    pub fn chardevs(&self) -> Result<Vec<CharDev>> {
        chardev::chardevs(&self.image, &self.symbols)
    }
}
