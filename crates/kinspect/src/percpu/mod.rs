//! Per-CPU address classification and translation.
//!
//! A kernel's per-CPU storage is the link-time template region plus any
//! chunks the allocator grew at runtime. Classifying an address checks the
//! static bounds first and falls back to intervals rebuilt from the chunk
//! maps; translating rebases a template-space address by a CPU's entry in
//! the offset table.

mod chunks;
mod region;

pub use chunks::Interval;
pub use region::{OffsetTable, StaticRegion};

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::image::ReadImage;
use crate::symbols::{SymbolTable, TypeInfo, Value};

#[cfg(feature = "debug-tools")]
pub(crate) use chunks::{REQUIRED_STRUCTS, REQUIRED_SYMBOLS as CHUNK_SYMBOLS};
#[cfg(feature = "debug-tools")]
pub(crate) use region::{OFFSET_SYMBOLS, REQUIRED_SYMBOLS as REGION_SYMBOLS};

/// How a caller names a per-CPU variable.
#[derive(Debug, Clone)]
pub enum PerCpuRef<'a> {
    /// A symbol name, resolved against the session's symbol table.
    Symbol(&'a str),
    /// A typed value the caller already resolved.
    Value(Value),
    /// A bare address; enough to classify, not to translate.
    Address(u64),
}

impl<'a> From<&'a str> for PerCpuRef<'a> {
    fn from(name: &'a str) -> Self {
        PerCpuRef::Symbol(name)
    }
}

impl From<Value> for PerCpuRef<'_> {
    fn from(value: Value) -> Self {
        PerCpuRef::Value(value)
    }
}

impl From<u64> for PerCpuRef<'_> {
    fn from(addr: u64) -> Self {
        PerCpuRef::Address(addr)
    }
}

/// Classification and translation engine for one inspection session.
///
/// All lazily bound state lives here. The image is a frozen snapshot, so
/// nothing is ever invalidated; inspecting a changed system means building
/// a new engine.
#[derive(Debug, Default)]
pub struct PerCpu {
    region: OnceLock<StaticRegion>,
    offsets: OnceLock<OffsetTable>,
    intervals: OnceLock<Vec<Interval>>,
    build_guard: Mutex<()>,
}

impl PerCpu {
    pub fn new() -> Self {
        Self::default()
    }

    fn region(&self, symbols: &SymbolTable) -> Result<StaticRegion> {
        if let Some(region) = self.region.get() {
            return Ok(*region);
        }
        let bound = StaticRegion::bind(symbols)?;
        Ok(*self.region.get_or_init(|| bound))
    }

    fn offsets(&self, image: &impl ReadImage, symbols: &SymbolTable) -> Result<&OffsetTable> {
        if let Some(table) = self.offsets.get() {
            return Ok(table);
        }
        let bound = OffsetTable::bind(image, symbols)?;
        Ok(self.offsets.get_or_init(|| bound))
    }

    /// The interval cache. The chunk walk runs at most once per engine:
    /// the guard serializes first use, and later reads hit the cell
    /// without taking it.
    fn intervals(&self, image: &impl ReadImage, symbols: &SymbolTable) -> Result<&[Interval]> {
        if let Some(intervals) = self.intervals.get() {
            return Ok(intervals);
        }
        let _guard = self
            .build_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(intervals) = self.intervals.get() {
            return Ok(intervals);
        }
        let built = chunks::build_intervals(image, symbols, self.region(symbols)?)?;
        Ok(self.intervals.get_or_init(|| built))
    }

    pub fn nr_cpus(&self, image: &impl ReadImage, symbols: &SymbolTable) -> Result<u32> {
        Ok(self.offsets(image, symbols)?.nr_cpus())
    }

    fn classify(&self, image: &impl ReadImage, symbols: &SymbolTable, addr: u64) -> Result<bool> {
        if self.region(symbols)?.contains(addr) {
            return Ok(true);
        }
        Ok(self
            .intervals(image, symbols)?
            .iter()
            .any(|iv| iv.contains(addr)))
    }

    fn address_of(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        var: &PerCpuRef<'_>,
    ) -> Result<u64> {
        match var {
            PerCpuRef::Symbol(name) => Ok(symbols.value_of(name)?.address),
            PerCpuRef::Value(value) if value.is_pointer() => value.read_pointer(image),
            PerCpuRef::Value(value) => Ok(value.address),
            PerCpuRef::Address(addr) => Ok(*addr),
        }
    }

    /// Does this variable or address live in per-CPU storage?
    pub fn is_percpu_var(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        var: PerCpuRef<'_>,
    ) -> Result<bool> {
        let addr = self.address_of(image, symbols, &var)?;
        self.classify(image, symbols, addr)
    }

    /// Resolve one CPU's instance of a per-CPU variable.
    pub fn get_percpu_var(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        var: PerCpuRef<'_>,
        cpu: u32,
    ) -> Result<Value> {
        let (candidate, ty) = self.resolve_candidate(image, symbols, var)?;
        self.translate(image, symbols, candidate, &ty, cpu)
    }

    /// Resolve every CPU's instance of a per-CPU variable.
    pub fn get_percpu_var_all(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        var: PerCpuRef<'_>,
    ) -> Result<BTreeMap<u32, Value>> {
        let (candidate, ty) = self.resolve_candidate(image, symbols, var)?;
        let nr_cpus = self.offsets(image, symbols)?.nr_cpus();
        (0..nr_cpus)
            .map(|cpu| Ok((cpu, self.translate(image, symbols, candidate, &ty, cpu)?)))
            .collect()
    }

    /// Apply the addressing-mode policy, yielding the template-space
    /// candidate address and the type of each per-CPU instance.
    ///
    /// Callers hand per-CPU variables in three shapes: the template object
    /// itself (use its address), a pointer into per-CPU storage (use its
    /// target), or an ordinary pointer variable that itself lives in
    /// per-CPU storage (fall back to its own address).
    fn resolve_candidate(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        var: PerCpuRef<'_>,
    ) -> Result<(u64, TypeInfo)> {
        let value = match var {
            PerCpuRef::Symbol(name) => symbols.value_of(name)?,
            PerCpuRef::Value(value) => value,
            PerCpuRef::Address(addr) => {
                return Err(Error::ArgumentType(format!(
                    "bare address {addr:#x} has no type; pass a symbol or typed value"
                )));
            }
        };

        let (mut candidate, mut ty) = match &value.ty {
            TypeInfo::Pointer { pointee } => (value.read_pointer(image)?, (**pointee).clone()),
            other => (value.address, other.clone()),
        };

        if !self.classify(image, symbols, candidate)? {
            candidate = value.address;
            ty = value.ty.clone();
            if !self.classify(image, symbols, candidate)? {
                return Err(Error::ArgumentType(
                    "argument does not correspond to a per-cpu pointer".into(),
                ));
            }
        }

        Ok((candidate, ty))
    }

    fn translate(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
        candidate: u64,
        ty: &TypeInfo,
        cpu: u32,
    ) -> Result<Value> {
        let region = self.region(symbols)?;
        let base = self.offsets(image, symbols)?.get(cpu)?;
        let offset = candidate.wrapping_sub(region.start);
        Ok(Value::new(ty.clone(), base.wrapping_add(offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{MockImage, MockImageBuilder};
    use crate::symbols::{Field, StructLayout};
    use std::cell::Cell;
    use std::collections::BTreeMap;

    // Template region: 8 KiB at PCPU_START.
    const PCPU_START: u64 = 0xffff_ffff_81a0_0000;
    const PCPU_SIZE: u64 = 0x2000;

    // Per-CPU bases for two CPUs.
    const CPU0_BASE: u64 = 0xffff_8880_3fc0_0000;
    const CPU1_BASE: u64 = 0xffff_8880_3fd0_0000;

    // Allocator state: one populated slot out of two.
    const PCPU_BASE_ADDR: u64 = 0xffff_8880_0140_0000;
    const SLOT_ARRAY: u64 = 0xffff_ffff_8270_0000;
    const CHUNK: u64 = 0xffff_8880_0233_0000;
    const CHUNK_MAP: u64 = 0xffff_8880_0234_0000;

    // The dynamic chunk serves addresses 1 MiB past the template start.
    const CHUNK_SPAN: u64 = 0x10_0000;

    fn int4() -> TypeInfo {
        TypeInfo::Int {
            size: 4,
            signed: true,
        }
    }

    fn ulong() -> TypeInfo {
        TypeInfo::Int {
            size: 8,
            signed: false,
        }
    }

    fn list_head() -> TypeInfo {
        TypeInfo::Struct {
            name: "list_head".into(),
            size: 16,
        }
    }

    fn chunk_layout() -> StructLayout {
        StructLayout {
            size: 40,
            fields: BTreeMap::from([
                (
                    "list".to_string(),
                    Field {
                        offset: 8,
                        ty: list_head(),
                    },
                ),
                (
                    "base_addr".to_string(),
                    Field {
                        offset: 16,
                        ty: TypeInfo::pointer_to(TypeInfo::Void),
                    },
                ),
                (
                    "map".to_string(),
                    Field {
                        offset: 24,
                        ty: TypeInfo::pointer_to(int4()),
                    },
                ),
                (
                    "map_used".to_string(),
                    Field {
                        offset: 32,
                        ty: int4(),
                    },
                ),
            ]),
        }
    }

    fn symbols() -> SymbolTable {
        let mut table = SymbolTable::new("6.4.0-test");
        table.insert("__per_cpu_start", PCPU_START, TypeInfo::Void);
        table.insert("__per_cpu_end", PCPU_START + PCPU_SIZE, TypeInfo::Void);
        table.insert(
            "__per_cpu_offset",
            0xffff_ffff_8260_0000,
            TypeInfo::array_of(ulong(), 2),
        );
        table.insert("pcpu_base_addr", 0xffff_ffff_8260_0100, ulong());
        table.insert("pcpu_nr_slots", 0xffff_ffff_8260_0108, int4());
        table.insert("pcpu_slot", SLOT_ARRAY, TypeInfo::array_of(list_head(), 2));
        table.insert_struct("pcpu_chunk", chunk_layout());
        table
    }

    /// Image with the allocator metadata plus one dynamic chunk whose map
    /// is `[-16, 8, -32]`.
    fn image() -> MockImage {
        MockImageBuilder::new()
            .write_u64(0xffff_ffff_8260_0000, CPU0_BASE)
            .write_u64(0xffff_ffff_8260_0008, CPU1_BASE)
            .write_u64(0xffff_ffff_8260_0100, PCPU_BASE_ADDR)
            .write_i32(0xffff_ffff_8260_0108, 2)
            // Slot 0: empty list.
            .write_u64(SLOT_ARRAY, SLOT_ARRAY)
            // Slot 1: one chunk, linked through pcpu_chunk.list at +8.
            .write_u64(SLOT_ARRAY + 16, CHUNK + 8)
            .write_u64(CHUNK + 8, SLOT_ARRAY + 16)
            .write_u64(CHUNK + 16, PCPU_BASE_ADDR + CHUNK_SPAN)
            .write_u64(CHUNK + 24, CHUNK_MAP)
            .write_i32(CHUNK + 32, 3)
            .write_i32(CHUNK_MAP, -16)
            .write_i32(CHUNK_MAP + 4, 8)
            .write_i32(CHUNK_MAP + 8, -32)
            .build()
    }

    fn dynamic_base() -> u64 {
        PCPU_START + CHUNK_SPAN
    }

    #[test]
    fn test_static_region_classification() {
        let (image, symbols, percpu) = (image(), symbols(), PerCpu::new());
        assert!(
            percpu
                .is_percpu_var(&image, &symbols, PCPU_START.into())
                .unwrap()
        );
        assert!(
            percpu
                .is_percpu_var(&image, &symbols, (PCPU_START + PCPU_SIZE - 1).into())
                .unwrap()
        );
        assert!(
            !percpu
                .is_percpu_var(&image, &symbols, (PCPU_START + PCPU_SIZE).into())
                .unwrap()
        );
    }

    #[test]
    fn test_static_path_needs_no_chunk_symbols() {
        // Markers only: the static fast path answers without the builder,
        // and the dynamic fallback reports pending instead of guessing.
        let mut symbols = SymbolTable::new("6.4.0-test");
        symbols.insert("__per_cpu_start", PCPU_START, TypeInfo::Void);
        symbols.insert("__per_cpu_end", PCPU_START + PCPU_SIZE, TypeInfo::Void);
        let image = MockImageBuilder::new().build();
        let percpu = PerCpu::new();

        assert!(
            percpu
                .is_percpu_var(&image, &symbols, (PCPU_START + 8).into())
                .unwrap()
        );
        let err = percpu
            .is_percpu_var(&image, &symbols, 0x1000u64.into())
            .unwrap_err();
        assert!(err.is_pending());
    }

    #[test]
    fn test_dynamic_intervals_follow_chunk_map() {
        let (image, symbols, percpu) = (image(), symbols(), PerCpu::new());
        let base = dynamic_base();

        // map [-16, 8, -32] => [base, base+16) and [base+24, base+56).
        for addr in [base, base + 15, base + 24, base + 55] {
            assert!(
                percpu.is_percpu_var(&image, &symbols, addr.into()).unwrap(),
                "{addr:#x} should be per-cpu"
            );
        }
        for addr in [base - 1, base + 16, base + 23, base + 56] {
            assert!(
                !percpu.is_percpu_var(&image, &symbols, addr.into()).unwrap(),
                "{addr:#x} should not be per-cpu"
            );
        }
    }

    #[test]
    fn test_interval_cache_builds_once() {
        struct CountingImage<'a> {
            inner: &'a MockImage,
            reads: Cell<usize>,
        }
        impl ReadImage for CountingImage<'_> {
            fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
                self.reads.set(self.reads.get() + 1);
                self.inner.read_bytes(addr, len)
            }
        }

        let inner = image();
        let image = CountingImage {
            inner: &inner,
            reads: Cell::new(0),
        };
        let symbols = symbols();
        let percpu = PerCpu::new();
        let addr = dynamic_base() + 4;

        let first = percpu.is_percpu_var(&image, &symbols, addr.into()).unwrap();
        let reads_after_build = image.reads.get();
        assert!(reads_after_build > 0);

        // Same answer, and not a single further image read: the walk ran
        // exactly once.
        let second = percpu.is_percpu_var(&image, &symbols, addr.into()).unwrap();
        assert_eq!(first, second);
        assert_eq!(image.reads.get(), reads_after_build);
    }

    #[test]
    fn test_get_percpu_var_promotes_template_object() {
        let (image, mut symbols, percpu) = (image(), symbols(), PerCpu::new());
        symbols.insert(
            "runqueues",
            PCPU_START + 0x100,
            TypeInfo::Struct {
                name: "rq".into(),
                size: 64,
            },
        );

        let v = percpu
            .get_percpu_var(&image, &symbols, "runqueues".into(), 1)
            .unwrap();
        assert_eq!(v.address, CPU1_BASE + 0x100);
        assert_eq!(
            v.ty,
            TypeInfo::Struct {
                name: "rq".into(),
                size: 64
            }
        );
    }

    #[test]
    fn test_get_percpu_var_follows_pointer_target() {
        let (image, symbols, percpu) = (image(), symbols(), PerCpu::new());
        // A pointer variable outside per-CPU storage, aimed at the
        // template region.
        let image = MockImageBuilder::new()
            .write_u64(0xffff_8880_1000_0000, PCPU_START + 0x40)
            .build_over(image);
        let ptr = Value::new(TypeInfo::pointer_to(int4()), 0xffff_8880_1000_0000);

        let v = percpu
            .get_percpu_var(&image, &symbols, ptr.into(), 0)
            .unwrap();
        assert_eq!(v.address, CPU0_BASE + 0x40);
        assert_eq!(v.ty, int4());
    }

    #[test]
    fn test_get_percpu_var_falls_back_to_pointer_location() {
        let (image, symbols, percpu) = (image(), symbols(), PerCpu::new());
        // A pointer that lives inside the template region but points
        // somewhere ordinary: its own address wins.
        let image = MockImageBuilder::new()
            .write_u64(PCPU_START + 0x80, 0xffff_8880_2000_0000)
            .build_over(image);
        let ptr = Value::new(TypeInfo::pointer_to(int4()), PCPU_START + 0x80);

        let v = percpu
            .get_percpu_var(&image, &symbols, ptr.clone().into(), 0)
            .unwrap();
        assert_eq!(v.address, CPU0_BASE + 0x80);
        assert_eq!(v.ty, ptr.ty);
    }

    #[test]
    fn test_get_percpu_var_rejects_ordinary_variable() {
        let (image, mut symbols, percpu) = (image(), symbols(), PerCpu::new());
        symbols.insert("nr_threads", 0xffff_ffff_8265_0000, int4());

        let err = percpu
            .get_percpu_var(&image, &symbols, "nr_threads".into(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentType(_)));
    }

    #[test]
    fn test_get_percpu_var_rejects_bare_address() {
        let (image, symbols, percpu) = (image(), symbols(), PerCpu::new());
        let err = percpu
            .get_percpu_var(&image, &symbols, (PCPU_START + 0x100).into(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentType(_)));
    }

    #[test]
    fn test_translation_matches_offset_table() {
        let (image, mut symbols, percpu) = (image(), symbols(), PerCpu::new());
        symbols.insert("cpu_number", PCPU_START + 0x7b8, int4());

        // target = offset[cpu] + (candidate - start), for every cpu.
        let all = percpu
            .get_percpu_var_all(&image, &symbols, "cpu_number".into())
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&0].address, CPU0_BASE + 0x7b8);
        assert_eq!(all[&1].address, CPU1_BASE + 0x7b8);

        for (cpu, value) in &all {
            let single = percpu
                .get_percpu_var(&image, &symbols, "cpu_number".into(), *cpu)
                .unwrap();
            assert_eq!(&single, value);
        }
    }

    #[test]
    fn test_unknown_cpu_is_rejected() {
        let (image, mut symbols, percpu) = (image(), symbols(), PerCpu::new());
        symbols.insert("cpu_number", PCPU_START + 0x7b8, int4());

        assert!(matches!(
            percpu.get_percpu_var(&image, &symbols, "cpu_number".into(), 2),
            Err(Error::NoSuchCpu { cpu: 2, nr_cpus: 2 })
        ));
    }
}
