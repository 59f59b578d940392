//! Task lookup over the imaged kernel's task list.
//!
//! Every task is threaded on the circular list rooted in `init_task`; the
//! cache walks it once per session and indexes tasks by pid.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use strum::{Display, FromRepr};
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::ReadImage;
use crate::lists::list_entries;
use crate::symbols::SymbolTable;

#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_SYMBOLS: &[&str] = &["init_task"];
#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_STRUCTS: &[&str] = &["task_struct"];

/// Length of the fixed `comm` buffer in `task_struct`.
const TASK_COMM_LEN: usize = 16;

/// Scheduling state decoded from the raw `task_struct.state` word.
///
/// Display forms are the conventional two-letter state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(i64)]
pub enum TaskState {
    #[strum(serialize = "RU")]
    Running = 0,
    #[strum(serialize = "IN")]
    Interruptible = 1,
    #[strum(serialize = "UN")]
    Uninterruptible = 2,
    #[strum(serialize = "ST")]
    Stopped = 4,
    #[strum(serialize = "TR")]
    Traced = 8,
    #[strum(serialize = "DE")]
    Dead = 16,
    #[strum(serialize = "ZO")]
    Zombie = 32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Address of the `task_struct` in the image.
    pub address: u64,
    pub pid: i32,
    pub comm: String,
    pub raw_state: i64,
}

impl Task {
    /// Decoded state, if the raw word is a single known value.
    pub fn state(&self) -> Option<TaskState> {
        TaskState::from_repr(self.raw_state)
    }

    /// Two-letter state code, or the raw word for composite states.
    pub fn state_label(&self) -> String {
        match self.state() {
            Some(state) => state.to_string(),
            None => format!("{:#x}", self.raw_state),
        }
    }
}

struct TaskLayout {
    pid: u64,
    comm: u64,
    state: u64,
    tasks: u64,
}

impl TaskLayout {
    fn bind(symbols: &SymbolTable) -> Result<Self> {
        Ok(Self {
            pid: symbols.field_offset("task_struct", "pid")?,
            comm: symbols.field_offset("task_struct", "comm")?,
            state: symbols.field_offset("task_struct", "state")?,
            tasks: symbols.field_offset("task_struct", "tasks")?,
        })
    }
}

/// Pid-indexed view of the task list, populated at most once per session.
#[derive(Debug, Default)]
pub struct TaskCache {
    tasks: OnceLock<BTreeMap<i32, Task>>,
    populate_guard: Mutex<()>,
}

impl TaskCache {
    fn cached(
        &self,
        image: &impl ReadImage,
        symbols: &SymbolTable,
    ) -> Result<&BTreeMap<i32, Task>> {
        if let Some(tasks) = self.tasks.get() {
            return Ok(tasks);
        }
        let _guard = self
            .populate_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tasks) = self.tasks.get() {
            return Ok(tasks);
        }
        let built = populate(image, symbols)?;
        Ok(self.tasks.get_or_init(|| built))
    }

    pub fn by_pid(&self, image: &impl ReadImage, symbols: &SymbolTable, pid: i32) -> Result<Task> {
        self.cached(image, symbols)?
            .get(&pid)
            .cloned()
            .ok_or(Error::TaskNotFound(pid))
    }

    /// Every task, in pid order.
    pub fn all(&self, image: &impl ReadImage, symbols: &SymbolTable) -> Result<Vec<Task>> {
        Ok(self.cached(image, symbols)?.values().cloned().collect())
    }
}

fn populate(image: &impl ReadImage, symbols: &SymbolTable) -> Result<BTreeMap<i32, Task>> {
    let layout = TaskLayout::bind(symbols)?;
    let init_task = symbols.address_of("init_task")?;

    let mut tasks = BTreeMap::new();
    let init = read_task(image, &layout, init_task)?;
    tasks.insert(init.pid, init);
    for entry in list_entries(image, init_task + layout.tasks, layout.tasks) {
        let task = read_task(image, &layout, entry?)?;
        tasks.insert(task.pid, task);
    }
    debug!("task cache: {} tasks", tasks.len());
    Ok(tasks)
}

fn read_task(image: &impl ReadImage, layout: &TaskLayout, addr: u64) -> Result<Task> {
    Ok(Task {
        address: addr,
        pid: image.read_i32(addr + layout.pid)?,
        comm: image.read_cstr(addr + layout.comm, TASK_COMM_LEN)?,
        raw_state: image.read_i64(addr + layout.state)?,
    })
}
