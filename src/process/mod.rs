//! # Process Manager
//!
//! Process records live in a fixed arena and are addressed by slot index.
//! Two index lists run over the arena:
//!
//! - the master sequence, every live process in creation order
//! - the ready queue, processes eligible to run, in scheduling order
//!
//! The running process stays at the head of the ready queue. Each call to
//! [`ProcessManager::schedule`] moves it to the tail and promotes the new
//! head, which gives plain round robin.
//!
//! ## Lifecycle
//!
//! ```text
//! create ──▶ Ready ◀──schedule──▶ Running
//!              │  ▲                  │
//!         block│  │wake         block│
//!              ▼  │                  │
//!            Blocked ◀───────────────┘
//!
//! terminate (from any state) frees the record and its stack
//! ```
//!
//! A process terminated while its registers are still on the CPU keeps its
//! stack until the interrupt exit path has moved off it; see
//! [`ProcessManager::reap`].
//!
//! Register state is not touched here except through
//! [`ProcessManager::switch_stack`], which the interrupt exit path calls
//! after dispatch to trade the interrupted stack for the selected one.

pub mod context;

use core::fmt;

use crate::config::{MAX_PROCESSES, PROCESS_NAME_LEN, PROCESS_STACK_SIZE};
use crate::data_structures::IndexList;
use crate::format::FixedStr;
use crate::interrupts::frame::InterruptFrame;
use crate::memory::{AllocError, Heap};
use crate::{klog_debug, klog_info};

pub use context::{ContextBuilder, SavedContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Blocked => "BLOCKED",
            ProcessState::Terminated => "TERMINATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    TableFull,
    OutOfMemory(AllocError),
    NoSuchProcess(Pid),
}

impl From<AllocError> for ProcessError {
    fn from(err: AllocError) -> Self {
        ProcessError::OutOfMemory(err)
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TableFull => write!(f, "process table full ({} entries)", MAX_PROCESSES),
            ProcessError::OutOfMemory(err) => write!(f, "cannot allocate process stack: {}", err),
            ProcessError::NoSuchProcess(pid) => write!(f, "no process with pid {}", pid),
        }
    }
}

pub type ProcessName = FixedStr<PROCESS_NAME_LEN>;

#[derive(Debug, Clone, Copy)]
pub struct Process {
    pub pid: Pid,
    pub name: ProcessName,
    pub state: ProcessState,
    pub context: SavedContext,
    /// Heap address of the stack allocation.
    pub stack: u32,
}

/// Read-only view handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: ProcessName,
    pub state: ProcessState,
}

impl From<&Process> for ProcessInfo {
    fn from(p: &Process) -> Self {
        Self {
            pid: p.pid,
            name: p.name,
            state: p.state,
        }
    }
}

/// Whose registers the CPU currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Live {
    Boot,
    Process { slot: u16, pid: Pid },
}

pub struct ProcessManager {
    slots: [Option<Process>; MAX_PROCESSES],
    all: IndexList<MAX_PROCESSES>,
    ready: IndexList<MAX_PROCESSES>,
    current: Option<u16>,
    next_pid: u32,
    live: Live,
    boot: SavedContext,
    /// Stack of a terminated process that may still be executing on it.
    retired: Option<(Pid, u32)>,
}

impl ProcessManager {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PROCESSES],
            all: IndexList::new(),
            ready: IndexList::new(),
            current: None,
            next_pid: 1,
            live: Live::Boot,
            boot: SavedContext {
                esp: 0,
                ebp: 0,
                eip: 0,
            },
            retired: None,
        }
    }

    /// Create a process that starts at `entry` on a fresh stack from `heap`.
    ///
    /// If `entry` returns it lands in `exit_trampoline`. The new process is
    /// appended to both sequences in state `Ready`.
    pub fn create(
        &mut self,
        heap: &mut Heap,
        name: &str,
        entry: u32,
        exit_trampoline: u32,
    ) -> Result<Pid, ProcessError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ProcessError::TableFull)? as u16;

        let stack = heap.allocate(PROCESS_STACK_SIZE)?;
        let context = match heap.bytes_mut(stack, PROCESS_STACK_SIZE) {
            Ok(bytes) => ContextBuilder::new(entry, exit_trampoline).build(stack, bytes),
            Err(err) => {
                heap.free(stack);
                return Err(err.into());
            }
        };

        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        self.slots[slot as usize] = Some(Process {
            pid,
            name: ProcessName::truncated(name),
            state: ProcessState::Ready,
            context,
            stack,
        });
        // Both lists have the arena's capacity and the slot was free.
        let pushed = self.all.push_back(slot).and(self.ready.push_back(slot));
        debug_assert!(pushed.is_ok());

        klog_debug!("process: created {} '{}' stack {:#x}", pid, name, stack);
        Ok(pid)
    }

    /// Rotate the ready queue and return the process that now runs.
    ///
    /// The running process, if any, drops back to `Ready` at the tail. The
    /// head of the queue becomes current. An empty queue leaves nothing
    /// current.
    pub fn schedule(&mut self) -> Option<Pid> {
        if let Some(slot) = self.current {
            if let Some(process) = self.slots[slot as usize].as_mut() {
                if process.state == ProcessState::Running {
                    process.state = ProcessState::Ready;
                    let moved = self.ready.move_to_back(slot);
                    debug_assert!(moved.is_ok(), "running process missing from ready queue");
                }
            }
        }

        self.current = self.ready.front();
        let slot = self.current?;
        let process = self.slots[slot as usize].as_mut()?;
        process.state = ProcessState::Running;
        Some(process.pid)
    }

    /// Remove `pid` from both sequences and release its stack.
    ///
    /// Returns whether it was the current process. In that case nothing is
    /// current afterwards and the caller should schedule. When `pid` is the
    /// process whose registers the CPU holds, its stack is retired instead
    /// and released by [`reap`](Self::reap) after the next switch.
    pub fn terminate(&mut self, heap: &mut Heap, pid: Pid) -> Result<bool, ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NoSuchProcess(pid))?;
        self.reap(heap);

        self.all.remove(slot);
        self.ready.remove(slot);
        let was_current = self.current == Some(slot);
        if was_current {
            self.current = None;
        }

        if let Some(mut process) = self.slots[slot as usize].take() {
            process.state = ProcessState::Terminated;
            if self.live == (Live::Process { slot, pid }) {
                self.retired = Some((pid, process.stack));
            } else {
                heap.free(process.stack);
            }
            klog_info!("process: {} '{}' terminated", process.pid, process.name);
        }
        Ok(was_current)
    }

    /// Release a retired stack once the CPU has left it.
    pub fn reap(&mut self, heap: &mut Heap) {
        if let Some((pid, stack)) = self.retired {
            if !matches!(self.live, Live::Process { pid: live, .. } if live == pid) {
                heap.free(stack);
                self.retired = None;
            }
        }
    }

    /// Take `pid` off the ready queue. Returns whether it was current.
    pub fn block(&mut self, pid: Pid) -> Result<bool, ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NoSuchProcess(pid))?;
        if let Some(process) = self.slots[slot as usize].as_mut() {
            process.state = ProcessState::Blocked;
        }
        self.ready.remove(slot);
        let was_current = self.current == Some(slot);
        if was_current {
            self.current = None;
        }
        Ok(was_current)
    }

    /// Put a blocked process back at the tail of the ready queue.
    pub fn wake(&mut self, pid: Pid) -> Result<(), ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NoSuchProcess(pid))?;
        if let Some(process) = self.slots[slot as usize].as_mut() {
            if process.state == ProcessState::Blocked {
                process.state = ProcessState::Ready;
                let pushed = self.ready.push_back(slot);
                debug_assert!(pushed.is_ok(), "blocked process already queued");
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<ProcessInfo> {
        let slot = self.current?;
        self.slots[slot as usize].as_ref().map(ProcessInfo::from)
    }

    /// Every live process in creation order.
    pub fn enumerate(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.all
            .iter()
            .filter_map(move |slot| self.slots[slot as usize].as_ref().map(ProcessInfo::from))
    }

    /// Ready queue in scheduling order.
    pub fn ready_queue(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready
            .iter()
            .filter_map(move |slot| self.slots[slot as usize].as_ref().map(|p| p.pid))
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slot_of(pid)
            .and_then(|slot| self.slots[slot as usize].as_ref())
    }

    pub fn count(&self) -> usize {
        self.all.len()
    }

    /// Trade the interrupted stack for the one the scheduler selected.
    ///
    /// `frame_esp` is the stack pointer the entry stub handed over and
    /// `frame` the registers it saved there. When the selection differs from
    /// whoever was interrupted, the interrupted context is stored (in its
    /// process record, or as the boot context) and the selected context's
    /// stack pointer is returned. With nothing selected the boot context
    /// resumes.
    pub fn switch_stack(&mut self, frame_esp: u32, frame: &InterruptFrame) -> u32 {
        let target = match self.current.and_then(|slot| {
            self.slots[slot as usize]
                .as_ref()
                .map(|p| Live::Process { slot, pid: p.pid })
        }) {
            Some(live) => live,
            None => Live::Boot,
        };
        if target == self.live {
            return frame_esp;
        }

        let outgoing = SavedContext {
            esp: frame_esp,
            ebp: frame.ebp,
            eip: frame.eip,
        };
        match self.live {
            Live::Boot => self.boot = outgoing,
            Live::Process { slot, pid } => {
                // The record is gone if the process terminated itself.
                if let Some(process) = self.slots[slot as usize].as_mut().filter(|p| p.pid == pid) {
                    process.context = outgoing;
                }
            }
        }

        self.live = target;
        match target {
            Live::Boot => self.boot.esp,
            Live::Process { slot, .. } => self.slots[slot as usize]
                .as_ref()
                .map_or(frame_esp, |p| p.context.esp),
        }
    }

    fn slot_of(&self, pid: Pid) -> Option<u16> {
        self.all
            .iter()
            .find(|&slot| matches!(&self.slots[slot as usize], Some(p) if p.pid == pid))
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::leaked_region;

    const BASE: u32 = 0x0010_0000;
    const ENTRY: u32 = 0x0010_2000;
    const EXIT: u32 = 0x0010_3000;

    fn heap() -> Heap {
        Heap::new(BASE, leaked_region(64 * 1024)).unwrap()
    }

    fn spawn(pm: &mut ProcessManager, heap: &mut Heap, name: &str) -> Pid {
        pm.create(heap, name, ENTRY, EXIT).unwrap()
    }

    #[test]
    fn create_assigns_ascending_pids_in_order() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let idle = spawn(&mut pm, &mut heap, "idle");
        let work = spawn(&mut pm, &mut heap, "work");

        assert!(idle < work);
        assert_eq!(pm.ready_queue().collect::<Vec<_>>(), vec![idle, work]);
        let names: Vec<_> = pm.enumerate().map(|p| p.name).collect();
        assert_eq!(names[0].as_str(), "idle");
        assert_eq!(names[1].as_str(), "work");
        assert!(pm.enumerate().all(|p| p.state == ProcessState::Ready));
        assert_eq!(heap.used(), 2 * PROCESS_STACK_SIZE);
    }

    #[test]
    fn create_then_terminate_restores_both_sequences() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        spawn(&mut pm, &mut heap, "a");
        spawn(&mut pm, &mut heap, "b");
        let all_before = pm.all.clone();
        let ready_before = pm.ready.clone();
        let heap_before = heap.stats();

        let pid = spawn(&mut pm, &mut heap, "temp");
        assert_eq!(pm.terminate(&mut heap, pid), Ok(false));

        assert_eq!(pm.all, all_before);
        assert_eq!(pm.ready, ready_before);
        assert_eq!(heap.stats(), heap_before);
        assert!(pm.get(pid).is_none());
    }

    #[test]
    fn round_robin_visits_everyone_within_n_rounds() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let pids: Vec<_> = (0..5).map(|i| spawn(&mut pm, &mut heap, &format!("p{}", i))).collect();

        for start in 0..10 {
            let mut seen = Vec::new();
            for _ in 0..pids.len() {
                seen.push(pm.schedule().unwrap());
            }
            seen.sort();
            assert_eq!(seen, pids, "window starting at round {}", start);
        }
    }

    #[test]
    fn schedule_demotes_previous_and_promotes_head() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let a = spawn(&mut pm, &mut heap, "a");
        let b = spawn(&mut pm, &mut heap, "b");

        assert_eq!(pm.schedule(), Some(a));
        assert_eq!(pm.get(a).unwrap().state, ProcessState::Running);
        assert_eq!(pm.schedule(), Some(b));
        assert_eq!(pm.get(a).unwrap().state, ProcessState::Ready);
        assert_eq!(pm.get(b).unwrap().state, ProcessState::Running);
        assert_eq!(pm.ready_queue().collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(pm.schedule(), Some(a));
    }

    #[test]
    fn schedule_on_empty_queue_selects_nothing() {
        let mut pm = ProcessManager::new();
        assert_eq!(pm.schedule(), None);
        assert!(pm.current().is_none());
    }

    #[test]
    fn terminating_current_clears_it() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let a = spawn(&mut pm, &mut heap, "a");
        let b = spawn(&mut pm, &mut heap, "b");
        pm.schedule();

        assert_eq!(pm.terminate(&mut heap, a), Ok(true));
        assert!(pm.current().is_none());
        assert_eq!(pm.schedule(), Some(b));
        assert_eq!(
            pm.terminate(&mut heap, a),
            Err(ProcessError::NoSuchProcess(a))
        );
    }

    #[test]
    fn blocked_processes_are_skipped_until_woken() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let a = spawn(&mut pm, &mut heap, "a");
        let b = spawn(&mut pm, &mut heap, "b");

        assert_eq!(pm.block(b), Ok(false));
        assert_eq!(pm.schedule(), Some(a));
        assert_eq!(pm.schedule(), Some(a));
        pm.wake(b).unwrap();
        assert_eq!(pm.get(b).unwrap().state, ProcessState::Ready);
        assert_eq!(pm.schedule(), Some(b));
    }

    #[test]
    fn table_full_and_out_of_memory_are_reported() {
        let mut heap = Heap::new(BASE, leaked_region(6 * 1024)).unwrap();
        let mut pm = ProcessManager::new();
        spawn(&mut pm, &mut heap, "one");
        assert_eq!(
            pm.create(&mut heap, "two", ENTRY, EXIT),
            Err(ProcessError::OutOfMemory(AllocError::OutOfMemory))
        );
        assert_eq!(pm.count(), 1);

        let mut big = Heap::new(BASE, leaked_region(MAX_PROCESSES * 4200 + 4096)).unwrap();
        let mut pm = ProcessManager::new();
        for i in 0..MAX_PROCESSES {
            spawn(&mut pm, &mut big, &format!("p{}", i));
        }
        assert_eq!(
            pm.create(&mut big, "extra", ENTRY, EXIT),
            Err(ProcessError::TableFull)
        );
    }

    #[test]
    fn long_names_are_truncated() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let pid = spawn(&mut pm, &mut heap, "a-process-name-that-is-longer-than-the-record-holds");
        assert_eq!(pm.get(pid).unwrap().name.len(), PROCESS_NAME_LEN);
    }

    #[test]
    fn switch_stack_saves_outgoing_and_loads_incoming() {
        let mut heap = heap();
        let mut pm = ProcessManager::new();
        let a = spawn(&mut pm, &mut heap, "a");
        let b = spawn(&mut pm, &mut heap, "b");
        let a_esp = pm.get(a).unwrap().context.esp;
        let b_esp = pm.get(b).unwrap().context.esp;

        let boot_frame = InterruptFrame {
            eip: 0x0010_0100,
            ebp: 0x0009_0000,
            ..InterruptFrame::default()
        };
        // Nothing scheduled yet: stay on the boot stack.
        assert_eq!(pm.switch_stack(0x0009_FF00, &boot_frame), 0x0009_FF00);

        pm.schedule();
        assert_eq!(pm.switch_stack(0x0009_FF00, &boot_frame), a_esp);

        // a gets preempted somewhere inside its stack.
        let a_frame = InterruptFrame {
            eip: ENTRY + 0x40,
            ebp: a_esp + 8,
            ..InterruptFrame::default()
        };
        pm.schedule();
        assert_eq!(pm.switch_stack(a_esp - 0x20, &a_frame), b_esp);
        let saved = pm.get(a).unwrap().context;
        assert_eq!(saved.esp, a_esp - 0x20);
        assert_eq!(saved.eip, ENTRY + 0x40);

        // Same selection again: no switch.
        assert_eq!(pm.switch_stack(b_esp, &InterruptFrame::default()), b_esp);

        // Everyone gone: back to the boot context.
        pm.terminate(&mut heap, a).unwrap();
        pm.terminate(&mut heap, b).unwrap();
        pm.schedule();
        assert_eq!(pm.switch_stack(b_esp, &InterruptFrame::default()), 0x0009_FF00);
    }
}
