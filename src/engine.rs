use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{EngineError, SnapshotError};
use crate::image::ProgramImage;
use crate::isa::Instr;
use crate::runtime::RunState;
use crate::snapshot;

/// Predicate over the next, not yet executed, instruction that ends a run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopCondition {
    /// Stop in front of `IN` or `OUT`.
    Io,
    /// Stop in front of `EXIT` (`JMPL r0 r0`).
    Exit,
}

impl StopCondition {
    pub fn matches(self, instr: Instr) -> bool {
        match self {
            StopCondition::Io => instr.op.is_io(),
            StopCondition::Exit => instr.is_exit(),
        }
    }
}

/// Why a run returned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
    /// The condition matched the instruction at `pc`, which was left unexecuted.
    Condition(Instr),
    /// [`Engine::request_stop`] was observed.
    Stopped,
}

/// State guarded by the per-instruction lock.
struct Machine {
    state: RunState,
    /// A run is in flight.
    busy: bool,
}

struct Shared {
    machine: Mutex<Machine>,
    /// Signalled whenever `busy` drops back to false.
    idle: Condvar,
    stop: AtomicBool,
}

/// Execution engine. Owns the machine state; cloning gives another handle to the same CPU.
///
/// At most one run is active at a time. The lock is held for a single instruction, so
/// inspection, [`Engine::request_stop`] and refused calls wait at most one instruction.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_state(RunState::new())
    }

    pub fn with_state(state: RunState) -> Self {
        Engine {
            shared: Arc::new(Shared {
                machine: Mutex::new(Machine { state, busy: false }),
                idle: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.shared.lock()
    }

    /// Lock and refuse if a run is in flight.
    fn lock_idle(&self) -> Result<MutexGuard<'_, Machine>, EngineError> {
        let machine = self.lock();
        if machine.busy {
            return Err(EngineError::Busy);
        }
        Ok(machine)
    }

    /// Replace program memory. Does not reset registers or RAM.
    pub fn load_program(&self, image: &ProgramImage) -> Result<(), EngineError> {
        self.lock_idle()?.state.load_program(image);
        Ok(())
    }

    /// Clear RAM, registers, ports, carry and pc. The program is kept.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.lock_idle()?.state.reset();
        Ok(())
    }

    /// Execute a single instruction on the calling thread.
    pub fn step(&self) -> Result<Instr, EngineError> {
        Ok(self.lock_idle()?.state.step())
    }

    /// Start executing on a background thread until `cond` matches the next instruction
    /// or a stop is requested.
    pub fn run_until(&self, cond: StopCondition) -> Result<RunHandle, EngineError> {
        {
            let mut machine = self.lock_idle()?;
            if machine.state.program_length() == 0 {
                return Err(EngineError::NoProgramLoaded);
            }
            machine.busy = true;
            self.shared.stop.store(false, Ordering::SeqCst);
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::spawn(move || shared.run_loop(cond));
        Ok(RunHandle { handle })
    }

    /// Ask the active run to stop before its next instruction. No effect when idle.
    pub fn request_stop(&self) {
        let machine = self.lock();
        if machine.busy {
            self.shared.stop.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Block until no run is active.
    pub fn wait_idle(&self) {
        let machine = self.lock();
        let _idle = self
            .shared
            .idle
            .wait_while(machine, |m| m.busy)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until no run is active or `limit` passes. Returns whether the engine is idle.
    pub fn wait_idle_timeout(&self, limit: Duration) -> bool {
        let machine = self.lock();
        let (machine, _) = self
            .shared
            .idle
            .wait_timeout_while(machine, limit, |m| m.busy)
            .unwrap_or_else(PoisonError::into_inner);
        !machine.busy
    }

    /// Write an input port. Allowed while running.
    ///
    /// # Panics
    ///
    /// If `port` is not below 16.
    pub fn set_input(&self, port: usize, value: u8) {
        self.lock().state.set_input(port, value);
    }

    /// Copy of the state between two instructions.
    pub fn state(&self) -> RunState {
        self.lock().state.clone()
    }

    pub fn snapshot_save(&self) -> Vec<u8> {
        snapshot::encode(&self.lock().state)
    }

    /// Replace the whole state. On any error the live state is untouched.
    pub fn snapshot_load(&self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let decoded = snapshot::decode(bytes)?;
        self.lock_idle()?.state = decoded;
        Ok(())
    }

    pub fn save_snapshot_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let state = self.state();
        snapshot::write_file(path, &state)
    }

    pub fn load_snapshot_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let decoded = snapshot::read_file(path)?;
        self.lock_idle()?.state = decoded;
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        // A poisoned lock means an instruction panicked, which only an invariant violation does
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_loop(&self, cond: StopCondition) -> StopReason {
        loop {
            let mut machine = self.lock();
            if self.stop.load(Ordering::SeqCst) {
                return self.finish(machine, StopReason::Stopped);
            }
            let next = machine.state.current();
            if cond.matches(next) {
                return self.finish(machine, StopReason::Condition(next));
            }
            machine.state.step();
            // Lock is released here, once per instruction
        }
    }

    fn finish(&self, mut machine: MutexGuard<'_, Machine>, reason: StopReason) -> StopReason {
        machine.busy = false;
        self.stop.store(false, Ordering::SeqCst);
        drop(machine);
        self.idle.notify_all();
        reason
    }
}

/// Handle to a background run started by [`Engine::run_until`].
#[must_use = "dropping the handle detaches the run"]
pub struct RunHandle {
    handle: JoinHandle<StopReason>,
}

impl RunHandle {
    /// Wait for the run to end.
    pub fn join(self) -> StopReason {
        match self.handle.join() {
            Ok(reason) => reason,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
