//! Process tree discovery and termination
//!
//! [`ProcessTree`] answers "who are the children of this pid" from the OS
//! process table; descendant collection and tree killing are built on top
//! of that single query, so any backend only needs the primitives.

use std::collections::HashSet;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessStatus, System};
use taskrunner_foundation::{Error, Result};
use tracing::{debug, warn};

pub trait ProcessTree: Send + Sync {
    /// Re-read the process table
    fn refresh(&self);

    /// Direct children of `pid` as of the last refresh
    fn children_of(&self, pid: u32) -> Vec<u32>;

    /// Whether `pid` is running (zombies count as gone); refreshes first
    fn is_alive(&self, pid: u32) -> bool;

    /// Forcefully kill one process. A process that no longer exists is
    /// success.
    fn terminate(&self, pid: u32) -> Result<()>;

    /// Forcefully kill every member of the process group `pgid`. Agents
    /// are launched as group leaders, so this reaches children that were
    /// re-parented after their parent died. A missing group is success.
    fn terminate_group(&self, _pgid: u32) -> Result<()> {
        Ok(())
    }

    /// All transitive children of `pid`, parents before their children
    fn descendants_of(&self, pid: u32) -> Vec<u32> {
        let mut seen = HashSet::from([pid]);
        let mut order = Vec::new();
        let mut frontier = vec![pid];
        while let Some(parent) = frontier.pop() {
            for child in self.children_of(parent) {
                if seen.insert(child) {
                    order.push(child);
                    frontier.push(child);
                }
            }
        }
        order
    }

    /// Kill every descendant of `pid`, then `pid` itself, then whatever is
    /// left of the process group `pid` leads.
    ///
    /// Returns whether every kill succeeded.
    fn kill_tree(&self, pid: u32) -> bool {
        self.refresh();
        let descendants = self.descendants_of(pid);
        debug!(pid, count = descendants.len(), "Killing process tree");

        let mut clean = true;
        for target in descendants.iter().rev().chain(std::iter::once(&pid)) {
            if let Err(e) = self.terminate(*target) {
                warn!(pid = *target, "Failed to kill process: {}", e);
                clean = false;
            }
        }
        if let Err(e) = self.terminate_group(pid) {
            warn!(pgid = pid, "Failed to kill process group: {}", e);
            clean = false;
        }
        clean
    }
}

/// [`ProcessTree`] backed by `sysinfo`
pub struct SystemProcessTree {
    system: Mutex<System>,
}

impl SystemProcessTree {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> T {
        // a poisoned lock still holds a usable process table
        let mut guard = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Default for SystemProcessTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTree for SystemProcessTree {
    fn refresh(&self) {
        self.with_system(|sys| sys.refresh_processes());
    }

    fn children_of(&self, pid: u32) -> Vec<u32> {
        let parent = Pid::from_u32(pid);
        self.with_system(|sys| {
            let mut children: Vec<u32> = sys
                .processes()
                .iter()
                .filter(|(child, process)| **child != parent && process.parent() == Some(parent))
                .map(|(child, _)| child.as_u32())
                .collect();
            children.sort_unstable();
            children
        })
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.with_system(|sys| {
            sys.refresh_processes();
            sys.process(Pid::from_u32(pid))
                .map(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
                .unwrap_or(false)
        })
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| Error::InvalidInput(format!("pid out of range: {}", pid)))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(raw, libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pid, "Process already gone");
            return Ok(());
        }
        Err(Error::Process(format!("kill {}: {}", pid, err)))
    }

    #[cfg(unix)]
    fn terminate_group(&self, pgid: u32) -> Result<()> {
        let raw = i32::try_from(pgid)
            .ok()
            .filter(|raw| *raw > 1)
            .ok_or_else(|| Error::InvalidInput(format!("bad process group: {}", pgid)))?;
        // SAFETY: killpg(2) has no memory-safety preconditions
        let rc = unsafe { libc::killpg(raw, libc::SIGKILL) };
        if rc == 0 {
            debug!(pgid, "Killed process group");
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(Error::Process(format!("killpg {}: {}", pgid, err)))
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> Result<()> {
        self.with_system(|sys| {
            sys.refresh_processes();
            match sys.process(Pid::from_u32(pid)) {
                Some(process) if !process.kill() => {
                    Err(Error::Process(format!("kill {} refused", pid)))
                }
                Some(_) => Ok(()),
                None => {
                    debug!(pid, "Process already gone");
                    Ok(())
                }
            }
        })
    }
}
