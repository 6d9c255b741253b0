//! Kernel-enforced confinement for sandboxed processes
//!
//! Applied in the forked child right before exec, so the restrictions hold
//! for whatever the input does, including code the validator failed to
//! recognize.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  filesystem   landlock: read anywhere, write only beneath the   │
//! │               per-call workdir (and /dev/null)                  │
//! │  network      seccomp: socket() outside AF_UNIX, connect, bind, │
//! │               listen, accept fail with EPERM                    │
//! │  spawn        seccomp: fork, vfork, clone3 and non-thread clone │
//! │               fail with EPERM                                   │
//! │  always       seccomp: ptrace, mount, namespaces, kernel        │
//! │               modules, bpf, perf fail with EPERM                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The seccomp program and the landlock ruleset are built in the parent.
//! The child only installs them, which is a handful of syscalls.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which kernel boundaries to put around a sandboxed process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Confinement {
    /// Writes outside the workdir are refused
    pub filesystem: bool,
    /// No network sockets
    pub network: bool,
    /// No child processes (threads are still allowed)
    pub spawn: bool,
}

impl Confinement {
    /// Every boundary on
    pub fn strict() -> Self {
        Self {
            filesystem: true,
            network: true,
            spawn: true,
        }
    }

    /// No boundaries beyond the process limits
    pub fn none() -> Self {
        Self {
            filesystem: false,
            network: false,
            spawn: false,
        }
    }

    /// Drop the boundaries this kernel cannot enforce, with a warning
    pub fn supported(self) -> Self {
        let mut confinement = self;
        if confinement.filesystem && !filesystem_supported() {
            tracing::warn!(
                "landlock is not available on this kernel; sandboxed code can write outside its workdir"
            );
            confinement.filesystem = false;
        }
        if (confinement.network || confinement.spawn) && !syscall_filter_supported() {
            tracing::warn!("seccomp filtering is not supported on this platform");
            confinement.network = false;
            confinement.spawn = false;
        }
        confinement
    }
}

impl Default for Confinement {
    fn default() -> Self {
        Self::strict()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Linux
// ─────────────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod imp {
    use std::collections::BTreeMap;
    use std::convert::TryInto;
    use std::io;
    use std::path::Path;

    use landlock::{
        path_beneath_rules, Access, AccessFs, Ruleset, RulesetAttr, RulesetCreated,
        RulesetCreatedAttr, RulesetStatus, ABI,
    };
    use lazy_static::lazy_static;
    use seccompiler::{
        BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition,
        SeccompFilter, SeccompRule, TargetArch,
    };

    use super::Confinement;

    /// `LANDLOCK_CREATE_RULESET_VERSION`
    const LANDLOCK_VERSION_QUERY: libc::c_uint = 1;

    lazy_static! {
        /// Landlock ABI version the running kernel offers, if any
        static ref LANDLOCK_ABI: Option<i64> = {
            // SAFETY: with the version flag the kernel ignores the (null) attr
            // pointer and size and only reports the supported ABI.
            let version = unsafe {
                libc::syscall(
                    libc::SYS_landlock_create_ruleset,
                    std::ptr::null::<libc::c_void>(),
                    0usize,
                    LANDLOCK_VERSION_QUERY,
                )
            };
            (version > 0).then_some(version as i64)
        };
    }

    pub fn filesystem_supported() -> bool {
        LANDLOCK_ABI.is_some()
    }

    pub fn syscall_filter_supported() -> bool {
        target_arch().is_ok()
    }

    /// Restrictions prepared in the parent, installed in the child
    pub struct ChildRestrictions {
        ruleset: Option<RulesetCreated>,
        filter: Option<BpfProgram>,
    }

    impl ChildRestrictions {
        pub fn prepare(confinement: &Confinement, workdir: &Path) -> io::Result<Self> {
            let ruleset = if confinement.filesystem {
                Some(write_ruleset(workdir).map_err(to_io)?)
            } else {
                None
            };
            Ok(Self {
                ruleset,
                filter: syscall_filter(confinement)?,
            })
        }

        /// Install in the current (child) process; runs at most once
        pub fn install(&mut self) -> io::Result<()> {
            if let Some(ruleset) = self.ruleset.take() {
                let status = ruleset.restrict_self().map_err(to_io)?;
                if status.ruleset == RulesetStatus::NotEnforced {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "landlock ruleset not enforced",
                    ));
                }
            }
            if let Some(filter) = self.filter.take() {
                // also sets no_new_privs
                seccompiler::apply_filter(&filter).map_err(to_io)?;
            }
            Ok(())
        }
    }

    fn write_ruleset(workdir: &Path) -> Result<RulesetCreated, landlock::RulesetError> {
        let abi = ABI::V2;
        Ruleset::default()
            .handle_access(AccessFs::from_all(abi))?
            .create()?
            .add_rules(path_beneath_rules(["/"], AccessFs::from_read(abi)))?
            .add_rules(path_beneath_rules(["/dev/null"], AccessFs::from_file(abi)))?
            .add_rules(path_beneath_rules([workdir], AccessFs::from_all(abi)))
    }

    fn syscall_filter(confinement: &Confinement) -> io::Result<Option<BpfProgram>> {
        if !syscall_filter_supported() {
            return Ok(None);
        }
        let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
        for nr in [
            libc::SYS_ptrace,
            libc::SYS_process_vm_writev,
            libc::SYS_mount,
            libc::SYS_umount2,
            libc::SYS_pivot_root,
            libc::SYS_chroot,
            libc::SYS_unshare,
            libc::SYS_setns,
            libc::SYS_init_module,
            libc::SYS_finit_module,
            libc::SYS_delete_module,
            libc::SYS_kexec_load,
            libc::SYS_bpf,
            libc::SYS_perf_event_open,
        ] {
            rules.insert(nr, vec![]);
        }

        if confinement.network {
            // unix sockets stay usable for libc internals
            let not_unix = SeccompRule::new(vec![SeccompCondition::new(
                0,
                SeccompCmpArgLen::Dword,
                SeccompCmpOp::Ne,
                libc::AF_UNIX as u64,
            )
            .map_err(to_io)?])
            .map_err(to_io)?;
            rules.insert(libc::SYS_socket, vec![not_unix]);
            for nr in [
                libc::SYS_connect,
                libc::SYS_bind,
                libc::SYS_listen,
                libc::SYS_accept,
                libc::SYS_accept4,
            ] {
                rules.insert(nr, vec![]);
            }
        }

        if confinement.spawn {
            let new_process = SeccompRule::new(vec![SeccompCondition::new(
                0,
                SeccompCmpArgLen::Qword,
                SeccompCmpOp::MaskedEq(libc::CLONE_THREAD as u64),
                0,
            )
            .map_err(to_io)?])
            .map_err(to_io)?;
            rules.insert(libc::SYS_clone, vec![new_process]);
            rules.insert(libc::SYS_clone3, vec![]);
            #[cfg(target_arch = "x86_64")]
            {
                rules.insert(libc::SYS_fork, vec![]);
                rules.insert(libc::SYS_vfork, vec![]);
            }
        }

        let filter = SeccompFilter::new(
            rules,
            SeccompAction::Allow,
            SeccompAction::Errno(libc::EPERM as u32),
            target_arch()?,
        )
        .map_err(to_io)?;
        let program: BpfProgram = filter.try_into().map_err(to_io)?;
        Ok(Some(program))
    }

    fn target_arch() -> io::Result<TargetArch> {
        std::env::consts::ARCH.try_into().map_err(to_io)
    }

    fn to_io(e: impl std::fmt::Display) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Elsewhere
// ─────────────────────────────────────────────────────────────────────────

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::io;
    use std::path::Path;

    use super::Confinement;

    pub fn filesystem_supported() -> bool {
        false
    }

    pub fn syscall_filter_supported() -> bool {
        false
    }

    pub struct ChildRestrictions;

    impl ChildRestrictions {
        pub fn prepare(_confinement: &Confinement, _workdir: &Path) -> io::Result<Self> {
            Ok(Self)
        }

        pub fn install(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

pub(crate) use imp::ChildRestrictions;

/// Whether writes can be confined to a directory on this kernel
pub fn filesystem_supported() -> bool {
    imp::filesystem_supported()
}

/// Whether syscall filtering is available on this platform
pub fn syscall_filter_supported() -> bool {
    imp::syscall_filter_supported()
}

/// Build the restrictions for one run in `workdir`
pub(crate) fn prepare(confinement: &Confinement, workdir: &Path) -> io::Result<ChildRestrictions> {
    ChildRestrictions::prepare(confinement, workdir)
}
