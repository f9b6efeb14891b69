//! Common test utilities for tracepoint-cache integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const SCHED_SWITCH: &str = "name: sched_switch
ID: 316
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char prev_comm[16];\toffset:8;\tsize:16;\tsigned:0;
\tfield:pid_t prev_pid;\toffset:24;\tsize:4;\tsigned:1;
\tfield:int prev_prio;\toffset:28;\tsize:4;\tsigned:1;
\tfield:long prev_state;\toffset:32;\tsize:8;\tsigned:1;
\tfield:char next_comm[16];\toffset:40;\tsize:16;\tsigned:0;
\tfield:pid_t next_pid;\toffset:56;\tsize:4;\tsigned:1;
\tfield:int next_prio;\toffset:60;\tsize:4;\tsigned:1;

print fmt: \"prev_comm=%s prev_pid=%d next_comm=%s next_pid=%d\", REC->prev_comm, REC->prev_pid, REC->next_comm, REC->next_pid
";

pub const SCHED_WAKEUP: &str = "name: sched_wakeup
ID: 318
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char comm[16];\toffset:8;\tsize:16;\tsigned:0;
\tfield:pid_t pid;\toffset:24;\tsize:4;\tsigned:1;
\tfield:int prio;\toffset:28;\tsize:4;\tsigned:1;
\tfield:int target_cpu;\toffset:32;\tsize:4;\tsigned:1;

print fmt: \"comm=%s pid=%d prio=%d target_cpu=%03d\", REC->comm, REC->pid, REC->prio, REC->target_cpu
";

/// A fake machine: a mount table plus a tracing directory holding format files.
pub struct FakeTracefs {
    // Keeps the temp dir alive.
    _root: TempDir,
    pub mounts: PathBuf,
    pub tracing_dir: PathBuf,
}

impl FakeTracefs {
    /// Mount the fake tracing directory as tracefs (`debugfs == false`) or as
    /// the `tracing` directory of a debugfs mount.
    pub fn new(debugfs: bool) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let mount_point = root.path().join("kernel");
        let (fs_type, tracing_dir) = if debugfs {
            ("debugfs", mount_point.join("tracing"))
        } else {
            ("tracefs", mount_point.clone())
        };
        fs::create_dir_all(&tracing_dir).expect("Failed to create tracing dir");

        let mounts = root.path().join("mounts");
        fs::write(
            &mounts,
            format!(
                "proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0\n\
                 sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0\n\
                 none {} {fs_type} rw,relatime 0 0\n",
                mount_point.display()
            ),
        )
        .expect("Failed to write mounts");

        FakeTracefs {
            _root: root,
            mounts,
            tracing_dir,
        }
    }

    pub fn add_event(&self, system: &str, event: &str, format: &str) -> &Self {
        let dir = self.tracing_dir.join("events").join(system).join(event);
        fs::create_dir_all(&dir).expect("Failed to create event dir");
        fs::write(dir.join("format"), format).expect("Failed to write format");
        self
    }

    pub fn mounts(&self) -> &Path {
        &self.mounts
    }
}
