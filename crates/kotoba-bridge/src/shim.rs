//! Stand-ins for the OS surface the guest runtime expects on its global
//! object: `fs`, `process` and `path`.
//!
//! Only writes to stdout and stderr do anything. They are line-buffered and
//! routed into `tracing` under the `kotoba::guest` target. Every other call
//! fails with `ENOSYS`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::context::{GuestContext, call_function};
use crate::error::{BridgeError, BridgeResult};
use crate::value::{HostValue, lock};

/// fs calls that always fail. The last argument of each is its callback.
const UNSUPPORTED_FS_CALLS: &[&str] = &[
    "chmod", "chown", "close", "fchmod", "fchown", "fstat", "ftruncate", "lchown", "link", "lstat",
    "mkdir", "open", "read", "readdir", "readlink", "rename", "rmdir", "stat", "symlink",
    "truncate", "unlink", "utimes",
];

const FS_CONSTANTS: &[&str] = &[
    "O_WRONLY",
    "O_RDWR",
    "O_CREAT",
    "O_TRUNC",
    "O_APPEND",
    "O_EXCL",
    "O_DIRECTORY",
];

const STDOUT: i64 = 1;
const STDERR: i64 = 2;

/// Per-bridge OS shim state.
///
/// One instance is injected into each module bridge; nothing here is
/// process-global.
#[derive(Debug, Default)]
pub struct HostShim {
    pending: Mutex<HashMap<i64, Vec<u8>>>,
    captured: Option<Mutex<Vec<(i64, String)>>>,
}

impl HostShim {
    /// A shim that only logs guest output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A shim that also keeps every completed output line for inspection.
    #[must_use]
    pub fn capturing() -> Self {
        Self {
            pending: Mutex::default(),
            captured: Some(Mutex::default()),
        }
    }

    /// Lines emitted so far, as `(fd, line)`. Empty unless built with
    /// [`HostShim::capturing`].
    #[must_use]
    pub fn captured(&self) -> Vec<(i64, String)> {
        self.captured
            .as_ref()
            .map(|lines| lock(lines).clone())
            .unwrap_or_default()
    }

    /// Buffer `buf` for `fd` and emit every completed line.
    pub fn write_sync(&self, fd: i64, buf: &[u8]) -> BridgeResult<usize> {
        if fd != STDOUT && fd != STDERR {
            return Err(BridgeError::UnsupportedOperation(format!("write to fd {fd}")));
        }
        let mut pending = lock(&self.pending);
        let line_buf = pending.entry(fd).or_default();
        line_buf.extend_from_slice(buf);
        while let Some(nl) = line_buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = line_buf.drain(..=nl).collect();
            self.emit(fd, &line[..nl]);
        }
        Ok(buf.len())
    }

    /// Emit any partial lines still buffered.
    pub fn flush(&self) {
        let mut pending = lock(&self.pending);
        for (fd, line_buf) in pending.iter_mut() {
            if !line_buf.is_empty() {
                let line = std::mem::take(line_buf);
                self.emit(*fd, &line);
            }
        }
    }

    fn emit(&self, fd: i64, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        if fd == STDERR {
            warn!(target: "kotoba::guest", fd, "{line}");
        } else {
            info!(target: "kotoba::guest", fd, "{line}");
        }
        if let Some(captured) = &self.captured {
            lock(captured).push((fd, line.into_owned()));
        }
    }

    /// Attach `fs`, `process` and `path` to `global`.
    pub fn install(self: &Arc<Self>, global: &HostValue) {
        global.set("fs", self.fs_object());
        global.set("process", process_object());
        global.set("path", path_object());
    }

    fn fs_object(self: &Arc<Self>) -> HostValue {
        let fs = HostValue::object();

        let constants = HostValue::object();
        for name in FS_CONSTANTS {
            constants.set(name, HostValue::Number(-1.0));
        }
        fs.set("constants", constants);

        let shim = Arc::clone(self);
        fs.set(
            "writeSync",
            HostValue::native("writeSync", move |_, _, args| {
                let (fd, buf) = write_args(args)?;
                shim.write_sync(fd, &buf)
                    .map(count)
                    .map_err(|err| errno_value(&err))
            }),
        );

        let shim = Arc::clone(self);
        fs.set(
            "write",
            HostValue::native("write", move |cx, _, args| {
                let callback = arg(args, 5);
                let (fd, buf) = write_args(args)?;
                let whole = arg(args, 2).as_f64() == Some(0.0)
                    && arg(args, 3) == count(buf.len())
                    && matches!(arg(args, 4), HostValue::Null);
                let outcome = if whole {
                    shim.write_sync(fd, &buf)
                } else {
                    Err(BridgeError::UnsupportedOperation("partial fs.write".to_owned()))
                };
                let cb_args = match outcome {
                    Ok(n) => vec![HostValue::Null, count(n)],
                    Err(err) => vec![errno_value(&err)],
                };
                callback_with(cx, &callback, &cb_args)
            }),
        );

        fs.set(
            "fsync",
            HostValue::native("fsync", |cx, _, args| {
                callback_with(cx, &last_arg(args), &[HostValue::Null])
            }),
        );

        for name in UNSUPPORTED_FS_CALLS {
            let op = format!("fs.{name}");
            fs.set(
                name,
                HostValue::native(name, move |cx, _, args| {
                    let err = BridgeError::UnsupportedOperation(op.clone());
                    callback_with(cx, &last_arg(args), &[errno_value(&err)])
                }),
            );
        }
        fs
    }
}

fn process_object() -> HostValue {
    let process = HostValue::object();
    for id in ["getuid", "getgid", "geteuid", "getegid"] {
        process.set(id, HostValue::native(id, |_, _, _| Ok(HostValue::Number(-1.0))));
    }
    for unsupported in ["getgroups", "umask", "cwd", "chdir"] {
        let op = format!("process.{unsupported}");
        process.set(
            unsupported,
            HostValue::native(unsupported, move |_, _, _| {
                Err(errno_value(&BridgeError::UnsupportedOperation(op.clone())))
            }),
        );
    }
    process.set("pid", HostValue::Number(-1.0));
    process.set("ppid", HostValue::Number(-1.0));
    process
}

fn path_object() -> HostValue {
    let path = HostValue::object();
    path.set(
        "resolve",
        HostValue::native("resolve", |_, _, args| {
            let joined = args
                .iter()
                .map(HostValue::to_js_string)
                .collect::<Vec<_>>()
                .join("/");
            Ok(HostValue::string(joined))
        }),
    );
    path
}

/// The error value the guest sees for an unsupported operation.
fn errno_value(err: &BridgeError) -> HostValue {
    debug!(error = %err, "os shim call rejected");
    HostValue::errno(err.errno_code().unwrap_or("EIO"), "not implemented")
}

fn arg(args: &[HostValue], i: usize) -> HostValue {
    args.get(i).cloned().unwrap_or(HostValue::Undefined)
}

fn last_arg(args: &[HostValue]) -> HostValue {
    args.last().cloned().unwrap_or(HostValue::Undefined)
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> HostValue {
    HostValue::Number(n as f64)
}

#[allow(clippy::cast_possible_truncation)]
fn write_args(args: &[HostValue]) -> Result<(i64, Vec<u8>), HostValue> {
    let fd = arg(args, 0).as_f64().unwrap_or(-1.0) as i64;
    match arg(args, 1) {
        HostValue::Bytes(b) => Ok((fd, b.snapshot())),
        _ => Err(HostValue::type_error("write buffer must be a Uint8Array")),
    }
}

/// Invoke a Node-style completion callback. A bridge fault inside the
/// callback surfaces to the caller as a thrown error.
fn callback_with(
    cx: &mut dyn GuestContext,
    callback: &HostValue,
    args: &[HostValue],
) -> Result<HostValue, HostValue> {
    match call_function(cx, callback, &HostValue::Undefined, args) {
        Ok(Ok(_)) => Ok(HostValue::Undefined),
        Ok(Err(thrown)) => Err(thrown),
        Err(err) => {
            warn!(error = %err, "fs callback failed");
            Err(HostValue::error(err.to_string()))
        },
    }
}
