use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// What an external tool run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}
impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the transcoding tool with a prepared argument list.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, args: &[OsString]) -> Result<ToolOutput>;
}

/// Spawns the real executable.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
}
impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
        tracing::trace!(program = %self.program.display(), args = args.len(), "Spawning external tool");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            // A run abandoned by a timeout must not leave the tool behind.
            .kill_on_drop(true)
            .output()
            .await
            .or_raise(|| ErrorKind::Spawn(self.program.clone()))?;
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::scripted::{Script, ScriptedRunner};

#[cfg(any(test, feature = "mock"))]
mod scripted {
    use super::{ToolOutput, ToolRunner};
    use crate::error::{ErrorKind, Result};
    use async_trait::async_trait;
    use exn::ResultExt;
    use std::collections::VecDeque;
    use std::ffi::OsString;
    use std::path::PathBuf;
    use std::sync::{Mutex, PoisonError};

    /// One canned response for [`ScriptedRunner`].
    #[derive(Debug, Clone, Default)]
    pub struct Script {
        pub output: ToolOutput,
        /// Bytes written to the output file (the last argument) when the
        /// scripted run succeeds. `None` leaves no file behind.
        pub produces: Option<Vec<u8>>,
    }
    impl Script {
        /// Exit 0, print `stderr` and write `produces` to the output path.
        pub fn ok(stderr: impl Into<String>, produces: impl Into<Vec<u8>>) -> Self {
            Self {
                output: ToolOutput {
                    code: Some(0),
                    stderr: stderr.into(),
                    ..Default::default()
                },
                produces: Some(produces.into()),
            }
        }

        /// Exit with `code` and print `stderr`; nothing is written.
        pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
            Self {
                output: ToolOutput {
                    code: Some(code),
                    stderr: stderr.into(),
                    ..Default::default()
                },
                produces: None,
            }
        }
    }

    /// Replays [`Script`]s in order, recording every argument list.
    ///
    /// Runs past the end of the script succeed silently without producing a
    /// file.
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        scripts: Mutex<VecDeque<Script>>,
        calls: Mutex<Vec<Vec<OsString>>>,
    }
    impl ScriptedRunner {
        pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
                calls: Mutex::default(),
            }
        }

        /// Every argument list seen so far, in call order.
        pub fn calls(&self) -> Vec<Vec<OsString>> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(args.to_vec());
            let script = self.scripts.lock().unwrap_or_else(PoisonError::into_inner).pop_front().unwrap_or_else(|| {
                Script {
                    output: ToolOutput {
                        code: Some(0),
                        ..Default::default()
                    },
                    produces: None,
                }
            });
            if let (true, Some(bytes), Some(path)) = (script.output.success(), &script.produces, args.last()) {
                tokio::fs::write(PathBuf::from(path), bytes).await.or_raise(|| ErrorKind::Io)?;
            }
            Ok(script.output)
        }
    }
}
