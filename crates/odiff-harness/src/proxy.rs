//! Legacy process proxy
//!
//! Owns the worker process that hosts the legacy instance and turns
//! attribute and routine calls into request/response round trips. Every
//! call blocks (awaits) until the worker answers; there is no timeout and
//! no retry. A worker that dies or hangs up surfaces as
//! [`HarnessError::Communication`].

use crate::error::{HarnessError, Result, Side};
use crate::protocol::{decode_line, write_message, FailureKind, Hello, Request, Response, WireArgs, WireValue};
use odiff_model::{AttrValue, RoutineArgs};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader, Lines};
use tokio::process::{Child, Command};

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// How to launch the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Worker executable
    pub program: PathBuf,
    /// Reference library handed to the worker
    pub library: PathBuf,
    /// Named setup for run-to-completion mode
    pub setup: Option<String>,
    /// Seed handed to the worker
    pub seed: u64,
}

impl WorkerOptions {
    /// Options for a unit-mode worker
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, library: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            library: library.into(),
            setup: None,
            seed: 17,
        }
    }

    /// Bind the legacy instance to a named setup
    #[must_use]
    pub fn with_setup(mut self, setup: impl Into<String>) -> Self {
        self.setup = Some(setup.into());
        self
    }

    /// Seed for the legacy instance
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Handle on the worker process; single owner
pub struct LegacyProxy {
    child: Option<Child>,
    writer: BoxedWriter,
    lines: Lines<BoxedReader>,
    library: String,
    pid: Option<u32>,
    closed: bool,
}

impl std::fmt::Debug for LegacyProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyProxy")
            .field("library", &self.library)
            .field("pid", &self.pid)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn communication(context: &str, error: impl std::fmt::Display) -> HarnessError {
    HarnessError::Communication(format!("{context}: {error}"))
}

impl LegacyProxy {
    /// Launch the worker and wait for its handshake
    ///
    /// # Errors
    /// [`HarnessError::Startup`] if the library path is empty, the worker
    /// cannot be spawned, or it reports that the legacy instance failed to load.
    pub async fn start(options: &WorkerOptions) -> Result<Self> {
        let library = options.library.to_string_lossy().into_owned();
        if library.is_empty() {
            return Err(HarnessError::Startup {
                library,
                message: "no reference library path given".into(),
            });
        }

        let mut command = Command::new(&options.program);
        command
            .arg("--library")
            .arg(&options.library)
            .arg("--seed")
            .arg(options.seed.to_string());
        if let Some(setup) = &options.setup {
            command.arg("--setup").arg(setup);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| HarnessError::Startup {
            library: library.clone(),
            message: format!("cannot launch {}: {e}", options.program.display()),
        })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(HarnessError::Startup {
                library,
                message: "worker stdio not captured".into(),
            });
        };
        tracing::debug!(program = %options.program.display(), "legacy worker spawned");

        let mut proxy = Self::from_parts(Some(child), Box::new(BufReader::new(stdout)), Box::new(stdin), library);
        proxy.handshake().await?;
        Ok(proxy)
    }

    /// Attach to a worker reachable over arbitrary streams
    pub async fn connect<R, W>(reader: R, writer: W, library: impl Into<String>) -> Result<Self>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut proxy = Self::from_parts(None, Box::new(reader), Box::new(writer), library.into());
        proxy.handshake().await?;
        Ok(proxy)
    }

    fn from_parts(child: Option<Child>, reader: BoxedReader, writer: BoxedWriter, library: String) -> Self {
        Self {
            child,
            writer,
            lines: reader.lines(),
            library,
            pid: None,
            closed: false,
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let startup = |message: String| HarnessError::Startup {
            library: self.library.clone(),
            message,
        };
        let line = match self.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(startup("worker exited before the handshake".into())),
            Err(e) => return Err(startup(format!("reading handshake: {e}"))),
        };
        match decode_line::<Hello>(&line) {
            Ok(Hello::Ready { pid, setup, .. }) => {
                tracing::info!(pid, library = %self.library, ?setup, "legacy worker ready");
                self.pid = Some(pid);
                Ok(())
            }
            Ok(Hello::StartupFailed { message }) => {
                let err = startup(message);
                self.kill().await;
                Err(err)
            }
            Err(e) => {
                let err = startup(format!("unexpected handshake {line:?}: {e}"));
                self.kill().await;
                Err(err)
            }
        }
    }

    /// Library the worker was started with
    #[must_use]
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Worker process id as reported in the handshake
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn request(&mut self, request: &Request) -> Result<Response> {
        if self.closed {
            return Err(HarnessError::Communication("legacy worker already shut down".into()));
        }
        write_message(&mut self.writer, request)
            .await
            .map_err(|e| communication("sending request", e))?;
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| communication("reading response", e))?
            .ok_or_else(|| HarnessError::Communication("legacy worker closed its output".into()))?;
        decode_line(&line).map_err(|e| communication("decoding response", e))
    }

    fn failure(name: &str, kind: FailureKind, message: String) -> HarnessError {
        match kind {
            FailureKind::Attribute => HarnessError::Attribute {
                name: name.to_string(),
                side: Side::Legacy,
            },
            FailureKind::RoutineNotFound => HarnessError::RoutineNotFound {
                name: name.to_string(),
                side: Side::Legacy,
            },
            FailureKind::Model => HarnessError::Model {
                side: Side::Legacy,
                message,
            },
            FailureKind::Protocol => HarnessError::Communication(message),
        }
    }

    fn expect_done(name: &str, response: Response) -> Result<()> {
        match response {
            Response::Done => Ok(()),
            Response::Failed { kind, message } => Err(Self::failure(name, kind, message)),
            Response::Value { .. } => Err(HarnessError::Communication(format!(
                "unexpected value in reply to {name}"
            ))),
        }
    }

    fn expect_value(name: &str, response: Response) -> Result<Option<AttrValue>> {
        match response {
            Response::Value { value } => value
                .map(AttrValue::try_from)
                .transpose()
                .map_err(|e| communication("decoding value", e)),
            Response::Done => Ok(None),
            Response::Failed { kind, message } => Err(Self::failure(name, kind, message)),
        }
    }

    /// Assign an attribute on the legacy instance
    pub async fn set_attribute(&mut self, name: &str, value: &AttrValue) -> Result<()> {
        let request = Request::SetAttribute {
            name: name.to_string(),
            value: WireValue::from(value),
        };
        let response = self.request(&request).await?;
        Self::expect_done(name, response)
    }

    /// Read an attribute; `None` if the legacy instance has no such attribute
    pub async fn get_attribute(&mut self, name: &str) -> Result<Option<AttrValue>> {
        let response = self
            .request(&Request::GetAttribute { name: name.to_string() })
            .await?;
        Self::expect_value(name, response)
    }

    /// Invoke a routine on the legacy instance
    pub async fn call_routine(&mut self, name: &str, args: &RoutineArgs) -> Result<Option<AttrValue>> {
        let request = Request::CallRoutine {
            name: name.to_string(),
            args: WireArgs::from(args),
        };
        let response = self.request(&request).await?;
        Self::expect_value(name, response)
    }

    /// Set up the configuration the worker was started with
    pub async fn setup(&mut self) -> Result<()> {
        let response = self.request(&Request::Setup).await?;
        Self::expect_done("setup", response)
    }

    /// Run for the configured run length
    pub async fn run(&mut self) -> Result<()> {
        let response = self.request(&Request::Run).await?;
        Self::expect_done("run", response)
    }

    /// Ask the worker to exit and wait for it
    pub async fn shutdown(&mut self) -> Result<()> {
        let response = self.request(&Request::Shutdown).await?;
        self.closed = true;
        Self::expect_done("shutdown", response)?;
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await.map_err(|e| communication("waiting for worker", e))?;
            tracing::debug!(%status, "legacy worker exited");
        }
        Ok(())
    }

    /// Tear the worker down without asking
    pub async fn kill(&mut self) {
        self.closed = true;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill legacy worker: {}", e);
            }
        }
    }
}
