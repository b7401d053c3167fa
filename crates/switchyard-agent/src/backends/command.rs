use crate::client::{AgentClient, Invocation, InvocationOutput};
use crate::progress::{Progress, ProgressSink};
use crate::wire::WireCollector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use switchyard_security::Sanitizer;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// How much stderr is quoted in a failure message.
const STDERR_EXCERPT_CHARS: usize = 500;

/// Local CLI backend.
///
/// Spawns `program` once per call with the prompt on stdin and reads stdout
/// line by line as the wire protocol. The child is killed if the call is
/// dropped (timeout or cancellation).
pub struct CommandBackend {
    id: BackendId,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    file_arg: Option<String>,
    session_arg: Option<String>,
    sanitizer: Sanitizer,
}

impl CommandBackend {
    /// A backend that runs `program` with no extra arguments.
    pub fn new(id: BackendId, program: impl Into<String>) -> Self {
        Self {
            id,
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            file_arg: None,
            session_arg: None,
            sanitizer: Sanitizer::default(),
        }
    }

    /// Arguments placed before file references.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Extra environment for the child.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Working directory for the child.
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Flag placed before each file reference.
    pub fn with_file_arg(mut self, flag: Option<String>) -> Self {
        self.file_arg = flag;
        self
    }

    /// Flag placed before the session token.
    pub fn with_session_arg(mut self, flag: Option<String>) -> Self {
        self.session_arg = flag;
        self
    }

    /// The full argument list for one call.
    pub fn build_args(&self, invocation: &Invocation) -> Vec<String> {
        let mut args = self.args.clone();
        if let (Some(flag), Some(token)) = (&self.session_arg, &invocation.session_token) {
            args.push(flag.clone());
            args.push(token.clone());
        }
        for path in &invocation.file_refs {
            if let Some(flag) = &self.file_arg {
                args.push(flag.clone());
            }
            args.push(path.clone());
        }
        args
    }

    fn excerpt(&self, stderr: &str) -> String {
        let clean = self.sanitizer.sanitize_for_log(stderr.trim());
        clean.chars().take(STDERR_EXCERPT_CHARS).collect()
    }
}

#[async_trait]
impl AgentClient for CommandBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        progress: &ProgressSink,
    ) -> SwitchyardResult<InvocationOutput> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.build_args(invocation))
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!(
            backend = %self.id,
            program = %self.program,
            prompt_len = invocation.prompt.len(),
            file_refs = invocation.file_refs.len(),
            resumed = invocation.session_token.is_some(),
            "Spawning backend process"
        );

        let mut child = cmd.spawn().map_err(|e| {
            SwitchyardError::backend_failure(
                &self.id,
                format!("failed to run '{}': {e}", self.program),
            )
        })?;
        progress.emit(Progress::status("process started"));

        let (Some(mut stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SwitchyardError::backend_failure(
                &self.id,
                "child process pipes unavailable",
            ));
        };

        let prompt = invocation.prompt.clone();
        let write_prompt = async move {
            // A child that exits without reading stdin is not a failure by itself.
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                debug!(error = %e, "Backend closed stdin early");
            }
            drop(stdin);
        };

        let read_stdout = async {
            let mut collector = WireCollector::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                collector.push_line(&line, progress);
            }
            Ok::<_, std::io::Error>(collector)
        };

        let read_stderr = async {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.map(|_| buf)
        };

        let ((), collector, stderr_text) = tokio::join!(write_prompt, read_stdout, read_stderr);
        let status = child
            .wait()
            .await
            .map_err(|e| SwitchyardError::from(e).into_execution(&self.id))?;
        let collector =
            collector.map_err(|e| SwitchyardError::from(e).into_execution(&self.id))?;
        let stderr_text = stderr_text.unwrap_or_default();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let excerpt = self.excerpt(&stderr_text);
            warn!(backend = %self.id, exit_code = code, stderr = %excerpt, "Backend process failed");
            return Err(SwitchyardError::backend_failure(
                &self.id,
                format!("'{}' exited with status {code}: {excerpt}", self.program),
            ));
        }

        debug!(backend = %self.id, lines = collector.lines(), "Backend process finished");
        collector.finish(&self.id)
    }
}
