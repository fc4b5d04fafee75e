//! Recording transport shared by the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rigger_core::{AgentConfig, Lifecycle, MemoryStore, RuntimeStore};
use rigger_exec::{CommandError, CommandRunner, ExecOutput, RunOptions, Target, Transport};

pub const TEMP_DIR: &str = "/tmp/rigger.dir";
pub const TEMP_FILE: &str = "/tmp/rigger.pkg";

/// Something the lifecycle asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exec(String),
    Upload { dst: String, content: String },
    Exists(String),
}

/// Transport that records every call and succeeds unless told otherwise
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    /// Commands containing one of these fail with exit status 1
    failing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Exec(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn output(status: i32, stdout: &str) -> ExecOutput {
    ExecOutput {
        status,
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(1),
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(
        &self,
        command: &str,
        _timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommandError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Exec(command.to_string()));

        if self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| command.contains(fragment.as_str()))
        {
            return Ok(output(1, "simulated failure"));
        }

        Ok(match command {
            "mktemp -d" => output(0, &format!("{TEMP_DIR}\n")),
            "mktemp" => output(0, &format!("{TEMP_FILE}\n")),
            "command -v wget" => output(0, "/usr/bin/wget\n"),
            _ => output(0, ""),
        })
    }

    async fn upload(&self, src: &Path, dst: &str, _sudo: bool) -> Result<(), CommandError> {
        let content = std::fs::read_to_string(src)
            .map_err(|e| CommandError::io(src.display().to_string(), &e))?;
        self.calls.lock().unwrap().push(Call::Upload {
            dst: dst.to_string(),
            content,
        });
        Ok(())
    }

    async fn download(&self, src: &str, _dst: &Path) -> Result<(), CommandError> {
        Err(CommandError::io(
            src,
            &std::io::Error::from(std::io::ErrorKind::NotFound),
        ))
    }

    async fn path_exists(&self, path: &str) -> Result<bool, CommandError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Exists(path.to_string()));
        Ok(false)
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

pub fn runner(transport: &Arc<RecordingTransport>) -> CommandRunner {
    let transport: Arc<dyn Transport> = transport.clone();
    CommandRunner::with_transport(Target::Local, transport, RunOptions::new())
}

pub fn lifecycle(transport: &Arc<RecordingTransport>) -> (Lifecycle, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn RuntimeStore> = store.clone();
    (Lifecycle::new(runner(transport), dyn_store), store)
}

pub fn package_config() -> AgentConfig {
    AgentConfig {
        manager_ip: Some("10.0.0.1".to_string()),
        package_url: Some("http://10.0.0.1/agent.tar.gz".to_string()),
        ..AgentConfig::new("worker-1")
    }
}
