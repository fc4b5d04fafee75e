//! SSH command execution using russh crate

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, client};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::config::{Credentials, RemoteTarget};
use crate::error::CommandError;
use crate::keys::ResolvedKey;
use crate::registry::{self, Session};
use crate::result::ExecOutput;
use crate::shell::quote;
use crate::transport::Transport;

/// Upper bound on establishing the TCP connection and SSH handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// SSH client handler for russh
#[derive(Debug)]
pub(crate) struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// Raw channel output before decoding
struct ChannelOutput {
    status: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ChannelOutput {
    fn into_exec(self, duration: Duration) -> ExecOutput {
        ExecOutput {
            status: self.status,
            stdout: String::from_utf8_lossy(&self.stdout).to_string(),
            stderr: String::from_utf8_lossy(&self.stderr).to_string(),
            duration,
        }
    }
}

/// SSH transport
///
/// Sessions come from the process-wide [`registry`] and are established on
/// first use.
pub struct SshTransport {
    target: RemoteTarget,
    /// Resolved private key, if key authentication is used
    key: Option<ResolvedKey>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("target", &self.target)
            .field("key", &self.key)
            .finish()
    }
}

impl SshTransport {
    /// Create a new SSH transport
    ///
    /// # Errors
    /// Returns `CommandError::Configuration` if the private key cannot be resolved
    pub fn new(target: RemoteTarget) -> Result<Self, CommandError> {
        let key = match &target.credentials {
            Credentials::Key(source) => Some(
                source
                    .resolve()
                    .map_err(|e| CommandError::Configuration(format!("SSH key error: {e}")))?,
            ),
            Credentials::Password(_) => None,
        };

        Ok(Self { target, key })
    }

    /// Connection details
    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Connect and authenticate a new session
    #[instrument(skip(self), fields(endpoint = %self.target.endpoint()))]
    async fn connect(&self) -> Result<client::Handle<SshClientHandler>, CommandError> {
        let endpoint = self.target.endpoint();
        info!(
            host = %self.target.host,
            port = self.target.port,
            user = %self.target.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = timeout(
            CONNECT_TIMEOUT,
            client::connect(
                config,
                (&self.target.host[..], self.target.port),
                SshClientHandler,
            ),
        )
        .await
        .map_err(|_| {
            CommandError::transport(
                format!("ssh {endpoint}"),
                format!("connection timed out after {}s", CONNECT_TIMEOUT.as_secs()),
            )
        })?
        .map_err(|e| CommandError::transport(format!("ssh {endpoint}"), e))?;

        let authenticated = match (&self.target.credentials, &self.key) {
            (Credentials::Password(password), _) => session
                .authenticate_password(&self.target.user, password)
                .await
                .map_err(|e| CommandError::transport(format!("ssh {endpoint}"), e))?
                .success(),
            (Credentials::Key(_), Some(key)) => {
                let key_pair = load_secret_key(key.path(), None).map_err(|e| {
                    CommandError::Configuration(format!("SSH key error: {e}"))
                })?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                session
                    .authenticate_publickey(
                        &self.target.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| CommandError::transport(format!("ssh {endpoint}"), e))?
                    .success()
            }
            (Credentials::Key(_), None) => false,
        };

        if !authenticated {
            return Err(CommandError::transport(
                format!("ssh {endpoint}"),
                "authentication failed",
            ));
        }

        info!(endpoint = %endpoint, "SSH connected and authenticated");
        Ok(session)
    }

    async fn session(&self) -> Result<Session, CommandError> {
        registry::get_or_connect(&self.target.endpoint(), || self.connect()).await
    }

    /// Run `cmd` on a fresh channel, optionally feeding `stdin`
    async fn run_channel(&self, cmd: &str, stdin: Option<&[u8]>) -> Result<ChannelOutput, CommandError> {
        let session = self.session().await?;

        let mut channel = match session.channel_open_session().await {
            Ok(channel) => channel,
            Err(e) => {
                // the pooled session is unusable; reconnect next time
                registry::evict(&self.target.endpoint()).await;
                return Err(CommandError::transport(cmd, e));
            }
        };

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| CommandError::transport(cmd, e))?;

        if let Some(data) = stdin {
            channel
                .data(data)
                .await
                .map_err(|e| CommandError::transport(cmd, e))?;
            channel
                .eof()
                .await
                .map_err(|e| CommandError::transport(cmd, e))?;
        }

        let mut output = ChannelOutput {
            status: -1,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };

        // the exit status may arrive after EOF, so read until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    output.stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.status = exit_status.cast_signed();
                }
                _ => {}
            }
        }

        Ok(output)
    }
}

#[async_trait]
impl Transport for SshTransport {
    #[instrument(skip(self), fields(endpoint = %self.target.endpoint()))]
    async fn execute(
        &self,
        cmd: &str,
        timeout_duration: Option<Duration>,
    ) -> Result<ExecOutput, CommandError> {
        debug!(command = %cmd, "executing remote command");
        let start = Instant::now();

        let output = match timeout_duration {
            None => self.run_channel(cmd, None).await?,
            Some(limit) => match timeout(limit, self.run_channel(cmd, None)).await {
                Ok(result) => result?,
                Err(_) => {
                    error!(command = %cmd, timeout = ?limit, "command timed out");
                    return Err(CommandError::transport(
                        cmd,
                        format!("timed out after {limit:?}"),
                    ));
                }
            },
        };

        let duration = start.elapsed();
        debug!(
            command = %cmd,
            status = output.status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(output.into_exec(duration))
    }

    #[instrument(skip(self), fields(endpoint = %self.target.endpoint()))]
    async fn upload(&self, src: &Path, dst: &str, sudo: bool) -> Result<(), CommandError> {
        let src_display = src.display().to_string();
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| CommandError::io(&src_display, &e))?;

        let cmd = if sudo {
            format!("sudo tee {} > /dev/null", quote(dst))
        } else {
            format!("cat > {}", quote(dst))
        };

        let output = self.run_channel(&cmd, Some(&data)).await?;
        if output.status != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CommandError::transfer("put", &src_display, dst, stderr.trim_end()));
        }

        debug!(src = %src_display, dst, bytes = data.len(), "uploaded file");
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.target.endpoint()))]
    async fn download(&self, src: &str, dst: &Path) -> Result<(), CommandError> {
        let dst_display = dst.display().to_string();

        if !self.path_exists(src).await? {
            return Err(CommandError::Io {
                path: src.to_string(),
                kind: io::ErrorKind::NotFound,
                message: "no such file on target".to_string(),
            });
        }

        let output = self.run_channel(&format!("cat {}", quote(src)), None).await?;
        if output.status != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CommandError::transfer("get", src, &dst_display, stderr.trim_end()));
        }

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CommandError::io(parent.display().to_string(), &e))?;
        }
        tokio::fs::write(dst, &output.stdout)
            .await
            .map_err(|e| CommandError::transfer("get", src, &dst_display, e))?;

        debug!(src, dst = %dst_display, bytes = output.stdout.len(), "downloaded file");
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool, CommandError> {
        let output = self
            .run_channel(&format!("test -e {}", quote(path)), None)
            .await?;
        Ok(output.status == 0)
    }

    fn kind(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeySource;

    #[test]
    fn test_missing_key_is_configuration_error() {
        let target = RemoteTarget {
            host: "host".to_string(),
            user: "user".to_string(),
            port: 22,
            credentials: Credentials::Key(KeySource::Path("/nonexistent/rigger/key".into())),
        };

        assert!(matches!(
            SshTransport::new(target),
            Err(CommandError::Configuration(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_roundtrip() {
        let password = std::env::var("RIGGER_TEST_SSH_PASSWORD").unwrap();
        let target = RemoteTarget {
            host: "127.0.0.1".to_string(),
            user: std::env::var("USER").unwrap(),
            port: 22,
            credentials: Credentials::Password(password),
        };
        let transport = SshTransport::new(target).unwrap();

        let output = transport.execute("echo hello", None).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert!(transport.path_exists("/").await.unwrap());

        registry::close_all().await;
    }
}
