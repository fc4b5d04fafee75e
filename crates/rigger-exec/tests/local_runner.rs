//! Runner tests against the local machine
//!
//! Remote mode shares every code path above the transport; SSH itself is
//! covered by the ignored tests in `ssh.rs`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use rigger_exec::{CommandError, CommandRunner, ConnectionConfig, RunOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn local_runner() -> CommandRunner {
    CommandRunner::new(&ConnectionConfig::local()).unwrap()
}

async fn has_tool(runner: &CommandRunner, tool: &str) -> bool {
    runner.run(&format!("command -v {tool}")).await.is_ok()
}

/// Serve `body` once over HTTP on an ephemeral port
async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(header.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}/archive.tar.gz")
}

#[tokio::test]
async fn test_connect_with_validation() {
    let runner = CommandRunner::connect(&ConnectionConfig::local(), true)
        .await
        .unwrap();
    runner.ping().await.unwrap();
}

#[tokio::test]
async fn test_run_command() {
    let response = local_runner().run("echo hello").await.unwrap();

    assert!(response.output().contains("hello"));
    assert_eq!(response.exit_code, 0);
    assert_eq!(response.command, "echo hello");
}

#[tokio::test]
async fn test_run_command_with_env() {
    let mut env = BTreeMap::new();
    env.insert("TEST_KEY".to_string(), "TEST_VALUE".to_string());

    let response = local_runner().run_with_env("env", &env).await.unwrap();
    assert!(response.output().contains("TEST_KEY=TEST_VALUE"));
}

#[tokio::test]
async fn test_env_value_with_spaces_and_quotes() {
    let runner = local_runner().with(&RunOptions::new().env("GREETING", "it's a test"));
    let response = runner.run("printf '%s' \"$GREETING\"").await.unwrap();

    assert_eq!(response.output(), "it's a test");
}

#[tokio::test]
async fn test_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let runner = local_runner().with(&RunOptions::new().working_dir(dir.path().display().to_string()));

    let response = runner.run("pwd").await.unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(Path::new(response.output()).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn test_non_zero_exit_is_execution_error() {
    let err = local_runner()
        .run("echo broken; echo details >&2; exit 3")
        .await
        .unwrap_err();

    match err {
        CommandError::Execution {
            command,
            error,
            code,
        } => {
            assert_eq!(command, "echo broken; echo details >&2; exit 3");
            assert!(error.contains("broken"));
            assert!(error.contains("details"));
            assert_eq!(code, 3);
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let runner = local_runner().with(&RunOptions::new().timeout(std::time::Duration::from_secs(1)));
    let err = runner.run("sleep 5").await.unwrap_err();

    assert!(matches!(err, CommandError::Transport { ref command, .. } if command == "sleep 5"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_run_script() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "#!/bin/bash").unwrap();
    writeln!(script, "echo hello").unwrap();

    let response = local_runner().run_script(script.path(), &[]).await.unwrap();
    assert_eq!(response.output().trim_end(), "hello");
}

#[tokio::test]
async fn test_run_script_with_args() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "#!/bin/sh").unwrap();
    writeln!(script, "echo \"$1-$2\"").unwrap();

    let response = local_runner()
        .run_script(script.path(), &["a", "b"])
        .await
        .unwrap();
    assert_eq!(response.output(), "a-b");
}

#[tokio::test]
async fn test_exists() {
    let runner = local_runner();

    assert!(
        runner
            .exists(&std::env::temp_dir().display().to_string())
            .await
            .unwrap()
    );
    assert!(!runner.exists("/nonexistent/rigger/path").await.unwrap());
}

#[tokio::test]
async fn test_put_get_file() {
    let runner = local_runner();
    let mut src = tempfile::NamedTempFile::new().unwrap();
    write!(src, "test_put_get_file").unwrap();

    let remote_path = runner.put_file(src.path(), None, false).await.unwrap();
    assert!(runner.exists(&remote_path).await.unwrap());

    let local_path = runner.get_file(&remote_path, None).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&local_path).unwrap(),
        "test_put_get_file"
    );
}

#[tokio::test]
async fn test_put_file_explicit_destination() {
    let runner = local_runner();
    let dir = tempfile::tempdir().unwrap();
    let mut src = tempfile::NamedTempFile::new().unwrap();
    write!(src, "payload").unwrap();

    let dst = dir.path().join("payload.txt").display().to_string();
    let returned = runner.put_file(src.path(), Some(&dst), false).await.unwrap();

    assert_eq!(returned, dst);
    assert_eq!(std::fs::read_to_string(&dst).unwrap(), "payload");
}

#[tokio::test]
async fn test_get_non_existing_file() {
    let err = local_runner().get_file("non-existing", None).await.unwrap_err();

    assert!(matches!(err, CommandError::Io { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_put_non_existing_file() {
    let err = local_runner()
        .put_file(Path::new("/nonexistent/rigger/src"), None, false)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_mktemp() {
    let runner = local_runner();

    let file = runner.mktemp(true, false).await.unwrap();
    assert!(Path::new(&file).is_file());

    let dir = runner.mkdtemp().await.unwrap();
    assert!(Path::new(&dir).is_dir());

    let reserved = runner.mktemp(false, false).await.unwrap();
    assert!(!reserved.is_empty());
    assert!(!Path::new(&reserved).exists());
}

#[tokio::test]
async fn test_extract() {
    let runner = local_runner();
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src/package");
    std::fs::create_dir_all(source.join("bin")).unwrap();
    std::fs::write(source.join("bin/agent"), "#!/bin/sh\n").unwrap();

    let archive = work.path().join("package.tar.gz").display().to_string();
    runner
        .run(&format!(
            "tar czf {archive} -C {} package",
            work.path().join("src").display()
        ))
        .await
        .unwrap();

    // destination does not exist yet; extract creates it
    let destination = work.path().join("out/agent").display().to_string();
    runner.extract(&archive, &destination, 1).await.unwrap();

    assert!(
        runner
            .exists(&format!("{destination}/bin/agent"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_download() {
    let runner = local_runner();
    if !has_tool(&runner, "wget").await && !has_tool(&runner, "curl").await {
        eprintln!("skipping: neither wget nor curl installed");
        return;
    }

    let url = serve_once(b"archive-bytes".to_vec()).await;
    let output_path = runner.download(&url, None).await.unwrap();

    assert!(runner.exists(&output_path).await.unwrap());
    assert_eq!(std::fs::read(&output_path).unwrap(), b"archive-bytes");
}

#[tokio::test]
async fn test_python_introspection() {
    let runner = local_runner();
    if !has_tool(&runner, "python3").await {
        eprintln!("skipping: python3 not installed");
        return;
    }

    let result = runner.python("import os", "40 + 2").await.unwrap();
    assert_eq!(result, "42");

    // noise printed before the result does not leak into it
    let noisy = runner
        .python("print('banner')", "'value'")
        .await
        .unwrap();
    assert_eq!(noisy, "value");
}

#[tokio::test]
async fn test_python_without_markers_is_malformed() {
    let runner = local_runner();
    if !has_tool(&runner, "python3").await {
        eprintln!("skipping: python3 not installed");
        return;
    }

    // exiting during setup means the delimited line is never written
    let err = runner.python("sys.exit(0)", "1").await.unwrap_err();
    assert!(matches!(err, CommandError::MalformedOutput { .. }));
}

#[tokio::test]
async fn test_machine_distribution() {
    let runner = local_runner();
    if !has_tool(&runner, "python3").await {
        eprintln!("skipping: python3 not installed");
        return;
    }
    let Ok(os_release) = std::fs::read_to_string("/etc/os-release") else {
        eprintln!("skipping: no /etc/os-release");
        return;
    };

    let field = |name: &str| {
        os_release
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{name}=")))
            .map(|v| v.trim_matches('"').trim_matches('\'').to_string())
            .unwrap_or_default()
    };

    let dist = runner.machine_distribution().await.unwrap();
    assert_eq!(dist.name, field("NAME"));
    assert_eq!(dist.version, field("VERSION_ID"));
    assert_eq!(dist.id, field("VERSION_CODENAME"));
}

#[tokio::test]
async fn test_close_twice() {
    let runner = local_runner();
    runner.close().await;
    runner.close().await;
}
