use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;
use super::environment::Environment;
use crate::gateway_error::ExecutionError;

const S_IXUSR: u32 = 0o100;

/// A running script with its output captured
pub struct ScriptHandle
{
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stdin: Option<ChildStdin>
}

impl ScriptHandle
{
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn stdout(&mut self) -> &mut ChildStdout
    {
        &mut self.stdout
    }

    /// The script's stdin, if it was spawned to receive a request body
    pub fn take_stdin(&mut self) -> Option<ChildStdin>
    {
        self.stdin.take()
    }

    /// Close the pipes and reap the child
    pub async fn wait(self) -> io::Result<ExitStatus>
    {
        let ScriptHandle{mut child, stdout, stdin, ..} = self;
        drop(stdin);
        drop(stdout);
        child.wait().await
    }
}

/// Check that `path` names something the current user may execute.
/// Returns the path to hand to exec.
pub async fn validate_script(path: &Path) -> Result<PathBuf, ExecutionError>
{
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(source) => return Err(ExecutionError::FileNotFound{
            path: path.to_path_buf(), source
        })
    };
    if meta.permissions().mode() & S_IXUSR == 0 {
        return Err(ExecutionError::FileNotExecutable{path: path.to_path_buf()});
    }
    Ok(exec_path(path))
}

/// A bare file name would otherwise be looked up in PATH
fn exec_path(path: &Path) -> PathBuf
{
    let bare = path.parent().map_or(true, |p| p.as_os_str().is_empty());
    if bare {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

/// Start the script named by the environment, with exactly that
/// environment. The script's stdin is piped only if `with_stdin` is set.
pub async fn spawn_script(env: &Environment, with_stdin: bool)
                          -> Result<ScriptHandle, ExecutionError>
{
    let path = env.script_filename();
    let exec_path = validate_script(&path).await?;
    debug!(script = %exec_path.display(), "spawning");

    let spawned = Command::new(&exec_path)
        .env_clear()
        .envs(env.iter())
        .stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(source) => return Err(ExecutionError::SpawnFailed{path, source})
    };
    let stdin = child.stdin.take();
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => return Err(ExecutionError::SpawnFailed{
            path,
            source: io::Error::new(io::ErrorKind::Other, "stdout not captured")
        })
    };
    Ok(ScriptHandle{path, child, stdout, stdin})
}

#[cfg(test)]
use tokio::runtime::Runtime;
#[cfg(test)]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(test)]
use bytes::Bytes;
#[cfg(test)]
use super::request::NameValuePair;

#[cfg(test)]
fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf
{
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
        .unwrap();
    path
}

#[cfg(test)]
fn script_env(path: &Path, extra: &[(&str, &str)]) -> Environment
{
    let mut pairs = vec![NameValuePair::new(
        Bytes::from_static(b"SCRIPT_FILENAME"),
        Bytes::copy_from_slice(path.to_str().unwrap().as_bytes()))];
    for (k, v) in extra {
        pairs.push(NameValuePair::new(Bytes::copy_from_slice(k.as_bytes()),
                                      Bytes::copy_from_slice(v.as_bytes())));
    }
    Environment::build(&pairs).unwrap()
}

#[test]
fn test_validate_missing()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.cgi");
    match rt.block_on(validate_script(&path)) {
        Err(ExecutionError::FileNotFound{path: p, ..}) => assert_eq!(p, path),
        other => panic!("Unexpected result {:?}", other)
    }
}

#[test]
fn test_validate_not_executable()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "plain.cgi", "#!/bin/sh\n", 0o644);
    match rt.block_on(validate_script(&path)) {
        Err(ExecutionError::FileNotExecutable{..}) => {},
        other => panic!("Unexpected result {:?}", other)
    }
}

#[test]
fn test_exec_path()
{
    assert_eq!(exec_path(Path::new("bare.cgi")), PathBuf::from("./bare.cgi"));
    assert_eq!(exec_path(Path::new("cgi-bin/x.cgi")),
               PathBuf::from("cgi-bin/x.cgi"));
    assert_eq!(exec_path(Path::new("/srv/x.cgi")), PathBuf::from("/srv/x.cgi"));
    assert_eq!(exec_path(Path::new("./x.cgi")), PathBuf::from("./x.cgi"));
}

#[test]
fn test_validate_returns_exec_path()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "ok.cgi", "#!/bin/sh\n", 0o755);
    assert_eq!(rt.block_on(validate_script(&path)).unwrap(), path);
}

#[test]
fn test_spawn_environment_only()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "env.cgi",
                            "#!/bin/sh\nprintf '%s|%s|%s' \"$FOO\" \"$SCGI\" \"${HOME-unset}\"\n",
                            0o755);
    let env = script_env(&path, &[("FOO", "bar")]);
    rt.block_on(async {
        let mut script = spawn_script(&env, false).await.unwrap();
        let mut out = Vec::new();
        script.stdout().read_to_end(&mut out).await.unwrap();
        let status = script.wait().await.unwrap();
        assert!(status.success());
        assert_eq!(String::from_utf8(out).unwrap(), "bar|1|unset");
    });
}

#[test]
fn test_spawn_with_stdin()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "echo.cgi",
                            "#!/bin/sh\nwhile read line; do printf '<%s>' \"$line\"; done\n",
                            0o755);
    let env = script_env(&path, &[]);
    rt.block_on(async {
        let mut script = spawn_script(&env, true).await.unwrap();
        let mut stdin = script.take_stdin().unwrap();
        stdin.write_all(b"one\ntwo\n").await.unwrap();
        drop(stdin);
        let mut out = Vec::new();
        script.stdout().read_to_end(&mut out).await.unwrap();
        script.wait().await.unwrap();
        assert_eq!(out, b"<one><two>");
    });
}

#[test]
fn test_spawn_failure()
{
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    // Passes the permission check, but cannot be executed
    let path = dir.path().join("subdir");
    std::fs::create_dir(&path).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .unwrap();
    let env = script_env(&path, &[]);
    match rt.block_on(spawn_script(&env, false)) {
        Err(ExecutionError::SpawnFailed{..}) => {},
        Err(e) => panic!("Unexpected error {:?}", e),
        Ok(_) => panic!("Spawn succeeded")
    }
}
