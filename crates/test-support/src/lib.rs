use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::any;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// A request as seen by [`spawn_upstream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: String,
}

pub struct Upstream {
    pub base_url: String,
    requests: mpsc::UnboundedReceiver<RecordedRequest>,
}

impl Upstream {
    /// Wait for the next request the upstream received.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or if the server task stopped.
    pub async fn next_request(&mut self, timeout_dur: Duration) -> anyhow::Result<RecordedRequest> {
        tokio::time::timeout(timeout_dur, self.requests.recv())
            .await
            .context("timed out waiting for upstream request")?
            .context("upstream server stopped")
    }
}

/// Start a local HTTP server that records every request. `/missing` answers 404, everything
/// else 200 with a small JSON body.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_upstream() -> anyhow::Result<Upstream> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |method: Method, uri: Uri, body: Bytes| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(RecordedRequest {
                method: method.to_string(),
                path: uri.path().to_string(),
                query: uri.query().map(str::to_string),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
            if uri.path() == "/missing" {
                (StatusCode::NOT_FOUND, axum::Json(json!({"error": "not found"})))
            } else {
                (StatusCode::OK, axum::Json(json!({"ok": true})))
            }
        }
    };

    let app = Router::new().route("/{*path}", any(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind upstream")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(Upstream {
        base_url: format!("http://{addr}"),
        requests: rx,
    })
}

/// A child process driven over newline-delimited JSON on its stdin/stdout.
pub struct StdioSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl StdioSession {
    /// Spawn `bin` with `args`. Stderr is inherited so server logs show up in test output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn spawn<I, S>(bin: impl AsRef<Path>, args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(bin.as_ref())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {}", bin.as_ref().display()))?;

        let stdin = child.stdin.take().context("child stdin")?;
        let stdout = child.stdout.take().context("child stdout")?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// Write one raw line (a trailing newline is added).
    ///
    /// # Errors
    ///
    /// Returns an error if stdin was closed or the write fails.
    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().context("stdin already closed")?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read the next response line and parse it as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, end of stream, or a non-JSON line.
    pub async fn read_message(&mut self, timeout_dur: Duration) -> anyhow::Result<Value> {
        let mut line = String::new();
        let n = tokio::time::timeout(timeout_dur, self.stdout.read_line(&mut line))
            .await
            .context("timed out waiting for response")??;
        anyhow::ensure!(n > 0, "stdout closed");
        serde_json::from_str(line.trim_end()).with_context(|| format!("parse response: {line}"))
    }

    /// Send a JSON-RPC request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or no response arrives in time.
    pub async fn request(
        &mut self,
        id: impl Into<Value>,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": id.into(),
            "method": method,
            "params": params,
        });
        self.send_line(&msg.to_string()).await?;
        self.read_message(timeout_dur).await
    }

    /// Close stdin and wait for the process to exit. Returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or if the process was killed by a signal.
    pub async fn close(mut self, timeout_dur: Duration) -> anyhow::Result<i32> {
        drop(self.stdin.take());
        let status = tokio::time::timeout(timeout_dur, self.child.wait())
            .await
            .context("timed out waiting for exit")??;
        status.code().context("process terminated by signal")
    }
}
