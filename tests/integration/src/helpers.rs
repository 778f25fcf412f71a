//! Test helpers for spawning a fedmgr-server and talking to it.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output};
use std::sync::Arc;
use std::time::Duration;

use fedmgr_federation::{
    ControllerConn, ControllerRequest, ControllerResponse, ControllerSecret, ControllerTransport,
    FederationInfo, TcpTransport, TransportConfig,
};

/// A fedmgr-server subprocess managed by the test harness.
pub struct TestServer {
    child: Child,
    pub port: u16,
}

/// Options for starting a test server.
pub struct ServerOptions {
    pub cluster_name: String,
    /// Port to listen on. A free port is picked when unset.
    pub port: Option<u16>,
    pub state_dir: Option<PathBuf>,
    pub federations_file: Option<PathBuf>,
    pub auth_pass: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            cluster_name: "alpha".into(),
            port: None,
            state_dir: None,
            federations_file: None,
            auth_pass: None,
        }
    }
}

impl TestServer {
    /// Starts a fedmgr-server for cluster "alpha" on a random port.
    ///
    /// Blocks until the server is accepting connections (up to 5 seconds).
    pub fn start() -> Self {
        Self::start_with(ServerOptions::default())
    }

    pub fn start_with(opts: ServerOptions) -> Self {
        let port = opts.port.unwrap_or_else(find_free_port);
        let binary = server_binary();

        let mut cmd = Command::new(&binary);
        cmd.arg("--port").arg(port.to_string());
        cmd.arg("--host").arg("127.0.0.1");
        cmd.arg("--cluster-name").arg(&opts.cluster_name);
        // suppress tracing output in tests
        cmd.env("RUST_LOG", "error");

        if let Some(ref dir) = opts.state_dir {
            cmd.arg("--state-dir").arg(dir);
        }
        if let Some(ref path) = opts.federations_file {
            cmd.arg("--federations-file").arg(path);
        }
        if let Some(ref pass) = opts.auth_pass {
            cmd.arg("--auth-pass").arg(pass);
        }

        let child = cmd
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .unwrap_or_else(|e| {
                panic!("failed to spawn fedmgr-server at {}: {e}", binary.display())
            });

        // wait for the server to be ready
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if std::time::Instant::now() > deadline {
                panic!("fedmgr-server failed to start within 5 seconds on port {port}");
            }
            if std::net::TcpStream::connect(format!("127.0.0.1:{port}")).is_ok() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        Self { child, port }
    }

    /// Opens a controller connection to this server.
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.port, None).await
    }

    pub async fn connect_with_secret(&self, password: &str) -> TestClient {
        let secret = Arc::new(ControllerSecret::from_password(password));
        TestClient::connect(self.port, Some(secret)).await
    }

    /// Sends SIGINT and waits for the server to save state and exit.
    #[cfg(unix)]
    pub fn stop(mut self) {
        let status = Command::new("kill")
            .arg("-INT")
            .arg(self.child.id().to_string())
            .status()
            .expect("failed to run kill");
        assert!(status.success(), "kill -INT failed: {status}");

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    assert!(status.success(), "server exited with {status}");
                    return;
                }
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) => panic!("fedmgr-server did not exit after SIGINT"),
                Err(e) => panic!("failed to wait for fedmgr-server: {e}"),
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A controller client using the production TCP transport.
pub struct TestClient {
    conn: Box<dyn ControllerConn>,
}

impl TestClient {
    async fn connect(port: u16, secret: Option<Arc<ControllerSecret>>) -> Self {
        let transport = TcpTransport::new(TransportConfig::default(), secret);
        let conn = transport
            .connect("127.0.0.1", port)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to 127.0.0.1:{port}: {e}"));
        Self { conn }
    }

    pub async fn ping(&mut self) -> i32 {
        match self.conn.send_recv(&ControllerRequest::Ping).await {
            Ok(resp) => resp.return_code(),
            Err(e) => panic!("ping failed: {e}"),
        }
    }

    /// Sends a ping and returns whether any answer came back.
    pub async fn try_ping(&mut self) -> bool {
        self.conn.send_recv(&ControllerRequest::Ping).await.is_ok()
    }

    pub async fn federation_info(&mut self) -> FederationInfo {
        match self.conn.send_recv(&ControllerRequest::FederationInfo).await {
            Ok(ControllerResponse::FederationInfo(info)) => info,
            Ok(other) => panic!("expected FederationInfo, got {other:?}"),
            Err(e) => panic!("federation info request failed: {e}"),
        }
    }
}

/// One cluster line of a definitions file: name, port, cluster id.
pub type ClusterDef<'a> = (&'a str, u16, u32);

/// Writes a federation definitions file listing `federations`. Every
/// cluster's controller is on 127.0.0.1.
pub fn write_definitions(dir: &Path, federations: &[(&str, &[ClusterDef<'_>])]) -> PathBuf {
    let mut out = String::new();
    for (name, clusters) in federations {
        out.push_str(&format!("[[federation]]\nname = \"{name}\"\n\n"));
        for (cluster, port, id) in clusters.iter() {
            out.push_str(&format!(
                "[[federation.cluster]]\nname = \"{cluster}\"\nhost = \"127.0.0.1\"\nport = {port}\nid = {id}\n\n"
            ));
        }
    }
    let path = dir.join("federations.toml");
    std::fs::write(&path, out).unwrap();
    path
}

/// Runs the server binary with `args` and returns its output.
pub fn run_server(args: &[&str]) -> Output {
    Command::new(server_binary())
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run fedmgr-server")
}

/// Finds a free TCP port by binding to port 0.
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Locates the fedmgr-server binary in the cargo target directory.
fn server_binary() -> PathBuf {
    // test binary is in target/<profile>/deps/, the server one level up
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("fedmgr-server");
    if !path.exists() {
        panic!(
            "fedmgr-server binary not found. run `cargo build` first.\nlooked at: {}",
            path.display()
        );
    }
    path
}
