//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use http_kit::config::KitConfig;
use http_kit::http::HttpServer;
use http_kit::lifecycle::Shutdown;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SECRET: &str = "integration secret";

/// A server bound to an ephemeral port with its own file and upload directories.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<KitConfig>,
    pub config: KitConfig,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
    dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn public_dir(&self) -> PathBuf {
        self.dir.path().join("public")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn write_public(&self, name: &str, contents: &[u8]) {
        let path = self.public_dir().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn stored_uploads(&self) -> usize {
        std::fs::read_dir(self.upload_dir()).unwrap().count()
    }
}

/// Start a server after letting `configure` adjust the defaults.
pub async fn start_server(configure: impl FnOnce(&mut KitConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("public")).unwrap();
    std::fs::create_dir(dir.path().join("uploads")).unwrap();

    let mut config = KitConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.cookies.secret = SECRET.to_string();
    config.files.root = dir.path().join("public");
    config.uploads.temp_dir = Some(dir.path().join("uploads"));
    configure(&mut config);

    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config.clone());
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, config_updates, server_shutdown).await });

    TestServer {
        addr,
        shutdown,
        updates,
        config,
        handle,
        dir,
    }
}

/// Client that neither pools connections nor follows proxies from the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// The `name=value` pair of a `Set-Cookie` header.
pub fn cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}
