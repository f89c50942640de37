//! End-to-end tests against a live server on 127.0.0.1 serving a temporary
//! root directory.

use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rax_ftp_engine::session::handle_client;
use rax_ftp_engine::{Server, ServerConfig};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    addr: SocketAddr,
    root: TempDir,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn test_config(root: &TempDir, tls: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.startup.bind_address = "127.0.0.1".into();
    config.startup.control_port = 0;
    // An empty range makes passive listeners use ephemeral ports.
    config.startup.data_port_min = 0;
    config.startup.data_port_max = 0;
    config.startup.server_root = root.path().to_string_lossy().into_owned();
    config.startup.data_connect_timeout_secs = 5;
    config.startup.close_wait_millis = 200;
    if tls {
        config.startup.tls_cert_file = Some(fixture("cert.pem"));
        config.startup.tls_key_file = Some(fixture("key.pem"));
    }
    config
}

async fn start_server(tls: bool) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let server = Server::bind(test_config(&root, tls)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    tokio::spawn(async move { server.start().await });

    TestServer {
        addr,
        root,
        shutdown,
    }
}

/// Minimal FTP control client.
struct Control<S> {
    io: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Control<S> {
    fn new(stream: S) -> Self {
        Self {
            io: BufReader::new(stream),
        }
    }

    /// Reads one complete (possibly multi-line) reply.
    async fn reply(&mut self) -> (u16, String) {
        tokio::time::timeout(REPLY_TIMEOUT, async {
            let mut text = String::new();
            loop {
                let mut line = String::new();
                let n = self.io.read_line(&mut line).await.unwrap();
                assert!(n > 0, "connection closed while waiting for a reply");
                text.push_str(&line);
                let bytes = line.as_bytes();
                if bytes.len() >= 4 && bytes[3] == b' ' {
                    if let Ok(code) = line[..3].parse::<u16>() {
                        return (code, text);
                    }
                }
            }
        })
        .await
        .expect("timed out waiting for a reply")
    }

    async fn send(&mut self, line: &str) {
        let stream = self.io.get_mut();
        stream.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    }

    async fn cmd(&mut self, line: &str) -> (u16, String) {
        self.send(line).await;
        self.reply().await
    }

    async fn expect(&mut self, line: &str, code: u16) -> String {
        let (got, text) = self.cmd(line).await;
        assert_eq!(got, code, "{line} answered {text}");
        text
    }

    async fn login(&mut self) {
        self.expect("USER alice", 331).await;
        self.expect("PASS alice123", 230).await;
    }

    /// Issues PASV and returns the announced data address.
    async fn pasv(&mut self) -> SocketAddr {
        let text = self.expect("PASV", 227).await;
        let start = text.find('(').unwrap() + 1;
        let end = text.find(')').unwrap();
        let n: Vec<u16> = text[start..end]
            .split(',')
            .map(|p| p.trim().parse().unwrap())
            .collect();
        SocketAddr::from((
            [n[0] as u8, n[1] as u8, n[2] as u8, n[3] as u8],
            n[4] * 256 + n[5],
        ))
    }
}

async fn connect(server: &TestServer) -> Control<TcpStream> {
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut control = Control::new(stream);
    let (code, text) = control.reply().await;
    assert_eq!(code, 220, "greeting was {text}");
    control
}

async fn upload(control: &mut Control<TcpStream>, name: &str, content: &[u8]) {
    let data_addr = control.pasv().await;
    control.expect(&format!("STOR {name}"), 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    data.write_all(content).await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    let (code, text) = control.reply().await;
    assert_eq!(code, 226, "STOR finished with {text}");
}

#[tokio::test]
async fn login_flow() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;

    // Only the login and information verbs may follow the greeting.
    control.expect("PASS alice123", 503).await;

    control.expect("USER bob", 331).await;
    control.expect("PASS wrong", 530).await;
    control.expect("LIST", 530).await;

    control.login().await;
    let text = control.expect("PWD", 257).await;
    assert!(text.contains("\"/\""), "unexpected PWD reply {text}");
    control.expect("SYST", 215).await;
    let feat = control.expect("FEAT", 211).await;
    assert!(feat.starts_with("211-"));
    assert!(feat.contains(" EPSV"));
    assert!(!feat.contains("AUTH TLS"), "TLS is not configured");
    control.expect("QUIT", 221).await;
}

#[tokio::test]
async fn unknown_command_is_not_implemented() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("XYZZY", 502).await;
    control.expect("MODE C", 504).await;
    control.expect("TYPE L 8", 200).await;
}

#[tokio::test]
async fn passive_store_retrieve_and_list() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("TYPE I", 200).await;

    upload(&mut control, "hello.txt", b"hello over ftp").await;
    let stored = std::fs::read(server.root.path().join("hello.txt")).unwrap();
    assert_eq!(stored, b"hello over ftp");

    control.expect("SIZE hello.txt", 213).await;

    let data_addr = control.pasv().await;
    control.expect("RETR hello.txt", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"hello over ftp");
    assert_eq!(control.reply().await.0, 226);

    let data_addr = control.pasv().await;
    control.expect("NLST", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let mut listing = String::new();
    data.read_to_string(&mut listing).await.unwrap();
    assert!(listing.lines().any(|l| l == "hello.txt"), "listing was {listing:?}");
    assert_eq!(control.reply().await.0, 226);

    control.expect("RETR missing.txt", 550).await;
    control.expect("QUIT", 221).await;
}

#[tokio::test]
async fn transfer_without_data_setup_is_refused() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("LIST", 503).await;
}

#[tokio::test]
async fn busy_session_refuses_commands_but_answers_noop() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("TYPE I", 200).await;

    let data_addr = control.pasv().await;
    control.expect("STOR slow.bin", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    data.write_all(b"first part").await.unwrap();

    let text = control.expect("PWD", 503).await;
    assert!(text.contains("Previous transfer not finished"));
    control.expect("NOOP", 200).await;
    let status = control.expect("STAT", 211).await;
    assert!(status.contains("slow.bin"), "status was {status}");

    data.write_all(b", second part").await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    assert_eq!(control.reply().await.0, 226);

    // Idle again as soon as the final reply is read.
    control.expect("PWD", 257).await;
    let stored = std::fs::read(server.root.path().join("slow.bin")).unwrap();
    assert_eq!(stored, b"first part, second part");
}

#[tokio::test]
async fn abort_reports_426_then_226() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("TYPE I", 200).await;

    let data_addr = control.pasv().await;
    control.expect("STOR aborted.bin", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    data.write_all(b"partial").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    control.send("ABOR").await;
    assert_eq!(control.reply().await.0, 426);
    assert_eq!(control.reply().await.0, 226);

    // The server closed its end of the data connection.
    let mut rest = Vec::new();
    let closed = tokio::time::timeout(REPLY_TIMEOUT, data.read_to_end(&mut rest)).await;
    assert!(closed.is_ok());

    control.expect("NOOP", 200).await;
    control.expect("ABOR", 226).await;
}

#[tokio::test]
async fn rename_sequence_is_enforced() {
    let server = start_server(false).await;
    std::fs::write(server.root.path().join("old.txt"), b"x").unwrap();

    let mut control = connect(&server).await;
    control.login().await;

    control.expect("RNFR old.txt", 350).await;
    control.expect("PWD", 503).await;

    control.expect("RNFR old.txt", 350).await;
    control.expect("RNTO new.txt", 250).await;
    assert!(server.root.path().join("new.txt").exists());
    assert!(!server.root.path().join("old.txt").exists());

    control.expect("RNTO again.txt", 503).await;
}

#[tokio::test]
async fn directory_navigation_stays_inside_root() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;

    control.expect("MKD docs", 257).await;
    control.expect("CWD docs", 250).await;
    let text = control.expect("PWD", 257).await;
    assert!(text.contains("\"/docs\""));
    control.expect("CDUP", 250).await;
    control.expect("CDUP", 250).await;
    let text = control.expect("PWD", 257).await;
    assert!(text.contains("\"/\""));
    control.expect("CWD ../..", 553).await;
    control.expect("RMD docs", 250).await;
}

#[tokio::test]
async fn block_mode_keeps_the_data_channel_open() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;
    control.expect("TYPE I", 200).await;
    control.expect("MODE B", 200).await;

    let data_addr = control.pasv().await;
    control.expect("STOR block.bin", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    data.write_all(&[0x40, 0x00, 0x05]).await.unwrap();
    data.write_all(b"hello").await.unwrap();
    assert_eq!(control.reply().await.0, 250);

    control.expect("RETR block.bin", 125).await;
    let mut frames = [0u8; 11];
    data.read_exact(&mut frames).await.unwrap();
    assert_eq!(&frames[..3], &[0x00, 0x00, 0x05]);
    assert_eq!(&frames[3..8], b"hello");
    assert_eq!(&frames[8..], &[0x40, 0x00, 0x00]);
    assert_eq!(control.reply().await.0, 250);
}

#[tokio::test]
async fn auth_without_tls_is_unavailable() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.expect("AUTH TLS", 534).await;
    control.expect("AUTH KERBEROS", 504).await;
}

fn client_config() -> Arc<ClientConfig> {
    let pem = std::fs::read(fixture("ca.pem")).unwrap();
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut Cursor::new(pem)) {
        roots.add(cert.unwrap()).unwrap();
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}

#[tokio::test]
async fn auth_tls_reply_precedes_handshake() {
    let server = start_server(true).await;
    let mut control = connect(&server).await;

    let feat = control.expect("FEAT", 211).await;
    assert!(feat.contains("AUTH TLS"));

    // 234 arrives in plaintext; only then does the handshake start.
    control.expect("AUTH TLS", 234).await;
    let tcp = control.io.into_inner();
    let connector = TlsConnector::from(client_config());
    let name = ServerName::try_from("localhost").unwrap();
    let tls = connector.connect(name, tcp).await.unwrap();
    let mut control = Control::new(tls);

    control.login().await;
    control.expect("AUTH TLS", 503).await;
    control.expect("PROT P", 503).await;
    control.expect("PBSZ 0", 200).await;
    control.expect("PROT P", 200).await;

    std::fs::write(server.root.path().join("secret.txt"), b"top secret").unwrap();
    control.expect("TYPE I", 200).await;
    let data_addr = control.pasv().await;
    control.expect("RETR secret.txt", 150).await;
    let tcp = TcpStream::connect(data_addr).await.unwrap();
    let connector = TlsConnector::from(client_config());
    let name = ServerName::try_from("localhost").unwrap();
    let mut data = connector.connect(name, tcp).await.unwrap();
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"top secret");
    assert_eq!(control.reply().await.0, 226);

    control.expect("QUIT", 221).await;
}

#[tokio::test]
async fn data_connection_opened_before_transfer_verb() {
    let server = start_server(false).await;
    std::fs::write(server.root.path().join("early.txt"), b"x").unwrap();
    let mut control = connect(&server).await;
    control.login().await;

    // Clients commonly connect right after the PASV reply.
    let data_addr = control.pasv().await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    control.expect("NLST", 150).await;
    let mut listing = String::new();
    data.read_to_string(&mut listing).await.unwrap();
    assert!(listing.lines().any(|l| l == "early.txt"), "listing was {listing:?}");
    assert_eq!(control.reply().await.0, 226);
}

#[tokio::test]
async fn dual_stack_listener_serves_ipv4_data_connections() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(&root, false);
    config.startup.bind_address = "::".into();
    // Hosts without IPv6 cannot bind the wildcard address.
    let Ok(server) = Server::bind(config).await else {
        return;
    };
    let port = server.local_addr().unwrap().port();
    let shutdown = server.shutdown_token();
    tokio::spawn(async move { server.start().await });
    let server = TestServer {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        root,
        shutdown,
    };
    // A v6-only wildcard listener does not accept IPv4 clients.
    let Ok(stream) = TcpStream::connect(server.addr).await else {
        return;
    };
    let mut control = Control::new(stream);
    assert_eq!(control.reply().await.0, 220);
    control.login().await;
    control.expect("TYPE I", 200).await;
    std::fs::write(server.root.path().join("dual.txt"), b"both stacks").unwrap();

    let data_addr = control.pasv().await;
    assert_eq!(data_addr.ip(), IpAddr::from([127, 0, 0, 1]));
    control.expect("RETR dual.txt", 150).await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"both stacks");
    assert_eq!(control.reply().await.0, 226);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    control
        .expect(&format!("PORT 127,0,0,1,{},{}", port / 256, port % 256), 200)
        .await;
    control.expect("RETR dual.txt", 150).await;
    let (mut data, _) = tokio::time::timeout(REPLY_TIMEOUT, listener.accept())
        .await
        .expect("server never connected back")
        .unwrap();
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"both stacks");
    assert_eq!(control.reply().await.0, 226);
}

#[tokio::test]
async fn shutdown_ends_sessions_with_421() {
    let server = start_server(false).await;
    let mut control = connect(&server).await;
    control.login().await;

    server.shutdown.cancel();
    let (code, text) = control.reply().await;
    assert_eq!(code, 421, "shutdown reply was {text}");
    let mut rest = String::new();
    assert_eq!(control.io.read_line(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn session_accepted_during_shutdown_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let server = Server::bind(test_config(&root, false)).await.unwrap();
    let ctx = server.context();
    server.shutdown_token().cancel();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (client, accepted) = tokio::join!(
        TcpStream::connect(listener.local_addr().unwrap()),
        listener.accept()
    );
    tokio::spawn(handle_client(ctx, accepted.unwrap().0));

    let mut control = Control::new(client.unwrap());
    let (code, text) = control.reply().await;
    assert_eq!(code, 421, "greeting was {text}");
    let mut rest = String::new();
    assert_eq!(control.io.read_line(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn ccc_returns_control_channel_to_plaintext() {
    let server = start_server(true).await;
    let mut control = connect(&server).await;
    control.expect("CCC", 503).await;

    control.expect("AUTH TLS", 234).await;
    let tcp = control.io.into_inner();
    let connector = TlsConnector::from(client_config());
    let name = ServerName::try_from("localhost").unwrap();
    let tls = connector.connect(name, tcp).await.unwrap();
    let mut control = Control::new(tls);
    control.login().await;

    control.expect("CCC", 200).await;
    // The server's close_notify ends the TLS stream; answer with ours.
    let mut rest = Vec::new();
    control.io.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    let mut tls = control.io.into_inner();
    tls.get_mut().1.send_close_notify();
    tls.flush().await.unwrap();
    let (tcp, _) = tls.into_inner();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut control = Control::new(tcp);
    control.expect("NOOP", 200).await;
    control.expect("PWD", 257).await;
    control.expect("QUIT", 221).await;
}
