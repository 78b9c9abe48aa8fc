//! End-to-end tests against a scripted loopback FTP server.
//!
//! Each test binds a listener, spawns a task that plays the server side of
//! the conversation line by line, and drives the client against it.

use ftpkit::ftp::types::FtpEvent;
use ftpkit::{FtpClient, FtpConfig, FtpErrorKind};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Scripted control-channel endpoint for the server side.
struct Ctl(BufReader<TcpStream>);

impl Ctl {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Ctl(BufReader::new(stream))
    }

    async fn say(&mut self, line: &str) {
        self.0
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn expect(&mut self, prefix: &str) -> String {
        let mut line = String::new();
        self.0.read_line(&mut line).await.unwrap();
        let line = line.trim_end().to_string();
        assert!(
            line.starts_with(prefix),
            "expected command starting with '{}', got '{}'",
            prefix,
            line
        );
        line
    }

    /// Greeting, USER/PASS for the standard test credentials, TYPE I.
    async fn handshake(&mut self) {
        self.say("220 test server ready").await;
        self.expect("USER alice").await;
        self.say("331 password required").await;
        self.expect("PASS secret").await;
        self.say("230 logged in").await;
        self.expect("TYPE I").await;
        self.say("200 switching to binary mode").await;
    }
}

async fn start() -> (TcpListener, FtpConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut cfg = FtpConfig::new("127.0.0.1", port, "alice", "secret");
    cfg.connect_timeout_secs = 2;
    cfg.command_timeout_secs = 2;
    cfg.data_timeout_secs = 2;
    (listener, cfg)
}

fn pasv_reply(port: u16) -> String {
    format!(
        "227 Entering Passive Mode (127,0,0,1,{},{}).",
        port / 256,
        port % 256
    )
}

/// Bind a data-channel listener and reply 227 pointing at it.
async fn offer_pasv(ctl: &mut Ctl) -> TcpListener {
    ctl.expect("PASV").await;
    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = data.local_addr().unwrap().port();
    ctl.say(&pasv_reply(port)).await;
    data
}

// ─── Session lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn connects_authenticates_and_quits() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("QUIT").await;
        ctl.say("221 goodbye").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let state = client.session();
    assert!(state.connected && state.authenticated);
    assert_eq!(state.command_count, 3);
    assert_eq!(state.last_command.as_deref(), Some("TYPE I"));

    client.close().await;
    assert!(!client.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn multiline_greeting_is_accepted() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.say("220-Welcome to the test server").await;
        ctl.say("220-Unauthorised access prohibited").await;
        ctl.say("220 ready").await;
        ctl.expect("USER alice").await;
        ctl.say("331 ok").await;
        ctl.expect("PASS secret").await;
        ctl.say("230 ok").await;
        ctl.expect("TYPE I").await;
        ctl.say("200 ok").await;
        // Hold the control socket open until the client hangs up.
        ctl.expect("QUIT").await;
        ctl.say("221 goodbye").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    assert!(client.is_authenticated());
    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn login_rejection_surfaces_code() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.say("220 ready").await;
        ctl.expect("USER alice").await;
        ctl.say("331 ok").await;
        ctl.expect("PASS secret").await;
        ctl.say("530 Login incorrect").await;
    });

    let err = FtpClient::connect(cfg).await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Protocol);
    assert_eq!(err.code, Some(530));
}

// ─── Transfers ───────────────────────────────────────────────────────

#[tokio::test]
async fn uploads_via_passive_data_channel() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("STOR /up.bin").await;
        ctl.say("150 opening data connection").await;
        let (mut sock, _) = data.accept().await.unwrap();
        let mut payload = Vec::new();
        sock.read_to_end(&mut payload).await.unwrap();
        ctl.say("226 transfer complete").await;
        payload
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let sent = client.upload("/up.bin", b"hello").await.unwrap();
    assert_eq!(sent, 5);
    assert_eq!(server.await.unwrap(), b"hello");
}

#[tokio::test]
async fn downloads_via_passive_data_channel() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("RETR /down.bin").await;
        ctl.say("150 sending").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(b"file contents").await.unwrap();
        drop(sock);
        ctl.say("226 done").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let body = client.download("/down.bin").await.unwrap();
    assert_eq!(body, b"file contents");
}

#[tokio::test]
async fn streams_download_into_writer() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("RETR /big.bin").await;
        ctl.say("150 sending").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(&vec![9u8; 100_000]).await.unwrap();
        drop(sock);
        ctl.say("226 done").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let mut sink: Vec<u8> = Vec::new();
    let received = client.download_streaming("/big.bin", &mut sink).await.unwrap();
    assert_eq!(received, 100_000);
    assert_eq!(sink.len(), 100_000);
}

#[tokio::test]
async fn missing_terminal_reply_fails_by_default() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("RETR /f").await;
        ctl.say("150 sending").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(b"abc").await.unwrap();
        drop(sock);
        // No 226. The client must not invent success.
        tokio::time::sleep(std::time::Duration::from_secs(4)).await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let err = client.download("/f").await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Timeout);
}

#[tokio::test]
async fn grace_window_accepts_clean_close_without_reply() {
    let (listener, mut cfg) = start().await;
    cfg.completion_grace_secs = Some(1);
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("RETR /f").await;
        ctl.say("150 sending").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(b"abc").await.unwrap();
        drop(sock);
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let body = client.download("/f").await.unwrap();
    assert_eq!(body, b"abc");
}

#[tokio::test]
async fn server_rejection_after_transfer_is_an_error() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("STOR /denied").await;
        ctl.say("150 ok").await;
        let (mut sock, _) = data.accept().await.unwrap();
        let mut sink = Vec::new();
        sock.read_to_end(&mut sink).await.unwrap();
        ctl.say("552 quota exceeded").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let err = client.upload("/denied", b"x").await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Protocol);
    assert_eq!(err.code, Some(552));
}

// ─── Directory operations ────────────────────────────────────────────

#[tokio::test]
async fn lists_directory_entries() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("LIST /pub").await;
        ctl.say("150 listing").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(
            b"-rw-r--r--   1 ftp ftp   1234 Jan 15 10:30 readme.txt\r\n\
              drwxr-xr-x   2 ftp ftp   4096 Feb  1 08:00 uploads\r\n",
        )
        .await
        .unwrap();
        drop(sock);
        ctl.say("226 done").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let entries = client.list_detailed("/pub").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "readme.txt");
    assert_eq!(entries[0].size, 1234);
    assert_eq!(entries[1].name, "uploads");
}

#[tokio::test]
async fn removes_directory_tree_recursively() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("LIST /junk").await;
        ctl.say("150 listing").await;
        let (mut sock, _) = data.accept().await.unwrap();
        sock.write_all(
            b"-rw-r--r--   1 ftp ftp     10 Jan  1 10:00 a.txt\r\n\
              drwxr-xr-x   2 ftp ftp   4096 Jan  1 10:00 sub\r\n",
        )
        .await
        .unwrap();
        drop(sock);
        ctl.say("226 done").await;
        ctl.expect("DELE /junk/a.txt").await;
        ctl.say("250 deleted").await;
        let data = offer_pasv(&mut ctl).await;
        ctl.expect("LIST /junk/sub").await;
        ctl.say("150 listing").await;
        let (sock, _) = data.accept().await.unwrap();
        drop(sock);
        ctl.say("226 done").await;
        ctl.expect("RMD /junk/sub").await;
        ctl.say("250 removed").await;
        ctl.expect("RMD /junk").await;
        ctl.say("250 removed").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    client.remove_dir("/junk", true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn renames_with_rnfr_rnto() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("RNFR /old.txt").await;
        ctl.say("350 ready for destination").await;
        ctl.expect("RNTO /new.txt").await;
        ctl.say("250 rename successful").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    client.rename("/old.txt", "/new.txt").await.unwrap();
}

#[tokio::test]
async fn ensure_dir_creates_missing_ancestors() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("PWD").await;
        ctl.say("257 \"/\" is current").await;
        // Ancestor walk: /a/b/c and /a/b missing, /a exists.
        ctl.expect("CWD /a/b/c").await;
        ctl.say("550 no such directory").await;
        ctl.expect("CWD /a/b").await;
        ctl.say("550 no such directory").await;
        ctl.expect("CWD /a").await;
        ctl.say("250 ok").await;
        // Creation shallowest-first.
        ctl.expect("MKD /a/b").await;
        ctl.say("257 \"/a/b\" created").await;
        ctl.expect("MKD /a/b/c").await;
        ctl.say("257 \"/a/b/c\" created").await;
        // Working directory restored.
        ctl.expect("CWD /").await;
        ctl.say("250 ok").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    client.ensure_dir("/a/b/c", true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn ensure_dir_second_call_detects_existing_tree() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        // First call creates the chain.
        ctl.expect("PWD").await;
        ctl.say("257 \"/\" is current").await;
        ctl.expect("CWD /a/b/c").await;
        ctl.say("550 no such directory").await;
        ctl.expect("CWD /a/b").await;
        ctl.say("550 no such directory").await;
        ctl.expect("CWD /a").await;
        ctl.say("250 ok").await;
        ctl.expect("MKD /a/b").await;
        ctl.say("257 \"/a/b\" created").await;
        ctl.expect("MKD /a/b/c").await;
        ctl.say("257 \"/a/b/c\" created").await;
        ctl.expect("CWD /").await;
        ctl.say("250 ok").await;
        // Second call: the probe succeeds, so no MKD is issued (an
        // unexpected MKD would trip the next expect below).
        ctl.expect("PWD").await;
        ctl.say("257 \"/\" is current").await;
        ctl.expect("CWD /a/b/c").await;
        ctl.say("250 ok").await;
        ctl.expect("CWD /").await;
        ctl.say("250 ok").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    client.ensure_dir("/a/b/c", true).await.unwrap();
    client.ensure_dir("/a/b/c", true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn ensure_dir_swallows_concurrent_creation() {
    let (listener, cfg) = start().await;
    let server = tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("PWD").await;
        ctl.say("257 \"/\" is current").await;
        ctl.expect("CWD /a").await;
        ctl.say("550 no such directory").await;
        // Someone else created it between the probe and the MKD.
        ctl.expect("MKD /a").await;
        ctl.say("550 Directory already exists").await;
        ctl.expect("CWD /").await;
        ctl.say("250 ok").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    client.ensure_dir("/a", true).await.unwrap();
    server.await.unwrap();
}

// ─── Path probing ────────────────────────────────────────────────────

#[tokio::test]
async fn stat_detects_file_via_size() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("SIZE /f.txt").await;
        ctl.say("213 1234").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let stat = client.stat("/f.txt").await.unwrap();
    assert!(stat.exists && stat.is_file && !stat.is_dir);
    assert_eq!(stat.size, Some(1234));
}

#[tokio::test]
async fn stat_falls_back_to_cwd_probe_for_directories() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("SIZE /dir").await;
        ctl.say("550 not a plain file").await;
        ctl.expect("PWD").await;
        ctl.say("257 \"/home\" is current").await;
        ctl.expect("CWD /dir").await;
        ctl.say("250 ok").await;
        ctl.expect("CWD /home").await;
        ctl.say("250 ok").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let stat = client.stat("/dir").await.unwrap();
    assert!(stat.exists && stat.is_dir && !stat.is_file);
    assert!(client.session().last_command.as_deref() == Some("CWD /home"));
}

#[tokio::test]
async fn exists_is_false_when_both_probes_fail() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("SIZE /nope").await;
        ctl.say("550 no such file").await;
        ctl.expect("PWD").await;
        ctl.say("257 \"/\" is current").await;
        ctl.expect("CWD /nope").await;
        ctl.say("550 no such directory").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    assert!(!client.exists("/nope").await.unwrap());
}

#[tokio::test]
async fn parses_mdtm_reply() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("MDTM /f.txt").await;
        ctl.say("213 20240115103045").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let ts = client.modified_time("/f.txt").await.unwrap();
    assert_eq!(ts.to_rfc3339(), "2024-01-15T10:30:45+00:00");
}

// ─── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribers_see_raw_reply_lines() {
    let (listener, cfg) = start().await;
    tokio::spawn(async move {
        let mut ctl = Ctl::accept(&listener).await;
        ctl.handshake().await;
        ctl.expect("NOOP").await;
        ctl.say("200 zzz").await;
    });

    let mut client = FtpClient::connect(cfg).await.unwrap();
    let mut events = client.subscribe();
    client.noop().await.unwrap();

    let event = events.recv().await.unwrap();
    match event {
        FtpEvent::Line(line) => assert_eq!(line, "200 zzz"),
        other => panic!("expected a line event, got {:?}", other),
    }
}
