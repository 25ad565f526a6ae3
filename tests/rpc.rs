use std::io::Write;
use std::net::TcpListener;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use kvrpc::{
    BindAddr, Handle, KvError, KvsClient, KvsServer, KvsService, RemoteError, Request, Response,
    SharedQueueThreadPool, SledEngine, ThreadPool,
};
use serde::Deserialize;
use tempfile::TempDir;

/// Starts a server on an ephemeral local port and returns the port.
fn start_server() -> u16 {
    let pool = SharedQueueThreadPool::new(4).unwrap();
    let server = KvsServer::new(KvsService::<SledEngine>::new(), pool);
    let listener = server
        .bind(&BindAddr::Tcp("127.0.0.1".to_owned(), 0))
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || server.serve(listener));
    port
}

fn connect(port: u16) -> KvsClient {
    KvsClient::connect("127.0.0.1", port).unwrap()
}

fn db_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_owned()
}

#[test]
fn open_put_get_close_reopen_scenario() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "db");
    let mut client = connect(start_server());

    let handle = client.open(&path).unwrap();
    assert_eq!(handle, Handle::new(0));
    assert_eq!(client.open(&path).unwrap(), handle);

    client.put(handle, b"hello", b"world").unwrap();
    assert_eq!(client.get(handle, b"hello").unwrap(), Some(b"world".to_vec()));

    client.close(handle).unwrap();
    assert_eq!(client.get(handle, b"hello").unwrap(), Some(b"world".to_vec()));
    client.close(handle).unwrap();
    assert!(matches!(
        client.get(handle, b"hello"),
        Err(KvError::Remote(RemoteError::InvalidHandle(h))) if h == handle
    ));

    let reopened = client.open(&path).unwrap();
    assert_eq!(reopened, Handle::new(1));
    assert_eq!(client.get(reopened, b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn arbitrary_bytes_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut client = connect(start_server());
    let handle = client.open(&db_path(&dir, "db")).unwrap();

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"empty".to_vec(), Vec::new()),
        (Vec::new(), b"empty key".to_vec()),
        (b"nul\0inside".to_vec(), b"\0\0\xff\x01".to_vec()),
        ((0..=255).collect(), (0..=255).rev().collect()),
    ];
    for (key, value) in &pairs {
        client.put(handle, key, value).unwrap();
    }
    for (key, value) in &pairs {
        assert_eq!(client.get(handle, key).unwrap().as_ref(), Some(value));
    }
    assert_eq!(client.get(handle, b"absent").unwrap(), None);
}

#[test]
fn multi_get_preserves_key_order() {
    let dir = TempDir::new().unwrap();
    let mut client = connect(start_server());
    let handle = client.open(&db_path(&dir, "db")).unwrap();
    for i in 0..10u8 {
        client.put(handle, &[i], &[i, i]).unwrap();
    }

    let keys: Vec<Vec<u8>> = vec![vec![9], vec![42], vec![0], vec![5], vec![9]];
    let values = client.multi_get(handle, &keys).unwrap();
    assert_eq!(values.len(), keys.len());

    let sequential: Vec<_> = keys
        .iter()
        .map(|key| client.get(handle, key).unwrap())
        .collect();
    assert_eq!(values, sequential);
    assert_eq!(values[1], None);
    assert_eq!(values[0], Some(vec![9, 9]));
}

#[test]
fn unknown_handles_are_protocol_errors() {
    let mut client = connect(start_server());
    let bogus = Handle::new(1000);

    let errors = vec![
        client.get(bogus, b"k").unwrap_err(),
        client.put(bogus, b"k", b"v").unwrap_err(),
        client.close(bogus).unwrap_err(),
        client.multi_get(bogus, &[b"k".to_vec()]).unwrap_err(),
    ];
    for e in errors {
        assert!(!e.is_transport());
        assert!(matches!(e, KvError::Remote(RemoteError::InvalidHandle(h)) if h == bogus));
    }
}

#[test]
fn clients_share_handles_by_path() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir, "shared");
    let port = start_server();
    let mut first = connect(port);
    let mut second = connect(port);

    let a = first.open(&path).unwrap();
    let b = second.open(&path).unwrap();
    assert_eq!(a, b);

    first.put(a, b"k", b"v").unwrap();
    first.close(a).unwrap();
    assert_eq!(second.get(b, b"k").unwrap(), Some(b"v".to_vec()));

    let other = second.open(&db_path(&dir, "other")).unwrap();
    assert!(other > a);
}

#[test]
fn failed_open_reports_engine_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, b"x").unwrap();
    let mut client = connect(start_server());

    let err = client
        .open(file.join("db").to_str().unwrap())
        .unwrap_err();
    assert!(matches!(err, KvError::Remote(RemoteError::Engine(_))));

    // The failed open consumed no handle and the session is still usable.
    assert_eq!(client.open(&db_path(&dir, "db")).unwrap(), Handle::new(0));
}

#[test]
fn deadline_expiry_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        // Accept and hold the connection without ever answering.
        let (_stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_secs(5));
    });

    let mut client = connect(port);
    client
        .set_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let err = client.open("/nowhere").unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");

    let err = client.get(Handle::new(0), b"k").unwrap_err();
    assert!(matches!(err, KvError::Transport(_)));
}

#[test]
fn server_hangup_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let mut client = connect(port);
    let err = client.open("/nowhere").unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
}

#[test]
fn serves_unix_domain_sockets() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("kvrpc.sock");
    let server = KvsServer::new(
        KvsService::<SledEngine>::new(),
        SharedQueueThreadPool::new(2).unwrap(),
    );
    let listener = server.bind(&BindAddr::Unix(socket.clone())).unwrap();
    assert_eq!(
        listener.to_string(),
        format!("unix socket [{}]", socket.display())
    );
    thread::spawn(move || server.serve(listener));

    let mut stream = UnixStream::connect(&socket).unwrap();
    let request = Request::Open {
        path: db_path(&dir, "db"),
    };
    serde_json::to_writer(&mut stream, &request).unwrap();
    stream.flush().unwrap();

    let mut reader = serde_json::Deserializer::from_reader(stream);
    let response = Response::deserialize(&mut reader).unwrap();
    assert_eq!(response, Response::Handle(Handle::new(0)));
}
