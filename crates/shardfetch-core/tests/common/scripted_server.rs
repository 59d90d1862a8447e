//! Minimal HTTP/1.1 server for integration tests that replays a script of responses.
//!
//! Each request consumes the next scripted reply; once the script is exhausted
//! the last reply is repeated. Every request is counted so tests can assert
//! how many attempts a client made.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with this status and body.
    Status(u16, Vec<u8>),
    /// Accept the request, then say nothing for this long before closing.
    Stall(Duration),
    /// 200 with `body` sent in `piece`-byte writes, sleeping `every` between them.
    Trickle {
        body: Vec<u8>,
        piece: usize,
        every: Duration,
    },
}

impl Reply {
    pub fn ok(body: &[u8]) -> Reply {
        Reply::Status(200, body.to_vec())
    }

    pub fn status(code: u16) -> Reply {
        Reply::Status(code, format!("status {}", code).into_bytes())
    }
}

pub struct ScriptedServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl ScriptedServer {
    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. The server runs until the process exits.
/// `path` is appended to the base URL, e.g. `start("/ok.zip", ..)`.
pub fn start(path: &str, script: Vec<Reply>) -> ScriptedServer {
    assert!(!script.is_empty(), "script needs at least one reply");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let script = Arc::new(Mutex::new((script, 0usize)));
    let hits_srv = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let reply = {
                let mut guard = script.lock().unwrap();
                let (replies, next) = &mut *guard;
                let reply = replies[(*next).min(replies.len() - 1)].clone();
                *next += 1;
                reply
            };
            let hits = Arc::clone(&hits_srv);
            thread::spawn(move || handle(stream, reply, &hits));
        }
    });
    ScriptedServer {
        url: format!("http://127.0.0.1:{}{}", port, path),
        hits,
    }
}

fn read_request(stream: &mut TcpStream) -> bool {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    true
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn handle(mut stream: TcpStream, reply: Reply, hits: &AtomicUsize) {
    if !read_request(&mut stream) {
        return;
    }
    hits.fetch_add(1, Ordering::SeqCst);
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    match reply {
        Reply::Status(code, body) => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                code,
                reason(code),
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
        Reply::Stall(d) => thread::sleep(d),
        Reply::Trickle { body, piece, every } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            for chunk in body.chunks(piece.max(1)) {
                if stream.write_all(chunk).and_then(|_| stream.flush()).is_err() {
                    return;
                }
                thread::sleep(every);
            }
        }
    }
}
