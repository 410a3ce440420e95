//! A tiny HTTP server that answers connections from a fixed script, for cases
//! mockito cannot express: replies in a set order and bodies that never finish.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub struct Reply {
    raw: String,
    hold_open: bool,
}

impl Reply {
    /// A complete response; the connection is closed afterwards.
    pub fn json(status: u16, body: &str) -> Self {
        let reason = match status {
            200 => "OK",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            _ => "Status",
        };
        Self {
            raw: format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            ),
            hold_open: false,
        }
    }

    /// Announces `declared_len` body bytes, sends only `partial`, then stalls.
    pub fn stalled_body(declared_len: usize, partial: &str) -> Self {
        Self {
            raw: format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {declared_len}\r\n\r\n{partial}"
            ),
            hold_open: true,
        }
    }
}

pub struct ScriptedServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl ScriptedServer {
    /// Connection `n` gets `replies[n]`; the last reply repeats once the
    /// script runs out.
    pub fn start(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            let mut stalled: Vec<TcpStream> = Vec::new();
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = &replies[n.min(replies.len() - 1)];

                read_request_head(&mut stream);
                let _ = stream.write_all(reply.raw.as_bytes());
                let _ = stream.flush();
                if reply.hold_open {
                    stalled.push(stream);
                }
            }
        });

        Self { base, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn read_request_head(stream: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}
