use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use verbum::catalog::{Answerer, AskRequest, Catalog};
use verbum::http::HttpBackend;
use verbum::{FailureClass, VerbumError};

#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    body: String,
}

struct Reply {
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

fn json(status: &'static str, body: &str) -> Reply {
    Reply {
        status,
        content_type: "application/json",
        body: body.as_bytes().to_vec(),
    }
}

/// Serve every connection with `route(request_line)` until the test ends.
fn serve<F>(route: F) -> (String, Arc<Mutex<Vec<Recorded>>>)
where
    F: Fn(&str) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_thread = log.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let recorded = read_request(&mut stream);
            let reply = route(&recorded.request_line);
            log_thread.lock().unwrap().push(recorded);

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.status,
                reply.content_type,
                reply.body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&reply.body);
            let _ = stream.flush();
        }
    });

    (base, log)
}

fn read_request(stream: &mut TcpStream) -> Recorded {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break buffer.len();
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
    }
}

fn backend(base: &str) -> HttpBackend {
    HttpBackend::new(base, Duration::from_secs(5)).unwrap()
}

#[test]
fn fetches_hierarchy_and_root_distances() {
    let (base, log) = serve(|line| {
        if line.starts_with("GET /api/hierarchy ") {
            json(
                "200 OK",
                r#"{"hierarchy": {"name": "root", "type": "root", "children": [
                    {"name": "A", "type": "folder", "children": [
                        {"name": "doc1.pdf", "type": "document", "path": "A/doc1.pdf"}
                    ]},
                    {"name": "B", "type": "folder", "children": []}
                ]}}"#,
            )
        } else if line.starts_with("GET /api/semantic-distances/level-0 ") {
            json("200 OK", r#"{"distances": {"B|A": 0.25}}"#)
        } else {
            json("404 Not Found", "{}")
        }
    });
    let http = backend(&base);

    let root = http.hierarchy().unwrap();
    assert_eq!(root.children.len(), 2);
    assert_eq!(
        root.walk(&["A", "doc1.pdf"]).unwrap().kind.document_path(),
        Some("A/doc1.pdf")
    );

    let table = http.level_distances(&[]).unwrap();
    assert_eq!(table.get("A", "B"), Some(0.25));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn missing_deeper_level_means_no_distances() {
    let (base, log) = serve(|_| json("404 Not Found", r#"{"error": "no such level"}"#));
    let http = backend(&base);

    let table = http.level_distances(&["A".to_string()]).unwrap();
    assert!(table.is_empty());
    assert_eq!(
        log.lock().unwrap()[0].request_line,
        "GET /api/semantic-distances/level-1?path=A HTTP/1.1"
    );

    let err = http.level_distances(&[]).unwrap_err();
    assert!(matches!(err, VerbumError::Status { status: 404, .. }));
    assert_eq!(err.failure_class(), FailureClass::DataFetch);
}

#[test]
fn malformed_hierarchy_is_a_fetch_failure() {
    let (base, _log) = serve(|_| json("200 OK", r#"{"tree": []}"#));
    let err = backend(&base).hierarchy().unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::DataFetch);
}

#[test]
fn downloads_document_bytes() {
    let (base, log) = serve(|line| {
        if line.starts_with("GET /api/document/A/doc%201.pdf?t=") {
            Reply {
                status: "200 OK",
                content_type: "application/pdf",
                body: b"%PDF-1.7 body".to_vec(),
            }
        } else {
            json("404 Not Found", "{}")
        }
    });
    let bytes = backend(&base).document("A/doc 1.pdf").unwrap();
    assert_eq!(bytes, b"%PDF-1.7 body");
    assert!(log.lock().unwrap()[0].request_line.contains("?t="));
}

#[test]
fn ask_posts_question_and_reads_answer() {
    let (base, log) = serve(|_| json("200 OK", r#"{"answer": "Entropy rises.", "confidence": 0.9}"#));
    let request = AskRequest {
        question: "What happens?".to_string(),
        document: "Physics/thermo.pdf".to_string(),
    };
    let answer = backend(&base).ask(&request).unwrap();
    assert_eq!(answer.text, "Entropy rises.");
    assert_eq!(answer.percent(), 90);

    let recorded = log.lock().unwrap()[0].clone();
    assert_eq!(recorded.request_line, "POST /api/ask HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&recorded.body).unwrap();
    assert_eq!(body["question"], "What happens?");
    assert_eq!(body["document"], "Physics/thermo.pdf");
}

#[test]
fn ask_error_payload_is_surfaced() {
    let (base, _log) = serve(|_| json("500 Internal Server Error", r#"{"error": "model offline"}"#));
    let request = AskRequest {
        question: "Why?".to_string(),
        document: "a.pdf".to_string(),
    };
    let err = backend(&base).ask(&request).unwrap_err();
    assert_eq!(err.to_string(), "model offline");
    assert_eq!(err.failure_class(), FailureClass::QuestionSubmission);
}

#[test]
fn ask_non_json_failure_reports_status() {
    let (base, _log) = serve(|_| Reply {
        status: "502 Bad Gateway",
        content_type: "text/html",
        body: b"<html>bad gateway</html>".to_vec(),
    });
    let request = AskRequest {
        question: "Why?".to_string(),
        document: "a.pdf".to_string(),
    };
    let err = backend(&base).ask(&request).unwrap_err();
    assert!(matches!(err, VerbumError::Status { status: 502, .. }));
}
