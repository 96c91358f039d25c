use hearth::handler::file::FileHandler;
use hearth::handler::{BlockHandler, Handler, HandlerFuture, NotImplementedHandler};
use hearth::http::request::Request;
use hearth::http::response::Response;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, DuplexStream};
use url::Url;

fn root() -> Url {
    Url::parse("http://127.0.0.1:8080/").unwrap()
}

async fn request_from(raw: &[u8]) -> Request {
    let mut req = Request::new(Box::new(Cursor::new(raw.to_vec())), root());
    req.read_headers().await.unwrap();
    req
}

fn response_pair() -> (Response, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (Response::new(Box::new(server)), client)
}

async fn read_wire(mut client: DuplexStream) -> String {
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).to_string()
}

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hearth-test-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// Handler with per-clone mutable state, used to prove clones are independent.
struct CountingHandler {
    calls: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl Handler for CountingHandler {
    fn can_handle(&self, _request: &Request) -> bool {
        true
    }

    fn for_request(&self, _request: &Request) -> Box<dyn Handler> {
        Box::new(CountingHandler {
            calls: 0,
            log: Arc::clone(&self.log),
        })
    }

    fn handle<'a>(
        &'a mut self,
        _request: &'a mut Request,
        response: &'a mut Response,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.calls += 1;
            self.log.lock().unwrap().push(self.calls);
            response.send_simple(200, "text/plain", b"ok").await
        })
    }
}

#[tokio::test]
async fn test_clones_share_no_mutable_state() {
    let prototype = CountingHandler {
        calls: 0,
        log: Arc::new(Mutex::new(Vec::new())),
    };

    for _ in 0..2 {
        let mut request = request_from(b"GET / HTTP/1.1\r\n\r\n").await;
        let (mut response, _client) = response_pair();
        let mut clone = prototype.for_request(&request);
        clone.handle(&mut request, &mut response).await;
        response.complete_response().await;
    }

    // Each clone counted from zero; mutation in one never reached the other.
    assert_eq!(*prototype.log.lock().unwrap(), vec![1, 1]);
    assert_eq!(prototype.calls, 0);
}

#[tokio::test]
async fn test_fallback_answers_501() {
    let prototype = NotImplementedHandler;
    let mut request = request_from(b"BREW /coffee HTTP/1.1\r\n\r\n").await;

    assert!(prototype.can_handle(&request));

    let (mut response, client) = response_pair();
    let mut clone = prototype.for_request(&request);
    let advisory = clone.handle(&mut request, &mut response).await;
    response.complete_response().await;

    assert_eq!(advisory, 501);
    let wire = read_wire(client).await;
    assert!(wire.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    assert!(wire.ends_with("501 Not Implemented"));
}

#[tokio::test]
async fn test_block_handler_predicate_gates_matching() {
    fn noop<'a>(_req: &'a mut Request, res: &'a mut Response) -> HandlerFuture<'a> {
        Box::pin(async move { res.send_simple(204, "text/plain", b"").await })
    }

    let handler = BlockHandler::new(
        |request: &Request| request.url().is_some_and(|u| u.path() == "/ping"),
        noop,
    );

    let ping = request_from(b"GET /ping HTTP/1.1\r\n\r\n").await;
    let other = request_from(b"GET /other HTTP/1.1\r\n\r\n").await;

    assert!(handler.can_handle(&ping));
    assert!(!handler.can_handle(&other));
}

#[tokio::test]
async fn test_unconditional_block_handler_matches_everything() {
    fn noop<'a>(_req: &'a mut Request, res: &'a mut Response) -> HandlerFuture<'a> {
        Box::pin(async move { res.send_simple(200, "text/plain", b"any").await })
    }

    let handler = BlockHandler::unconditional(noop);

    let post = request_from(b"POST /anything HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
    assert!(handler.can_handle(&post));
}

#[tokio::test]
async fn test_file_handler_matches_read_methods_on_existing_files() {
    let dir = temp_root("match");
    std::fs::write(dir.join("page.html"), "<html></html>").unwrap();
    let handler = FileHandler::new(&dir);

    let get = request_from(b"GET /page.html HTTP/1.1\r\n\r\n").await;
    let head = request_from(b"HEAD /page.html HTTP/1.1\r\n\r\n").await;
    let post = request_from(b"POST /page.html HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
    let missing = request_from(b"GET /absent.html HTTP/1.1\r\n\r\n").await;

    assert!(handler.can_handle(&get));
    assert!(handler.can_handle(&head));
    assert!(!handler.can_handle(&post));
    assert!(!handler.can_handle(&missing));
}

#[tokio::test]
async fn test_file_handler_serves_file_with_content_type() {
    let dir = temp_root("serve");
    std::fs::write(dir.join("hello.txt"), "hello world").unwrap();
    let prototype = FileHandler::new(&dir);

    let mut request = request_from(b"GET /hello.txt HTTP/1.1\r\n\r\n").await;
    let (mut response, client) = response_pair();

    let mut clone = prototype.for_request(&request);
    let advisory = clone.handle(&mut request, &mut response).await;
    response.complete_response().await;

    assert_eq!(advisory, 200);
    let wire = read_wire(client).await;
    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Type: text/plain\r\n"));
    assert!(wire.contains("Content-Length: 11\r\n"));
    assert!(wire.ends_with("hello world"));
}

#[tokio::test]
async fn test_file_handler_head_omits_body() {
    let dir = temp_root("head");
    std::fs::write(dir.join("data.json"), "{}").unwrap();
    let prototype = FileHandler::new(&dir);

    let mut request = request_from(b"HEAD /data.json HTTP/1.1\r\n\r\n").await;
    let (mut response, client) = response_pair();

    prototype
        .for_request(&request)
        .handle(&mut request, &mut response)
        .await;
    response.complete_response().await;

    let wire = read_wire(client).await;
    assert!(wire.contains("Content-Length: 2\r\n"));
    assert!(wire.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_file_handler_single_range() {
    let dir = temp_root("range");
    std::fs::write(dir.join("hello.txt"), "hello world").unwrap();
    let prototype = FileHandler::new(&dir);

    let mut request =
        request_from(b"GET /hello.txt HTTP/1.1\r\nRange: bytes=0-4\r\n\r\n").await;
    let (mut response, client) = response_pair();

    let advisory = prototype
        .for_request(&request)
        .handle(&mut request, &mut response)
        .await;
    response.complete_response().await;

    assert_eq!(advisory, 206);
    let wire = read_wire(client).await;
    assert!(wire.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(wire.contains("Content-Range: bytes 0-4/11\r\n"));
    assert!(wire.ends_with("hello"));
}

#[tokio::test]
async fn test_file_handler_unsatisfiable_range() {
    let dir = temp_root("badrange");
    std::fs::write(dir.join("hello.txt"), "hello world").unwrap();
    let prototype = FileHandler::new(&dir);

    let mut request =
        request_from(b"GET /hello.txt HTTP/1.1\r\nRange: bytes=50-\r\n\r\n").await;
    let (mut response, client) = response_pair();

    let advisory = prototype
        .for_request(&request)
        .handle(&mut request, &mut response)
        .await;
    response.complete_response().await;

    assert_eq!(advisory, 416);
    let wire = read_wire(client).await;
    assert!(wire.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
    assert!(wire.contains("Content-Range: bytes */11\r\n"));
}

#[tokio::test]
async fn test_file_handler_bound_to_single_file() {
    let dir = temp_root("single");
    let file = dir.join("only.css");
    std::fs::write(&file, "body {}").unwrap();
    let prototype = FileHandler::new(&file);

    let mut request = request_from(b"GET /whatever HTTP/1.1\r\n\r\n").await;
    assert!(prototype.can_handle(&request));

    let (mut response, client) = response_pair();
    prototype
        .for_request(&request)
        .handle(&mut request, &mut response)
        .await;
    response.complete_response().await;

    let wire = read_wire(client).await;
    assert!(wire.contains("Content-Type: text/css\r\n"));
    assert!(wire.ends_with("body {}"));
}
