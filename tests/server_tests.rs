mod common;

use common::{config_on_free_port, TestServer};
use servant::registry::{Handler, Resource};
use servant::server::Server;
use servant::session::Session;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

const USERS: &str = r#"
users:
  ops:
    key: s3cret
    allow: ["commands/sys", "files/logs/public"]
  admin:
    key: root
    allow: ["*"]
commands:
  sys:
    greet:
      code: "echo hello ${who}"
"#;

const OPS: [(&str, &str); 2] = [("X-Servant-User", "ops"), ("X-Servant-Key", "s3cret")];
const ADMIN: [(&str, &str); 2] = [("X-Servant-User", "admin"), ("X-Servant-Key", "root")];

fn start(yaml: &str) -> TestServer {
    TestServer::start(Server::builder(config_on_free_port(yaml)))
}

#[test]
fn test_command_runs_for_permitted_user() {
    let server = start(USERS);
    let resp = server.request("GET", "/commands/sys/greet?who=there", &OPS);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "hello there\n");
    assert!(resp.error().is_none());
}

#[test]
fn test_unknown_resource_is_404() {
    let server = start(USERS);
    let resp = server.request("GET", "/unknownres/a/b", &ADMIN);
    assert_eq!(resp.status, 404);
    assert!(resp.error().unwrap().contains("unknown resource"));
}

#[test]
fn test_malformed_path_is_404() {
    let server = start(USERS);
    let resp = server.request("GET", "/commands/sys", &ADMIN);
    assert_eq!(resp.status, 404);
    assert_eq!(resp.error(), Some("unknown resource"));
}

#[test]
fn test_auth_failure_is_403() {
    let server = start(USERS);
    let resp = server.request("GET", "/commands/sys/greet", &[]);
    assert_eq!(resp.status, 403);
    assert!(resp.error().unwrap().starts_with("auth failed:"));

    let resp = server.request(
        "GET",
        "/commands/sys/greet",
        &[("X-Servant-User", "ops"), ("X-Servant-Key", "wrong")],
    );
    assert_eq!(resp.status, 403);
    assert_eq!(resp.error(), Some("auth failed: bad key for user ops"));
}

#[test]
fn test_permission_denied_names_path() {
    let server = start(USERS);
    let resp = server.request("GET", "/files/logs/private/secret.txt", &OPS);
    assert_eq!(resp.status, 403);
    assert_eq!(
        resp.error(),
        Some("access of /files/logs/private/secret.txt forbidden")
    );
}

#[test]
fn test_file_tail_selects_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nginx")).unwrap();
    fs::write(dir.path().join("nginx/access.log"), "line one\nline two\n").unwrap();
    let yaml = format!(
        "{USERS}files:\n  logs:\n    public:\n      root: {}\n",
        dir.path().display()
    );
    let server = start(&yaml);

    let resp = server.request("GET", "/files/logs/public/nginx/access.log", &OPS);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/plain"));
    assert_eq!(resp.body, "line one\nline two\n");

    let resp = server.request("GET", "/files/logs/public/nginx/missing.log", &OPS);
    assert_eq!(resp.status, 404);
    assert!(resp.error().is_some());
}

#[test]
fn test_put_stores_body() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "{USERS}files:\n  logs:\n    public:\n      root: {}\n      writable: true\n",
        dir.path().display()
    );
    let server = start(&yaml);

    let resp = server.request_with_body("PUT", "/files/logs/public/note.txt", &OPS, "remember");
    assert_eq!(resp.status, 200);
    assert_eq!(fs::read_to_string(dir.path().join("note.txt")).unwrap(), "remember");
}

static BUILT: AtomicUsize = AtomicUsize::new(0);

struct Counted;

impl Handler for Counted {
    fn serve(&mut self) {}
}

fn counted(_sess: &mut Session) -> Box<dyn Handler + '_> {
    BUILT.fetch_add(1, Ordering::SeqCst);
    Box::new(Counted)
}

#[test]
fn test_refused_request_builds_no_handler() {
    let server = TestServer::start(
        Server::builder(config_on_free_port(USERS)).resource(Resource::Databases, counted),
    );

    let resp = server.request("GET", "/databases/main/users", &[]);
    assert_eq!(resp.status, 403);
    let resp = server.request("GET", "/databases/main/users", &OPS);
    assert_eq!(resp.status, 403);
    assert_eq!(BUILT.load(Ordering::SeqCst), 0);

    let resp = server.request("GET", "/databases/main/users", &ADMIN);
    assert_eq!(resp.status, 200);
    assert_eq!(BUILT.load(Ordering::SeqCst), 1);
}
