use crate::registry::Handler;
use crate::session::Session;
use http::{Method, StatusCode};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Serves the directory tree configured under `files.<group>.<item>`.
///
/// The path tail selects a file below the configured root. `GET` reads it,
/// `PUT` replaces it when the item is `writable`.
pub struct FileServer<'s> {
    sess: &'s mut Session,
}

pub fn new_file_server(sess: &mut Session) -> Box<dyn Handler + '_> {
    Box::new(FileServer { sess })
}

/// Map a URL tail onto a path below `root`.
///
/// Only plain components are accepted; `..`, absolute prefixes and the like
/// yield `None`.
fn map_path(root: &Path, tail: &str) -> Option<PathBuf> {
    let mut pb = root.to_path_buf();
    for comp in Path::new(tail.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => pb.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(pb)
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "txt" | "log" | "conf" => "text/plain",
        _ => "application/octet-stream",
    }
}

impl FileServer<'_> {
    fn get(&mut self, path: &Path) {
        if !path.is_file() {
            let tail = self.sess.tail().to_string();
            self.sess
                .error_end(StatusCode::NOT_FOUND, format_args!("no file {tail}"));
            return;
        }
        match fs::read(path) {
            Ok(bytes) => {
                self.sess.set_header("Content-Type", content_type(path));
                self.sess.write_body(&bytes);
                self.sess.good_end(format_args!("sent {} bytes", bytes.len()));
            }
            Err(e) => self.read_failed(&e),
        }
    }

    fn put(&mut self, path: &Path, writable: bool) {
        if !writable {
            self.sess.error_end(StatusCode::FORBIDDEN, "file item is read-only");
            return;
        }
        if path.is_dir() {
            self.sess.error_end(StatusCode::CONFLICT, "target is a directory");
            return;
        }
        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, self.sess.body()));
        match written {
            Ok(()) => {
                let len = self.sess.body().len();
                self.sess.good_end(format_args!("stored {len} bytes"));
            }
            Err(e) => self.read_failed(&e),
        }
    }

    fn read_failed(&mut self, e: &io::Error) {
        let status = match e.kind() {
            io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        self.sess.error_end(status, format_args!("file access failed: {e}"));
    }
}

impl Handler for FileServer<'_> {
    fn serve(&mut self) {
        let Some(item) = self
            .sess
            .config()
            .file(self.sess.group(), self.sess.item())
            .cloned()
        else {
            let name = format!("{}/{}", self.sess.group(), self.sess.item());
            self.sess
                .error_end(StatusCode::NOT_FOUND, format_args!("file item {name} not found"));
            return;
        };

        let Some(path) = map_path(&item.root, self.sess.tail()) else {
            self.sess.error_end(StatusCode::FORBIDDEN, "invalid file path");
            return;
        };

        let method = self.sess.method().clone();
        match method {
            Method::GET => self.get(&path),
            Method::PUT => self.put(&path, item.writable),
            other => self.sess.error_end(
                StatusCode::METHOD_NOT_ALLOWED,
                format_args!("method {other} not allowed"),
            ),
        }
    }
}
