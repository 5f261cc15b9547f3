//! Request router for dispatching HTTP requests to file-tree operations.
//!
//! This module provides the `Router` struct that matches a parsed request
//! against the API surface, drives the operation, and writes the response.
//! Every [`ShareError`] is mapped to its status with a `{"error": ...}`
//! body here; transport parse failures bubble up as [`HttpError`] for the
//! connection handler's best-effort error reply.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use protocol::http::response::send_head;
use protocol::http::{boundary_from_content_type, Method, MultipartReader, Request, Response, Status};
use protocol::messages::{
    CreateFolderRequest, Deleted, FolderCreated, MoveRequest, Moved, RenameRequest, Renamed,
};
use protocol::{HttpError, ShareError};

use crate::events::{ChangeBus, NotificationStream};
use crate::files::FileTree;

/// Maximum accepted JSON request body.
const MAX_JSON_BODY: u64 = 64 * 1024;

/// Embedded browsing client, served at `/`.
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Matched API endpoint with its path operand.
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Index,
    Events,
    List(&'a str),
    Download(&'a str),
    Upload(&'a str),
    CreateFolder(&'a str),
    Rename(&'a str),
    Move(&'a str),
    Delete(&'a str),
    NotFound,
}

fn route(method: Method, path: &str) -> Route<'_> {
    let path = path.trim_start_matches('/');
    match method {
        Method::Get => {
            if path.is_empty() {
                Route::Index
            } else if path == "events" {
                Route::Events
            } else if path == "api/list" {
                Route::List("")
            } else if let Some(rest) = path.strip_prefix("api/list/") {
                Route::List(rest)
            } else if let Some(rest) = path.strip_prefix("download/") {
                Route::Download(rest)
            } else {
                Route::NotFound
            }
        }
        Method::Post => {
            if path == "upload" {
                Route::Upload("")
            } else if let Some(rest) = path.strip_prefix("upload/") {
                Route::Upload(rest)
            } else if path == "api/folder" {
                Route::CreateFolder("")
            } else if let Some(rest) = path.strip_prefix("api/folder/") {
                Route::CreateFolder(rest)
            } else if let Some(rest) = path.strip_prefix("api/rename/") {
                Route::Rename(rest)
            } else if let Some(rest) = path.strip_prefix("api/move/") {
                Route::Move(rest)
            } else {
                Route::NotFound
            }
        }
        Method::Delete => {
            if let Some(rest) = path.strip_prefix("api/item/") {
                Route::Delete(rest)
            } else {
                Route::NotFound
            }
        }
    }
}

/// Dispatches requests to the file tree and the event bus.
#[derive(Debug)]
pub struct Router {
    files: FileTree,
    bus: ChangeBus,
    keep_alive: Duration,
}

impl Router {
    /// Build a router over the shared subsystems.
    pub fn new(files: FileTree, bus: ChangeBus, keep_alive: Duration) -> Self {
        Self {
            files,
            bus,
            keep_alive,
        }
    }

    /// Handle one request: run the matched operation and write the response.
    ///
    /// `reader` is positioned at the start of the request body; `writer` is
    /// the raw response stream (downloads and event streams write through it
    /// directly).
    pub async fn dispatch<R, W>(
        &self,
        request: Request,
        mut reader: R,
        writer: &mut W,
    ) -> Result<(), HttpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let matched = route(request.method, &request.path);
        debug!(path = %request.path, route = ?matched, "Dispatching request");

        match matched {
            Route::Index => Response::html(INDEX_HTML).send(writer).await?,

            Route::List(rel) => {
                let result = self.files.list(rel).map(|l| Response::json(Status::Ok, &l));
                send_result(writer, result).await?;
            }

            Route::CreateFolder(rel) => {
                let body: CreateFolderRequest = read_json(&request, &mut reader).await?;
                let result = self
                    .files
                    .create_folder(rel, &body.name)
                    .map(|path| Response::json(Status::Created, &FolderCreated { path }));
                send_result(writer, result).await?;
            }

            Route::Rename(rel) => {
                let body: RenameRequest = read_json(&request, &mut reader).await?;
                let result = self
                    .files
                    .rename(rel, &body.new_name)
                    .map(|name| Response::json(Status::Ok, &Renamed { name }));
                send_result(writer, result).await?;
            }

            Route::Move(rel) => {
                let body: MoveRequest = read_json(&request, &mut reader).await?;
                let result = self
                    .files
                    .move_item(rel, &body.destination)
                    .map(|path| Response::json(Status::Ok, &Moved { path }));
                send_result(writer, result).await?;
            }

            Route::Delete(rel) => {
                let result = self
                    .files
                    .delete(rel)
                    .map(|deleted| Response::json(Status::Ok, &Deleted { deleted }));
                send_result(writer, result).await?;
            }

            Route::Upload(rel) => {
                let response = self.handle_upload(&request, rel, reader).await?;
                response.send(writer).await?;
            }

            Route::Download(rel) => self.handle_download(rel, writer).await?,

            Route::Events => {
                send_head(
                    writer,
                    Status::Ok,
                    &[
                        ("Content-Type", "text/event-stream"),
                        ("Cache-Control", "no-cache"),
                    ],
                )
                .await?;
                let stream = NotificationStream::new(self.bus.subscribe(), self.keep_alive);
                stream.run(writer).await?;
            }

            Route::NotFound => {
                Response::error(Status::NotFound, "not found")
                    .send(writer)
                    .await?
            }
        }
        Ok(())
    }

    /// Stream the multipart body into upload sinks, one file per part.
    async fn handle_upload<R>(
        &self,
        request: &Request,
        rel: &str,
        reader: R,
    ) -> Result<Response, HttpError>
    where
        R: AsyncRead + Unpin,
    {
        let boundary = request
            .header("content-type")
            .and_then(boundary_from_content_type);
        let Some(boundary) = boundary else {
            return Ok(Response::error(
                Status::BadRequest,
                "expected multipart/form-data",
            ));
        };
        let length = request.content_length().ok_or(HttpError::LengthRequired)?;

        let mut batch = match self.files.upload_to(rel) {
            Ok(batch) => batch,
            Err(e) => return Ok(Response::error(e.status(), e.to_string())),
        };

        let body = reader.take(length);
        let mut multipart = MultipartReader::new(body, &boundary);

        let mut saw_file_part = false;
        while let Some(part) = multipart.next_part().await? {
            // Plain form fields carry no filename; ignore them.
            let Some(filename) = part.filename else {
                continue;
            };
            saw_file_part = true;

            let sink = match batch.begin_file(&filename).await {
                Ok(sink) => sink,
                Err(e) => {
                    batch.record_failure(filename, &e);
                    continue;
                }
            };
            // Unusable names are skipped; next_part drains the body.
            let Some(mut sink) = sink else {
                continue;
            };

            let name = sink.name().to_string();
            let mut write_err: Option<ShareError> = None;
            while let Some(chunk) = multipart.chunk().await? {
                if write_err.is_none() {
                    if let Err(e) = sink.write_chunk(&chunk).await {
                        // Keep draining so the remaining parts stay parseable.
                        write_err = Some(e);
                    }
                }
            }
            match write_err {
                Some(e) => {
                    sink.abort().await;
                    batch.record_failure(&name, &e);
                }
                None => match sink.finish().await {
                    Ok(()) => batch.record_success(),
                    Err(e) => batch.record_failure(&name, &e),
                },
            }
        }

        if !saw_file_part {
            return Ok(Response::error(Status::BadRequest, "no files in request"));
        }

        let failed_entirely = batch.uploaded() == 0 && batch.has_failures();
        let outcome = batch.finish();
        let status = if failed_entirely {
            Status::InternalServerError
        } else {
            Status::Ok
        };
        Ok(Response::json(status, &outcome))
    }

    /// Stream a file back as an attachment.
    async fn handle_download<W>(&self, rel: &str, writer: &mut W) -> Result<(), HttpError>
    where
        W: AsyncWrite + Unpin,
    {
        let download = match self.files.open_download(rel).await {
            Ok(download) => download,
            Err(e) => {
                return Ok(Response::error(e.status(), e.to_string())
                    .send(writer)
                    .await?)
            }
        };

        let length = download.size.to_string();
        let disposition = format!(
            "attachment; filename=\"{}\"",
            download.name.replace('"', "_")
        );
        send_head(
            writer,
            Status::Ok,
            &[
                ("Content-Type", "application/octet-stream"),
                ("Content-Length", &length),
                ("Content-Disposition", &disposition),
            ],
        )
        .await?;

        let mut file = download.file;
        tokio::io::copy(&mut file, writer).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Send either the operation's response or its mapped error body.
async fn send_result<W: AsyncWrite + Unpin>(
    writer: &mut W,
    result: Result<Response, ShareError>,
) -> Result<(), HttpError> {
    let response = match result {
        Ok(response) => response,
        Err(e) => Response::error(e.status(), e.to_string()),
    };
    Ok(response.send(writer).await?)
}

/// Read and deserialize a small JSON body.
async fn read_json<T, R>(request: &Request, reader: &mut R) -> Result<T, HttpError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let length = request.content_length().ok_or(HttpError::LengthRequired)?;
    if length > MAX_JSON_BODY {
        return Err(HttpError::TooLarge("JSON body".to_string()));
    }
    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            HttpError::Malformed("truncated request body".to_string())
        } else {
            HttpError::Io(e)
        }
    })?;
    serde_json::from_slice(&buf)
        .map_err(|e| HttpError::Malformed(format!("invalid JSON body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::Sandbox;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    fn test_router(temp: &TempDir) -> Router {
        let bus = ChangeBus::new(10);
        let sandbox = Sandbox::open(temp.path().join("share"), 5).unwrap();
        let files = FileTree::new(sandbox, bus.clone());
        Router::new(files, bus, Duration::from_secs(30))
    }

    /// Run one raw request through the router and return the response text.
    async fn roundtrip(router: &Router, raw: &str) -> String {
        let mut reader = BufReader::new(raw.as_bytes());
        let request = Request::read_from(&mut reader).await.unwrap().unwrap();
        let mut out = Vec::new();
        router.dispatch(request, reader, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_route_matching() {
        assert_eq!(route(Method::Get, "/"), Route::Index);
        assert_eq!(route(Method::Get, "/events"), Route::Events);
        assert_eq!(route(Method::Get, "/api/list"), Route::List(""));
        assert_eq!(route(Method::Get, "/api/list/docs/a"), Route::List("docs/a"));
        assert_eq!(
            route(Method::Get, "/download/docs/f.txt"),
            Route::Download("docs/f.txt")
        );
        assert_eq!(route(Method::Post, "/upload"), Route::Upload(""));
        assert_eq!(route(Method::Post, "/upload/docs"), Route::Upload("docs"));
        assert_eq!(route(Method::Post, "/api/folder"), Route::CreateFolder(""));
        assert_eq!(
            route(Method::Post, "/api/rename/docs/f.txt"),
            Route::Rename("docs/f.txt")
        );
        assert_eq!(route(Method::Post, "/api/move/a"), Route::Move("a"));
        assert_eq!(route(Method::Delete, "/api/item/a"), Route::Delete("a"));
    }

    #[test]
    fn test_route_unknown_paths() {
        assert_eq!(route(Method::Get, "/api/unknown"), Route::NotFound);
        assert_eq!(route(Method::Post, "/api/list"), Route::NotFound);
        assert_eq!(route(Method::Delete, "/api/item"), Route::NotFound);
        assert_eq!(route(Method::Get, "/download/"), Route::Download(""));
    }

    #[tokio::test]
    async fn test_dispatch_index_page() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let text = roundtrip(&router, "GET / HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("text/html"));
    }

    #[tokio::test]
    async fn test_dispatch_list_and_errors() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);
        fs::write(temp.path().join("share/hello.txt"), "hi").unwrap();

        let text = roundtrip(&router, "GET /api/list HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("hello.txt"));

        let text = roundtrip(&router, "GET /api/list/ghost HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("\"error\""));
    }

    #[tokio::test]
    async fn test_dispatch_traversal_is_forbidden() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let text = roundtrip(&router, "GET /api/list/../../etc HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    }

    #[tokio::test]
    async fn test_dispatch_create_folder() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let body = r#"{"name":"docs"}"#;
        let raw = format!(
            "POST /api/folder HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let text = roundtrip(&router, &raw).await;
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(text.contains(r#"{"path":"docs"}"#));
        assert!(temp.path().join("share/docs").is_dir());
    }

    #[tokio::test]
    async fn test_dispatch_invalid_json_is_bad_request() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let raw = "POST /api/folder HTTP/1.1\r\nContent-Length: 9\r\n\r\nnot json!";
        let mut reader = BufReader::new(raw.as_bytes());
        let request = Request::read_from(&mut reader).await.unwrap().unwrap();
        let mut out = Vec::new();
        let err = router
            .dispatch(request, reader, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_route_is_404() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let text = roundtrip(&router, "GET /api/nope HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_dispatch_upload_and_download() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let mut body = Vec::new();
        body.extend_from_slice(b"--B\r\n");
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"f.bin\"\r\n\r\n",
        );
        body.extend_from_slice(b"payload-bytes");
        body.extend_from_slice(b"\r\n--B--\r\n");

        let mut raw = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(&body);

        let mut reader = BufReader::new(raw.as_slice());
        let request = Request::read_from(&mut reader).await.unwrap().unwrap();
        let mut out = Vec::new();
        router.dispatch(request, reader, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("\"uploaded\":1"));

        let text = roundtrip(&router, "GET /download/f.bin HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("attachment; filename=\"f.bin\""));
        assert!(text.ends_with("payload-bytes"));
    }

    #[tokio::test]
    async fn test_dispatch_upload_without_files_is_bad_request() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        let body = b"--B\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--B--\r\n";
        let mut raw = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);

        let mut reader = BufReader::new(raw.as_slice());
        let request = Request::read_from(&mut reader).await.unwrap().unwrap();
        let mut out = Vec::new();
        router.dispatch(request, reader, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("no files"));
    }

    #[tokio::test]
    async fn test_dispatch_delete_root_forbidden() {
        let temp = TempDir::new().unwrap();
        let router = test_router(&temp);

        // "/api/item/" leaves an empty operand, which resolves to the root.
        let text = roundtrip(&router, "DELETE /api/item/ HTTP/1.1\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    }
}
