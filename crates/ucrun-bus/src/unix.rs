// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Unix socket transport
//!
//! Frames are JSON objects, one per line, tagged by `op`. The client sends
//! `add_object` once per connection, then answers each `call` frame with an
//! optional `data` frame followed by exactly one `status` frame.

use crate::attr::Table;
use crate::error::Result;
use crate::message::{ObjectSpec, Reply, Request, RequestId, Status};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Frames written by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Publish an object
    AddObject {
        /// Object name
        object: String,
        /// Exported methods
        methods: Vec<String>,
    },
    /// Reply payload for a call
    Data {
        /// Call being answered
        id: RequestId,
        /// Payload
        data: Table,
    },
    /// Final status for a call
    Status {
        /// Call being answered
        id: RequestId,
        /// Outcome
        status: Status,
    },
}

/// Frames written by the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Inbound method call
    Call {
        /// Correlation id
        id: RequestId,
        /// Target object
        object: String,
        /// Method name
        method: String,
        /// Call payload
        #[serde(default)]
        data: Option<Table>,
    },
}

/// Transport reaching the bus daemon through a unix socket
#[derive(Debug, Clone)]
pub struct UnixTransport {
    path: PathBuf,
}

impl UnixTransport {
    /// Transport for the socket at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let stream = UnixStream::connect(&self.path).await?;
        let (read, write) = stream.into_split();
        Ok(Box::new(UnixConnection {
            lines: BufReader::new(read).lines(),
            writer: write,
        }))
    }
}

struct UnixConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl UnixConnection {
    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for UnixConnection {
    async fn add_object(&mut self, object: &ObjectSpec) -> Result<()> {
        self.send(&ClientFrame::AddObject {
            object: object.name.clone(),
            methods: object.methods.clone(),
        })
        .await
    }

    async fn recv(&mut self) -> Result<Option<Request>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }

            let ServerFrame::Call {
                id,
                object,
                method,
                data,
            } = serde_json::from_str(&line)?;
            return Ok(Some(Request {
                id,
                object,
                method,
                data,
            }));
        }
    }

    async fn reply(&mut self, reply: Reply) -> Result<()> {
        if let Some(data) = reply.data {
            self.send(&ClientFrame::Data { id: reply.id, data }).await?;
        }
        self.send(&ClientFrame::Status {
            id: reply.id,
            status: reply.status,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[test]
    fn test_frame_encoding() {
        let frame = ClientFrame::Status {
            id: 4,
            status: Status::MethodNotFound,
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"op":"status","id":4,"status":"method_not_found"}"#
        );

        let call: ServerFrame =
            serde_json::from_str(r#"{"op":"call","id":1,"object":"o","method":"m"}"#).unwrap();
        assert_eq!(
            call,
            ServerFrame::Call {
                id: 1,
                object: "o".to_string(),
                method: "m".to_string(),
                data: None,
            }
        );
    }

    #[tokio::test]
    async fn test_socket_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            let hello: ClientFrame =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(
                hello,
                ClientFrame::AddObject {
                    object: "demo".to_string(),
                    methods: vec!["ping".to_string()],
                }
            );

            write
                .write_all(b"{\"op\":\"call\",\"id\":9,\"object\":\"demo\",\"method\":\"ping\"}\n")
                .await
                .unwrap();

            let mut frames = Vec::new();
            for _ in 0..2 {
                let line = lines.next_line().await.unwrap().unwrap();
                frames.push(serde_json::from_str::<ClientFrame>(&line).unwrap());
            }
            frames
        });

        let transport = UnixTransport::new(&path);
        let mut conn = transport.connect().await.unwrap();
        conn.add_object(&ObjectSpec {
            name: "demo".to_string(),
            methods: vec!["ping".to_string()],
        })
        .await
        .unwrap();

        let request = conn.recv().await.unwrap().unwrap();
        assert_eq!(request.id, 9);
        assert_eq!(request.method, "ping");

        conn.reply(Reply {
            id: 9,
            status: Status::Ok,
            data: Some(Table::new().with("pong", 1)),
        })
        .await
        .unwrap();

        let frames = server.await.unwrap();
        assert_eq!(
            frames,
            vec![
                ClientFrame::Data {
                    id: 9,
                    data: Table::new().with("pong", 1),
                },
                ClientFrame::Status {
                    id: 9,
                    status: Status::Ok,
                },
            ]
        );

        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UnixTransport::new(dir.path().join("missing.sock"));
        assert!(transport.connect().await.is_err());
    }
}
