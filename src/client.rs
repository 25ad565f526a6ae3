use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::common::{
    BytesListOrError, BytesOrError, Handle, HandleOrError, PossibleError, Request, Response,
};
use crate::{KvError, Result};

/// A blocking client for the RPC server.
///
/// Each call sends one request and waits for its response, so there is at
/// most one call in flight per client. After any transport failure the
/// session is considered broken and every later call fails immediately:
/// a late response could otherwise be read as the answer to the next call.
pub struct KvsClient {
    reader: Deserializer<IoRead<TcpStream>>,
    writer: BufWriter<TcpStream>,
    stream: TcpStream,
    broken: bool,
}

impl KvsClient {
    /// Connects to the server at `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let reader_stream = stream.try_clone()?;
        let writer_stream = stream.try_clone()?;
        Ok(Self {
            reader: Deserializer::from_reader(reader_stream),
            writer: BufWriter::new(writer_stream),
            stream,
            broken: false,
        })
    }

    /// Sets a deadline for each call. `None` waits forever.
    ///
    /// A call that misses its deadline fails with a transport error.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Opens the database at `path` on the server.
    ///
    /// Opening a path that is already open returns the same handle.
    pub fn open(&mut self, path: &str) -> HandleOrError {
        let request = Request::Open {
            path: path.to_owned(),
        };
        match self.call(&request)? {
            Response::Handle(handle) => Ok(handle),
            _ => Err(KvError::UnexpectedResponse),
        }
    }

    /// Releases one `open` of `handle`.
    pub fn close(&mut self, handle: Handle) -> PossibleError {
        match self.call(&Request::Close { handle })? {
            Response::Done => Ok(()),
            _ => Err(KvError::UnexpectedResponse),
        }
    }

    /// Gets the value of `key`, or `None` if it is absent.
    pub fn get(&mut self, handle: Handle, key: &[u8]) -> BytesOrError {
        let request = Request::Get {
            handle,
            key: key.to_vec(),
        };
        match self.call(&request)? {
            Response::Value(value) => Ok(value),
            _ => Err(KvError::UnexpectedResponse),
        }
    }

    /// Sets `key` to `value`.
    pub fn put(&mut self, handle: Handle, key: &[u8], value: &[u8]) -> PossibleError {
        let request = Request::Put {
            handle,
            key: key.to_vec(),
            value: value.to_vec(),
        };
        match self.call(&request)? {
            Response::Done => Ok(()),
            _ => Err(KvError::UnexpectedResponse),
        }
    }

    /// Gets the values of `keys`, in the same order.
    pub fn multi_get(&mut self, handle: Handle, keys: &[Vec<u8>]) -> BytesListOrError {
        let request = Request::MultiGet {
            handle,
            keys: keys.to_vec(),
        };
        match self.call(&request)? {
            Response::Values(values) if values.len() == keys.len() => Ok(values),
            Response::Values(values) => Err(KvError::BatchMismatch {
                expected: keys.len(),
                actual: values.len(),
            }),
            _ => Err(KvError::UnexpectedResponse),
        }
    }

    /// Sends one request and reads its response. Server-side errors come
    /// back as `KvError::Remote`.
    fn call(&mut self, request: &Request) -> Result<Response> {
        if self.broken {
            return Err(KvError::Transport(
                "session broken by an earlier transport failure".to_owned(),
            ));
        }

        match self.exchange(request) {
            Ok(Response::Err(e)) => Err(KvError::Remote(e)),
            Ok(response) => Ok(response),
            Err(e) => {
                self.broken = true;
                Err(e)
            }
        }
    }

    fn exchange(&mut self, request: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, request)?;
        self.writer.flush()?;

        match Response::deserialize(&mut self.reader) {
            Ok(response) => Ok(response),
            Err(e) if e.is_eof() => Err(KvError::Transport(
                "connection closed by server".to_owned(),
            )),
            Err(e) if e.is_io() => Err(KvError::Io(e.into())),
            Err(e) => Err(KvError::Serde(e)),
        }
    }
}
