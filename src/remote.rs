//! Client side of the agent's TCP remote-control protocol.
//!
//! Every call opens its own connection, sends a header plus one dump
//! command and reads the agent's answer up to the command acknowledgement.
//! The connection is shut down when the call returns, whatever the outcome.

use std::io::{self, BufReader, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{CoverageError, Result};
use crate::execdata::{Block, ExecDataReader, ExecDataWriter, ReadError};

pub struct RemoteClient {
    address: String,
    timeout: Option<Duration>,
}

impl RemoteClient {
    /// `address` is `host:port`.
    pub fn new(address: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dumps the agent's execution data. The returned bytes are a complete
    /// execution-data stream ending with the acknowledgement block.
    pub fn fetch(&self, reset: bool) -> Result<Vec<u8>> {
        let data = self.execute(true, reset)?;
        debug!("Received {} bytes of execution data from {}", data.len(), self.address);
        Ok(data)
    }

    pub fn reset(&self) -> Result<()> {
        self.execute(false, true).map(|_| ())
    }

    fn execute(&self, dump: bool, reset: bool) -> Result<Vec<u8>> {
        let mut connection = Connection::open(&self.address, self.timeout)?;
        connection.send_command(dump, reset)?;
        connection.read_response()
    }
}

/// An open agent connection. Dropping it shuts the socket down.
struct Connection {
    stream: TcpStream,
    address: String,
}

impl Connection {
    fn open(address: &str, timeout: Option<Duration>) -> Result<Self> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| CoverageError::connection(address, e))?
            .collect();

        let mut last_error = None;
        for addr in &addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream
                        .set_read_timeout(timeout)
                        .and_then(|_| stream.set_write_timeout(timeout))
                        .map_err(|e| CoverageError::connection(address, e))?;
                    trace!("Connected to {} ({})", address, addr);
                    return Ok(Self {
                        stream,
                        address: address.to_string(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => CoverageError::connection(address, e),
            None => CoverageError::connection(address, "address resolved to nothing"),
        })
    }

    fn send_command(&mut self, dump: bool, reset: bool) -> Result<()> {
        let mut writer = ExecDataWriter::new(&self.stream)
            .map_err(|e| CoverageError::connection(&self.address, e))?;
        writer
            .write_dump_command(dump, reset)
            .and_then(|_| writer.flush())
            .map_err(|e| CoverageError::connection(&self.address, e))
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let capture = Capture::new(BufReader::new(&self.stream));
        let mut reader = ExecDataReader::new(capture);

        loop {
            match reader.next_block() {
                Ok(Some(Block::CommandOk)) => break,
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Err(CoverageError::connection(
                        &self.address,
                        "connection closed before command acknowledgement",
                    ))
                }
                Err(ReadError::Format(msg)) => return Err(CoverageError::Decode(msg)),
                Err(e) => return Err(CoverageError::connection(&self.address, e)),
            }
        }

        Ok(reader.into_inner().into_bytes())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Peer may already be gone.
        let _ = self.stream.shutdown(Shutdown::Both);
        trace!("Connection to {} closed", self.address);
    }
}

/// Reader that keeps a copy of every byte handed out.
struct Capture<R> {
    inner: R,
    bytes: Vec<u8>,
}

impl<R: Read> Capture<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Vec::new(),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl<R: Read> Read for Capture<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}
