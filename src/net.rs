//! Blocking socket layer.
use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::common::verbose;

/// The underlying transport, one OS socket per attachment.
#[derive(Debug)]
pub enum Socket {
    Tcp(TcpStream),
    #[cfg(test)]
    Mock(mock::MockSocket),
}

impl Socket {
    /// Open a TCP connection to `host:port`.
    ///
    /// A zero `timeout` connects without a deadline.
    pub fn connect(host: &str, port: u16, timeout: u32) -> io::Result<Socket> {
        verbose!("connecting to {host}:{port}");
        let stream = if timeout == 0 {
            TcpStream::connect((host, port))?
        } else {
            let mut addrs = (host, port).to_socket_addrs()?;
            let addr = addrs.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "hostname did not resolve")
            })?;
            TcpStream::connect_timeout(&addr, Duration::from_secs(timeout as u64))?
        };
        stream.set_nodelay(true)?;
        Ok(Socket::Tcp(stream))
    }

    /// Clone a handle to the same socket, used to shut it down from
    /// another thread.
    pub fn try_clone(&self) -> io::Result<Socket> {
        match self {
            Socket::Tcp(s) => Ok(Socket::Tcp(s.try_clone()?)),
            #[cfg(test)]
            Socket::Mock(s) => Ok(Socket::Mock(s.clone())),
        }
    }

    /// Shut down both directions, unblocking any pending read.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(test)]
            Socket::Mock(s) => s.shutdown(),
        }
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.read(buf),
            #[cfg(test)]
            Socket::Mock(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.write(buf),
            #[cfg(test)]
            Socket::Mock(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.flush(),
            #[cfg(test)]
            Socket::Mock(s) => s.flush(),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory socket for protocol tests.
    use std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::Arc,
        time::Duration,
    };

    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Inner {
        input: VecDeque<u8>,
        output: Vec<u8>,
        read_delay: Option<Duration>,
        down: bool,
    }

    /// In-memory socket fed with a reply script, recording every write.
    #[derive(Debug, Clone, Default)]
    pub struct MockSocket {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockSocket {
        pub fn new() -> Self {
            Self::default()
        }

        /// Append server reply bytes to the read script.
        pub fn push_input(&self, bytes: &[u8]) {
            self.inner.lock().input.extend(bytes);
        }

        /// Sleep this long inside every read, to widen race windows.
        pub fn set_read_delay(&self, delay: Duration) {
            self.inner.lock().read_delay = Some(delay);
        }

        /// Everything written so far.
        pub fn written(&self) -> Vec<u8> {
            self.inner.lock().output.clone()
        }

        pub fn shutdown(&self) -> io::Result<()> {
            self.inner.lock().down = true;
            Ok(())
        }

        pub(super) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let delay = self.inner.lock().read_delay;
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            let mut inner = self.inner.lock();
            if inner.down {
                return Ok(0);
            }
            if inner.input.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"));
            }
            let n = buf.len().min(inner.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inner.input.pop_front().unwrap();
            }
            Ok(n)
        }

        pub(super) fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.lock().output.extend_from_slice(buf);
            Ok(buf.len())
        }

        pub(super) fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
