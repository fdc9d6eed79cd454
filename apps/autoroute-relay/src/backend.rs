//! One request/reply exchange with the autorouter over a Unix
//! `SOCK_SEQPACKET` socket.
//!
//! The exchange is a plain blocking call bounded by socket timeouts; the
//! HTTP handler runs it on the blocking pool.

use nix::errno::Errno;
use nix::sys::socket::{self, sockopt, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr};
use nix::sys::time::{TimeVal, TimeValLike};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_SOCKET_PATH: &str = "/run/vfrnav/autoroute/socket";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(15);
/// Largest reply record accepted from the autorouter.
pub const MAX_REPLY_BYTES: usize = 65536;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The autorouter had nothing to say within the receive timeout.
    #[error("no reply within the receive timeout")]
    Timeout,
    #[error("socket {stage} {}", os_message(.source))]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    fn io(stage: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| BackendError::Io { stage, source }
    }
}

/// `<strerror> (<errno>)`, the form the autoroute front end shows verbatim.
fn os_message(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => {
            let text = err.to_string();
            let suffix = format!(" (os error {code})");
            let text = text.strip_suffix(&suffix).unwrap_or(&text);
            format!("{text} ({code})")
        }
        None => format!("{err} (0)"),
    }
}

pub trait Backend: Send + Sync + 'static {
    /// Send one request record and wait for one reply record.
    fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, BackendError>;
}

#[derive(Debug, Clone)]
pub struct SeqpacketBackend {
    path: PathBuf,
    send_timeout: Duration,
    recv_timeout: Duration,
}

impl SeqpacketBackend {
    pub fn new(path: impl Into<PathBuf>, send_timeout: Duration, recv_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            send_timeout,
            recv_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for SeqpacketBackend {
    fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, BackendError> {
        let socket = sys::seqpacket_socket().map_err(BackendError::io("create"))?;
        sys::connect(&socket, &self.path).map_err(BackendError::io("connect"))?;
        sys::set_timeouts(&socket, self.send_timeout, self.recv_timeout)
            .map_err(BackendError::io("setsockopt"))?;

        sys::send_record(&socket, request).map_err(BackendError::io("send"))?;
        match sys::recv_record(&socket, MAX_REPLY_BYTES) {
            Ok(reply) => {
                debug!(path = %self.path.display(), bytes = reply.len(), "autorouter replied");
                Ok(reply)
            }
            Err(err) if is_timeout(&err) => Err(BackendError::Timeout),
            Err(err) => Err(BackendError::Io {
                stage: "recv",
                source: err,
            }),
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

pub(crate) mod sys {
    use super::*;

    pub fn seqpacket_socket() -> io::Result<OwnedFd> {
        Ok(socket::socket(
            AddressFamily::Unix,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?)
    }

    pub fn connect(socket: &OwnedFd, path: &Path) -> io::Result<()> {
        let address = UnixAddr::new(path)?;
        socket::connect(socket.as_raw_fd(), &address)?;
        Ok(())
    }

    fn timeval(timeout: Duration) -> TimeVal {
        TimeVal::microseconds(i64::try_from(timeout.as_micros()).unwrap_or(i64::MAX))
    }

    pub fn set_timeouts(socket: &OwnedFd, send: Duration, recv: Duration) -> io::Result<()> {
        socket::setsockopt(socket, sockopt::SendTimeout, &timeval(send))?;
        socket::setsockopt(socket, sockopt::ReceiveTimeout, &timeval(recv))?;
        Ok(())
    }

    pub fn send_record(socket: &OwnedFd, record: &[u8]) -> io::Result<usize> {
        loop {
            match socket::send(socket.as_raw_fd(), record, MsgFlags::MSG_EOR) {
                Err(Errno::EINTR) => continue,
                result => return Ok(result?),
            }
        }
    }

    pub fn recv_record(socket: &OwnedFd, limit: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; limit];
        loop {
            match socket::recv(socket.as_raw_fd(), &mut buffer, MsgFlags::empty()) {
                Err(Errno::EINTR) => continue,
                result => {
                    buffer.truncate(result?);
                    return Ok(buffer);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;
    use std::thread;

    /// Listening seqpacket socket at a fresh path under the temp dir.
    struct Listener {
        socket: OwnedFd,
        path: PathBuf,
    }

    impl Listener {
        fn bind(tag: &str) -> Listener {
            let path = std::env::temp_dir().join(format!(
                "autoroute-relay-{tag}-{}-{}.sock",
                std::process::id(),
                uuid::Uuid::new_v4().simple()
            ));
            let socket = sys::seqpacket_socket().unwrap();
            socket::bind(socket.as_raw_fd(), &UnixAddr::new(path.as_path()).unwrap()).unwrap();
            socket::listen(&socket, 4).unwrap();
            Listener { socket, path }
        }

        fn accept(&self) -> OwnedFd {
            let fd = socket::accept(self.socket.as_raw_fd()).unwrap();
            // SAFETY: `accept` just returned this descriptor and nothing else owns it.
            unsafe { OwnedFd::from_raw_fd(fd) }
        }
    }

    impl Drop for Listener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn backend(path: &Path, recv_timeout: Duration) -> SeqpacketBackend {
        SeqpacketBackend::new(path, DEFAULT_SEND_TIMEOUT, recv_timeout)
    }

    #[test]
    fn exchanges_one_record_each_way() {
        let listener = Listener::bind("echo");
        let backend = backend(&listener.path, Duration::from_secs(5));

        let server = thread::spawn(move || {
            let peer = listener.accept();
            let request = sys::recv_record(&peer, MAX_REPLY_BYTES).unwrap();
            sys::send_record(&peer, br#"{"cmds":{"cmdname":"pong"}}"#).unwrap();
            request
        });

        let reply = backend.exchange(br#"{"session":"s1"}"#).unwrap();
        assert_eq!(reply, br#"{"cmds":{"cmdname":"pong"}}"#);
        assert_eq!(server.join().unwrap(), br#"{"session":"s1"}"#);
    }

    #[test]
    fn silent_peer_is_a_timeout() {
        let listener = Listener::bind("silent");
        let backend = backend(&listener.path, Duration::from_millis(100));

        let server = thread::spawn(move || {
            let peer = listener.accept();
            let _ = sys::recv_record(&peer, MAX_REPLY_BYTES).unwrap();
            thread::sleep(Duration::from_millis(400));
            drop(peer);
        });

        assert!(matches!(
            backend.exchange(b"{}"),
            Err(BackendError::Timeout)
        ));
        server.join().unwrap();
    }

    #[test]
    fn missing_socket_reports_connect_stage() {
        let path = std::env::temp_dir().join(format!(
            "autoroute-relay-missing-{}.sock",
            uuid::Uuid::new_v4().simple()
        ));
        let err = backend(&path, Duration::from_secs(1))
            .exchange(b"{}")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("socket connect "), "{message}");
        assert!(message.ends_with(&format!("({})", Errno::ENOENT as i32)), "{message}");
    }

    #[test]
    fn overlong_path_fails_at_connect() {
        let path = std::env::temp_dir().join("x".repeat(200));
        match backend(&path, Duration::from_secs(1)).exchange(b"{}") {
            Err(BackendError::Io { stage, .. }) => assert_eq!(stage, "connect"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn os_message_strips_rust_suffix() {
        let err = io::Error::from_raw_os_error(Errno::EAGAIN as i32);
        let message = os_message(&err);
        assert!(message.ends_with(&format!("({})", Errno::EAGAIN as i32)));
        assert!(!message.contains("os error"));
    }
}
