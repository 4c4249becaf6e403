//! Byte stream abstraction used by the acquisition path, and the
//! deadline-bounded reader built on top of it.
//!
//! Serial links deliver a response in bursts, so a single `read` call
//! regularly returns only part of a frame. [`read_exact`] keeps polling the
//! stream until the whole frame has arrived or its deadline has passed.
use log::*;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Pause between two polls of an idle stream.
pub const IDLE_STEP: Duration = Duration::from_millis(1);

/// A duplex, serial-like byte stream to the probe.
pub trait SensorTransport {
    /// Drops any bytes already queued on the receive side.
    fn discard_input(&mut self) -> io::Result<()>;

    /// Sends a complete frame.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Reads whatever is available without waiting for more, at most `buf.len()` bytes.
    ///
    /// `Ok(0)` means nothing is available right now.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: SensorTransport + ?Sized> SensorTransport for Box<T> {
    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }
}

/// Opens transports on demand.
///
/// The polling daemon reconnects through this after a connection failure.
pub trait Connector {
    type Transport: SensorTransport;

    fn connect(&mut self) -> io::Result<Self::Transport>;
}

impl<F, T> Connector for F
where
    F: FnMut() -> io::Result<T>,
    T: SensorTransport,
{
    type Transport = T;

    fn connect(&mut self) -> io::Result<T> {
        self()
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Reads exactly `n` bytes from `stream` before `timeout` elapses.
///
/// Returns `None` if the deadline passes first or the stream fails; bytes
/// collected up to that point are dropped, a short read is never returned.
pub fn read_exact<T: SensorTransport + ?Sized>(
    stream: &mut T,
    n: usize,
    timeout: Duration,
) -> Option<Vec<u8>> {
    match try_read_exact(stream, n, timeout) {
        Ok(frame) => frame,
        Err(err) => {
            debug!("Read aborted: {err}");
            None
        }
    }
}

/// Like [`read_exact`], but keeps stream failures apart from timeouts.
///
/// `Ok(None)` means the deadline passed; `Err` means the stream itself failed
/// with something other than an idle condition.
pub fn try_read_exact<T: SensorTransport + ?Sized>(
    stream: &mut T,
    n: usize,
    timeout: Duration,
) -> io::Result<Option<Vec<u8>>> {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::with_capacity(n);
    let mut buf = vec![0u8; n];

    while out.len() < n {
        if Instant::now() >= deadline {
            trace!("Deadline passed with {} of {n} bytes", out.len());
            return Ok(None);
        }
        let wanted = n - out.len();
        match stream.read_available(&mut buf[..wanted]) {
            Ok(0) => thread::sleep(IDLE_STEP),
            Ok(count) => out.extend_from_slice(&buf[..count.min(wanted)]),
            Err(err) if is_idle(&err) => thread::sleep(IDLE_STEP),
            Err(err) => return Err(err),
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Delivers scripted chunks, each no earlier than its offset from the first poll.
    pub(crate) struct TimedStream {
        chunks: VecDeque<(Duration, Vec<u8>)>,
        pending: VecDeque<u8>,
        started: Option<Instant>,
    }

    impl TimedStream {
        pub(crate) fn new(chunks: Vec<(Duration, Vec<u8>)>) -> Self {
            Self {
                chunks: chunks.into(),
                pending: VecDeque::new(),
                started: None,
            }
        }
    }

    impl SensorTransport for TimedStream {
        fn discard_input(&mut self) -> io::Result<()> {
            self.pending.clear();
            Ok(())
        }

        fn write_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let started = *self.started.get_or_insert_with(Instant::now);
            while let Some((at, _)) = self.chunks.front() {
                if started.elapsed() < *at {
                    break;
                }
                if let Some((_, chunk)) = self.chunks.pop_front() {
                    self.pending.extend(chunk);
                }
            }
            if self.pending.is_empty() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let count = buf.len().min(self.pending.len());
            for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
                *slot = byte;
            }
            Ok(count)
        }
    }

    struct BrokenStream;

    impl SensorTransport for BrokenStream {
        fn discard_input(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn write_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_available(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn bytes(range: std::ops::Range<u8>) -> Vec<u8> {
        range.collect()
    }

    #[test]
    fn assembles_chunks() {
        let mut stream = TimedStream::new(vec![
            (Duration::ZERO, bytes(0..7)),
            (Duration::from_millis(40), bytes(7..14)),
            (Duration::from_millis(80), bytes(14..19)),
        ]);
        let frame = read_exact(&mut stream, 19, Duration::from_millis(300));
        assert_eq!(frame, Some(bytes(0..19)));
    }

    #[test]
    fn short_read_is_no_read() {
        let mut stream = TimedStream::new(vec![
            (Duration::ZERO, bytes(0..4)),
            (Duration::from_millis(20), bytes(4..10)),
        ]);
        let started = Instant::now();
        assert_eq!(read_exact(&mut stream, 19, Duration::from_millis(300)), None);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn never_reads_past_n() {
        let mut stream = TimedStream::new(vec![(Duration::ZERO, bytes(0..25))]);
        assert_eq!(
            read_exact(&mut stream, 19, Duration::from_millis(100)),
            Some(bytes(0..19))
        );
        assert_eq!(stream.pending.len(), 6);
    }

    #[test]
    fn silent_stream_respects_deadline() {
        let mut stream = TimedStream::new(Vec::new());
        let started = Instant::now();
        assert_eq!(read_exact(&mut stream, 19, Duration::from_millis(50)), None);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn stream_error_aborts() {
        assert_eq!(
            read_exact(&mut BrokenStream, 19, Duration::from_secs(5)),
            None
        );
    }

    #[test]
    fn stream_error_is_reported() {
        let err = try_read_exact(&mut BrokenStream, 19, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let mut stream = TimedStream::new(Vec::new());
        assert!(matches!(
            try_read_exact(&mut stream, 19, Duration::from_millis(20)),
            Ok(None)
        ));
    }

    #[test]
    fn zero_length_read() {
        let mut stream = TimedStream::new(Vec::new());
        assert_eq!(read_exact(&mut stream, 0, Duration::ZERO), Some(Vec::new()));
    }
}
