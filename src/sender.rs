use std::{io, sync::Arc, thread::JoinHandle};

use crossbeam_channel::{self as channel, select, Receiver};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    metric::Line,
    transport::Transport,
};

/// Diagnostic sink for failures that happen after the caller has already returned.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

pub(crate) fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &Error| debug!("Got error emitting statsd metric, was: {err}"))
}

/// Bounded FIFO of encoded lines in front of a single sender thread.
///
/// Any number of threads may [push](SubmissionQueue::push). The sender thread is the only reader,
/// and the only thing that ever touches the transport.
pub(crate) struct SubmissionQueue {
    lines: channel::Sender<Line>,
    /// One-shot: taking and dropping it disconnects the channel, which wakes the sender.
    shutdown: Mutex<Option<channel::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<io::Result<()>>>>,
}

impl SubmissionQueue {
    pub(crate) fn start<T: Transport>(
        transport: T,
        capacity: usize,
        on_error: ErrorHandler,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }
        let (lines, lines_rx) = channel::bounded(capacity);
        let (shutdown, shutdown_rx) = channel::bounded(0);
        let worker = std::thread::Builder::new()
            .name("pigeon-sender".to_string())
            .spawn(move || run(transport, lines_rx, shutdown_rx, on_error))
            .map_err(Error::Spawn)?;
        Ok(Self {
            lines,
            shutdown: Mutex::new(Some(shutdown)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Blocks while the queue is full. Fails only once the sender has exited.
    pub(crate) fn push(&self, line: Line) -> Result<()> {
        self.lines.send(line).map_err(|_| Error::Closed)
    }

    /// Stops the sender and waits for it to drain the queue and close the transport.
    /// Safe to call more than once, later calls are no-ops. Concurrent callers all wait until the
    /// sender has stopped writing.
    pub(crate) fn shutdown(&self) -> Result<()> {
        drop(self.shutdown.lock().take());
        // Held across the join so a second caller can't return while the sender still writes.
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(closed) => closed.map_err(Error::Close),
            Err(_) => Err(Error::SenderPanicked),
        }
    }
}

fn run<T: Transport>(
    mut transport: T,
    lines: Receiver<Line>,
    shutdown: Receiver<()>,
    on_error: ErrorHandler,
) -> io::Result<()> {
    debug!("Sender started");
    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => send_line(&mut transport, line, &on_error),
                // Every producer is gone.
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    let mut drained = 0usize;
    for line in lines.try_iter() {
        send_line(&mut transport, line, &on_error);
        drained += 1;
    }
    drop(lines);
    debug!("Sender stopping, drained {drained} queued lines");
    let flushed = transport.flush();
    let closed = transport.close();
    flushed.and(closed)
}

fn send_line<T: Transport>(transport: &mut T, line: Line, on_error: &ErrorHandler) {
    let sent = transport
        .write(line.as_bytes())
        .and_then(|_| transport.flush());
    match sent {
        Ok(()) => trace!(line = line.as_str(), "Sent statsd line"),
        Err(source) => on_error(&Error::Transmit {
            line: line.into_inner(),
            source,
        }),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::transport::SpyTransport;

    fn line(s: &str) -> Line {
        Line::from(s.to_string())
    }

    fn received(rx: &Receiver<Vec<u8>>) -> Vec<String> {
        rx.try_iter()
            .map(|payload| String::from_utf8(payload).unwrap())
            .collect()
    }

    /// Parks inside `write` until the test hands out a token through `gate`.
    struct GatedTransport {
        entered: channel::Sender<()>,
        gate: Receiver<()>,
        out: channel::Sender<Vec<u8>>,
    }

    impl Transport for GatedTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            let _ = self.out.send(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FlakyTransport {
        out: channel::Sender<Vec<u8>>,
    }

    impl Transport for FlakyTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.starts_with(b"bad") {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            let _ = self.out.send(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "close failed"))
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let (_rx, spy) = SpyTransport::new();
        assert!(matches!(
            SubmissionQueue::start(spy, 0, default_error_handler()),
            Err(Error::InvalidCapacity)
        ));
    }

    #[test]
    fn test_shutdown_drains_in_order() {
        let (rx, spy) = SpyTransport::new();
        let queue = SubmissionQueue::start(spy, 100, default_error_handler()).unwrap();
        let expected = (0..50).map(|i| format!("q:{i}|c")).collect::<Vec<_>>();
        for l in &expected {
            queue.push(line(l)).unwrap();
        }
        queue.shutdown().unwrap();
        assert_eq!(received(&rx), expected);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (rx, spy) = SpyTransport::new();
        let queue = SubmissionQueue::start(spy, 4, default_error_handler()).unwrap();
        queue.push(line("a:1|c")).unwrap();
        queue.shutdown().unwrap();
        queue.shutdown().unwrap();
        assert!(matches!(queue.push(line("b:1|c")), Err(Error::Closed)));
        assert_eq!(received(&rx), vec!["a:1|c".to_string()]);
    }

    #[test]
    fn test_concurrent_shutdown_waits_for_sender() {
        let (entered_tx, entered) = channel::unbounded();
        let (gate, gate_rx) = channel::unbounded();
        let (out_tx, out) = channel::unbounded();
        let transport = GatedTransport {
            entered: entered_tx,
            gate: gate_rx,
            out: out_tx,
        };
        let queue = Arc::new(SubmissionQueue::start(transport, 4, default_error_handler()).unwrap());
        queue.push(line("a")).unwrap();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        queue.push(line("b")).unwrap();

        let (done_tx, done) = channel::unbounded();
        let closers = (0..2)
            .map(|_| {
                let queue = queue.clone();
                let done_tx = done_tx.clone();
                let out = out.clone();
                std::thread::spawn(move || {
                    let closed = queue.shutdown();
                    // Whatever the sender wrote is visible by the time shutdown returns.
                    let written = out.len();
                    done_tx.send(written).unwrap();
                    closed
                })
            })
            .collect::<Vec<_>>();
        // The sender is parked in write, so neither closer may return yet.
        assert!(done.recv_timeout(Duration::from_millis(200)).is_err());

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        for closer in closers {
            closer.join().unwrap().unwrap();
        }
        let written = done.try_iter().collect::<Vec<_>>();
        assert_eq!(written, vec![2, 2]);
    }

    #[test]
    fn test_full_queue_blocks_until_drained() {
        let (entered_tx, entered) = channel::unbounded();
        let (gate, gate_rx) = channel::unbounded();
        let (out_tx, out) = channel::unbounded();
        let transport = GatedTransport {
            entered: entered_tx,
            gate: gate_rx,
            out: out_tx,
        };
        let queue = Arc::new(SubmissionQueue::start(transport, 2, default_error_handler()).unwrap());

        queue.push(line("a")).unwrap();
        // The sender holds "a" and is parked in write, so the queue itself is empty.
        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        queue.push(line("b")).unwrap();
        queue.push(line("c")).unwrap();

        let (done_tx, done) = channel::bounded(1);
        let blocked = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                queue.push(line("d")).unwrap();
                done_tx.send(()).unwrap();
            })
        };
        assert!(done.recv_timeout(Duration::from_millis(200)).is_err());

        gate.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        blocked.join().unwrap();

        for _ in 0..3 {
            gate.send(()).unwrap();
        }
        queue.shutdown().unwrap();
        let sent = received(&out);
        assert_eq!(sent, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_transmit_errors_reach_handler_and_sender_keeps_going() {
        let (out_tx, out) = channel::unbounded();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let on_error: ErrorHandler = {
            let failures = failures.clone();
            Arc::new(move |err: &Error| {
                if let Error::Transmit { line, .. } = err {
                    failures.lock().push(line.clone());
                }
            })
        };
        let queue = SubmissionQueue::start(FlakyTransport { out: out_tx }, 8, on_error).unwrap();
        queue.push(line("ok:1|c")).unwrap();
        queue.push(line("bad:2|c")).unwrap();
        queue.push(line("ok:3|c")).unwrap();

        assert!(matches!(queue.shutdown(), Err(Error::Close(_))));
        assert_eq!(received(&out), vec!["ok:1|c", "ok:3|c"]);
        assert_eq!(*failures.lock(), vec!["bad:2|c".to_string()]);
    }
}
