//! Interrupt dispatch
//!
//! Each armed line gets two threads. The waiter blocks on the line's
//! [`EdgeSource`] and forwards matching events over a channel; the delivery
//! thread receives them and runs the user callback. A slow callback only
//! backs up its own channel, so other lines keep their latency, and events
//! of one line reach the callback in the order the kernel produced them.
//!
//! The waiter never blocks longer than the dispatcher's poll interval, which
//! bounds how long an unregister takes to be noticed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::EdgeSource;
use crate::error::{Error, Result};
use crate::gpio::{Edge, EdgeEvent};

/// User callback invoked once per delivered edge
pub type InterruptCallback = Box<dyn FnMut(&EdgeEvent, &InterruptControl) + Send + 'static>;

/// Handed to the callback so it can stop its own delivery
#[derive(Debug, Clone)]
pub struct InterruptControl {
    stop: Arc<AtomicBool>,
}

impl InterruptControl {
    /// Stop delivery after the current callback returns
    ///
    /// The only way a callback should end its own registration; it never
    /// waits on anything.
    pub fn unregister(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether delivery is still running
    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }
}

/// Spawns waiter and delivery threads for armed lines
#[derive(Debug, Clone, Copy)]
pub struct InterruptDispatcher {
    poll: Duration,
}

impl InterruptDispatcher {
    /// Create a dispatcher whose waiters wake at least every `poll`
    pub fn new(poll: Duration) -> Self {
        Self { poll }
    }

    /// Start delivering edges from `source` that match `edge`
    pub fn arm(
        &self,
        label: &str,
        edge: Edge,
        mut source: Box<dyn EdgeSource>,
        mut callback: InterruptCallback,
    ) -> Result<InterruptRegistration> {
        if edge == Edge::None {
            return Err(Error::InvalidParameter);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<EdgeEvent>();

        let control = InterruptControl { stop: stop.clone() };
        let delivery = thread::Builder::new()
            .name(format!("irq-{}-cb", label))
            .spawn(move || {
                for event in rx {
                    if !control.is_active() {
                        break;
                    }
                    callback(&event, &control);
                    if !control.is_active() {
                        break;
                    }
                }
            })
            .map_err(|e| {
                log::error!("irq: cannot spawn delivery thread for {}: {}", label, e);
                Error::IoFailure
            })?;

        let poll = self.poll;
        let waiter_stop = stop.clone();
        let waiter_label = label.to_string();
        let waiter = thread::Builder::new()
            .name(format!("irq-{}", label))
            .spawn(move || {
                while !waiter_stop.load(Ordering::SeqCst) {
                    match source.wait(poll) {
                        Ok(Some(event)) => {
                            if !edge.matches(event.kind) {
                                continue;
                            }
                            log::trace!(
                                "irq: {} {:?} edge #{} at {} ns",
                                waiter_label,
                                event.kind,
                                event.seqno,
                                event.timestamp_ns
                            );
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::error!("irq: waiting on {} failed: {}", waiter_label, e);
                            waiter_stop.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            });

        let waiter = match waiter {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("irq: cannot spawn waiter for {}: {}", label, e);
                stop.store(true, Ordering::SeqCst);
                // The delivery thread exits once its sender is gone.
                let _ = delivery.join();
                return Err(Error::IoFailure);
            }
        };

        Ok(InterruptRegistration {
            label: label.to_string(),
            stop,
            waiter: Some(waiter),
            delivery: Some(delivery),
        })
    }
}

/// A live interrupt registration
///
/// Dropping it stops delivery and waits for both threads, except when the
/// drop happens on the delivery thread itself.
pub struct InterruptRegistration {
    label: String,
    stop: Arc<AtomicBool>,
    waiter: Option<JoinHandle<()>>,
    delivery: Option<JoinHandle<()>>,
}

impl InterruptRegistration {
    /// Whether events are still being delivered
    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    /// Stop delivery and wait for the threads to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(waiter) = self.waiter.take() {
            if waiter.join().is_err() {
                log::warn!("irq: waiter for {} panicked", self.label);
            }
        }

        if let Some(delivery) = self.delivery.take() {
            if delivery.thread().id() == thread::current().id() {
                // Unregistering from inside the callback; the thread
                // finishes on its own once the callback returns.
                return;
            }
            if delivery.join().is_err() {
                log::warn!("irq: callback for {} panicked", self.label);
            }
        }
        log::trace!("irq: {} stopped", self.label);
    }
}

impl Drop for InterruptRegistration {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for InterruptRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptRegistration")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::EdgeKind;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    struct ChannelSource {
        rx: mpsc::Receiver<Result<EdgeEvent>>,
    }

    impl EdgeSource for ChannelSource {
        fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>> {
            match self.rx.recv_timeout(timeout) {
                Ok(event) => event.map(Some),
                Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    thread::sleep(timeout);
                    Ok(None)
                }
            }
        }
    }

    fn source() -> (mpsc::Sender<Result<EdgeEvent>>, Box<dyn EdgeSource>) {
        let (tx, rx) = mpsc::channel();
        (tx, Box::new(ChannelSource { rx }))
    }

    fn event(seqno: u64, kind: EdgeKind) -> EdgeEvent {
        EdgeEvent {
            kind,
            timestamp_ns: seqno * 1000,
            seqno,
        }
    }

    fn alternating(seqno: u64) -> EdgeEvent {
        let kind = if seqno % 2 == 1 {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        };
        event(seqno, kind)
    }

    fn dispatcher() -> InterruptDispatcher {
        InterruptDispatcher::new(Duration::from_millis(10))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn delivers_every_event_in_order() {
        let (tx, src) = source();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reg = dispatcher()
            .arm(
                "t0",
                Edge::Both,
                src,
                Box::new(move |e, _| sink.lock().unwrap().push(e.seqno)),
            )
            .unwrap();

        for n in 1..=50 {
            tx.send(Ok(alternating(n))).unwrap();
        }
        assert!(wait_for(|| seen.lock().unwrap().len() == 50));
        reg.stop();
        assert_eq!(*seen.lock().unwrap(), (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn filters_by_edge() {
        let (tx, src) = source();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let reg = dispatcher()
            .arm(
                "t1",
                Edge::Falling,
                src,
                Box::new(move |e, _| {
                    assert_eq!(e.kind, EdgeKind::Falling);
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        for n in 1..=10 {
            tx.send(Ok(alternating(n))).unwrap();
        }
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 5));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        drop(reg);
    }

    #[test]
    fn callback_can_unregister_itself() {
        let (tx, src) = source();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let reg = dispatcher()
            .arm(
                "t2",
                Edge::Both,
                src,
                Box::new(move |_, control| {
                    if c.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        control.unregister();
                    }
                }),
            )
            .unwrap();

        for n in 1..=10 {
            tx.send(Ok(alternating(n))).unwrap();
        }
        assert!(wait_for(|| !reg.is_active()));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        reg.stop();
    }

    #[test]
    fn dropping_registration_inside_callback_does_not_deadlock() {
        let (tx, src) = source();
        let slot: Arc<Mutex<Option<InterruptRegistration>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();

        let reg = dispatcher()
            .arm(
                "t3",
                Edge::Both,
                src,
                Box::new(move |_, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                    if let Some(reg) = inner.lock().unwrap().take() {
                        reg.stop();
                    }
                }),
            )
            .unwrap();
        *slot.lock().unwrap() = Some(reg);

        tx.send(Ok(alternating(1))).unwrap();
        tx.send(Ok(alternating(2))).unwrap();
        assert!(wait_for(|| slot.lock().unwrap().is_none()));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_prompt_without_events() {
        let (_tx, src) = source();
        let reg = dispatcher()
            .arm("t4", Edge::Both, src, Box::new(|_, _| {}))
            .unwrap();
        let start = Instant::now();
        reg.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn source_error_ends_delivery() {
        let (tx, src) = source();
        let reg = dispatcher()
            .arm("t5", Edge::Both, src, Box::new(|_, _| {}))
            .unwrap();
        tx.send(Err(Error::IoFailure)).unwrap();
        assert!(wait_for(|| !reg.is_active()));
    }

    #[test]
    fn edge_none_is_rejected() {
        let (_tx, src) = source();
        assert_eq!(
            dispatcher()
                .arm("t6", Edge::None, src, Box::new(|_, _| {}))
                .unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn slow_callback_does_not_delay_other_lines() {
        let (slow_tx, slow_src) = source();
        let (fast_tx, fast_src) = source();
        let fast_seen = Arc::new(AtomicUsize::new(0));
        let f = fast_seen.clone();

        let slow = dispatcher()
            .arm(
                "slow",
                Edge::Both,
                slow_src,
                Box::new(|_, _| thread::sleep(Duration::from_millis(300))),
            )
            .unwrap();
        let fast = dispatcher()
            .arm(
                "fast",
                Edge::Both,
                fast_src,
                Box::new(move |_, _| {
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        slow_tx.send(Ok(alternating(1))).unwrap();
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        fast_tx.send(Ok(alternating(1))).unwrap();
        assert!(wait_for(|| fast_seen.load(Ordering::SeqCst) == 1));
        assert!(start.elapsed() < Duration::from_millis(250));

        fast.stop();
        slow.stop();
    }
}
