//! # MessageConn — the framed connection handler
//!
//! Wraps one [`Channel`] and speaks the length-prefixed frame protocol on
//! top of it:
//!
//! - **Send path**: `send_message` packs a frame and pushes it on a
//!   lock-free outbox; the empty→non-empty transition arms write interest.
//!   `on_write_ready` drains the outbox, carrying partial progress across
//!   would-block results, and disarms write interest once idle so idle
//!   connections are not polled for writability.
//! - **Receive path**: a header/body state machine with a cursor,
//!   reassembling frames across arbitrarily fragmented reads. A bad
//!   signature or an out-of-bounds length is a protocol violation that
//!   kills the connection.
//! - **Error path**: runs once — unregister everywhere, flush failure
//!   hooks for undelivered frames, close the socket, fire the error
//!   callback. Nothing is re-armed afterwards.
//!
//! Callbacks run under the busy-flag discipline, so none of the state here
//! needs more than the locks uncontended workers take in turn. The outbox
//! is the exception: arbitrary caller threads push to it via
//! `send_message`, which is why it is a concurrent queue rather than a
//! field behind the receive lock.

use std::net::Ipv4Addr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crossbeam_queue::SegQueue;

use wiremux_core::error::{EngineError, EngineResult};
use wiremux_core::frame::{self, HEADER_LEN};
use wiremux_core::interest::Interest;
use wiremux_core::status::IoStatus;
use wiremux_core::{wm_debug, wm_warn};

use crate::channel::Channel;
use crate::handler::{BusyFlag, EventHandler, HandlerRef};
use crate::registry::Registry;

/// Callback receiving each complete incoming payload. Shared so it can be
/// invoked outside the slot's lock; a callback may replace itself.
pub type MessageCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback fired once when the connection dies.
pub type ErrorCallback = Box<dyn Fn() + Send + Sync>;

/// Per-message completion/failure hook.
pub type SendHook = Box<dyn FnOnce() + Send>;

/// One packed frame queued for sending.
struct OutFrame {
    bytes: Vec<u8>,
    sent: usize,
    on_sent: Option<SendHook>,
    on_failed: Option<SendHook>,
}

#[derive(PartialEq, Eq)]
enum RecvPhase {
    AwaitingHeader,
    AwaitingBody,
}

struct RecvState {
    phase: RecvPhase,
    header: [u8; HEADER_LEN],
    body: Vec<u8>,
    cursor: usize,
}

impl RecvState {
    fn new() -> Self {
        Self {
            phase: RecvPhase::AwaitingHeader,
            header: [0u8; HEADER_LEN],
            body: Vec::new(),
            cursor: 0,
        }
    }

    fn reset(&mut self) {
        self.phase = RecvPhase::AwaitingHeader;
        self.cursor = 0;
        self.body = Vec::new();
    }
}

/// A message-framed TCP connection.
pub struct MessageConn {
    channel: Channel,
    registry: Arc<Registry>,
    busy: BusyFlag,
    weak_self: Weak<MessageConn>,

    outbox: SegQueue<OutFrame>,
    /// Frames pushed but not yet fully sent; the 0→1 edge arms write interest.
    queued: AtomicUsize,
    /// Frame mid-send, if any. Only callbacks touch it (busy discipline).
    current: Mutex<Option<OutFrame>>,

    recv: Mutex<RecvState>,

    on_message: Mutex<Option<MessageCallback>>,
    on_error_cb: Mutex<Option<ErrorCallback>>,
    errored: AtomicBool,
}

impl MessageConn {
    /// Wrap an established channel. Set the callbacks, then call
    /// [`register`](Self::register) to start receiving.
    pub fn new(channel: Channel, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            channel,
            registry,
            busy: BusyFlag::new(),
            weak_self: weak.clone(),
            outbox: SegQueue::new(),
            queued: AtomicUsize::new(0),
            current: Mutex::new(None),
            recv: Mutex::new(RecvState::new()),
            on_message: Mutex::new(None),
            on_error_cb: Mutex::new(None),
            errored: AtomicBool::new(false),
        })
    }

    /// Dial `addr:port` and wrap the resulting channel.
    pub fn connect(addr: Ipv4Addr, port: u16, registry: Arc<Registry>) -> EngineResult<Arc<Self>> {
        let channel = Channel::connect(addr, port)?;
        Ok(Self::new(channel, registry))
    }

    /// Install the payload callback.
    pub fn set_on_message(&self, cb: impl Fn(&[u8]) + Send + Sync + 'static) {
        *self.on_message.lock().unwrap() = Some(Arc::new(cb));
    }

    /// Install the connection-error callback. It fires at most once.
    pub fn set_on_error(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.on_error_cb.lock().unwrap() = Some(Box::new(cb));
    }

    /// Arm the handler for read + error readiness.
    pub fn register(self: &Arc<Self>) {
        let href: HandlerRef = self.clone();
        self.registry.register(&href, Interest::READ | Interest::ERROR);
    }

    /// Queue `payload` for delivery. Never blocks: the frame goes on the
    /// outbox and the readiness loop drains it. Frames leave in FIFO order
    /// per connection. `on_sent` fires when the last byte is handed to the
    /// OS; `on_failed` fires if the connection dies first.
    pub fn send_message(
        &self,
        payload: &[u8],
        on_sent: Option<SendHook>,
        on_failed: Option<SendHook>,
    ) -> EngineResult<()> {
        if self.errored.load(Ordering::Acquire) {
            return Err(EngineError::ConnectionDown);
        }
        let bytes = frame::pack(payload)?;
        self.outbox.push(OutFrame {
            bytes,
            sent: 0,
            on_sent,
            on_failed,
        });
        if self.queued.fetch_add(1, Ordering::SeqCst) == 0 {
            self.arm_write();
        }
        // fail() may have run to completion between the errored check and
        // the push; its hook flush would then have missed this frame. The
        // drain below may also resolve frames from concurrent senders —
        // each popped frame fires its on_failed exactly once either way.
        if self.errored.load(Ordering::Acquire) {
            while let Some(mut frame) = self.outbox.pop() {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                if let Some(cb) = frame.on_failed.take() {
                    cb();
                }
            }
            return Err(EngineError::ConnectionDown);
        }
        Ok(())
    }

    /// True after the error path ran.
    pub fn is_down(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Frames queued or mid-send.
    pub fn unsent_frames(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    fn arm_write(&self) {
        if let Some(me) = self.weak_self.upgrade() {
            let href: HandlerRef = me;
            self.registry.register(&href, Interest::WRITE | Interest::ERROR);
        }
    }

    fn deliver(&self, payload: &[u8]) {
        // Clone the callback out so it runs unlocked; it may call
        // set_on_message on this very connection.
        let cb = self.on_message.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(payload);
        }
    }

    /// The once-only error path: unregister, flush failure hooks, close,
    /// notify.
    fn fail(&self) {
        if self.errored.swap(true, Ordering::AcqRel) {
            return;
        }
        let fd = self.channel.fd();
        if fd >= 0 {
            self.registry.unregister_all(fd);
        }
        wm_debug!("conn fd={}: entering error handling", fd);

        if let Some(mut frame) = self.current.lock().unwrap().take() {
            if let Some(cb) = frame.on_failed.take() {
                cb();
            }
        }
        while let Some(mut frame) = self.outbox.pop() {
            if let Some(cb) = frame.on_failed.take() {
                cb();
            }
        }

        self.channel.close();

        // Take the callback out before invoking: it fires at most once,
        // and it must be free to touch this connection itself.
        let cb = self.on_error_cb.lock().unwrap().take();
        if let Some(cb) = cb {
            cb();
        }
    }
}

impl EventHandler for MessageConn {
    fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    fn busy(&self) -> &BusyFlag {
        &self.busy
    }

    fn on_read_ready(&self) {
        if self.errored.load(Ordering::Acquire) {
            return;
        }

        let mut failed = false;
        {
            let mut st = self.recv.lock().unwrap();
            loop {
                match st.phase {
                    RecvPhase::AwaitingHeader => {
                        let cursor = st.cursor;
                        let status = self.channel.receive(&mut st.header[cursor..HEADER_LEN]);
                        match status {
                            IoStatus::Success(n) => {
                                st.cursor += n;
                                if st.cursor < HEADER_LEN {
                                    continue;
                                }
                                match frame::parse_header(&st.header) {
                                    Ok(0) => {
                                        // Header-only frame: deliver the empty payload.
                                        st.reset();
                                        self.deliver(&[]);
                                    }
                                    Ok(body_len) => {
                                        st.phase = RecvPhase::AwaitingBody;
                                        st.body = vec![0u8; body_len];
                                        st.cursor = 0;
                                    }
                                    Err(e) => {
                                        wm_warn!("conn fd={}: {}", self.channel.fd(), e);
                                        failed = true;
                                        break;
                                    }
                                }
                            }
                            IoStatus::WouldBlock(_) => break,
                            status => {
                                if status != IoStatus::RemoteClosed {
                                    wm_warn!("conn fd={}: receive: {}", self.channel.fd(), status);
                                }
                                failed = true;
                                break;
                            }
                        }
                    }
                    RecvPhase::AwaitingBody => {
                        let cursor = st.cursor;
                        let status = self.channel.receive(&mut st.body[cursor..]);
                        match status {
                            IoStatus::Success(n) => {
                                st.cursor += n;
                                if st.cursor == st.body.len() {
                                    let payload = std::mem::take(&mut st.body);
                                    st.reset();
                                    self.deliver(&payload);
                                }
                            }
                            IoStatus::WouldBlock(_) => break,
                            status => {
                                if status != IoStatus::RemoteClosed {
                                    wm_warn!("conn fd={}: receive: {}", self.channel.fd(), status);
                                }
                                failed = true;
                                break;
                            }
                        }
                    }
                }
            }
        }

        if failed {
            self.fail();
        }
    }

    fn on_write_ready(&self) {
        if self.errored.load(Ordering::Acquire) {
            return;
        }

        loop {
            let mut cur = self.current.lock().unwrap();
            if cur.is_none() {
                *cur = self.outbox.pop();
            }
            let Some(frame) = cur.as_mut() else {
                drop(cur);
                // Fully drained: idle connections are not polled for
                // writability.
                let fd = self.channel.fd();
                if fd >= 0 {
                    self.registry.unregister(fd, Interest::WRITE);
                    // A sender may have pushed between the drain check and
                    // the unregister.
                    if !self.outbox.is_empty() {
                        self.arm_write();
                    }
                }
                return;
            };

            match self.channel.send(&frame.bytes[frame.sent..]) {
                IoStatus::Success(_) => {
                    let mut done = cur.take().unwrap();
                    drop(cur);
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    if let Some(cb) = done.on_sent.take() {
                        cb();
                    }
                }
                IoStatus::WouldBlock(n) => {
                    // Partial progress; resume from here next write cycle.
                    frame.sent += n;
                    return;
                }
                status => {
                    wm_warn!("conn fd={}: send: {}", self.channel.fd(), status);
                    let mut done = cur.take().unwrap();
                    drop(cur);
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    if let Some(cb) = done.on_failed.take() {
                        cb();
                    }
                    self.fail();
                    return;
                }
            }
        }
    }

    fn on_error(&self) {
        self.fail();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn loopback_pair() -> (TcpStream, Channel) {
        let listener = Channel::bind_listen(0).unwrap();
        let port = listener.local_port().unwrap();
        let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(ch) = listener.accept().unwrap() {
                return (client, ch);
            }
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn collector(conn: &Arc<MessageConn>) -> Arc<Mutex<Vec<Vec<u8>>>> {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        conn.set_on_message(move |payload| sink.lock().unwrap().push(payload.to_vec()));
        messages
    }

    /// Pump the read callback until the wire goes quiet.
    fn pump_reads(conn: &Arc<MessageConn>) {
        for _ in 0..200 {
            conn.on_read_ready();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_whole_frame_delivery() {
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);
        let messages = collector(&conn);

        client.write_all(&frame::pack(b"hello").unwrap()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        conn.on_read_ready();

        assert_eq!(messages.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
    }

    #[test]
    fn test_fragmented_frames_reassemble_in_order() {
        // 10 frames fed one byte at a time across many read callbacks must
        // come out exactly like one unfragmented read would.
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);
        let messages = collector(&conn);

        let mut wire = Vec::new();
        let mut expect = Vec::new();
        for i in 0..10u8 {
            let payload = vec![i; (i as usize % 3) + 1];
            wire.extend_from_slice(&frame::pack(&payload).unwrap());
            expect.push(payload);
        }

        for byte in wire {
            client.write_all(&[byte]).unwrap();
            client.flush().unwrap();
            std::thread::sleep(Duration::from_micros(300));
            conn.on_read_ready();
        }
        pump_reads(&conn);

        assert_eq!(*messages.lock().unwrap(), expect);
        assert!(!conn.is_down());
    }

    #[test]
    fn test_zero_length_payload() {
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);
        let messages = collector(&conn);

        client.write_all(&frame::pack(b"").unwrap()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        conn.on_read_ready();

        assert_eq!(messages.lock().unwrap().as_slice(), &[Vec::<u8>::new()]);
    }

    #[test]
    fn test_send_path_fifo_on_wire() {
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry.clone());

        for i in 0..5u8 {
            conn.send_message(&[i; 4], None, None).unwrap();
        }
        // Queueing armed write interest.
        assert!(registry.is_registered(conn.fd()));

        // Act as the worker draining the outbox.
        while conn.unsent_frames() > 0 {
            conn.on_write_ready();
        }

        let mut wire = vec![0u8; 5 * (HEADER_LEN + 4)];
        client.read_exact(&mut wire).unwrap();
        for i in 0..5u8 {
            let at = i as usize * (HEADER_LEN + 4);
            let mut header = [0u8; HEADER_LEN];
            header.copy_from_slice(&wire[at..at + HEADER_LEN]);
            assert_eq!(frame::parse_header(&header).unwrap(), 4);
            assert_eq!(&wire[at + HEADER_LEN..at + HEADER_LEN + 4], &[i; 4]);
        }

        // Drained: write interest disarmed.
        conn.on_write_ready();
        assert!(!registry.write_set().contains(conn.fd()));
    }

    #[test]
    fn test_sent_hooks_fire_in_order() {
        let registry = Arc::new(Registry::new());
        let (_client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            conn.send_message(
                b"m",
                Some(Box::new(move || order.lock().unwrap().push(i))),
                None,
            )
            .unwrap();
        }
        while conn.unsent_frames() > 0 {
            conn.on_write_ready();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_partial_header_then_close_errors_once() {
        // Peer dies after 2 of 5 header bytes: the error callback fires
        // exactly once and no payload callback ever runs.
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry.clone());
        let messages = collector(&conn);

        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        conn.set_on_error(move || {
            e.fetch_add(1, Ordering::SeqCst);
        });
        conn.register();
        let fd = conn.fd();

        let full = frame::pack(b"never arrives").unwrap();
        client.write_all(&full[..2]).unwrap();
        drop(client);

        std::thread::sleep(Duration::from_millis(20));
        conn.on_read_ready();
        conn.on_read_ready();
        conn.on_error();

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(messages.lock().unwrap().is_empty());
        assert!(conn.is_down());
        assert!(!registry.is_registered(fd));
    }

    #[test]
    fn test_bad_signature_is_fatal() {
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);
        let messages = collector(&conn);

        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        conn.set_on_error(move || {
            e.fetch_add(1, Ordering::SeqCst);
        });

        let mut bogus = frame::pack(b"payload").unwrap();
        bogus[0] ^= 0xff;
        client.write_all(&bogus).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        conn.on_read_ready();

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_after_error_rejected_and_failed_hooks_flush() {
        let registry = Arc::new(Registry::new());
        let (_client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);

        let failed = Arc::new(AtomicUsize::new(0));
        let f = failed.clone();
        conn.send_message(b"doomed", None, Some(Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap();

        conn.on_error();
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert!(conn.channel().is_closed());

        assert_eq!(
            conn.send_message(b"late", None, None),
            Err(EngineError::ConnectionDown)
        );
    }

    #[test]
    fn test_sends_racing_error_path_all_resolve() {
        // Senders hammer the connection while the error path runs. No
        // frame may end up stranded: every send that returned Ok must see
        // its on_failed hook fire (a send losing the race returns
        // ConnectionDown after flushing hooks, so hooks can outnumber Oks,
        // never the reverse), and the outbox must end up empty.
        let registry = Arc::new(Registry::new());
        let (_client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);
        conn.set_on_error(|| {});

        let ok_sends = Arc::new(AtomicUsize::new(0));
        let failed_hooks = Arc::new(AtomicUsize::new(0));

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let conn = conn.clone();
                let ok_sends = ok_sends.clone();
                let failed_hooks = failed_hooks.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let f = failed_hooks.clone();
                        let hook: SendHook = Box::new(move || {
                            f.fetch_add(1, Ordering::SeqCst);
                        });
                        if conn.send_message(b"racing", None, Some(hook)).is_ok() {
                            ok_sends.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_micros(500));
        conn.on_error();
        for t in senders {
            t.join().unwrap();
        }

        assert!(conn.is_down());
        assert!(conn.outbox.is_empty());
        assert!(
            failed_hooks.load(Ordering::SeqCst) >= ok_sends.load(Ordering::SeqCst),
            "a frame was stranded: {} ok sends, {} failure hooks",
            ok_sends.load(Ordering::SeqCst),
            failed_hooks.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_message_callback_may_replace_itself() {
        let registry = Arc::new(Registry::new());
        let (mut client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let me = conn.clone();
        let f = first.clone();
        let s = second.clone();
        conn.set_on_message(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            let s = s.clone();
            me.set_on_message(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            });
        });

        client.write_all(&frame::pack(b"one").unwrap()).unwrap();
        client.write_all(&frame::pack(b"two").unwrap()).unwrap();
        pump_reads(&conn);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_callback_may_touch_own_connection() {
        let registry = Arc::new(Registry::new());
        let (_client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);

        let fired = Arc::new(AtomicUsize::new(0));
        let me = conn.clone();
        let f = fired.clone();
        conn.set_on_error(move || {
            f.fetch_add(1, Ordering::SeqCst);
            me.set_on_error(|| {});
            assert_eq!(
                me.send_message(b"too late", None, None),
                Err(EngineError::ConnectionDown)
            );
        });

        conn.on_error();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(conn.is_down());
    }

    #[test]
    fn test_oversize_payload_rejected_up_front() {
        let registry = Arc::new(Registry::new());
        let (_client, server_ch) = loopback_pair();
        let conn = MessageConn::new(server_ch, registry);

        let huge = vec![0u8; frame::MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            conn.send_message(&huge, None, None),
            Err(EngineError::Frame(_))
        ));
        assert_eq!(conn.unsent_frames(), 0);
    }
}
