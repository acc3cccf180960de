//! Session state and its event loop.
//!
//! A `Session` owns everything the client shares across callbacks: the push
//! channel state, the pending-fetch gate, and the notice subscription. All of
//! it is mutated from one task, which consumes `SessionEvent`s in order.
//! Channel tasks, fetch tasks, and callers reach the session only through a
//! `SessionHandle`.
//!
//! Lifecycle: created before connecting, `Open` once the channel is up,
//! finished when the channel closes or the session is shut down. Nothing
//! outlives the session.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::envelope::Envelope;
use crate::error::{DecodeError, FetchError};
use crate::fetch::{ATTACHMENT, FORM, FetchRequest, Fetcher, ResponseKind};
use crate::gate::{Deferred, PendingGate};
use crate::record;
use crate::render::{RenderUpdate, Renderer};
use crate::token::{self, NEW_BATCH, PushAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Terminal; a closed session is never reopened.
    Closed,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// The push channel is established.
    Opened,
    Push {
        payload: String,
        received_at: Instant,
    },
    FetchDone {
        request: FetchRequest,
        result: Result<Bytes, FetchError>,
    },
    TransportError(String),
    Closed,
    Command(Command),
}

#[derive(Debug)]
pub enum Command {
    Send(Envelope),
    Fetch(FetchRequest),
    NoticeOpen(String),
    NoticeClose,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Cloneable entry point into a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    fn post(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("session already finished, event dropped");
        }
    }

    fn command(&self, command: Command) {
        self.post(SessionEvent::Command(command));
    }

    /// Send an envelope on the push channel; dropped if the channel is not open.
    pub fn send(&self, envelope: Envelope) {
        self.command(Command::Send(envelope));
    }

    /// Fetch a message and acknowledge it with `thread_open` once decoded.
    pub fn thread_open(&self, msg_id: impl Into<String>) {
        self.command(Command::Fetch(FetchRequest::open_thread(msg_id)));
    }

    /// Subscribe to a service's notices and fetch its log.
    pub fn notice_open(&self, service: impl Into<String>) {
        self.command(Command::NoticeOpen(service.into()));
    }

    pub fn notice_close(&self) {
        self.command(Command::NoticeClose);
    }

    pub fn form_open(&self, id: impl Into<String>) {
        self.fetch(FORM, Some(id.into()));
    }

    pub fn attach_open(&self, id: impl Into<String>) {
        self.fetch(ATTACHMENT, Some(id.into()));
    }

    pub fn fetch(&self, token: impl Into<String>, id: Option<String>) {
        self.command(Command::Fetch(FetchRequest::new(token, id)));
    }

    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    // Transport side.

    pub fn opened(&self) {
        self.post(SessionEvent::Opened);
    }

    pub fn push(&self, payload: impl Into<String>) {
        self.post(SessionEvent::Push {
            payload: payload.into(),
            received_at: Instant::now(),
        });
    }

    pub fn transport_error(&self, detail: impl Into<String>) {
        self.post(SessionEvent::TransportError(detail.into()));
    }

    pub fn closed(&self) {
        self.post(SessionEvent::Closed);
    }
}

pub struct Session<F: Fetcher, R: Renderer> {
    config: SessionConfig,
    fetcher: F,
    renderer: R,
    outbound: mpsc::Sender<String>,
    state: ChannelState,
    gate: PendingGate,
    notice: Option<String>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<F: Fetcher, R: Renderer> Session<F, R> {
    /// Create a session. The returned receiver yields serialized envelopes for the channel writer.
    pub fn new(config: SessionConfig, fetcher: F, renderer: R) -> (Self, mpsc::Receiver<String>) {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            fetcher,
            renderer,
            outbound,
            state: ChannelState::Connecting,
            gate: PendingGate::new(),
            notice: None,
            events_tx,
            events_rx,
        };
        (session, outbound_rx)
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Process events until the channel closes or the session is shut down.
    ///
    /// Returns the renderer. Fetches still in flight are abandoned.
    pub async fn run(mut self) -> R {
        while self.step().await == Flow::Continue {}
        if self.gate.pending() > 0 || self.gate.deferred_len() > 0 {
            debug!(
                pending = self.gate.pending(),
                deferred = self.gate.deferred_len(),
                "session ended with work outstanding"
            );
        }
        self.renderer
    }

    async fn step(&mut self) -> Flow {
        // The session holds a sender itself, so the queue never ends on its own.
        let Some(event) = self.events_rx.recv().await else {
            return Flow::Stop;
        };
        let flow = self.handle_event(event);
        if flow == Flow::Continue {
            self.drain_gate();
        }
        flow
    }

    fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Opened => {
                info!("ws open");
                self.state = ChannelState::Open;
                self.send_envelope(Envelope::Open);
            }
            SessionEvent::Push {
                payload,
                received_at,
            } => {
                if let Some(item) = self.gate.admit(payload, received_at) {
                    self.process_push(item);
                }
            }
            SessionEvent::FetchDone { request, result } => {
                self.gate.finish_fetch();
                self.complete_fetch(request, result);
            }
            SessionEvent::TransportError(detail) => {
                warn!(error = %detail, "ws error");
                self.renderer.error(&detail);
            }
            SessionEvent::Closed => {
                info!("ws closed");
                self.state = ChannelState::Closed;
                self.renderer.quit();
                return Flow::Stop;
            }
            SessionEvent::Command(command) => return self.handle_command(command),
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Send(envelope) => self.send_envelope(envelope),
            Command::Fetch(request) => self.dispatch_fetch(request),
            Command::NoticeOpen(service) => {
                self.notice = Some(service.clone());
                self.dispatch_fetch(FetchRequest::notice_log(service));
            }
            Command::NoticeClose => self.notice = None,
            Command::Shutdown => {
                info!("session shutdown requested");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Process deferred payloads while nothing is pending.
    fn drain_gate(&mut self) {
        while let Some(item) = self.gate.next_ready() {
            debug!(
                waited_ms = item.received_at.elapsed().as_millis() as u64,
                "ws handle deferred"
            );
            self.process_push(item);
        }
    }

    fn process_push(&mut self, item: Deferred) {
        trace!(payload = %item.payload, "ws");

        let actions = match token::tokenize(&item.payload) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, payload = %item.payload, "malformed push payload");
                self.renderer.error(&e.to_string());
                return;
            }
        };

        for action in actions {
            match action {
                PushAction::NameSet(names) => self.renderer.render(RenderUpdate::NameSet { names }),
                PushAction::ThreadChange => self.renderer.thread_change(),
                PushAction::Error(message) => self.renderer.error(&message),
                PushAction::Fetch { token, id } => {
                    let new_batch = token == NEW_BATCH;
                    self.dispatch_fetch(FetchRequest::new(token, id));
                    if new_batch {
                        if let Some(service) = self.notice.clone() {
                            self.dispatch_fetch(FetchRequest::notice_log(service));
                        }
                    }
                }
            }
        }
    }

    /// Start a fetch; its completion comes back as `FetchDone` exactly once.
    fn dispatch_fetch(&mut self, request: FetchRequest) {
        self.gate.begin_fetch();

        let path = request.path();
        debug!(token = %request.token, %path, pending = self.gate.pending(), "fetch");

        let fetcher = self.fetcher.clone();
        let tx = self.events_tx.clone();
        let limit = self.config.fetch_timeout;
        tokio::spawn(async move {
            let result = match limit {
                Some(limit) => tokio::time::timeout(limit, fetcher.fetch(&path))
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Timeout(limit))),
                None => fetcher.fetch(&path).await,
            };
            let _ = tx.send(SessionEvent::FetchDone { request, result });
        });
    }

    fn complete_fetch(&mut self, request: FetchRequest, result: Result<Bytes, FetchError>) {
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                let text = err.report_text();
                warn!(token = %request.token, body = %text, "fetch failed");
                self.renderer.error(&text);
                return;
            }
        };

        match request.kind() {
            ResponseKind::Raw => self.renderer.render(RenderUpdate::Raw {
                token: request.token,
                body,
                id: request.id,
            }),
            ResponseKind::SingleRecord => match record::decode_single(body) {
                Ok(record) => {
                    let ack = request
                        .open
                        .then(|| Envelope::thread_open(record.id().as_str(), record.header.thread_id()));
                    self.renderer.render(RenderUpdate::Message {
                        token: request.token,
                        record,
                    });
                    if let Some(envelope) = ack {
                        self.send_envelope(envelope);
                    }
                }
                Err(e) => self.decode_failed(&request, e),
            },
            ResponseKind::MultiRecord => match record::decode_multi(body) {
                Ok(records) => self.renderer.render(RenderUpdate::Messages {
                    token: request.token,
                    records,
                }),
                Err(e) => self.decode_failed(&request, e),
            },
        }
    }

    fn decode_failed(&mut self, request: &FetchRequest, err: DecodeError) {
        error!(token = %request.token, id = ?request.id, error = %err, "record stream decode failed");
        self.renderer.error(&FetchError::from(err).report_text());
    }

    /// Fire-and-forget: envelopes for a channel that is not open are logged and dropped.
    fn send_envelope(&mut self, envelope: Envelope) {
        if self.state != ChannelState::Open {
            warn!(state = ?self.state, "ws op failed on closed socket");
            return;
        }
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize envelope");
                return;
            }
        };
        if let Err(e) = self.outbound.try_send(json) {
            warn!(error = %e, "ws op dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use crate::record::tests::encode_record;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Render(RenderUpdate),
        Error(String),
        Quit,
        ThreadChange,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Seen>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, update: RenderUpdate) {
            self.seen.push(Seen::Render(update));
        }
        fn error(&mut self, message: &str) {
            self.seen.push(Seen::Error(message.to_string()));
        }
        fn quit(&mut self) {
            self.seen.push(Seen::Quit);
        }
        fn thread_change(&mut self) {
            self.seen.push(Seen::ThreadChange);
        }
    }

    /// Answers each path from a fixed table; unknown paths are 404s.
    #[derive(Clone, Default)]
    struct StaticFetcher {
        routes: Arc<HashMap<String, Result<Bytes, (u16, String)>>>,
    }

    impl StaticFetcher {
        fn new(routes: Vec<(&str, Result<&str, (u16, &str)>)>) -> Self {
            let routes = routes
                .into_iter()
                .map(|(path, r)| {
                    let r = r
                        .map(|body| Bytes::copy_from_slice(body.as_bytes()))
                        .map_err(|(s, b)| (s, b.to_string()));
                    (path.to_string(), r)
                })
                .collect();
            Self {
                routes: Arc::new(routes),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        async fn fetch(&self, path: &str) -> Result<Bytes, FetchError> {
            match self.routes.get(path) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err((status, body))) => Err(FetchError::Status {
                    status: *status,
                    body: body.clone(),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    body: format!("no route {path}"),
                }),
            }
        }
    }

    /// Never answers.
    #[derive(Clone)]
    struct StalledFetcher;

    impl Fetcher for StalledFetcher {
        async fn fetch(&self, _path: &str) -> Result<Bytes, FetchError> {
            std::future::pending().await
        }
    }

    fn open_session<F: Fetcher>(
        fetcher: F,
    ) -> (Session<F, Recorder>, SessionHandle, mpsc::Receiver<String>) {
        let (mut session, outbound) = Session::new(SessionConfig::default(), fetcher, Recorder::default());
        session.state = ChannelState::Open;
        let handle = session.handle();
        (session, handle, outbound)
    }

    fn sent(outbound: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(json) = outbound.try_recv() {
            out.push(serde_json::from_str(&json).unwrap());
        }
        out
    }

    fn raw(token: &str, body: &str, id: Option<&str>) -> Seen {
        Seen::Render(RenderUpdate::Raw {
            token: token.to_string(),
            body: Bytes::copy_from_slice(body.as_bytes()),
            id: id.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn opened_sends_open_envelope() {
        let (mut session, mut outbound) =
            Session::new(SessionConfig::default(), StaticFetcher::default(), Recorder::default());
        let handle = session.handle();
        assert_eq!(session.state(), ChannelState::Connecting);

        handle.opened();
        assert_eq!(session.step().await, Flow::Continue);
        assert_eq!(session.state(), ChannelState::Open);
        assert_eq!(sent(&mut outbound), vec![json!({"op": "open"})]);
    }

    #[tokio::test]
    async fn send_before_open_is_dropped() {
        let (mut session, mut outbound) =
            Session::new(SessionConfig::default(), StaticFetcher::default(), Recorder::default());
        let handle = session.handle();

        handle.send(Envelope::thread_send("d1"));
        session.step().await;
        assert!(sent(&mut outbound).is_empty());
        assert!(session.renderer.seen.is_empty());
    }

    #[tokio::test]
    async fn push_tokens_dispatch_in_order() {
        let fetcher = StaticFetcher::new(vec![
            ("/t/", Ok("tabs")),
            ("?an=a%201", Ok("attachment")),
        ]);
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["_t","/t","_e","bad thing","an","a 1","_n","x","/t"]"#);
        session.step().await;
        assert_eq!(session.gate.pending(), 2);
        assert_eq!(
            session.renderer.seen,
            vec![
                Seen::ThreadChange,
                Seen::Error("bad thing".to_string()),
                Seen::Render(RenderUpdate::NameSet {
                    names: vec![json!("x"), json!("/t")]
                }),
            ]
        );

        session.step().await;
        session.step().await;
        assert_eq!(session.gate.pending(), 0);
        assert_eq!(session.renderer.seen.len(), 5);
        assert!(session.renderer.seen.contains(&raw("/t", "tabs", None)));
        assert!(session.renderer.seen.contains(&raw("an", "attachment", Some("a 1"))));
    }

    #[tokio::test]
    async fn pending_count_returns_to_zero_after_mixed_outcomes() {
        let fetcher = StaticFetcher::new(vec![
            ("/t/", Ok("ok")),
            ("?mo", Ok("zz")),
            ("/f/", Err((500, "form store broken"))),
        ]);
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["/t","mo","/f","/missing"]"#);
        session.step().await;
        assert_eq!(session.gate.pending(), 4);

        for _ in 0..4 {
            session.step().await;
        }
        assert_eq!(session.gate.pending(), 0);

        let errors: Vec<_> = session
            .renderer
            .seen
            .iter()
            .filter(|s| matches!(s, Seen::Error(_)))
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(session.renderer.seen.contains(&Seen::Error("form store broken".to_string())));
        assert!(session.renderer.seen.contains(&raw("/t", "ok", None)));
    }

    #[tokio::test]
    async fn push_waits_for_outstanding_fetch() {
        let fetcher = StaticFetcher::new(vec![("/t/", Ok("tabs"))]);
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["/t"]"#);
        // Queued before the fetch task gets a chance to run.
        handle.push(r#"["_t"]"#);

        session.step().await;
        assert_eq!(session.gate.pending(), 1);
        session.step().await;
        assert_eq!(session.gate.deferred_len(), 1);
        assert!(session.renderer.seen.is_empty());

        session.step().await;
        assert_eq!(session.gate.pending(), 0);
        assert_eq!(session.gate.deferred_len(), 0);
        assert_eq!(session.renderer.seen, vec![raw("/t", "tabs", None), Seen::ThreadChange]);
    }

    #[tokio::test]
    async fn deferred_payloads_keep_arrival_order() {
        let fetcher = StaticFetcher::new(vec![("/t/", Ok("1")), ("/c/", Ok("2"))]);
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["/t"]"#);
        handle.push(r#"["/c"]"#);
        handle.push(r#"["_e","third"]"#);

        session.step().await; // "/t" dispatched
        session.step().await; // "/c" deferred
        session.step().await; // "_e" deferred
        assert_eq!(session.gate.deferred_len(), 2);

        // "/t" completes; "/c" is released and raises the count again, so "_e" keeps waiting.
        session.step().await;
        assert_eq!(session.gate.pending(), 1);
        assert_eq!(session.gate.deferred_len(), 1);

        session.step().await;
        assert_eq!(
            session.renderer.seen,
            vec![raw("/t", "1", None), raw("/c", "2", None), Seen::Error("third".to_string())]
        );
    }

    #[tokio::test]
    async fn thread_open_decodes_and_acknowledges() {
        let fetcher = StaticFetcher::new(vec![("?mn=1", Ok("0010{\"Id\":1,\"Len\":3}\x00abc"))]);
        let (mut session, handle, mut outbound) = open_session(fetcher);

        handle.thread_open("1");
        session.step().await;
        session.step().await;

        let [Seen::Render(RenderUpdate::Message { token, record })] = session.renderer.seen.as_slice() else {
            panic!("expected one message, got {:?}", session.renderer.seen);
        };
        assert_eq!(token, "mn");
        assert_eq!(record.id().as_str(), "1");
        assert_eq!(record.msg_text(), "abc");
        assert_eq!(
            sent(&mut outbound),
            vec![json!({"op": "thread_open", "touch": {"act": 115, "msgid": "1", "threadid": "1"}})]
        );
    }

    #[tokio::test]
    async fn pushed_mn_does_not_acknowledge() {
        let stream = encode_record(&json!({"Id": "m9", "Len": 1, "SubHead": {"ThreadId": "t1"}}), b"x", &[]);
        let fetcher = StaticFetcher {
            routes: Arc::new(HashMap::from([("?mn=m9".to_string(), Ok(Bytes::from(stream)))])),
        };
        let (mut session, handle, mut outbound) = open_session(fetcher);

        handle.push(r#"["mn","m9"]"#);
        session.step().await;
        session.step().await;
        assert_eq!(session.renderer.seen.len(), 1);
        assert!(sent(&mut outbound).is_empty());
    }

    #[tokio::test]
    async fn multi_record_mapping_delivered_once() {
        let mut stream = encode_record(&json!({"Id": 5, "Len": 1}), b"a", &[]);
        stream.push(b'\n');
        stream.extend(encode_record(&json!({"Id": 7, "Len": 1}), b"b", &[]));
        let fetcher = StaticFetcher {
            routes: Arc::new(HashMap::from([("?mo".to_string(), Ok(Bytes::from(stream)))])),
        };
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["mo"]"#);
        session.step().await;
        session.step().await;

        let [Seen::Render(RenderUpdate::Messages { token, records })] = session.renderer.seen.as_slice() else {
            panic!("expected one mapping, got {:?}", session.renderer.seen);
        };
        assert_eq!(token, "mo");
        let ids: Vec<_> = records.keys().cloned().collect();
        assert_eq!(ids, vec![RecordId::new("5"), RecordId::new("7")]);
    }

    #[tokio::test]
    async fn decode_failure_reports_without_partial_mapping() {
        let mut stream = encode_record(&json!({"Id": 5, "Len": 1}), b"a", &[]);
        stream.extend_from_slice(b"00ff{\"Id\":");
        let fetcher = StaticFetcher {
            routes: Arc::new(HashMap::from([("?mo".to_string(), Ok(Bytes::from(stream)))])),
        };
        let (mut session, handle, mut outbound) = open_session(fetcher);

        handle.push(r#"["mo"]"#);
        session.step().await;
        session.step().await;

        assert_eq!(session.gate.pending(), 0);
        assert_eq!(session.renderer.seen.len(), 1);
        assert!(matches!(&session.renderer.seen[0], Seen::Error(m) if m.contains("truncated")));
        assert!(sent(&mut outbound).is_empty());
    }

    #[tokio::test]
    async fn new_batch_refreshes_subscribed_notice_log() {
        let fetcher = StaticFetcher::new(vec![
            ("/v/", Ok("batch")),
            ("/svc1?nl", Ok("notices")),
        ]);
        let (mut session, handle, _outbound) = open_session(fetcher);

        handle.push(r#"["/v"]"#);
        session.step().await;
        assert_eq!(session.gate.pending(), 1);
        session.step().await;

        handle.notice_open("svc1");
        session.step().await;
        assert_eq!(session.gate.pending(), 1);
        session.step().await;

        handle.push(r#"["/v"]"#);
        session.step().await;
        assert_eq!(session.gate.pending(), 2);
        session.step().await;
        session.step().await;

        handle.notice_close();
        handle.push(r#"["/v"]"#);
        session.step().await;
        session.step().await;
        assert_eq!(session.gate.pending(), 1);
        session.step().await;

        let notices = session
            .renderer
            .seen
            .iter()
            .filter(|s| **s == raw("nlo", "notices", Some("svc1")))
            .count();
        assert_eq!(notices, 2);
    }

    #[tokio::test]
    async fn malformed_push_is_reported() {
        let (mut session, handle, _outbound) = open_session(StaticFetcher::default());
        handle.push("{not json");
        session.step().await;
        assert_eq!(session.gate.pending(), 0);
        assert!(matches!(&session.renderer.seen[..], [Seen::Error(_)]));
    }

    #[tokio::test]
    async fn transport_error_and_close() {
        let (session, handle, _outbound) = open_session(StaticFetcher::default());
        handle.transport_error("connection reset");
        handle.closed();
        handle.push(r#"["_t"]"#);

        let renderer = session.run().await;
        assert_eq!(
            renderer.seen,
            vec![Seen::Error("connection reset".to_string()), Seen::Quit]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_without_quit() {
        let (session, handle, _outbound) = open_session(StaticFetcher::default());
        handle.shutdown();
        let renderer = session.run().await;
        assert!(renderer.seen.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_releases_gate() {
        let (mut session, outbound) = Session::new(
            SessionConfig {
                fetch_timeout: Some(Duration::from_secs(5)),
                outbound_capacity: 8,
            },
            StalledFetcher,
            Recorder::default(),
        );
        drop(outbound);
        session.state = ChannelState::Open;
        let handle = session.handle();

        handle.push(r#"["/t"]"#);
        handle.push(r#"["_t"]"#);
        session.step().await;
        session.step().await;
        assert_eq!(session.gate.deferred_len(), 1);

        session.step().await; // timeout fires after the paused clock auto-advances
        assert_eq!(session.gate.pending(), 0);
        assert_eq!(session.renderer.seen.len(), 2);
        assert!(matches!(&session.renderer.seen[0], Seen::Error(m) if m.contains("did not complete")));
        assert_eq!(session.renderer.seen[1], Seen::ThreadChange);
    }
}
