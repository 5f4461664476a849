use crate::data::{ProductRecord, ResponseTopic, SUGGESTION_CHIPS};
use crate::feedback::{FeedbackLedger, Vote, VoteSummary, describe_ratio};
use crate::intent::{Mode, detect};
use crate::resolve::resolve_topic;
use crate::reveal::{
    Motion, RevealFrame, RevealOutcome, RevealPhase, RevealSink, RevealTicket, RevealTiming,
    run_reveal,
};
use crate::session::{Query as SearchQuery, SearchSession, SubmitError, Submission};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use cookie::{Cookie, SameSite};
use futures::stream;
use lru::LruCache;
use parking_lot::Mutex;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info};

type SharedState = Arc<AppState>;
const SESSION_COOKIE: &str = "hs_session";
const SESSION_ID_LEN: usize = 24;

pub struct AppState {
    pub sessions: SessionStore,
    pub feedback: FeedbackLedger,
    pub timing: RevealTiming,
    pub base_url: String,
}

impl AppState {
    pub fn new(config: &WebConfig) -> Self {
        Self {
            sessions: SessionStore::new(config.max_sessions),
            feedback: FeedbackLedger::new(),
            timing: config.timing,
            base_url: config.base_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
    pub timing: RevealTiming,
    pub max_sessions: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
            timing: RevealTiming::default(),
            max_sessions: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let state = Arc::new(AppState::new(&config));
    let router = build_router(state);
    info!(
        %config.addr,
        base = %config.base_url,
        thinking_ms = config.timing.thinking_delay.as_millis() as u64,
        tick_ms = config.timing.tick.as_millis() as u64,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

/// Visitor sessions keyed by cookie id. Least recently seen sessions are
/// dropped once `capacity` is reached.
pub struct SessionStore {
    inner: Mutex<LruCache<String, SearchSession>>,
}

pub struct SessionHandle {
    pub id: String,
    pub session: SearchSession,
    pub is_new: bool,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Looks up `id`, or starts a fresh session under a new id.
    pub fn resolve(&self, id: Option<&str>) -> SessionHandle {
        let mut guard = self.inner.lock();
        if let Some(id) = id {
            if let Some(session) = guard.get(id) {
                return SessionHandle {
                    id: id.to_string(),
                    session: session.clone(),
                    is_new: false,
                };
            }
        }
        let id = generate_session_id();
        let session = SearchSession::new();
        guard.put(id.clone(), session.clone());
        debug!(sessions = guard.len(), "session created");
        SessionHandle {
            id,
            session,
            is_new: true,
        }
    }

    pub fn update<R>(&self, id: &str, apply: impl FnOnce(&mut SearchSession) -> R) -> Option<R> {
        self.inner.lock().get_mut(id).map(apply)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn with_session_cookie(mut response: Response, handle: &SessionHandle) -> Response {
    if handle.is_new {
        let cookie = Cookie::build((SESSION_COOKIE, handle.id.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyQuery => ApiError::bad_request("Query parameter `q` is required"),
            SubmitError::Render(err) => ApiError::internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/search", get(search_html))
        .route("/ai-mode", post(toggle_ai_mode))
        .route("/api/classify", get(api_classify))
        .route("/api/hint", get(api_hint))
        .route("/api/search", get(api_search))
        .route("/api/reveal", get(api_reveal))
        .route("/api/feedback", get(api_feedback_summary).post(api_feedback))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "hybrid-search-web" }))
}

async fn home(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let page = render_page(&state, &handle.session, "", None);
    with_session_cookie(page, &handle)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn search_html(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let raw = params.q.unwrap_or_default();
    let page = match handle.session.submit(&raw) {
        Ok(submission) => render_page(&state, &handle.session, raw.trim(), Some(&submission)),
        // Nothing to resolve; show the idle box with the input focused.
        Err(SubmitError::EmptyQuery) => render_page(&state, &handle.session, "", None),
        Err(err) => error_page_response(err.to_string()),
    };
    with_session_cookie(page, &handle)
}

async fn toggle_ai_mode(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    state
        .sessions
        .update(&handle.id, SearchSession::toggle_ai_mode);
    with_session_cookie(Redirect::to("/").into_response(), &handle)
}

async fn api_classify(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let query = SearchQuery::parse(params.q.as_deref().unwrap_or_default())?;
    let detection = detect(query.as_str());
    let payload = ClassifyPayload {
        mode: handle.session.mode_for(&query),
        query: query.to_string(),
        trigger: detection.trigger,
        pinned: handle.session.is_ai_pinned(),
    };
    Ok(with_session_cookie(Json(payload).into_response(), &handle))
}

async fn api_hint(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let feedback = handle
        .session
        .input_feedback(params.q.as_deref().unwrap_or_default());
    with_session_cookie(Json(feedback).into_response(), &handle)
}

async fn api_search(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let submission = handle
        .session
        .submit(params.q.as_deref().unwrap_or_default())?;
    let payload = SubmissionPayload::from_submission(&submission);
    Ok(with_session_cookie(Json(payload).into_response(), &handle))
}

#[derive(Debug, Deserialize)]
struct RevealParams {
    q: Option<String>,
    ticket: Option<u64>,
    reduced: Option<u8>,
}

enum StreamEvent {
    Phase(RevealPhase),
    Frame(RevealFrame),
    Superseded,
}

impl StreamEvent {
    fn into_sse(self) -> Result<Event, axum::Error> {
        match self {
            StreamEvent::Phase(phase) => Event::default().event("phase").json_data(phase),
            StreamEvent::Frame(frame) => Event::default().event("frame").json_data(frame),
            StreamEvent::Superseded => Ok(Event::default().event("superseded").data("{}")),
        }
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl RevealSink for ChannelSink {
    fn phase(&mut self, phase: RevealPhase) {
        let _ = self.tx.send(StreamEvent::Phase(phase));
    }

    fn frame(&mut self, frame: RevealFrame) {
        let _ = self.tx.send(StreamEvent::Frame(frame));
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Plays `text` into `tx` on its own task. The task ends as soon as the
/// receiving stream is dropped.
fn spawn_reveal(
    ticket: RevealTicket,
    text: &'static str,
    timing: RevealTiming,
    tx: mpsc::UnboundedSender<StreamEvent>,
) -> JoinHandle<RevealOutcome> {
    tokio::spawn(async move {
        let sink = ChannelSink { tx: tx.clone() };
        let outcome = run_reveal(&ticket, text, timing, sink).await;
        match outcome {
            RevealOutcome::Superseded { .. } => {
                let _ = tx.send(StreamEvent::Superseded);
            }
            RevealOutcome::Abandoned { frames } => {
                debug!(ticket = ticket.id(), frames, "reveal client went away");
            }
            RevealOutcome::Completed { .. } => {}
        }
        outcome
    })
}

/// Streams the answer for `q` as SSE. With `ticket`, the stream belongs to
/// that submission and ends at once if a newer one exists; without it, the
/// stream starts a submission of its own.
async fn api_reveal(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<RevealParams>,
) -> Result<Response, ApiError> {
    let handle = state.sessions.resolve(session_cookie(&headers).as_deref());
    let query = SearchQuery::parse(params.q.as_deref().unwrap_or_default())?;
    let controller = handle.session.reveal_controller();
    let ticket = match params.ticket {
        Some(id) => controller.resume(id),
        None => Some(controller.begin()),
    };
    let motion = if params.reduced.unwrap_or(0) != 0 {
        Motion::Reduced
    } else {
        Motion::Full
    };
    let timing = state.timing.with_motion(motion);
    let topic = resolve_topic(query.as_str());

    let (tx, rx) = mpsc::unbounded_channel();
    match ticket {
        Some(ticket) => {
            debug!(ticket = ticket.id(), %topic, ?motion, "reveal stream opened");
            spawn_reveal(ticket, topic.text(), timing, tx);
        }
        None => {
            let _ = tx.send(StreamEvent::Superseded);
        }
    }

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event.into_sse(), rx))
    });
    let response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    Ok(with_session_cookie(response, &handle))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    topic: ResponseTopic,
    vote: Vote,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeedbackPayload {
    topic: ResponseTopic,
    #[serde(flatten)]
    summary: VoteSummary,
    message: Option<String>,
}

async fn api_feedback(
    State(state): State<SharedState>,
    request: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackPayload>, ApiError> {
    let Json(request) = request?;
    let summary = state.feedback.record(request.topic, request.vote);
    Ok(Json(FeedbackPayload {
        topic: request.topic,
        summary,
        message: describe_ratio(&summary),
    }))
}

async fn api_feedback_summary(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.feedback.snapshot())
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassifyPayload {
    query: String,
    mode: Mode,
    trigger: Option<String>,
    pinned: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubmissionPayload {
    query: String,
    mode: Mode,
    product: Option<ProductRecord>,
    topic: Option<ResponseTopic>,
    text: Option<String>,
    ticket: Option<u64>,
    html: String,
    hint: Option<String>,
}

impl SubmissionPayload {
    fn from_submission(submission: &Submission) -> Self {
        let mut payload = Self {
            query: submission.query().to_string(),
            mode: submission.mode(),
            product: None,
            topic: None,
            text: None,
            ticket: None,
            html: submission.panel_html().to_string(),
            hint: submission.hint().map(|hint| hint.plain_text()),
        };
        match submission {
            Submission::Product { record, .. } => payload.product = Some(record.clone()),
            Submission::Answer {
                topic,
                text,
                ticket,
                ..
            } => {
                payload.topic = Some(*topic);
                payload.text = Some((*text).to_string());
                payload.ticket = Some(ticket.id());
            }
        }
        payload
    }
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn search_path(query: &str) -> String {
    format!("/search?q={}", encode_component(query))
}

struct ChipLink {
    label: &'static str,
    href: String,
}

fn render_page(
    state: &AppState,
    session: &SearchSession,
    query: &str,
    submission: Option<&Submission>,
) -> Response {
    let hint = submission
        .and_then(Submission::hint)
        .cloned()
        .unwrap_or_else(|| session.resting_hint());
    let reveal_src = match submission {
        Some(Submission::Answer { query, ticket, .. }) => Some(format!(
            "/api/reveal?q={}&ticket={}",
            encode_component(query.as_str()),
            ticket.id()
        )),
        _ => None,
    };
    let topic = match submission {
        Some(Submission::Answer { topic, .. }) => Some(topic.as_str()),
        _ => None,
    };
    let chips = SUGGESTION_CHIPS
        .iter()
        .map(|&label| ChipLink {
            label,
            href: search_path(label),
        })
        .collect();
    let template = PageTemplate {
        base_url: &state.base_url,
        query,
        placeholder: session.placeholder(),
        hint_html: hint.to_html(),
        ai_pinned: session.is_ai_pinned(),
        chips,
        panel_html: submission.map(Submission::panel_html),
        reveal_src,
        topic,
        focus_input: submission.is_none(),
    };
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => error_page_response(err.to_string()),
    }
}

fn error_page_response(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(render_error_page(message)),
    )
        .into_response()
}

fn render_error_page(message: impl Into<String>) -> String {
    let message = crate::render::escape_html(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Software Reviews • Error</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="bg-slate-50 text-slate-900">
    <main class="min-h-screen flex flex-col items-center justify-start py-10 px-4">
      <div class="max-w-3xl w-full space-y-4">
        <h1 class="text-3xl font-extrabold tracking-tight">Something went wrong</h1>
        <p class="text-lg text-slate-600">{message}</p>
        <a href="/" class="inline-flex items-center rounded-full bg-slate-900 px-4 py-2 text-white font-semibold">Back to search</a>
      </div>
    </main>
  </body>
</html>"#
    )
}

#[derive(Template)]
#[template(
    source = r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Software Reviews • Search or ask</title>
    <link rel="canonical" href="{{ base_url }}/">
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    <style>
      .loading-dots span { display: inline-block; width: 6px; height: 6px; margin-right: 4px; border-radius: 9999px; background: #5746b2; animation: blink 1s infinite; }
      .loading-dots span:nth-child(2) { animation-delay: .2s; }
      .loading-dots span:nth-child(3) { animation-delay: .4s; }
      .typing-cursor::after { content: "▍"; margin-left: 1px; }
      @keyframes blink { 50% { opacity: .2; } }
      @media (prefers-reduced-motion: reduce) { .loading-dots span { animation: none; } }
    </style>
  </head>
  <body class="bg-slate-50 text-slate-900">
    <main class="min-h-screen flex flex-col items-center justify-start py-10 px-4">
      <div class="max-w-3xl w-full space-y-4">
        <h1 class="text-4xl font-extrabold tracking-tight">Find the right software, or just ask.</h1>
        <form id="search-form" action="/search" method="get" role="search" class="flex gap-2">
          <div id="search-field" class="flex-1 {% if ai_pinned %}ai-active{% endif %}">
            <label for="search-input" class="sr-only">Search software or ask a question</label>
            <input id="search-input" name="q" type="search" value="{{ query }}" placeholder="{{ placeholder }}" autocomplete="off" {% if focus_input %}autofocus{% endif %}
                   class="w-full rounded-full border border-slate-300 px-5 py-3 text-base focus:outline-none focus:ring-2 focus:ring-indigo-500">
          </div>
          <button type="submit" class="rounded-full bg-[#ff492c] px-5 py-3 text-white font-semibold">Search</button>
        </form>
        <form action="/ai-mode" method="post">
          <button id="ai-mode-toggle" type="submit" aria-pressed="{{ ai_pinned }}" class="rounded-full border border-indigo-300 px-4 py-1 text-sm font-semibold text-indigo-700">✨ AI Mode{% if ai_pinned %} · on{% endif %}</button>
        </form>
        <p id="search-hint" class="text-sm text-slate-500">{{ hint_html|safe }}</p>
        {% if ai_pinned %}
        <ul id="ai-canvas" class="flex flex-wrap gap-2 list-none p-0" role="list">
          {% for chip in chips %}
          <li><a href="{{ chip.href }}" class="prompt-chip inline-block rounded-full bg-indigo-50 px-3 py-1 text-sm text-indigo-800 hover:bg-indigo-100">{{ chip.label }}</a></li>
          {% endfor %}
        </ul>
        {% endif %}
        {% if let Some(panel) = panel_html %}
        <section id="response-panel" class="bg-white shadow rounded-xl p-5"{% if let Some(src) = reveal_src %} data-reveal-src="{{ src }}"{% endif %}{% if let Some(topic) = topic %} data-topic="{{ topic }}"{% endif %}>
          {{ panel|safe }}
        </section>
        {% else %}
        <section id="response-panel" class="hidden bg-white shadow rounded-xl p-5"></section>
        {% endif %}
      </div>
    </main>
    <script>
      (() => {
        const input = document.getElementById('search-input');
        const hint = document.getElementById('search-hint');
        const panel = document.getElementById('response-panel');

        input.addEventListener('input', async () => {
          const response = await fetch('/api/hint?q=' + encodeURIComponent(input.value));
          const feedback = await response.json();
          if (feedback.hint) {
            if (feedback.hint.kind === 'markup') hint.innerHTML = feedback.hint.text;
            else hint.textContent = feedback.hint.text;
          }
          if (feedback.hide_results) panel.classList.add('hidden');
        });

        if (panel.classList.contains('hidden')) return;
        panel.scrollIntoView({ behavior: 'smooth', block: 'nearest' });

        panel.querySelectorAll('[data-vote]').forEach((button) => {
          button.addEventListener('click', () => {
            fetch('/api/feedback', {
              method: 'POST',
              headers: { 'Content-Type': 'application/json' },
              body: JSON.stringify({ topic: panel.dataset.topic, vote: button.dataset.vote }),
            });
            button.disabled = true;
          });
        });

        const src = panel.dataset.revealSrc;
        if (!src) return;
        const reduced = window.matchMedia('(prefers-reduced-motion: reduce)').matches;
        const loading = document.getElementById('ai-loading');
        const text = document.getElementById('ai-text');
        const events = new EventSource(src + (reduced ? '&reduced=1' : ''));
        events.addEventListener('phase', (event) => {
          const phase = JSON.parse(event.data);
          if (phase === 'revealing') {
            if (loading) loading.classList.add('hidden');
            text.classList.remove('hidden');
            if (!reduced) text.classList.add('typing-cursor');
          } else if (phase === 'done') {
            text.classList.remove('typing-cursor');
            events.close();
          }
        });
        events.addEventListener('frame', (event) => {
          const frame = JSON.parse(event.data);
          if (frame.kind === 'raw') text.textContent = frame.body;
          else text.innerHTML = frame.body;
        });
        events.addEventListener('superseded', () => events.close());
      })();
    </script>
  </body>
</html>"##,
    ext = "html"
)]
struct PageTemplate<'a> {
    base_url: &'a str,
    query: &'a str,
    placeholder: &'a str,
    hint_html: String,
    ai_pinned: bool,
    chips: Vec<ChipLink>,
    panel_html: Option<&'a str>,
    reveal_src: Option<String>,
    topic: Option<&'static str>,
    focus_input: bool,
}
