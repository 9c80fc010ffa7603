//! The engine: owner of every token and region of a run.
//!
//! All token and region records live in arenas owned by the engine thread.
//! Other threads never see them; they talk to the engine only through the
//! shared resumed queue (see [`resume`](super::resume)).
//!
//! # Run loop
//!
//! ```text
//! loop {
//!     terminate requested?        -> close the top-level region
//!     top-level region closed?    -> done
//!     paused?                     -> block until unpaused
//!     ready token?                -> step it
//!     resumed token?              -> admit one (one round)
//!     logical timer pending?      -> advance the clock
//!     otherwise                   -> block until a push arrives
//! }
//! ```
//!
//! The ready queue always drains before the next resumption is admitted, so
//! everything a resumed token triggers synchronously happens within its
//! round.
//!
//! # Region accounting
//!
//! Every token and child region is added to exactly one region, and removed
//! from it exactly once: either by departing (death, child close) or by being
//! taken when the region closes. [`RunSummary`] counts both sides; after a
//! run they are equal.

use crate::error::{Error, ErrorKind, Result, TokenError, TokenErrorKind};
use crate::graph::Node;
use crate::record::{Departure, FutureCell, RegionKind, RegionRecord, TokenRecord, TokenState};
use crate::runtime::blocking_pool::{BlockingPool, BlockingPoolOptions};
use crate::runtime::config::EngineConfig;
use crate::runtime::resume::{ResumeKind, Resumption, Shared};
use crate::runtime::scheduler::ReadyQueue;
use crate::runtime::sink::{Sink, SinkEvent};
use crate::trace::{TraceBuffer, TraceData, TraceEvent, TraceEventKind};
use crate::tracing_compat::{debug, info, info_span, trace, warn};
use crate::types::{EngineState, Env, RegionId, TokenId, Value};
use crate::util::Arena;
use std::collections::VecDeque;
use std::sync::Arc;

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Top-level publications delivered to the sink.
    pub publications: u64,
    /// Resumptions admitted from the resumed queue.
    pub rounds: u64,
    /// Token steps taken.
    pub steps: u64,
    /// Tokens created, including the root token.
    pub tokens_created: u64,
    /// Regions created, including the top-level region.
    pub regions_created: u64,
    /// Members (tokens and child regions) added to a region.
    pub region_adds: u64,
    /// Members removed from a region.
    pub region_removes: u64,
    /// Highest number of simultaneously live tokens.
    pub peak_tokens: usize,
    /// Logical time when the run ended.
    pub logical_time: u64,
}

impl RunSummary {
    /// Returns true if every region member added was also removed.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.region_adds == self.region_removes
    }
}

/// A cloneable handle for observing and stopping an engine from any thread.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Asks the engine to stop.
    ///
    /// The engine closes its top-level region at the next loop iteration,
    /// killing every live token. Suspended site calls may still respond;
    /// their responses are dropped.
    pub fn terminate(&self) {
        self.shared.request_terminate();
    }

    /// Stops the engine from stepping tokens or admitting resumptions until
    /// [`unpause`](Self::unpause) is called.
    ///
    /// Site responses that arrive meanwhile are queued. Termination still
    /// takes effect while paused.
    pub fn pause(&self) {
        debug!("pause requested");
        self.shared.pause();
    }

    /// Lets a paused engine continue.
    pub fn unpause(&self) {
        debug!("unpause requested");
        self.shared.unpause();
    }

    /// Returns true between [`pause`](Self::pause) and
    /// [`unpause`](Self::unpause).
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }
}

impl core::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Which kind of member is leaving a region.
#[derive(Debug, Clone, Copy)]
pub(super) enum Member {
    Token(TokenId),
    Region(RegionId),
}

/// Work a region leaves behind when it closes.
enum CloseHook {
    None,
    StopRun,
    CloseCell(Arc<FutureCell>),
    Release(TokenId),
}

/// The execution engine.
///
/// An engine runs one expression graph to completion with
/// [`run`](Self::run). Build one with
/// [`EngineBuilder`](super::builder::EngineBuilder).
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) tokens: Arena<TokenRecord>,
    pub(super) regions: Arena<RegionRecord>,
    pub(super) ready: ReadyQueue,
    pub(super) shared: Arc<Shared>,
    pub(super) pool: BlockingPool,
    pub(super) outbox: VecDeque<SinkEvent>,
    pub(super) trace: Option<TraceBuffer>,
    pub(super) summary: RunSummary,
    root: Option<RegionId>,
    root_closed: bool,
}

impl Engine {
    /// Creates an engine from `config` after normalizing it.
    pub fn with_config(mut config: EngineConfig) -> Result<Self> {
        config.normalize();
        let pool = BlockingPool::with_options(
            config.blocking.min_threads,
            config.blocking.max_threads,
            BlockingPoolOptions {
                thread_name_prefix: config.blocking.thread_name_prefix.clone(),
                ..BlockingPoolOptions::default()
            },
        );
        let trace = (config.trace_capacity > 0).then(|| TraceBuffer::new(config.trace_capacity));
        debug!(
            max_tokens = ?config.max_tokens,
            max_publications = ?config.max_publications,
            trace_capacity = config.trace_capacity,
            "engine created"
        );
        Ok(Self {
            config,
            tokens: Arena::new(),
            regions: Arena::new(),
            ready: ReadyQueue::new(),
            shared: Arc::new(Shared::new()),
            pool,
            outbox: VecDeque::new(),
            trace,
            summary: RunSummary::default(),
            root: None,
            root_closed: false,
        })
    }

    /// The (normalized) configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a handle usable from other threads.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Recorded trace events, if tracing is enabled.
    #[must_use]
    pub const fn trace(&self) -> Option<&TraceBuffer> {
        self.trace.as_ref()
    }

    /// Counters for the current (or finished) run.
    #[must_use]
    pub const fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Number of live tokens.
    #[must_use]
    pub const fn live_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Number of live regions.
    #[must_use]
    pub const fn live_regions(&self) -> usize {
        self.regions.len()
    }

    /// Runs `root` in `env` until its top-level region closes.
    ///
    /// Publications and token errors go to `sink` in the order they happen,
    /// followed by exactly one `finished`. An engine runs once; a second call
    /// fails with [`ErrorKind::InvalidStateTransition`].
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ResourceExhausted`] if the token limit is hit, and
    /// [`ErrorKind::Internal`] if an engine invariant breaks. Either way the
    /// top-level region is closed and `finished` is still reported.
    pub fn run(&mut self, root: Arc<Node>, env: Env, sink: &mut dyn Sink) -> Result<RunSummary> {
        let state = self.state();
        if state != EngineState::New {
            return Err(Error::new(ErrorKind::InvalidStateTransition)
                .with_message(format!("engine cannot run from state {state:?}")));
        }
        self.shared.set_state(EngineState::Running);
        let _run = info_span!("orc_run").entered();
        debug!(node = root.kind(), env = env.len(), "run started");

        let result = self.start(root, env).and_then(|()| self.drive(sink));
        if let Err(err) = &result {
            debug!(error = %err, "run aborted");
            if let Some(root) = self.root {
                self.close_region(root);
            }
        }
        self.flush(sink);
        self.ready.clear();
        self.summary.logical_time = self.shared.logical_time();
        self.shared.set_state(EngineState::Dead);
        self.shared.clear();
        sink.finished();

        debug!(
            publications = self.summary.publications,
            rounds = self.summary.rounds,
            steps = self.summary.steps,
            tokens = self.summary.tokens_created,
            regions = self.summary.regions_created,
            "run finished"
        );
        result.map(|()| self.summary)
    }

    fn start(&mut self, node: Arc<Node>, env: Env) -> Result<()> {
        let root = self.open_region(None, RegionKind::Execution)?;
        self.root = Some(root);
        let token = self.spawn_token(|id| TokenRecord::new(id, root, node, env))?;
        self.ready.schedule(token);
        Ok(())
    }

    fn drive(&mut self, sink: &mut dyn Sink) -> Result<()> {
        loop {
            if self.shared.terminate_requested() && !self.root_closed {
                debug!("terminate requested");
                if let Some(root) = self.root {
                    self.close_region(root);
                }
            }
            if self.root_closed {
                return Ok(());
            }
            if self.shared.is_paused() {
                self.shared.wait_while_paused();
                continue;
            }

            if let Some(token) = self.ready.pop() {
                self.step(token)?;
                self.flush(sink);
                continue;
            }

            if let Some(resumption) = self.shared.pop() {
                self.summary.rounds += 1;
                self.report_round();
                self.admit(resumption)?;
                self.flush(sink);
                continue;
            }

            if let Some((now, released)) = self.shared.advance_clock() {
                let old = self.summary.logical_time;
                self.summary.logical_time = now;
                trace!(old, new = now, released = released.len(), "logical clock advanced");
                self.record(TraceEventKind::ClockAdvance, || TraceData::Time { old, new: now });
                for token in released {
                    self.shared
                        .push(Resumption::new(token, ResumeKind::Publish(Value::Signal)));
                }
                continue;
            }

            self.shared.wait();
        }
    }

    fn report_round(&self) {
        if self.config.report_rounds {
            info!(
                round = self.summary.rounds,
                ready = self.ready.len(),
                resumed = self.shared.pending(),
                tokens = self.tokens.len(),
                logical_time = self.shared.logical_time(),
                timers = self.shared.logical_pending(),
                "round"
            );
        }
    }

    fn flush(&mut self, sink: &mut dyn Sink) {
        while let Some(event) = self.outbox.pop_front() {
            event.deliver(sink);
        }
    }

    /// Hands a resumed token back to the ready queue.
    fn admit(&mut self, resumption: Resumption) -> Result<()> {
        let Resumption { token: id, kind } = resumption;
        let Some(token) = self.tokens.get_mut(id.arena_index()) else {
            trace!(token = %id, "resumption for dead token discarded");
            self.record(TraceEventKind::Discard, || TraceData::Message(id.to_string()));
            return Ok(());
        };
        let expected = match kind {
            ResumeKind::Wake => TokenState::OnFuture,
            _ => TokenState::OnCall,
        };
        if token.state != expected {
            return Err(Error::internal(format!(
                "resumption {kind:?} for token in state {:?}",
                token.state
            ))
            .with_token(id));
        }
        token.state = TokenState::Runnable;
        let region = token.region;
        self.record(TraceEventKind::Admit, || TraceData::Token { token: id, region });

        match kind {
            ResumeKind::Publish(value) => {
                self.token_mut(id)?.publish(value);
                self.ready.schedule(id);
            }
            ResumeKind::Wake => {
                self.ready.schedule(id);
            }
            ResumeKind::Halt => self.kill(id),
            ResumeKind::Fail(kind) => self.fail_token(id, kind)?,
        }
        Ok(())
    }

    pub(super) fn token(&self, id: TokenId) -> Result<&TokenRecord> {
        self.tokens
            .get(id.arena_index())
            .ok_or_else(|| Error::internal("token is not live").with_token(id))
    }

    pub(super) fn token_mut(&mut self, id: TokenId) -> Result<&mut TokenRecord> {
        self.tokens
            .get_mut(id.arena_index())
            .ok_or_else(|| Error::internal("token is not live").with_token(id))
    }

    pub(super) fn record<F>(&mut self, kind: TraceEventKind, data: F)
    where
        F: FnOnce() -> TraceData,
    {
        if let Some(buffer) = &mut self.trace {
            let seq = buffer.next_seq();
            buffer.push(TraceEvent::new(seq, self.summary.rounds, kind, data()));
        }
    }

    /// Creates a region, registering it with `parent`.
    pub(super) fn open_region(
        &mut self,
        parent: Option<RegionId>,
        kind: RegionKind,
    ) -> Result<RegionId> {
        let name = kind.name();
        let index = self
            .regions
            .insert_with(|index| RegionRecord::new(RegionId::from_arena(index), parent, kind));
        let id = RegionId::from_arena(index);
        if let Some(parent) = parent {
            let added = self
                .regions
                .get_mut(parent.arena_index())
                .is_some_and(|record| record.add_child(id));
            if !added {
                self.regions.remove(index);
                return Err(Error::internal("region opened under a closed parent")
                    .with_region(parent));
            }
            self.summary.region_adds += 1;
        }
        self.summary.regions_created += 1;
        trace!(region = %id, kind = name, "region opened");
        self.record(TraceEventKind::RegionOpen, || TraceData::Region { region: id, parent });
        Ok(id)
    }

    /// Inserts a token record built by `make` and adds it to its region.
    pub(super) fn spawn_token<F>(&mut self, make: F) -> Result<TokenId>
    where
        F: FnOnce(TokenId) -> TokenRecord,
    {
        if let Some(limit) = self.config.max_tokens {
            if self.tokens.len() >= limit {
                return Err(Error::resource_exhausted(limit));
            }
        }
        let index = self
            .tokens
            .insert_with(|index| make(TokenId::from_arena(index)));
        let id = TokenId::from_arena(index);
        let region = self
            .tokens
            .get(index)
            .map(|token| token.region)
            .ok_or_else(|| Error::internal("token vanished on insertion").with_token(id))?;
        let added = self
            .regions
            .get_mut(region.arena_index())
            .is_some_and(|record| record.add_token(id));
        if !added {
            self.tokens.remove(index);
            return Err(Error::internal("token spawned into a closed region")
                .with_token(id)
                .with_region(region));
        }
        self.summary.tokens_created += 1;
        self.summary.region_adds += 1;
        self.summary.peak_tokens = self.summary.peak_tokens.max(self.tokens.len());
        trace!(token = %id, region = %region, "token created");
        self.record(TraceEventKind::Fork, || TraceData::Token { token: id, region });
        Ok(id)
    }

    /// Copies `parent` to a new token at `node`, letting `adjust` change the
    /// copy before insertion.
    pub(super) fn fork_token<F>(
        &mut self,
        parent: TokenId,
        node: Arc<Node>,
        adjust: F,
    ) -> Result<TokenId>
    where
        F: FnOnce(&mut TokenRecord),
    {
        let mut seed = self.token(parent)?.fork(node);
        adjust(&mut seed);
        self.spawn_token(|id| TokenRecord { id, ..seed })
    }

    /// Kills a token. Killing a dead token is a no-op.
    pub(super) fn kill(&mut self, id: TokenId) {
        let Some(token) = self.tokens.remove(id.arena_index()) else {
            return;
        };
        trace!(token = %id, region = %token.region, "token died");
        let region = token.region;
        self.record(TraceEventKind::Death, || TraceData::Token { token: id, region });
        self.leave_region(region, Member::Token(id));
    }

    /// Fails a token: reports the error to the sink and kills the token.
    pub(super) fn fail_token(&mut self, id: TokenId, kind: TokenErrorKind) -> Result<()> {
        let token = self.token(id)?;
        let error = TokenError {
            kind,
            token: id,
            location: token.location.clone(),
            backtrace: token.backtrace(),
        };
        warn!(token = %id, error = %error, "token failed");
        self.record(TraceEventKind::Fault, || TraceData::Message(error.render()));
        self.outbox.push_back(SinkEvent::Failed(error));
        self.kill(id);
        Ok(())
    }

    fn leave_region(&mut self, region: RegionId, member: Member) {
        let Some(record) = self.regions.get_mut(region.arena_index()) else {
            return;
        };
        let departure = match member {
            Member::Token(token) => record.remove_token(token),
            Member::Region(child) => record.remove_child(child),
        };
        match departure {
            Departure::Ignored => {}
            Departure::Remaining(_) => self.summary.region_removes += 1,
            Departure::Emptied => {
                self.summary.region_removes += 1;
                self.close_region(region);
            }
        }
    }

    /// Closes a region and, recursively, everything inside it.
    ///
    /// Member tokens die without running any handlers. Each closed region's
    /// hook runs once, innermost regions after their parents. The region is
    /// then removed from its parent, which may close in turn.
    pub(super) fn close_region(&mut self, id: RegionId) {
        let Some(parent) = self
            .regions
            .get(id.arena_index())
            .map(|record| record.parent)
        else {
            return;
        };

        let mut pending = vec![id];
        let mut closed = Vec::new();
        while let Some(current) = pending.pop() {
            let Some(record) = self.regions.get_mut(current.arena_index()) else {
                continue;
            };
            if !record.begin_close() {
                continue;
            }
            let (members, children) = record.take_members();
            self.summary.region_removes += (members.len() + children.len()) as u64;
            for token in members {
                if let Some(dead) = self.tokens.remove(token.arena_index()) {
                    let region = dead.region;
                    self.record(TraceEventKind::Death, || TraceData::Token { token, region });
                }
            }
            pending.extend(children);
            self.run_close_hook(current);
            closed.push(current);
        }
        if closed.is_empty() {
            return;
        }

        for region in closed {
            if let Some(record) = self.regions.remove(region.arena_index()) {
                trace!(region = %region, kind = record.kind.name(), "region closed");
                let parent = record.parent;
                self.record(TraceEventKind::RegionClose, || TraceData::Region { region, parent });
            }
        }
        if let Some(parent) = parent {
            self.leave_region(parent, Member::Region(id));
        }
    }

    fn run_close_hook(&mut self, id: RegionId) {
        let Some(record) = self.regions.get_mut(id.arena_index()) else {
            return;
        };
        let hook = match &mut record.kind {
            RegionKind::Execution => CloseHook::StopRun,
            RegionKind::Pruning { cell } => CloseHook::CloseCell(Arc::clone(cell)),
            RegionKind::Otherwise { pending, published } => {
                match pending.take() {
                    Some(token) if !*published => CloseHook::Release(token),
                    _ => CloseHook::None,
                }
            }
        };

        match hook {
            CloseHook::None => {}
            CloseHook::StopRun => {
                debug!(region = %id, "top-level region closed");
                self.root_closed = true;
            }
            CloseHook::CloseCell(cell) => {
                if let Some(readers) = cell.close() {
                    for reader in readers {
                        self.kill(reader);
                    }
                }
            }
            CloseHook::Release(token) => {
                let released = match self.tokens.get_mut(token.arena_index()) {
                    Some(record) if record.state == TokenState::Held => {
                        record.state = TokenState::Runnable;
                        true
                    }
                    _ => false,
                };
                if released {
                    trace!(token = %token, "otherwise fallback released");
                    self.ready.schedule(token);
                }
            }
        }
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("tokens", &self.tokens.len())
            .field("regions", &self.regions.len())
            .field("ready", &self.ready.len())
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}
