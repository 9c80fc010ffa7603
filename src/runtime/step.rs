//! Token stepping: what one runnable token does at its current position.
//!
//! A token either evaluates the node it sits at or, if it holds a result,
//! delivers that result through its continuation frames. Each step runs to
//! a suspension point (parking, a site call, death) or reschedules the token.

use crate::error::{Error, Result, TokenErrorKind};
use crate::graph::{Arg, Binder, Def, Node};
use crate::record::{
    CallChain, Frame, FutureCell, Position, ReadOutcome, RegionKind, Stack, TokenRecord, TokenState,
};
use crate::runtime::engine::Engine;
use crate::runtime::resume::{ResumeKind, Resumption};
use crate::runtime::sink::SinkEvent;
use crate::site::{CallHandle, LetSite, Site};
use crate::trace::{TraceData, TraceEventKind};
use crate::tracing_compat::{debug, trace};
use crate::types::{Binding, Closure, Env, RegionId, TokenId, Value};
use std::sync::Arc;

/// The innermost handler a raised exception reaches.
struct CatchTarget {
    handler: Arc<Node>,
    env: Env,
    region: RegionId,
    callers: CallChain,
    rest: Stack,
}

/// Finds the nearest lexically enclosing `Catch` frame whose region is
/// still open.
///
/// At a `Return` frame the search leaves the caller's frames and continues
/// in the frames where the returning closure was defined.
fn find_handler<F>(stack: &Stack, open: F) -> Option<CatchTarget>
where
    F: Fn(RegionId) -> bool,
{
    let mut cursor = stack;
    while let Some((frame, rest)) = cursor.top() {
        match frame {
            Frame::Catch {
                handler,
                env,
                region,
                callers,
            } if open(*region) => {
                return Some(CatchTarget {
                    handler: Arc::clone(handler),
                    env: env.clone(),
                    region: *region,
                    callers: callers.clone(),
                    rest: rest.clone(),
                });
            }
            Frame::Return { scope, .. } => cursor = scope,
            _ => cursor = rest,
        }
    }
    None
}

/// Binds every definition of a group as a closure over `env` and the
/// handler frames in `scope`, first definition outermost.
fn bind_group(defs: &Arc<[Def]>, env: &Env, scope: &Stack) -> Env {
    (0..defs.len()).fold(env.clone(), |bound, index| {
        bound.extend_value(Value::Closure(Arc::new(Closure {
            defs: Arc::clone(defs),
            index,
            env: env.clone(),
            scope: scope.clone(),
        })))
    })
}

impl Engine {
    /// Steps one token popped from the ready queue.
    pub(super) fn step(&mut self, id: TokenId) -> Result<()> {
        let Some(token) = self.tokens.get(id.arena_index()) else {
            // Killed by a region close while queued.
            return Ok(());
        };
        if token.state != TokenState::Runnable {
            return Err(Error::internal(format!(
                "stepped a token in state {:?}",
                token.state
            ))
            .with_token(id));
        }
        let position = token.position.clone();
        self.summary.steps += 1;
        match position {
            Position::At(node) => {
                let kind = node.kind();
                trace!(token = %id, node = kind, "step");
                self.record(TraceEventKind::Step, || TraceData::Node { token: id, node: kind });
                self.eval(id, &node)
            }
            Position::Publishing => self.deliver(id),
        }
    }

    fn eval(&mut self, id: TokenId, node: &Arc<Node>) -> Result<()> {
        match &**node {
            Node::Stop => {
                self.kill(id);
                Ok(())
            }
            Node::Let(args) => {
                let Some(values) = self.resolve_all(id, args)? else {
                    return Ok(());
                };
                self.token_mut(id)?.publish(LetSite::collapse(values));
                self.deliver(id)
            }
            Node::Call { target, args } => self.call(id, target, args),
            Node::Parallel(left, right) => {
                let forked = self.fork_token(id, Arc::clone(right), |_| {})?;
                self.token_mut(id)?.move_to(Arc::clone(left));
                self.ready.schedule(id);
                self.ready.schedule(forked);
                Ok(())
            }
            Node::Sequential {
                left,
                binder,
                right,
            } => {
                let token = self.token_mut(id)?;
                let frame = Frame::Sequential {
                    binder: binder.clone(),
                    right: Arc::clone(right),
                    env: token.env.clone(),
                };
                token.stack = token.stack.push(frame);
                token.move_to(Arc::clone(left));
                self.ready.schedule(id);
                Ok(())
            }
            Node::Pruning {
                target,
                binder,
                source,
            } => self.prune(id, target, binder, source),
            Node::Otherwise(left, right) => self.otherwise(id, left, right),
            Node::Throw(arg) => {
                let Some(value) = self.resolve(id, arg)? else {
                    return Ok(());
                };
                self.raise(id, value)
            }
            Node::Catch { body, handler } => {
                let token = self.token_mut(id)?;
                let frame = Frame::Catch {
                    handler: Arc::clone(handler),
                    env: token.env.clone(),
                    region: token.region,
                    callers: token.callers.clone(),
                };
                token.stack = token.stack.push(frame);
                token.move_to(Arc::clone(body));
                self.ready.schedule(id);
                Ok(())
            }
            Node::Defs { defs, body } => {
                let token = self.token_mut(id)?;
                token.env = bind_group(defs, &token.env, &token.stack);
                token.move_to(Arc::clone(body));
                self.ready.schedule(id);
                Ok(())
            }
            Node::WithLocation { location, body } => {
                let token = self.token_mut(id)?;
                token.location = Some(location.clone());
                token.move_to(Arc::clone(body));
                self.ready.schedule(id);
                Ok(())
            }
        }
    }

    /// `target <x< source`: the source runs in a fresh pruning region while
    /// the original token parks on the future its first publication binds.
    fn prune(
        &mut self,
        id: TokenId,
        target: &Arc<Node>,
        binder: &Binder,
        source: &Arc<Node>,
    ) -> Result<()> {
        let parent = self.token(id)?.region;
        let cell = Arc::new(FutureCell::new());
        let region = self.open_region(
            Some(parent),
            RegionKind::Pruning {
                cell: Arc::clone(&cell),
            },
        )?;
        let frame = Frame::Prune {
            region,
            cell: Arc::clone(&cell),
        };
        let producer = self.fork_token(id, Arc::clone(source), |seed| {
            seed.region = region;
            seed.stack = seed.stack.push(frame);
        })?;

        let token = self.token_mut(id)?;
        if binder.binds() {
            token.env = token.env.extend(Binding::Future(Arc::clone(&cell)));
        }
        token.move_to(Arc::clone(target));
        if cell.read(id) != ReadOutcome::Parked {
            return Err(Error::internal("fresh pruning future was not unbound")
                .with_token(id)
                .with_region(region));
        }
        token.state = TokenState::OnFuture;
        self.record(TraceEventKind::Park, || TraceData::Token { token: id, region: parent });
        self.ready.schedule(producer);
        Ok(())
    }

    /// `left ; right`: the left side runs in a fresh region; the original
    /// token is held at `right` until that region closes without a
    /// publication.
    fn otherwise(&mut self, id: TokenId, left: &Arc<Node>, right: &Arc<Node>) -> Result<()> {
        let parent = self.token(id)?.region;
        let region = self.open_region(
            Some(parent),
            RegionKind::Otherwise {
                pending: Some(id),
                published: false,
            },
        )?;
        let first = self.fork_token(id, Arc::clone(left), |seed| {
            seed.region = region;
            seed.stack = seed.stack.push(Frame::Otherwise { region });
        })?;
        let token = self.token_mut(id)?;
        token.move_to(Arc::clone(right));
        token.state = TokenState::Held;
        self.ready.schedule(first);
        Ok(())
    }

    fn call(&mut self, id: TokenId, target: &Arg, args: &[Arg]) -> Result<()> {
        let Some(callee) = self.resolve(id, target)? else {
            return Ok(());
        };
        let Some(values) = self.resolve_all(id, args)? else {
            return Ok(());
        };
        match callee {
            Value::Site(site) => self.invoke_site(id, &site, values),
            Value::Closure(closure) => self.enter_closure(id, &closure, values),
            other => self.fail_token(id, TokenErrorKind::Uncallable { value: other }),
        }
    }

    fn invoke_site(&mut self, id: TokenId, site: &Arc<dyn Site>, args: Vec<Value>) -> Result<()> {
        let token = self.token_mut(id)?;
        token.state = TokenState::OnCall;
        let region = token.region;
        let name: Arc<str> = Arc::from(site.name());
        trace!(token = %id, site = %name, args = args.len(), "site call");
        self.record(TraceEventKind::Call, || TraceData::Token { token: id, region });
        let handle = CallHandle::new(id, name, Arc::clone(&self.shared), self.pool.handle());
        site.call(args, handle);
        Ok(())
    }

    fn enter_closure(&mut self, id: TokenId, closure: &Closure, args: Vec<Value>) -> Result<()> {
        let def = closure.def();
        if def.arity != args.len() {
            return self.fail_token(
                id,
                TokenErrorKind::ArityMismatch {
                    callee: Arc::clone(&def.name),
                    expected: def.arity,
                    actual: args.len(),
                },
            );
        }
        let scope = args
            .into_iter()
            .fold(bind_group(&closure.defs, &closure.env, &closure.scope), |env, arg| {
                env.extend_value(arg)
            });
        let token = self.token_mut(id)?;
        let frame = Frame::Return {
            env: token.env.clone(),
            callers: token.callers.clone(),
            scope: closure.scope.clone(),
        };
        token.stack = token.stack.push(frame);
        token.callers = token
            .callers
            .push(Arc::clone(&def.name), token.location.clone());
        token.env = scope;
        token.move_to(Arc::clone(&def.body));
        self.ready.schedule(id);
        Ok(())
    }

    /// Resolves one argument.
    ///
    /// `Ok(None)` means the token can't continue this step: it parked on an
    /// unbound future, died on a closed one, or failed.
    fn resolve(&mut self, id: TokenId, arg: &Arg) -> Result<Option<Value>> {
        let index = match arg {
            Arg::Value(value) => return Ok(Some(value.clone())),
            Arg::Var(index) => *index,
        };
        let token = self.token(id)?;
        let binding = token.env.lookup(index).cloned();
        let depth = token.env.len();
        let region = token.region;
        match binding {
            None => {
                self.fail_token(id, TokenErrorKind::UnboundVariable { index, depth })?;
                Ok(None)
            }
            Some(Binding::Value(value)) => Ok(Some(value)),
            Some(Binding::Future(cell)) => match cell.read(id) {
                ReadOutcome::Ready(value) => Ok(Some(value)),
                ReadOutcome::Parked => {
                    self.token_mut(id)?.state = TokenState::OnFuture;
                    trace!(token = %id, "parked on future");
                    self.record(TraceEventKind::Park, || TraceData::Token { token: id, region });
                    Ok(None)
                }
                ReadOutcome::Closed => {
                    trace!(token = %id, "read a closed future");
                    self.kill(id);
                    Ok(None)
                }
            },
        }
    }

    fn resolve_all(&mut self, id: TokenId, args: &[Arg]) -> Result<Option<Vec<Value>>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.resolve(id, arg)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }

    /// Delivers the token's result to its innermost frame, unwinding frames
    /// that only observe the value on its way out.
    pub(super) fn deliver(&mut self, id: TokenId) -> Result<()> {
        loop {
            let token = self.token_mut(id)?;
            let Some(value) = token.result.take() else {
                return Err(Error::internal("delivering without a result").with_token(id));
            };
            let Some((frame, rest)) = token
                .stack
                .top()
                .map(|(frame, rest)| (frame.clone(), rest.clone()))
            else {
                return self.publish_top_level(id, value);
            };
            token.stack = rest;

            match frame {
                Frame::Sequential { binder, right, env } => {
                    token.env = if binder.binds() {
                        env.extend_value(value)
                    } else {
                        env
                    };
                    token.move_to(right);
                    self.ready.schedule(id);
                    return Ok(());
                }
                Frame::Prune { region, cell } => {
                    if let Some(readers) = cell.bind(value) {
                        for reader in readers {
                            self.shared.push(Resumption::new(reader, ResumeKind::Wake));
                        }
                    }
                    trace!(token = %id, region = %region, "pruned");
                    self.close_region(region);
                    self.kill(id);
                    return Ok(());
                }
                Frame::Otherwise { region } => {
                    token.result = Some(value);
                    if let Some(fallback) = self.mark_published(region) {
                        self.kill(fallback);
                    }
                }
                Frame::Catch { .. } => token.result = Some(value),
                Frame::Return { env, callers, .. } => {
                    token.env = env;
                    token.callers = callers;
                    token.result = Some(value);
                }
            }
        }
    }

    /// Records that an otherwise region published, returning the held
    /// fallback token the first time.
    fn mark_published(&mut self, region: RegionId) -> Option<TokenId> {
        let record = self.regions.get_mut(region.arena_index())?;
        match &mut record.kind {
            RegionKind::Otherwise { pending, published } => {
                *published = true;
                pending.take()
            }
            _ => None,
        }
    }

    fn publish_top_level(&mut self, id: TokenId, value: Value) -> Result<()> {
        let limit = self.config.max_publications.map(|limit| limit as u64);
        if limit.is_some_and(|limit| self.summary.publications >= limit) {
            trace!(token = %id, "publication over the limit dropped");
            self.kill(id);
            self.shared.request_terminate();
            return Ok(());
        }

        self.summary.publications += 1;
        debug!(token = %id, value = %value, "published");
        let recorded = value.clone();
        self.record(TraceEventKind::Publish, || TraceData::Value(recorded));
        self.outbox.push_back(SinkEvent::Published(value));
        self.kill(id);

        if limit.is_some_and(|limit| self.summary.publications >= limit) {
            debug!(limit = ?limit, "publication limit reached");
            self.shared.request_terminate();
        }
        Ok(())
    }

    /// Raises `value` from token `id`.
    ///
    /// The nearest lexically enclosing handler gets a fresh token in the
    /// handler's own region; the thrower dies after the handler exists, so
    /// the region cannot close in between. Handlers whose region has already
    /// closed are skipped. An exception with no open handler is uncaught.
    fn raise(&mut self, id: TokenId, value: Value) -> Result<()> {
        let token = self.token(id)?;
        let location = token.location.clone();
        let regions = &self.regions;
        let open = |region: RegionId| {
            regions
                .get(region.arena_index())
                .is_some_and(|record| record.is_open())
        };
        let Some(target) = find_handler(&token.stack, open) else {
            return self.fail_token(id, TokenErrorKind::UncaughtException { value });
        };
        trace!(token = %id, region = %target.region, "exception caught");
        let CatchTarget {
            handler,
            env,
            region,
            callers,
            rest,
        } = target;
        let env = env.extend_value(value);
        let catcher = self.spawn_token(|catcher| {
            let mut record = TokenRecord::new(catcher, region, handler, env);
            record.stack = rest;
            record.callers = callers;
            record.location = location;
            record
        })?;
        self.ready.schedule(catcher);
        self.kill(id);
        Ok(())
    }
}
