use crate::config::FeedConfig;
use crate::domain::instrument::Instrument;
use crate::domain::market::{FeedMode, Snapshot};
use crate::feed::generator::FeedGenerator;
use crate::feed::publisher::{Observer, Publisher, SubscriptionId};
use crate::ingest::provider::QuoteSource;
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Running,
}

enum Command {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<bool>),
    SetMode(FeedMode, oneshot::Sender<()>),
    Subscribe(Box<dyn Observer>, oneshot::Sender<SubscriptionId>),
    Unsubscribe(SubscriptionId, oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<Snapshot>),
    State(oneshot::Sender<LifecycleState>),
    Shutdown,
}

/// Cloneable handle to a running feed service. All operations are serialised
/// through one task, so ticks never overlap with each other or with mode
/// changes and subscriptions.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<Command>,
}

pub struct FeedService;

impl FeedService {
    /// Spawns the service task in the `Stopped` state. A zero tick period is
    /// replaced by the default one.
    pub fn spawn(
        instruments: Vec<Instrument>,
        config: FeedConfig,
        source: Option<Arc<dyn QuoteSource>>,
    ) -> (FeedHandle, JoinHandle<()>) {
        let period = if config.tick_period.is_zero() {
            let fallback = FeedConfig::default().tick_period;
            tracing::warn!(period = ?fallback, "zero tick period configured; using default");
            fallback
        } else {
            config.tick_period
        };

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = FeedActor {
            generator: FeedGenerator::new(instruments, &config, source),
            publisher: Publisher::new(),
            state: LifecycleState::Stopped,
            timer: None,
            period,
        };
        let join = tokio::spawn(actor.run(rx));
        (FeedHandle { tx }, join)
    }
}

impl FeedHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| anyhow!("feed service has shut down"))?;
        reply_rx.await.context("feed service dropped the reply")
    }

    /// Runs one tick+notify cycle and arms the periodic timer. Returns `false`
    /// (and does nothing) when already running.
    pub async fn start(&self) -> anyhow::Result<bool> {
        self.request(Command::Start).await
    }

    /// Disarms the timer. Returns `false` when already stopped.
    pub async fn stop(&self) -> anyhow::Result<bool> {
        self.request(Command::Stop).await
    }

    /// Switches data sourcing and publishes one out-of-band tick.
    pub async fn set_mode(&self, mode: FeedMode) -> anyhow::Result<()> {
        self.request(|reply| Command::SetMode(mode, reply)).await
    }

    pub async fn subscribe(&self, observer: impl Observer + 'static) -> anyhow::Result<SubscriptionId> {
        let observer: Box<dyn Observer> = Box::new(observer);
        self.request(|reply| Command::Subscribe(observer, reply)).await
    }

    /// Subscribes an unbounded channel; the first snapshot is already queued
    /// when this returns.
    pub async fn subscribe_channel(
        &self,
    ) -> anyhow::Result<(SubscriptionId, mpsc::UnboundedReceiver<Snapshot>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(tx).await?;
        Ok((id, rx))
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> anyhow::Result<bool> {
        self.request(|reply| Command::Unsubscribe(id, reply)).await
    }

    pub async fn snapshot(&self) -> anyhow::Result<Snapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn state(&self) -> anyhow::Result<LifecycleState> {
        self.request(Command::State).await
    }

    /// Stops the service task. Further calls on any handle fail.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| anyhow!("feed service has shut down"))
    }
}

struct FeedActor {
    generator: FeedGenerator,
    publisher: Publisher,
    state: LifecycleState,
    // At most one armed timer; `None` while stopped.
    timer: Option<Interval>,
    period: Duration,
}

impl FeedActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!(mode = %self.generator.mode(), period = ?self.period, "feed service ready");
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd).await {
                        break;
                    }
                }
                _ = next_tick(&mut self.timer) => {
                    self.cycle().await;
                }
            }
        }
        tracing::info!(ticks = self.generator.ticks(), "feed service stopped");
    }

    /// Returns `false` when the loop should exit.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start(reply) => {
                let started = self.start().await;
                let _ = reply.send(started);
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop());
            }
            Command::SetMode(mode, reply) => {
                tracing::info!(from = %self.generator.mode(), to = %mode, "feed mode changed");
                self.generator.set_mode(mode);
                self.cycle().await;
                let _ = reply.send(());
            }
            Command::Subscribe(observer, reply) => {
                let current = self.generator.snapshot(Utc::now());
                let id = self.publisher.subscribe(observer, current);
                let _ = reply.send(id);
            }
            Command::Unsubscribe(id, reply) => {
                let _ = reply.send(self.publisher.unsubscribe(id));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.generator.snapshot(Utc::now()));
            }
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
            Command::Shutdown => {
                self.stop();
                return false;
            }
        }
        true
    }

    async fn start(&mut self) -> bool {
        if self.state == LifecycleState::Running {
            return false;
        }

        self.cycle().await;

        let mut timer = tokio::time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        self.state = LifecycleState::Running;
        tracing::info!(period = ?self.period, "feed started");
        true
    }

    fn stop(&mut self) -> bool {
        self.timer = None;
        if self.state == LifecycleState::Stopped {
            return false;
        }
        self.state = LifecycleState::Stopped;
        tracing::info!("feed stopped");
        true
    }

    async fn cycle(&mut self) {
        self.generator.tick(Utc::now()).await;
        let snapshot = self.generator.snapshot(Utc::now());
        let delivered = self.publisher.notify(&snapshot);
        tracing::debug!(sequence = snapshot.sequence, delivered, "snapshot published");
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
