//! Tokio driver around [`RoundManager`].
//!
//! A single task owns the manager. It `select!`s over incoming commands,
//! finished verifications (a [`JoinSet`]) and a sleep until the manager's
//! next deadline. Submissions go through an outbox to a single sender task,
//! so the sink sees them in emission order and never blocks the loop.

use std::sync::Arc;
use std::time::Duration;

use attest_primitives::{AttestationRequest, Verification};
use attest_round::Submission;
use attest_scheduler::{Dispatch, VerifierError};
use rand_core::{CryptoRng, OsRng, RngCore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, info_span, Instrument};

use crate::clock::Clock;
use crate::config::AttesterConfig;
use crate::errors::ClientError;
use crate::manager::RoundManager;
use crate::verifier::{SubmissionSink, Verifier};

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_CAPACITY: usize = 1024;

type Completed = (Dispatch, Result<Verification, VerifierError>);

enum Command {
    Event(AttestationRequest, oneshot::Sender<Result<(), ClientError>>),
    Shutdown,
}

/// Sending side of a running client.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Route one chain event. Resolves once the event is admitted or rejected.
    pub async fn send_event(&self, request: AttestationRequest) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Event(request, reply))
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Stop the driver. In-flight verifications are aborted.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.tx.send(Command::Shutdown).await.map_err(|_| ClientError::ChannelClosed)
    }
}

pub struct AttesterClient<V, S, C, R = OsRng> {
    manager: RoundManager,
    verifier: Arc<V>,
    sink: Arc<S>,
    clock: C,
    rng: R,
    verify_timeout: Duration,
    label: Option<String>,
}

impl<V, S, C> AttesterClient<V, S, C, OsRng>
where
    V: Verifier,
    S: SubmissionSink,
    C: Clock,
{
    pub fn new(manager: RoundManager, verifier: Arc<V>, sink: Arc<S>, clock: C) -> Self {
        Self {
            manager,
            verifier,
            sink,
            clock,
            rng: OsRng,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            label: None,
        }
    }

    pub fn from_config(config: &AttesterConfig, verifier: Arc<V>, sink: Arc<S>, clock: C) -> Self {
        let mut client = Self::new(RoundManager::from_config(config), verifier, sink, clock);
        client.label.clone_from(&config.label);
        client
    }
}

impl<V, S, C, R> AttesterClient<V, S, C, R>
where
    V: Verifier,
    S: SubmissionSink,
    C: Clock,
    R: RngCore + CryptoRng + Send + 'static,
{
    /// Replace the nonce source (deterministic RNGs in tests).
    pub fn with_rng<R2>(self, rng: R2) -> AttesterClient<V, S, C, R2> {
        AttesterClient {
            manager: self.manager,
            verifier: self.verifier,
            sink: self.sink,
            clock: self.clock,
            rng,
            verify_timeout: self.verify_timeout,
            label: self.label,
        }
    }

    #[must_use]
    pub const fn with_verify_timeout(mut self, verify_timeout: Duration) -> Self {
        self.verify_timeout = verify_timeout;
        self
    }

    /// Spawn the driver on the current tokio runtime. The join handle yields
    /// the manager after shutdown.
    pub fn start(self) -> (ClientHandle, JoinHandle<RoundManager>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let span = info_span!("attester", label = self.label.as_deref().unwrap_or("none"));
        let task = tokio::spawn(self.run(rx).instrument(span));
        (ClientHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) -> RoundManager {
        let mut in_flight: JoinSet<Completed> = JoinSet::new();
        let (outbox, queued) = mpsc::unbounded_channel();
        let sender = tokio::spawn(send_submissions(Arc::clone(&self.sink), queued).in_current_span());
        info!("attester client started");
        loop {
            let now = self.clock.now_ms();
            let advance = self.manager.advance(now, &mut self.rng);
            for submission in advance.submissions {
                if outbox.send(submission).is_err() {
                    error!("submission sender stopped, dropping submission");
                }
            }
            self.verify(&mut in_flight, advance.dispatches);

            let wake = self
                .manager
                .next_deadline()
                .map(|at| Instant::now() + Duration::from_millis(at.saturating_sub(now)));

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Event(request, reply)) => {
                        let routed = self.manager.route_event(request, self.clock.now_ms());
                        let result = routed.map(|dispatches| self.verify(&mut in_flight, dispatches));
                        if let Err(err) = &result {
                            debug!(%err, "event rejected");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => match joined {
                    Ok((d, result)) => {
                        let dispatches = self.manager.on_verified(
                            d.source_id,
                            d.attestation_id,
                            d.attempt,
                            result,
                            self.clock.now_ms(),
                        );
                        self.verify(&mut in_flight, dispatches);
                    }
                    Err(err) => error!(%err, "verification task failed"),
                },
                () = async {
                    match wake {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {}
            }
        }
        in_flight.abort_all();
        drop(outbox);
        if let Err(err) = sender.await {
            error!(%err, "submission sender failed");
        }
        info!("attester client stopped");
        self.manager
    }

    fn verify(&self, in_flight: &mut JoinSet<Completed>, dispatches: Vec<Dispatch>) {
        for d in dispatches {
            let verifier = Arc::clone(&self.verifier);
            let limit = self.verify_timeout;
            in_flight.spawn(async move {
                let result = match timeout(limit, verifier.verify(d.source_id, &d.request)).await {
                    Ok(result) => result,
                    Err(_) => Err(VerifierError::Timeout(
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    )),
                };
                (d, result)
            });
        }
    }
}

/// Hand submissions to the sink one at a time, in the order they were queued.
async fn send_submissions<S: SubmissionSink>(sink: Arc<S>, mut queued: mpsc::UnboundedReceiver<Submission>) {
    while let Some(submission) = queued.recv().await {
        let round = submission.round_id;
        let kind = submission.kind;
        if let Err(err) = sink.submit(submission).await {
            error!(round, ?kind, %err, "submission failed");
        }
    }
}
