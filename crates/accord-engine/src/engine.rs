//! Negotiation orchestration
//!
//! [`NegotiationEngine`] drives a demand through formulation, resonance
//! matching, parallel offer collection behind a wait-barrier, gap
//! analysis, and recursive decomposition, publishing a protocol event at
//! every stage. Sessions advance through a strict state machine; the two
//! terminal states are never left.

use crate::barrier::{BarrierOutcome, OfferBarrier, ResponseOutcome};
use crate::collaborators::{
    AgentInvoker, DurableStore, FormulationProvider, HeuristicFormulator, NullStore,
    OfferRequest,
};
use crate::config::{EngineConfig, MatchSettings};
use crate::error::{EngineError, EngineResult};
use crate::gaps::{create_sub_demands, GapAnalyzer};
use crate::sessions::SessionMap;
use accord_events::{BusStats, EventBus, EventFilter, StreamRelay, StreamTransport};
use accord_health::{
    AgentProbe, AlwaysReachableProbe, HealthError, HealthEvent, HealthMonitor,
};
use accord_registry::{
    AgentDescriptor, AgentLoader, AgentRegistration, AgentRegistry, RegisterOutcome,
    RegistrySnapshot, StaticLoader,
};
use accord_signal::{find_resonant_agents, EmbeddingProvider, HashEmbedder, HypervectorEncoder};
use accord_types::{
    ActivatedAgent, AgentHealth, AgentId, Demand, DemandId, DemandPreferences, FailureReason,
    Formulation, GapAnalysis, NegotiationId, NegotiationSession, NegotiationStatus, Offer,
    ProbeReport, ProtocolEvent, ProtocolEventEnvelope, RecommendedAction, SceneId, SubscriptionId,
    UserAction,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// A demand entering the engine, with optional per-demand overrides of
/// the configured matching defaults.
#[derive(Debug, Clone)]
pub struct DemandSubmission {
    pub scene_id: SceneId,
    pub text: String,
    pub context: BTreeMap<String, String>,
    pub preferences: DemandPreferences,
    pub resonance_threshold: Option<f64>,
    pub activation_limit: Option<usize>,
}

impl DemandSubmission {
    pub fn new(scene_id: SceneId, text: impl Into<String>) -> Self {
        Self {
            scene_id,
            text: text.into(),
            context: BTreeMap::new(),
            preferences: DemandPreferences::default(),
            resonance_threshold: None,
            activation_limit: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_preferences(mut self, preferences: DemandPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_resonance_threshold(mut self, threshold: f64) -> Self {
        self.resonance_threshold = Some(threshold);
        self
    }

    pub fn with_activation_limit(mut self, limit: usize) -> Self {
        self.activation_limit = Some(limit);
        self
    }
}

/// What a submission returns: the session id plus the formulation now
/// waiting at the confirmation gate.
#[derive(Debug, Clone)]
pub struct DemandReceipt {
    pub negotiation_id: NegotiationId,
    pub demand_id: DemandId,
    pub formulation: Formulation,
}

/// Terminal summary of a negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub negotiation_id: NegotiationId,
    pub status: NegotiationStatus,
    pub activated_agents: Vec<ActivatedAgent>,
    pub offers: Vec<Offer>,
    pub gap_analysis: Option<GapAnalysis>,
    pub sub_negotiations: Vec<NegotiationId>,
    pub failure: Option<FailureReason>,
}

impl NegotiationOutcome {
    fn from_session(session: &NegotiationSession) -> Self {
        Self {
            negotiation_id: session.id,
            status: session.status,
            activated_agents: session.activated_agents.clone(),
            offers: session.offers.clone(),
            gap_analysis: session.gap_analysis.clone(),
            sub_negotiations: session.sub_negotiations.clone(),
            failure: session.failure,
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    encoder: Arc<HypervectorEncoder>,
    registry: AgentRegistry,
    health: Arc<HealthMonitor>,
    bus: Arc<EventBus>,
    sessions: SessionMap,

    /// Per-negotiation matching knobs, removed when the session goes
    /// terminal
    match_settings: DashMap<NegotiationId, MatchSettings>,

    gaps: GapAnalyzer,
    formulator: Arc<dyn FormulationProvider>,
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<dyn DurableStore>,
    shutting_down: AtomicBool,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

/// The negotiation engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct NegotiationEngine {
    inner: Arc<EngineInner>,
}

/// Assembles an engine from its collaborators.
///
/// Only the invoker is mandatory. Everything else defaults to the
/// offline implementations, so a test or a single-process deployment
/// needs no external services.
pub struct EngineBuilder {
    config: EngineConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    formulator: Arc<dyn FormulationProvider>,
    invoker: Arc<dyn AgentInvoker>,
    loader: Arc<dyn AgentLoader>,
    probe: Arc<dyn AgentProbe>,
    store: Arc<dyn DurableStore>,
}

impl EngineBuilder {
    fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self {
            config: EngineConfig::default(),
            embedder: None,
            formulator: Arc::new(HeuristicFormulator),
            invoker,
            loader: Arc::new(StaticLoader::empty()),
            probe: Arc::new(AlwaysReachableProbe),
            store: Arc::new(NullStore),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn formulator(mut self, formulator: Arc<dyn FormulationProvider>) -> Self {
        self.formulator = formulator;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn AgentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn AgentProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = store;
        self
    }

    /// Fails when a supplied embedder does not match the configured
    /// embedding dimension.
    pub fn build(self) -> EngineResult<NegotiationEngine> {
        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashEmbedder::new(self.config.signal.embedding_dimension)));
        let encoder = Arc::new(HypervectorEncoder::new(&self.config.signal, embedder)?);
        let health = Arc::new(HealthMonitor::new(self.config.health.clone(), self.probe));
        let registry = AgentRegistry::new(encoder.clone(), health.clone(), self.loader);
        let bus = Arc::new(EventBus::new(self.config.events.clone()));
        let gaps = GapAnalyzer::new(self.config.gaps.clone());

        Ok(NegotiationEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                encoder,
                registry,
                health,
                bus,
                sessions: SessionMap::new(),
                match_settings: DashMap::new(),
                gaps,
                formulator: self.formulator,
                invoker: self.invoker,
                store: self.store,
                shutting_down: AtomicBool::new(false),
                forwarder: Mutex::new(None),
            }),
        })
    }
}

impl NegotiationEngine {
    pub fn builder(invoker: Arc<dyn AgentInvoker>) -> EngineBuilder {
        EngineBuilder::new(invoker)
    }

    /// Load the initial agent population and start forwarding health
    /// status changes onto the event bus. Idempotent.
    pub async fn initialize(&self) -> EngineResult<()> {
        self.ensure_running()?;
        self.inner.registry.initialize().await?;

        let mut forwarder = self.inner.forwarder.lock().await;
        if forwarder.is_none() {
            let engine = self.clone();
            let rx = self.inner.health.subscribe();
            *forwarder = Some(tokio::spawn(forward_health_events(engine, rx)));
        }
        Ok(())
    }

    /// Upsert an agent registration and announce it.
    pub async fn register_agent(
        &self,
        registration: AgentRegistration,
    ) -> EngineResult<RegisterOutcome> {
        self.ensure_running()?;
        let outcome = self.inner.registry.register(registration).await?;
        self.emit(ProtocolEvent::AgentRegistered {
            agent_id: outcome.descriptor.id.clone(),
            refreshed: outcome.refreshed,
        })
        .await;
        Ok(outcome)
    }

    /// Create a session for the demand, run formulation, and stop at the
    /// confirmation gate.
    pub async fn submit_demand(&self, submission: DemandSubmission) -> EngineResult<DemandReceipt> {
        self.ensure_running()?;
        let settings = MatchSettings {
            resonance_threshold: submission
                .resonance_threshold
                .unwrap_or(self.inner.config.negotiation.resonance_threshold),
            activation_limit: submission
                .activation_limit
                .unwrap_or(self.inner.config.negotiation.activation_limit),
        };

        let mut demand = Demand::new(submission.scene_id, submission.text)
            .with_preferences(submission.preferences);
        demand.context = submission.context;

        self.open_session(demand, 0, settings).await
    }

    /// Session creation shared by user submissions and sub-demands.
    async fn open_session(
        &self,
        demand: Demand,
        depth: u32,
        settings: MatchSettings,
    ) -> EngineResult<DemandReceipt> {
        let mut session = NegotiationSession::with_depth(demand, depth);
        let negotiation_id = session.id;
        self.inner.match_settings.insert(negotiation_id, settings);

        let formulation = match self.inner.formulator.formulate(&session.demand).await {
            Ok(formulation) => formulation,
            Err(err) => {
                tracing::warn!(
                    negotiation_id = %negotiation_id,
                    error = %err,
                    "formulation failed, falling back to raw demand text"
                );
                Formulation {
                    enriched_text: session.demand.text.clone(),
                    keywords: Vec::new(),
                    confidence: self.inner.config.negotiation.fallback_confidence,
                    fell_back: true,
                }
            }
        };
        session.formulation = Some(formulation.clone());

        tracing::info!(negotiation_id = %negotiation_id, depth, "negotiation opened");
        self.inner.sessions.insert(session.clone());

        self.emit_for(
            &session,
            ProtocolEvent::DemandSubmitted {
                negotiation_id,
                demand_id: session.demand.id,
                scene_id: session.scene_id.clone(),
                text: session.demand.text.clone(),
            },
        )
        .await;
        self.emit_for(
            &session,
            ProtocolEvent::FormulationCompleted {
                negotiation_id,
                enriched_text: formulation.enriched_text.clone(),
                keywords: formulation.keywords.clone(),
                confidence: formulation.confidence,
                fell_back: formulation.fell_back,
            },
        )
        .await;
        self.persist(&session).await;

        Ok(DemandReceipt {
            negotiation_id,
            demand_id: session.demand.id,
            formulation,
        })
    }

    /// Confirm the formulation and run the negotiation to a terminal
    /// state. An edit replaces the enriched text before encoding.
    ///
    /// The gate is atomic: a second confirmation of the same session
    /// fails with an invalid transition.
    pub async fn confirm_formulation(
        &self,
        negotiation_id: NegotiationId,
        edited_text: Option<String>,
    ) -> EngineResult<NegotiationOutcome> {
        self.ensure_running()?;
        let session = self.inner.sessions.try_update(&negotiation_id, |session| {
            if session.status != NegotiationStatus::Formulating {
                return Err(EngineError::InvalidTransition {
                    negotiation_id,
                    from: session.status,
                    to: NegotiationStatus::Resonating,
                });
            }
            if let Some(text) = &edited_text {
                if let Some(formulation) = session.formulation.as_mut() {
                    formulation.enriched_text = text.clone();
                }
            }
            session.status = NegotiationStatus::Resonating;
            Ok(session.clone())
        })?;

        self.emit_for(&session, ProtocolEvent::FormulationConfirmed { negotiation_id })
            .await;
        self.persist(&session).await;

        self.run_negotiation(negotiation_id).await
    }

    /// Run the pipeline from `Resonating` to a terminal state.
    async fn run_negotiation(
        &self,
        negotiation_id: NegotiationId,
    ) -> EngineResult<NegotiationOutcome> {
        let session = self.session(negotiation_id)?;
        let settings = self.settings_for(negotiation_id);

        let demand_signal = match self.inner.encoder.encode(session.effective_text()).await {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(
                    negotiation_id = %negotiation_id,
                    error = %err,
                    "demand encoding failed"
                );
                return self.fail(negotiation_id, FailureReason::EmbeddingUnavailable).await;
            }
        };

        let snapshot = self.inner.registry.snapshot();
        let activated = find_resonant_agents(
            &demand_signal,
            snapshot.candidates(),
            settings.resonance_threshold,
            settings.activation_limit,
        );
        if activated.is_empty() {
            tracing::info!(
                negotiation_id = %negotiation_id,
                threshold = settings.resonance_threshold,
                candidates = snapshot.len(),
                "no agent cleared the resonance threshold"
            );
            return self.fail(negotiation_id, FailureReason::NoResonantAgents).await;
        }
        tracing::info!(
            negotiation_id = %negotiation_id,
            activated = activated.len(),
            "resonance activation"
        );

        let session = self.inner.sessions.update(&negotiation_id, |session| {
            session.activated_agents = activated.clone();
            session.clone()
        })?;
        self.emit_for(
            &session,
            ProtocolEvent::ResonanceActivated {
                negotiation_id,
                activated: activated.clone(),
            },
        )
        .await;

        self.transition(negotiation_id, NegotiationStatus::CollectingOffers)
            .await?;
        let collected = self.collect_offers(&session, &snapshot, &activated).await;

        let session = self.inner.sessions.update(&negotiation_id, |session| {
            session.offers = collected.offers.clone();
            session.clone()
        })?;
        self.emit_for(
            &session,
            ProtocolEvent::BarrierCompleted {
                negotiation_id,
                collected: session.offers.len(),
                unresponsive: collected.unresponsive.len(),
                timed_out: collected.timed_out,
            },
        )
        .await;

        let mut analysis = self.inner.gaps.analyze(
            negotiation_id,
            &session.demand,
            session.formulation.as_ref(),
            &session.offers,
        );
        if analysis.recommended_action == RecommendedAction::Recursive
            && session.depth >= self.inner.config.negotiation.max_recursion_depth
        {
            tracing::warn!(
                negotiation_id = %negotiation_id,
                depth = session.depth,
                "recursion depth cap reached, downgrading to deliver with gap"
            );
            analysis.recommended_action = RecommendedAction::DeliverWithGap;
        }

        let session = self.inner.sessions.update(&negotiation_id, |session| {
            session.gap_analysis = Some(analysis.clone());
            session.clone()
        })?;
        self.emit_for(
            &session,
            ProtocolEvent::GapsIdentified {
                negotiation_id,
                gap_count: analysis.gaps.len(),
                high_severity: analysis.high_severity_count(),
                recommended_action: analysis.recommended_action,
            },
        )
        .await;

        if analysis.recommended_action == RecommendedAction::Recursive {
            self.spawn_sub_negotiations(&session, &analysis).await?;
        }

        self.transition(negotiation_id, NegotiationStatus::Completed)
            .await?;
        let session = self.session(negotiation_id)?;
        self.emit_for(
            &session,
            ProtocolEvent::NegotiationCompleted {
                negotiation_id,
                offer_count: session.offers.len(),
            },
        )
        .await;
        self.persist(&session).await;
        self.inner.match_settings.remove(&negotiation_id);
        tracing::info!(
            negotiation_id = %negotiation_id,
            offers = session.offers.len(),
            sub_negotiations = session.sub_negotiations.len(),
            "negotiation completed"
        );

        Ok(NegotiationOutcome::from_session(&session))
    }

    /// Solicit every activated agent in parallel and wait on the barrier.
    async fn collect_offers(
        &self,
        session: &NegotiationSession,
        snapshot: &RegistrySnapshot,
        activated: &[ActivatedAgent],
    ) -> BarrierOutcome {
        let barrier = Arc::new(OfferBarrier::new(
            activated.iter().map(|a| a.agent_id.clone()),
        ));
        let request = Arc::new(OfferRequest {
            negotiation_id: session.id,
            demand_text: session.effective_text().to_string(),
            context: session.demand.context.clone(),
        });

        for agent in activated {
            let Some(descriptor) = snapshot.descriptor(&agent.agent_id) else {
                // activation always comes from this snapshot, so a miss
                // means the snapshot and activation went out of sync
                tracing::debug!(agent_id = %agent.agent_id, "activated agent missing from snapshot");
                barrier.give_up(&agent.agent_id).await;
                continue;
            };

            let engine = self.clone();
            let descriptor = Arc::new(descriptor.clone());
            let request = request.clone();
            let barrier = barrier.clone();
            let score = agent.score;
            tokio::spawn(async move {
                engine
                    .solicit_offer(descriptor, request, score, barrier)
                    .await;
            });
        }

        barrier
            .wait(self.inner.config.negotiation.offer_timeout)
            .await
    }

    /// Drive one agent's solicitation to a barrier resolution.
    ///
    /// Invocation errors go through the health monitor's retry wrapper;
    /// exhausted retries resolve the agent as unresponsive without
    /// waiting for the barrier deadline.
    async fn solicit_offer(
        &self,
        descriptor: Arc<AgentDescriptor>,
        request: Arc<OfferRequest>,
        resonance_score: f64,
        barrier: Arc<OfferBarrier>,
    ) {
        let negotiation_id = request.negotiation_id;
        let agent_id = descriptor.id.clone();
        let invoker = self.inner.invoker.clone();

        let response = self
            .inner
            .health
            .with_retry(&agent_id, || {
                let invoker = invoker.clone();
                let descriptor = descriptor.clone();
                let request = request.clone();
                async move {
                    invoker
                        .generate_offer(&descriptor, &request)
                        .await
                        .map_err(|err| HealthError::OperationFailed {
                            agent_id: descriptor.id.clone(),
                            reason: err.to_string(),
                        })
                }
            })
            .await;

        match response {
            Some(Some(draft)) => {
                let offer = Offer::new(
                    negotiation_id,
                    agent_id.clone(),
                    draft.content,
                    draft.confidence,
                    resonance_score,
                );
                let offer_id = offer.id;
                match barrier.submit_offer(&agent_id, offer).await {
                    ResponseOutcome::Accepted => {
                        self.emit_scoped(
                            negotiation_id,
                            ProtocolEvent::OfferReceived {
                                negotiation_id,
                                agent_id,
                                offer_id,
                                resonance_score,
                            },
                        )
                        .await;
                    }
                    ResponseOutcome::Late => {
                        tracing::warn!(
                            negotiation_id = %negotiation_id,
                            agent_id = %agent_id,
                            "offer arrived after barrier completion, dropping"
                        );
                        self.emit_scoped(
                            negotiation_id,
                            ProtocolEvent::LateOfferDropped {
                                negotiation_id,
                                agent_id,
                            },
                        )
                        .await;
                    }
                    ResponseOutcome::Unknown => {
                        tracing::debug!(
                            negotiation_id = %negotiation_id,
                            agent_id = %agent_id,
                            "offer from unknown or already resolved agent"
                        );
                    }
                }
            }
            Some(None) => {
                if barrier.decline(&agent_id).await == ResponseOutcome::Accepted {
                    self.emit_scoped(
                        negotiation_id,
                        ProtocolEvent::OfferDeclined {
                            negotiation_id,
                            agent_id,
                        },
                    )
                    .await;
                }
            }
            None => {
                barrier.give_up(&agent_id).await;
            }
        }
    }

    /// Create one child negotiation per gap and run each to a terminal
    /// state in the background, with the confirmation gate auto-passed.
    ///
    /// Returns a boxed future: the recursion through `tokio::spawn` ->
    /// `confirm_formulation` would otherwise make the `Send` bound on the
    /// opaque future types cyclic and uninferable.
    fn spawn_sub_negotiations<'a>(
        &'a self,
        session: &'a NegotiationSession,
        analysis: &'a GapAnalysis,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let settings = self.settings_for(session.id);
            let child_depth = session.depth + 1;

            for sub in create_sub_demands(session, analysis) {
                let receipt = self.open_session(sub.demand, child_depth, settings).await?;
                self.inner.sessions.update(&session.id, |parent| {
                    parent.sub_negotiations.push(receipt.negotiation_id);
                })?;
                self.emit_scoped(
                    session.id,
                    ProtocolEvent::SubDemandSpawned {
                        negotiation_id: session.id,
                        child_id: receipt.negotiation_id,
                        gap_id: sub.gap_id,
                    },
                )
                .await;
                tracing::info!(
                    negotiation_id = %session.id,
                    child_id = %receipt.negotiation_id,
                    depth = child_depth,
                    "sub-negotiation spawned"
                );

                // children run unattended: nobody sits at their gate
                let engine = self.clone();
                let child_id = receipt.negotiation_id;
                tokio::spawn(async move {
                    if let Err(err) = engine.confirm_formulation(child_id, None).await {
                        tracing::warn!(
                            negotiation_id = %child_id,
                            error = %err,
                            "sub-negotiation errored"
                        );
                    }
                });
            }
            Ok(())
        })
    }

    /// Drive the session to `Failed` and announce why.
    async fn fail(
        &self,
        negotiation_id: NegotiationId,
        reason: FailureReason,
    ) -> EngineResult<NegotiationOutcome> {
        let session = self.inner.sessions.try_update(&negotiation_id, |session| {
            if !session.status.can_transition_to(NegotiationStatus::Failed) {
                return Err(EngineError::InvalidTransition {
                    negotiation_id,
                    from: session.status,
                    to: NegotiationStatus::Failed,
                });
            }
            session.status = NegotiationStatus::Failed;
            session.failure = Some(reason);
            Ok(session.clone())
        })?;

        self.emit_for(
            &session,
            ProtocolEvent::NegotiationFailed {
                negotiation_id,
                reason,
            },
        )
        .await;
        self.persist(&session).await;
        self.inner.match_settings.remove(&negotiation_id);
        Ok(NegotiationOutcome::from_session(&session))
    }

    /// Advance the state machine, rejecting illegal moves.
    async fn transition(
        &self,
        negotiation_id: NegotiationId,
        to: NegotiationStatus,
    ) -> EngineResult<()> {
        let session = self.inner.sessions.try_update(&negotiation_id, |session| {
            if !session.status.can_transition_to(to) {
                return Err(EngineError::InvalidTransition {
                    negotiation_id,
                    from: session.status,
                    to,
                });
            }
            let from = session.status;
            session.status = to;
            tracing::debug!(negotiation_id = %negotiation_id, %from, %to, "transition");
            Ok(session.clone())
        })?;
        self.persist(&session).await;
        Ok(())
    }

    /// Record the demand owner's judgement on a delivered result.
    pub async fn user_action(
        &self,
        negotiation_id: NegotiationId,
        action: UserAction,
    ) -> EngineResult<()> {
        self.ensure_running()?;
        let session = self.inner.sessions.try_update(&negotiation_id, |session| {
            if session.status != NegotiationStatus::Completed {
                return Err(EngineError::UserActionUnavailable {
                    negotiation_id,
                    status: session.status,
                });
            }
            session.user_action = Some(action.clone());
            Ok(session.clone())
        })?;

        self.emit_for(
            &session,
            ProtocolEvent::UserActionRecorded {
                negotiation_id,
                action,
            },
        )
        .await;
        self.persist(&session).await;
        Ok(())
    }

    pub fn session(&self, negotiation_id: NegotiationId) -> EngineResult<NegotiationSession> {
        self.inner
            .sessions
            .get(&negotiation_id)
            .ok_or(EngineError::SessionNotFound(negotiation_id))
    }

    /// All sessions, oldest first.
    pub fn sessions(&self) -> Vec<NegotiationSession> {
        self.inner.sessions.list()
    }

    /// Poll until the session reaches a terminal state.
    pub async fn wait_until_terminal(
        &self,
        negotiation_id: NegotiationId,
        timeout: Duration,
    ) -> EngineResult<NegotiationSession> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let session = self.session(negotiation_id)?;
            if session.is_terminal() {
                return Ok(session);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::WaitTimeout { negotiation_id });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::Receiver<ProtocolEventEnvelope>) {
        self.inner.bus.subscribe(filter).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id).await
    }

    /// Attach an external stream: a handshake envelope first, then every
    /// matching event until the transport fails or the relay is shut
    /// down.
    pub async fn stream_events(
        &self,
        filter: EventFilter,
        transport: Arc<dyn StreamTransport>,
    ) -> EngineResult<StreamRelay> {
        self.ensure_running()?;
        Ok(StreamRelay::spawn(self.inner.bus.clone(), filter, transport).await?)
    }

    /// Replay up to `limit` retained events matching `filter`, oldest
    /// first.
    pub async fn events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Vec<ProtocolEventEnvelope> {
        self.inner.bus.query(filter, limit).await
    }

    pub async fn bus_stats(&self) -> BusStats {
        self.inner.bus.stats().await
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    /// Probe one agent now, bounded by the configured probe timeout.
    pub async fn check_agent_health(&self, agent_id: &AgentId) -> EngineResult<ProbeReport> {
        self.ensure_running()?;
        Ok(self.inner.health.check_agent_health(agent_id).await?)
    }

    pub fn agent_health(&self, agent_id: &AgentId) -> Option<AgentHealth> {
        self.inner.health.health(agent_id)
    }

    /// Operator reset: the agent returns to active with a clean history.
    pub fn reset_agent_status(&self, agent_id: &AgentId) {
        self.inner.health.reset_agent_status(agent_id);
    }

    /// Voluntary departure announced by the agent. It leaves matching
    /// immediately and later probe successes do not revive it.
    pub fn agent_exiting(&self, agent_id: &AgentId) {
        self.inner.health.mark_exiting(agent_id);
    }

    /// Stop accepting new work. In-flight sessions finish; submissions,
    /// confirmations, and health checks are rejected from here on.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.forwarder.lock().await.take() {
            handle.abort();
        }
        tracing::info!("engine shut down");
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    fn settings_for(&self, negotiation_id: NegotiationId) -> MatchSettings {
        self.inner
            .match_settings
            .get(&negotiation_id)
            .map(|s| *s)
            .unwrap_or(MatchSettings {
                resonance_threshold: self.inner.config.negotiation.resonance_threshold,
                activation_limit: self.inner.config.negotiation.activation_limit,
            })
    }

    /// Publish an envelope enriched with the session's correlation ids.
    async fn emit_for(&self, session: &NegotiationSession, event: ProtocolEvent) {
        let envelope = ProtocolEventEnvelope::new(event)
            .with_scene(session.scene_id.clone())
            .with_demand(session.demand.id);
        self.record(envelope).await;
    }

    /// Publish with correlation looked up from the session map; falls
    /// back to a bare envelope when the session is gone.
    async fn emit_scoped(&self, negotiation_id: NegotiationId, event: ProtocolEvent) {
        match self.inner.sessions.get(&negotiation_id) {
            Some(session) => self.emit_for(&session, event).await,
            None => self.emit(event).await,
        }
    }

    async fn emit(&self, event: ProtocolEvent) {
        self.record(ProtocolEventEnvelope::new(event)).await;
    }

    async fn record(&self, envelope: ProtocolEventEnvelope) {
        if let Err(err) = self.inner.store.save_event(&envelope).await {
            tracing::warn!(error = %err, "event store write failed");
        }
        self.inner.bus.publish(envelope).await;
    }

    async fn persist(&self, session: &NegotiationSession) {
        if let Err(err) = self.inner.store.save_session(session).await {
            tracing::warn!(
                negotiation_id = %session.id,
                error = %err,
                "session store write failed"
            );
        }
    }
}

/// Forward health status flips onto the protocol event bus.
///
/// The monitor announces all liveness activity on its broadcast channel;
/// only status changes become protocol events.
async fn forward_health_events(
    engine: NegotiationEngine,
    mut rx: broadcast::Receiver<HealthEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(HealthEvent::StatusChanged { agent_id, from, to }) => {
                engine
                    .emit(ProtocolEvent::AgentStatusChanged { agent_id, from, to })
                    .await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "health event forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
