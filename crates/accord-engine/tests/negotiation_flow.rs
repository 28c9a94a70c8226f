//! End-to-end negotiation scenarios against a scripted agent population.

use accord_engine::{
    AgentInvoker, DemandSubmission, EngineConfig, EngineError, EngineResult, MemoryStore,
    NegotiationConfig, NegotiationEngine, OfferDraft, OfferRequest,
};
use accord_events::{EventFilter, EventResult, StreamTransport};
use accord_health::{HealthConfig, RetryConfig};
use accord_registry::{AgentDescriptor, AgentProfile, AgentRegistration};
use accord_signal::SignalConfig;
use accord_types::{
    AgentId, AgentStatus, DemandPreferences, FailureReason, GapSeverity, NegotiationStatus,
    ProtocolEvent, ProtocolEventEnvelope, RecommendedAction, SceneId, UserAction,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("accord_engine=debug,accord_health=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct AgentScript {
    content: String,
    confidence: f64,
    delay: Option<Duration>,
    declines: bool,
    fails: bool,
}

/// Invoker that answers per-agent from a fixed script. Unscripted agents
/// decline.
struct ScriptedInvoker {
    scripts: HashMap<AgentId, AgentScript>,
}

impl ScriptedInvoker {
    fn new() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    fn offers(mut self, agent: &str, content: &str, confidence: f64) -> Self {
        self.scripts.insert(
            AgentId::new(agent),
            AgentScript {
                content: content.into(),
                confidence,
                delay: None,
                declines: false,
                fails: false,
            },
        );
        self
    }

    fn offers_after(mut self, agent: &str, content: &str, delay: Duration) -> Self {
        self.scripts.insert(
            AgentId::new(agent),
            AgentScript {
                content: content.into(),
                confidence: 0.8,
                delay: Some(delay),
                declines: false,
                fails: false,
            },
        );
        self
    }

    fn declines(mut self, agent: &str) -> Self {
        self.scripts.insert(
            AgentId::new(agent),
            AgentScript {
                content: String::new(),
                confidence: 0.0,
                delay: None,
                declines: true,
                fails: false,
            },
        );
        self
    }

    fn fails(mut self, agent: &str) -> Self {
        self.scripts.insert(
            AgentId::new(agent),
            AgentScript {
                content: String::new(),
                confidence: 0.0,
                delay: None,
                declines: false,
                fails: true,
            },
        );
        self
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn generate_offer(
        &self,
        agent: &AgentDescriptor,
        _request: &OfferRequest,
    ) -> EngineResult<Option<OfferDraft>> {
        let Some(script) = self.scripts.get(&agent.id) else {
            return Ok(None);
        };
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        if script.fails {
            return Err(EngineError::Collaborator {
                reason: format!("{} is not answering", agent.id),
            });
        }
        if script.declines {
            return Ok(None);
        }
        Ok(Some(OfferDraft {
            content: script.content.clone(),
            confidence: script.confidence,
        }))
    }
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        signal: SignalConfig {
            embedding_dimension: 64,
            signal_dimension: 512,
            ..SignalConfig::default()
        },
        health: HealthConfig {
            retry: RetryConfig {
                max_retries: 1,
                retry_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            ..HealthConfig::default()
        },
        negotiation: NegotiationConfig {
            offer_timeout: Duration::from_secs(2),
            max_recursion_depth: 1,
            ..NegotiationConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn store_roster() -> Vec<AgentRegistration> {
    let roster = [
        (
            "agent-cart",
            "cart service",
            "shopping cart and checkout flows",
            vec!["cart", "checkout"],
        ),
        (
            "agent-catalog",
            "catalog service",
            "product catalog and inventory management",
            vec!["catalog", "inventory"],
        ),
        (
            "agent-auth",
            "auth service",
            "customer accounts and authentication",
            vec!["accounts", "login"],
        ),
        (
            "agent-shipping",
            "shipping service",
            "shipping rates and fulfillment",
            vec!["shipping", "fulfillment"],
        ),
        (
            "agent-search",
            "search service",
            "product search and ranking",
            vec!["search", "ranking"],
        ),
    ];
    roster
        .into_iter()
        .map(|(id, name, description, capabilities)| {
            AgentRegistration::new(
                AgentId::new(id),
                AgentProfile::new(
                    name,
                    description,
                    capabilities.into_iter().map(String::from).collect(),
                ),
            )
        })
        .collect()
}

async fn register_agents(engine: &NegotiationEngine, ids: &[&str]) {
    for registration in store_roster() {
        if ids.contains(&registration.id.as_str()) {
            engine.register_agent(registration).await.unwrap();
        }
    }
}

async fn register_store_agents(engine: &NegotiationEngine) {
    for registration in store_roster() {
        engine.register_agent(registration).await.unwrap();
    }
}

fn event_types(envelopes: &[ProtocolEventEnvelope]) -> Vec<&'static str> {
    envelopes.iter().map(|e| e.event.event_type()).collect()
}

/// Assert `milestones` appear in `types` in order, ignoring everything
/// interleaved between them.
fn assert_milestones(types: &[&str], milestones: &[&str]) {
    let mut remaining = types.iter();
    for milestone in milestones {
        assert!(
            remaining.any(|t| t == milestone),
            "milestone {milestone} missing or out of order in {types:?}"
        );
    }
}

async fn wait_for_event(
    engine: &NegotiationEngine,
    filter: &EventFilter,
    event_type: &str,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if engine
            .events(filter, 200)
            .await
            .iter()
            .any(|e| e.event.event_type() == event_type)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_demand_runs_full_pipeline_with_recursion() {
    init_tracing();
    let invoker = ScriptedInvoker::new()
        .offers(
            "agent-cart",
            "shopping cart and checkout flow for the online store build",
            0.9,
        )
        .offers("agent-catalog", "product catalog with inventory sync", 0.85)
        .offers("agent-auth", "customer accounts with login and sessions", 0.8)
        .offers(
            "agent-shipping",
            "shipping rates with carrier fulfillment",
            0.75,
        )
        .declines("agent-search");
    let store = Arc::new(MemoryStore::new());
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(engine_config())
        .store(store.clone())
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_store_agents(&engine).await;

    let submission = DemandSubmission::new(
        SceneId::new("scene-store"),
        "build an online store with cart and payment",
    )
    .with_preferences(DemandPreferences::required(["cart", "payment integration"]))
    .with_resonance_threshold(0.1)
    .with_activation_limit(5);

    let receipt = engine.submit_demand(submission).await.unwrap();
    assert!(!receipt.formulation.fell_back);
    assert!(receipt
        .formulation
        .enriched_text
        .contains("required: cart, payment integration"));

    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    // four agents offer, search declines
    assert_eq!(outcome.status, NegotiationStatus::Completed);
    assert_eq!(outcome.activated_agents.len(), 5);
    assert!(outcome
        .activated_agents
        .iter()
        .all(|a| (0.1..=1.0).contains(&a.score)));
    assert_eq!(outcome.offers.len(), 4);
    assert!(outcome.failure.is_none());

    // payment integration is nowhere in the offers: one high gap, spawned
    // as a child negotiation
    let analysis = outcome.gap_analysis.as_ref().unwrap();
    assert_eq!(analysis.gaps.len(), 1);
    assert_eq!(analysis.gaps[0].aspect, "payment integration");
    assert_eq!(analysis.gaps[0].severity, GapSeverity::High);
    assert_eq!(analysis.recommended_action, RecommendedAction::Recursive);
    assert_eq!(outcome.sub_negotiations.len(), 1);

    let child_id = outcome.sub_negotiations[0];
    let child = engine
        .wait_until_terminal(child_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(child.status, NegotiationStatus::Completed);
    assert_eq!(child.depth, 1);
    assert_eq!(child.scene_id, SceneId::new("scene-store"));
    assert_eq!(
        child.demand.context.get("parent_negotiation_id"),
        Some(&receipt.negotiation_id.to_string())
    );
    // the child hits the same missing aspect but sits at the depth cap,
    // so its recursion is downgraded
    let child_analysis = child.gap_analysis.as_ref().unwrap();
    assert_eq!(
        child_analysis.recommended_action,
        RecommendedAction::DeliverWithGap
    );

    let parent_events = engine
        .events(&EventFilter::new().negotiation(receipt.negotiation_id), 200)
        .await;
    let types = event_types(&parent_events);
    assert_milestones(
        &types,
        &[
            "demand.submitted",
            "formulation.completed",
            "formulation.confirmed",
            "resonance.activated",
            "barrier.completed",
            "gap.identified",
            "subdemand.spawned",
            "negotiation.completed",
        ],
    );
    // the decline is published from the soliciting task, so give it a
    // moment to land
    assert!(
        wait_for_event(
            &engine,
            &EventFilter::new().negotiation(receipt.negotiation_id),
            "offer.declined",
        )
        .await
    );

    // the user accepts the delivered result
    engine
        .user_action(receipt.negotiation_id, UserAction::Accept)
        .await
        .unwrap();

    // both sessions and their events reached the store
    assert!(store.session_count() >= 2);
    let stored = store.session(&receipt.negotiation_id).unwrap();
    assert_eq!(stored.status, NegotiationStatus::Completed);
    assert!(store
        .events()
        .await
        .iter()
        .any(|e| e.event.event_type() == "negotiation.completed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_novel_demand_fails_with_no_resonant_agents() {
    init_tracing();
    let engine = NegotiationEngine::builder(Arc::new(ScriptedInvoker::new()))
        .config(engine_config())
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_store_agents(&engine).await;

    let receipt = engine
        .submit_demand(
            DemandSubmission::new(
                SceneId::new("scene-novel"),
                "translate ancient sumerian poetry into movement notation",
            )
            .with_resonance_threshold(0.95),
        )
        .await
        .unwrap();
    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    assert_eq!(outcome.status, NegotiationStatus::Failed);
    assert_eq!(outcome.failure, Some(FailureReason::NoResonantAgents));
    assert!(outcome.offers.is_empty());

    let session = engine.session(receipt.negotiation_id).unwrap();
    assert_eq!(session.failure, Some(FailureReason::NoResonantAgents));

    let events = engine
        .events(&EventFilter::new().negotiation(receipt.negotiation_id), 50)
        .await;
    assert!(event_types(&events).contains(&"negotiation.failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_agent_times_out_and_late_offer_is_dropped() {
    init_tracing();
    let invoker = ScriptedInvoker::new()
        .offers("agent-cart", "shopping cart and checkout", 0.9)
        .offers_after(
            "agent-catalog",
            "product catalog, eventually",
            Duration::from_millis(400),
        );
    let mut config = engine_config();
    config.negotiation.offer_timeout = Duration::from_millis(100);
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(config)
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_agents(&engine, &["agent-cart", "agent-catalog"]).await;

    let receipt = engine
        .submit_demand(
            DemandSubmission::new(SceneId::new("scene-slow"), "set up cart and catalog")
                .with_resonance_threshold(0.1)
                .with_activation_limit(2),
        )
        .await
        .unwrap();
    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    // collection always exits to completed, with whatever arrived
    assert_eq!(outcome.status, NegotiationStatus::Completed);
    assert_eq!(outcome.offers.len(), 1);
    assert_eq!(outcome.offers[0].agent_id, AgentId::new("agent-cart"));

    let filter = EventFilter::new().negotiation(receipt.negotiation_id);
    let events = engine.events(&filter, 100).await;
    let timed_out_barrier = events.iter().any(|e| {
        matches!(
            e.event,
            ProtocolEvent::BarrierCompleted {
                timed_out: true,
                unresponsive: 1,
                ..
            }
        )
    });
    assert!(timed_out_barrier, "barrier should report the timeout");

    // the slow agent answers 300ms after the barrier closed
    assert!(wait_for_event(&engine, &filter, "offer.late_dropped").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unresponsive_agent_resolves_before_the_deadline() {
    init_tracing();
    let invoker = ScriptedInvoker::new()
        .offers("agent-cart", "shopping cart and checkout", 0.9)
        .fails("agent-catalog");
    let mut config = engine_config();
    config.negotiation.offer_timeout = Duration::from_secs(30);
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(config)
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_agents(&engine, &["agent-cart", "agent-catalog"]).await;

    let receipt = engine
        .submit_demand(
            DemandSubmission::new(SceneId::new("scene-broken"), "set up cart and catalog")
                .with_resonance_threshold(0.1)
                .with_activation_limit(2),
        )
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    // exhausted retries resolve the agent instead of holding the barrier
    // open for the full 30s window
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.status, NegotiationStatus::Completed);
    assert_eq!(outcome.offers.len(), 1);

    let events = engine
        .events(&EventFilter::new().negotiation(receipt.negotiation_id), 100)
        .await;
    let clean_barrier = events.iter().any(|e| {
        matches!(
            e.event,
            ProtocolEvent::BarrierCompleted {
                timed_out: false,
                unresponsive: 1,
                ..
            }
        )
    });
    assert!(clean_barrier, "barrier should complete without timing out");

    // the failures pushed the agent to unavailable, and the status change
    // was forwarded onto the bus
    let health = engine.agent_health(&AgentId::new("agent-catalog")).unwrap();
    assert_eq!(health.status, AgentStatus::Unavailable);
    assert!(
        wait_for_event(
            &engine,
            &EventFilter::new().event_type("agent.status_changed"),
            "agent.status_changed",
        )
        .await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_depth_cap_downgrades_recursion() {
    init_tracing();
    let invoker =
        ScriptedInvoker::new().offers("agent-cart", "shopping cart and checkout", 0.9);
    let mut config = engine_config();
    config.negotiation.max_recursion_depth = 0;
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(config)
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_store_agents(&engine).await;

    let receipt = engine
        .submit_demand(
            DemandSubmission::new(SceneId::new("scene-capped"), "cart with payment")
                .with_preferences(DemandPreferences::required(["payment integration"]))
                .with_resonance_threshold(0.1)
                .with_activation_limit(1),
        )
        .await
        .unwrap();
    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    assert_eq!(outcome.status, NegotiationStatus::Completed);
    let analysis = outcome.gap_analysis.as_ref().unwrap();
    assert_eq!(
        analysis.recommended_action,
        RecommendedAction::DeliverWithGap
    );
    assert!(analysis.high_severity_count() > 0);
    assert!(outcome.sub_negotiations.is_empty());

    let events = engine
        .events(&EventFilter::new().negotiation(receipt.negotiation_id), 100)
        .await;
    assert!(!event_types(&events).contains(&"subdemand.spawned"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exiting_agent_is_not_activated() {
    init_tracing();
    let invoker = ScriptedInvoker::new()
        .offers("agent-cart", "shopping cart and checkout", 0.9)
        .offers("agent-catalog", "product catalog with inventory", 0.85);
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(engine_config())
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_store_agents(&engine).await;

    engine.agent_exiting(&AgentId::new("agent-cart"));
    assert!(
        wait_for_event(
            &engine,
            &EventFilter::new().event_type("agent.status_changed"),
            "agent.status_changed",
        )
        .await
    );

    let receipt = engine
        .submit_demand(
            DemandSubmission::new(SceneId::new("scene-exit"), "set up cart and catalog")
                .with_resonance_threshold(0.1)
                .with_activation_limit(10),
        )
        .await
        .unwrap();
    let outcome = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    let session = engine.session(receipt.negotiation_id).unwrap();
    assert!(session
        .activated_agents
        .iter()
        .all(|a| a.agent_id != AgentId::new("agent-cart")));
    assert!(outcome
        .offers
        .iter()
        .all(|o| o.agent_id != AgentId::new("agent-cart")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_stay_isolated() {
    init_tracing();
    let invoker = ScriptedInvoker::new()
        .offers("agent-cart", "shopping cart and checkout", 0.9)
        .offers("agent-catalog", "product catalog with inventory", 0.85);
    let engine = NegotiationEngine::builder(Arc::new(invoker))
        .config(engine_config())
        .build()
        .unwrap();
    engine.initialize().await.unwrap();
    register_agents(&engine, &["agent-cart", "agent-catalog"]).await;

    let runs = (0..4).map(|i| {
        let engine = engine.clone();
        async move {
            let receipt = engine
                .submit_demand(
                    DemandSubmission::new(
                        SceneId::new(format!("scene-{i}")),
                        "set up cart and catalog",
                    )
                    .with_resonance_threshold(0.1)
                    .with_activation_limit(2),
                )
                .await?;
            engine.confirm_formulation(receipt.negotiation_id, None).await
        }
    });

    let outcomes = join_all(runs).await;
    assert_eq!(outcomes.len(), 4);
    let mut seen = Vec::new();
    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, NegotiationStatus::Completed);
        assert_eq!(outcome.offers.len(), 2);
        assert!(!seen.contains(&outcome.negotiation_id));
        seen.push(outcome.negotiation_id);
    }
}

struct VecTransport {
    sent: Mutex<Vec<ProtocolEventEnvelope>>,
    closed: AtomicBool,
}

impl VecTransport {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StreamTransport for VecTransport {
    async fn send(&self, envelope: &ProtocolEventEnvelope) -> EventResult<()> {
        self.sent.lock().await.push(envelope.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_relay_carries_scene_events() {
    init_tracing();
    let engine = NegotiationEngine::builder(Arc::new(ScriptedInvoker::new()))
        .config(engine_config())
        .build()
        .unwrap();
    engine.initialize().await.unwrap();

    let transport = Arc::new(VecTransport::new());
    let relay = engine
        .stream_events(
            EventFilter::new().scene(SceneId::new("scene-stream")),
            transport.clone(),
        )
        .await
        .unwrap();

    // empty registry: the negotiation fails fast but still streams its
    // lifecycle
    let receipt = engine
        .submit_demand(DemandSubmission::new(
            SceneId::new("scene-stream"),
            "build an online store",
        ))
        .await
        .unwrap();
    let _ = engine
        .confirm_formulation(receipt.negotiation_id, None)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let sent = transport.sent.lock().await;
            if sent
                .iter()
                .any(|e| e.event.event_type() == "negotiation.failed")
            {
                assert_eq!(sent[0].event.event_type(), "stream.handshake");
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "relay never carried the failure event"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // detaching the subscription drains the relay and closes the transport
    assert!(engine.unsubscribe(relay.subscription_id()).await);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !transport.closed.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "transport never closed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
