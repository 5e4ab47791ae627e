//! One user's session wired to the generation pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;
use waypoint_core::{
    AggregateScores, GenerationOptions, GenerationRequest, Profile, Result, StepCatalog, StepId,
    StepStatus, Tier, WaypointError,
};
use waypoint_generate::{GenerationHandle, GenerationPipeline, GenerationSlot, GenerationTransport};
use waypoint_state::{Completion, ProgressStore, WorkflowSession, WorkflowState};

/// Facade over a [`WorkflowSession`], the user's profile and a pipeline.
///
/// At most one report generation is active; starting another cancels it.
pub struct Workbench<S: ProgressStore, T: GenerationTransport> {
    session: WorkflowSession<S>,
    profile: Profile,
    pipeline: GenerationPipeline<T>,
    slot: GenerationSlot,
}

impl<S: ProgressStore, T: GenerationTransport> Workbench<S, T> {
    pub fn new(session: WorkflowSession<S>, profile: Profile, pipeline: GenerationPipeline<T>) -> Self {
        Self {
            session,
            profile,
            pipeline,
            slot: GenerationSlot::new(),
        }
    }

    /// Load `user`'s progress from `store` and build a workbench around it.
    pub async fn open(
        store: Arc<S>,
        user: &str,
        catalog: Arc<StepCatalog>,
        tier: Tier,
        profile: Profile,
        pipeline: GenerationPipeline<T>,
    ) -> Result<Self> {
        let key = WorkflowSession::<S>::key_for(user);
        let session = WorkflowSession::load(store, key, catalog, tier).await?;
        Ok(Self::new(session, profile, pipeline))
    }

    pub fn state(&self) -> &WorkflowState {
        self.session.state()
    }

    pub fn session(&self) -> &WorkflowSession<S> {
        &self.session
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    pub fn available_steps(&self) -> BTreeSet<StepId> {
        self.session.available_steps()
    }

    pub fn status(&self, step_id: StepId) -> Result<StepStatus> {
        self.state().status(step_id)
    }

    pub fn scores(&self) -> AggregateScores {
        self.state().scores()
    }

    pub async fn complete(&mut self, step_id: StepId, data: serde_json::Value) -> Result<Completion> {
        self.session.complete(step_id, data).await
    }

    pub async fn select_current(&mut self, step_id: StepId) -> Result<()> {
        self.session.select_current(step_id).await
    }

    pub async fn set_tier(&mut self, tier: Tier) -> Result<()> {
        self.session.set_tier(tier).await
    }

    /// Reset progress. An in-flight generation is cancelled.
    pub async fn reset(&mut self) -> Result<()> {
        self.slot.cancel_active().await;
        self.session.reset().await
    }

    /// Build a request from the current state.
    ///
    /// Outstanding required steps fail as `step:<id>` entries of a single
    /// validation error.
    pub fn generation_request(&self, options: GenerationOptions) -> Result<GenerationRequest> {
        let state = self.state();
        let outstanding = state.resolver().outstanding_required(state.completed());
        if !outstanding.is_empty() {
            return Err(WaypointError::missing_fields(
                outstanding.iter().map(|id| format!("step:{}", id)).collect(),
            ));
        }

        let (completed, total) = state.progress();
        GenerationRequest::builder()
            .profile(self.profile.clone())
            .tier(state.tier().clone())
            .progress(completed, total)
            .scores(state.scores())
            .options(options)
            .build()
    }

    /// Start a report generation, cancelling any earlier one.
    ///
    /// Validation problems are returned here, before any call is made.
    pub async fn generate_report(&self, options: GenerationOptions) -> Result<GenerationHandle> {
        let request = self.generation_request(options)?;
        info!(
            "Starting report generation {} ({} completed steps)",
            request.id, request.completed_count
        );
        Ok(self.slot.start(&self.pipeline, request).await)
    }

    /// Cancel the active generation, returning its request id.
    pub async fn cancel_generation(&self) -> Option<Uuid> {
        self.slot.cancel_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use waypoint_core::{Step, TierTable};
    use waypoint_generate::{
        GenerationEvent, PipelineConfig, ScriptedAttempt, ScriptedTransport, TransportError,
    };
    use waypoint_state::InMemoryProgressStore;

    fn tier(id: &str) -> Tier {
        TierTable::standard().get(id).unwrap().clone()
    }

    fn catalog() -> Arc<StepCatalog> {
        Arc::new(
            StepCatalog::builder()
                .step(Step::new(1, "Profile", &tier("basic")).weighted(10.0, 3.0, 2.0).required())
                .step(Step::new(2, "Market", &tier("basic")).after([1]).required())
                .step(Step::new(3, "Modules", &tier("professional")).after([1, 2]))
                .build()
                .unwrap(),
        )
    }

    fn profile() -> Profile {
        Profile::new().with("name", "Ada").with("industry", "Retail")
    }

    async fn workbench(
        script: Vec<ScriptedAttempt>,
    ) -> Workbench<InMemoryProgressStore, ScriptedTransport> {
        let pipeline = GenerationPipeline::with_config(
            ScriptedTransport::new(script),
            PipelineConfig::default().with_retry_delay(Duration::from_millis(5)),
        );
        Workbench::open(
            Arc::new(InMemoryProgressStore::new()),
            "ada",
            catalog(),
            tier("professional"),
            profile(),
            pipeline,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_outstanding_required_steps_block_generation() {
        let mut bench = workbench(vec![ScriptedAttempt::succeed(["unused"])]).await;
        bench.complete(StepId(1), serde_json::Value::Null).await.unwrap();

        let err = bench
            .generate_report(GenerationOptions::default())
            .await
            .err()
            .unwrap();

        match err {
            WaypointError::Validation { missing, .. } => assert_eq!(missing, vec!["step:2".to_string()]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(bench.pipeline.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_profile_fields_are_listed() {
        let mut bench = workbench(vec![]).await;
        bench.complete(StepId(1), serde_json::Value::Null).await.unwrap();
        bench.complete(StepId(2), serde_json::Value::Null).await.unwrap();
        bench.set_profile(Profile::new().with("name", "Ada"));

        let err = bench.generation_request(GenerationOptions::default()).unwrap_err();
        match err {
            WaypointError::Validation { missing, .. } => {
                assert_eq!(missing, vec!["profile.industry".to_string()])
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_report_end_to_end() {
        let mut bench = workbench(vec![
            ScriptedAttempt::refuse(TransportError::transient("503")),
            ScriptedAttempt::succeed(["# Report\n", "Ready."]),
        ])
        .await;
        bench.complete(StepId(1), serde_json::Value::Null).await.unwrap();
        let completion = bench.complete(StepId(2), serde_json::Value::Null).await.unwrap();
        assert!(completion.unlocked.contains(&StepId(3)));

        let request = bench.generation_request(GenerationOptions::default()).unwrap();
        assert_eq!(request.completed_count, 2);
        assert_eq!(request.total_count, 3);
        assert_eq!(request.scores.scaled_opportunities, 12);

        let events: Vec<_> = bench
            .generate_report(GenerationOptions::default())
            .await
            .unwrap()
            .collect()
            .await;

        assert!(events
            .iter()
            .any(|e| matches!(e, GenerationEvent::Retrying { attempt: 2, .. })));
        match events.last() {
            Some(GenerationEvent::Succeeded(report)) => assert_eq!(report.text, "# Report\nReady."),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_generation_cancels_first() {
        let mut bench = workbench(vec![
            ScriptedAttempt::stall(["draft"]),
            ScriptedAttempt::succeed(["final"]),
        ])
        .await;
        bench.complete(StepId(1), serde_json::Value::Null).await.unwrap();
        bench.complete(StepId(2), serde_json::Value::Null).await.unwrap();

        let mut first = bench.generate_report(GenerationOptions::default()).await.unwrap();
        // Wait until the first generation has taken its scripted attempt.
        assert!(matches!(first.next().await, Some(GenerationEvent::Attempting { .. })));
        assert_eq!(
            first.next().await,
            Some(GenerationEvent::Chunk {
                attempt: 1,
                text: "draft".into()
            })
        );

        let second = bench.generate_report(GenerationOptions::default()).await.unwrap();

        assert_eq!(first.wait().await, Err(WaypointError::Cancelled));
        assert_eq!(second.wait().await.unwrap().text, "final");
    }

    #[tokio::test]
    async fn test_reset_cancels_generation_and_clears_progress() {
        let mut bench = workbench(vec![ScriptedAttempt::stall(Vec::<String>::new())]).await;
        bench.complete(StepId(1), serde_json::Value::Null).await.unwrap();
        bench.complete(StepId(2), serde_json::Value::Null).await.unwrap();

        let handle = bench.generate_report(GenerationOptions::default()).await.unwrap();
        bench.reset().await.unwrap();

        assert_eq!(handle.wait().await, Err(WaypointError::Cancelled));
        assert!(bench.state().completed().is_empty());
        assert_eq!(bench.status(StepId(3)).unwrap(), StepStatus::Locked);
        assert_eq!(bench.scores(), AggregateScores::default());
    }
}
