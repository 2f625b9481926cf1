//! Pipeline tracker
//!
//! Registry of in-flight voice sessions keyed by session id. The registry map
//! is injected so several orchestrators (or tests) can share or isolate it.
//! Each session is written only by the orchestrator that created it; stage
//! records move `running -> success | fallback | failed` and never back.
//!
//! On completion the session is evicted and summarized: total and per-stage
//! durations, a performance tier, the degraded stages and the stages that
//! overran their latency target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use advisor_config::constants::voice;
use advisor_config::VoiceSettings;
use advisor_core::{PipelineStage, StageStatus};

use crate::PipelineError;

/// Shared session map
pub type SessionRegistry = Arc<DashMap<String, PipelineSession>>;

/// Coarse position of a session in the voice flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Pending,
    Transcribing,
    Generating,
    Synthesizing,
    Complete,
    Failed,
}

impl SessionPhase {
    fn for_stage(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Transcription => SessionPhase::Transcribing,
            PipelineStage::Generation => SessionPhase::Generating,
            PipelineStage::Synthesis => SessionPhase::Synthesizing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Pending => "pending",
            SessionPhase::Transcribing => "transcribing",
            SessionPhase::Generating => "generating",
            SessionPhase::Synthesizing => "synthesizing",
            SessionPhase::Complete => "complete",
            SessionPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Excellent => "excellent",
            PerformanceTier::Good => "good",
            PerformanceTier::Fair => "fair",
            PerformanceTier::Poor => "poor",
        }
    }
}

/// Upper bounds (exclusive) of the first three tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBounds {
    pub excellent_ms: u64,
    pub good_ms: u64,
    pub fair_ms: u64,
}

impl Default for TierBounds {
    fn default() -> Self {
        Self {
            excellent_ms: voice::TIER_EXCELLENT_MS,
            good_ms: voice::TIER_GOOD_MS,
            fair_ms: voice::TIER_FAIR_MS,
        }
    }
}

impl From<&VoiceSettings> for TierBounds {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            excellent_ms: settings.tier_excellent_ms,
            good_ms: settings.tier_good_ms,
            fair_ms: settings.tier_fair_ms,
        }
    }
}

impl TierBounds {
    pub fn classify(&self, total_ms: u64) -> PerformanceTier {
        if total_ms < self.excellent_ms {
            PerformanceTier::Excellent
        } else if total_ms < self.good_ms {
            PerformanceTier::Good
        } else if total_ms < self.fair_ms {
            PerformanceTier::Fair
        } else {
            PerformanceTier::Poor
        }
    }
}

/// Per-stage latency targets used for bottleneck reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTargets {
    pub transcription_ms: u64,
    pub generation_ms: u64,
    pub synthesis_ms: u64,
}

impl Default for StageTargets {
    fn default() -> Self {
        Self {
            transcription_ms: voice::TARGET_TRANSCRIPTION_MS,
            generation_ms: voice::TARGET_GENERATION_MS,
            synthesis_ms: voice::TARGET_SYNTHESIS_MS,
        }
    }
}

impl From<&VoiceSettings> for StageTargets {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            transcription_ms: settings.target_transcription_ms,
            generation_ms: settings.target_generation_ms,
            synthesis_ms: settings.target_synthesis_ms,
        }
    }
}

impl StageTargets {
    pub fn for_stage(&self, stage: PipelineStage) -> u64 {
        match stage {
            PipelineStage::Transcription => self.transcription_ms,
            PipelineStage::Generation => self.generation_ms,
            PipelineStage::Synthesis => self.synthesis_ms,
        }
    }
}

/// One stage of one session
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub service: String,
    pub model: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    #[serde(skip)]
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct PipelineSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    pub stages: HashMap<PipelineStage, StageRecord>,
    started: Instant,
}

impl PipelineSession {
    pub fn new(session_id: impl Into<String>, user_id: Option<&str>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.map(str::to_string),
            phase: SessionPhase::Pending,
            started_at: Utc::now(),
            stages: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn stage(&self, stage: PipelineStage) -> Option<&StageRecord> {
        self.stages.get(&stage)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move a stage from pending to running. Each stage runs once.
    pub fn start_stage(
        &mut self,
        stage: PipelineStage,
        service: &str,
        model: &str,
    ) -> Result<(), PipelineError> {
        if let Some(existing) = self.stages.get(&stage) {
            return Err(PipelineError::InvalidTransition {
                stage: stage.to_string(),
                from: existing.status.as_str().to_string(),
                to: StageStatus::Running.as_str().to_string(),
            });
        }

        self.stages.insert(
            stage,
            StageRecord {
                service: service.to_string(),
                model: model.to_string(),
                status: StageStatus::Running,
                started_at: Utc::now(),
                ended_at: None,
                duration_ms: None,
                error: None,
                started: Instant::now(),
            },
        );
        self.phase = SessionPhase::for_stage(stage);
        Ok(())
    }

    /// Move a running stage to a terminal status
    pub fn finish_stage(
        &mut self,
        stage: PipelineStage,
        status: StageStatus,
        error: Option<String>,
    ) -> Result<u64, PipelineError> {
        let invalid = |from: StageStatus| PipelineError::InvalidTransition {
            stage: stage.to_string(),
            from: from.as_str().to_string(),
            to: status.as_str().to_string(),
        };

        let Some(record) = self.stages.get_mut(&stage) else {
            return Err(invalid(StageStatus::Pending));
        };
        if record.status != StageStatus::Running || !status.is_terminal() {
            return Err(invalid(record.status));
        }

        let duration_ms = record.started.elapsed().as_millis() as u64;
        record.status = status;
        record.ended_at = Some(Utc::now());
        record.duration_ms = Some(duration_ms);
        record.error = error;
        Ok(duration_ms)
    }

    /// Mark whatever is still running as failed
    fn fail_running(&mut self, reason: &str) {
        for record in self.stages.values_mut() {
            if record.status == StageStatus::Running {
                record.status = StageStatus::Failed;
                record.ended_at = Some(Utc::now());
                record.duration_ms = Some(record.started.elapsed().as_millis() as u64);
                record.error = Some(reason.to_string());
            }
        }
        self.phase = SessionPhase::Failed;
    }

    pub fn summarize(
        &self,
        total_ms: u64,
        tiers: &TierBounds,
        targets: &StageTargets,
    ) -> PipelineSummary {
        let mut stages = Vec::new();
        let mut fallbacks = Vec::new();
        let mut bottlenecks = Vec::new();

        for stage in PipelineStage::ALL {
            let Some(record) = self.stages.get(&stage) else {
                continue;
            };
            let duration_ms = record.duration_ms.unwrap_or(0);
            let target_ms = targets.for_stage(stage);
            let over_target = duration_ms > target_ms;

            if matches!(record.status, StageStatus::Fallback | StageStatus::Failed) {
                fallbacks.push(stage);
            }
            if over_target {
                bottlenecks.push(stage);
            }
            stages.push(StageSummary {
                stage,
                service: record.service.clone(),
                model: record.model.clone(),
                status: record.status,
                duration_ms,
                target_ms,
                over_target,
            });
        }

        PipelineSummary {
            session_id: self.session_id.clone(),
            phase: self.phase,
            total_ms,
            tier: tiers.classify(total_ms),
            stages,
            fallbacks,
            bottlenecks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: PipelineStage,
    pub service: String,
    pub model: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub target_ms: u64,
    pub over_target: bool,
}

/// Produced once per session at eviction
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub session_id: String,
    pub phase: SessionPhase,
    pub total_ms: u64,
    pub tier: PerformanceTier,
    pub stages: Vec<StageSummary>,
    /// Stages that ended in fallback or failure
    pub fallbacks: Vec<PipelineStage>,
    /// Stages slower than their target
    pub bottlenecks: Vec<PipelineStage>,
}

impl PipelineSummary {
    pub fn stage(&self, stage: PipelineStage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn status(&self, stage: PipelineStage) -> Option<StageStatus> {
        self.stage(stage).map(|s| s.status)
    }
}

/// Snapshot of an in-flight session
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub stages: HashMap<PipelineStage, StageStatus>,
}

pub struct PipelineTracker {
    sessions: SessionRegistry,
    tiers: TierBounds,
    targets: StageTargets,
}

impl PipelineTracker {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self {
            sessions,
            tiers: TierBounds::default(),
            targets: StageTargets::default(),
        }
    }

    pub fn from_settings(settings: &VoiceSettings, sessions: SessionRegistry) -> Self {
        Self {
            sessions,
            tiers: TierBounds::from(settings),
            targets: StageTargets::from(settings),
        }
    }

    pub fn with_tiers(mut self, tiers: TierBounds) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_targets(mut self, targets: StageTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn create(&self, session_id: &str, user_id: Option<&str>) -> Result<(), PipelineError> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(PipelineError::DuplicateSession(session_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(PipelineSession::new(session_id, user_id));
                tracing::debug!(session_id, "Pipeline session started");
                Ok(())
            }
        }
    }

    pub fn start_stage(
        &self,
        session_id: &str,
        stage: PipelineStage,
        service: &str,
        model: &str,
    ) -> Result<(), PipelineError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        session.start_stage(stage, service, model)?;
        tracing::debug!(session_id, stage = %stage, service, model, "Stage started");
        Ok(())
    }

    pub fn finish_stage(
        &self,
        session_id: &str,
        stage: PipelineStage,
        status: StageStatus,
        error: Option<String>,
    ) -> Result<(), PipelineError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        let duration_ms = session.finish_stage(stage, status, error)?;
        drop(session);

        metrics::histogram!("advisor_stage_latency_ms", "stage" => stage.as_str())
            .record(duration_ms as f64);
        if status != StageStatus::Success {
            metrics::counter!("advisor_fallbacks_total", "stage" => stage.as_str()).increment(1);
        }
        tracing::debug!(
            session_id,
            stage = %stage,
            status = status.as_str(),
            duration_ms,
            "Stage finished"
        );
        Ok(())
    }

    /// Evict a finished session and return its summary
    pub fn complete(&self, session_id: &str) -> Result<PipelineSummary, PipelineError> {
        let (_, mut session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        session.phase = SessionPhase::Complete;
        Ok(self.report(&session))
    }

    /// Evict an abandoned session, failing any stage still running
    pub fn fail(&self, session_id: &str, reason: &str) -> Result<PipelineSummary, PipelineError> {
        let (_, mut session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        session.fail_running(reason);
        tracing::warn!(session_id, reason, "Pipeline session abandoned");
        Ok(self.report(&session))
    }

    fn report(&self, session: &PipelineSession) -> PipelineSummary {
        let total_ms = session.elapsed_ms();
        let summary = session.summarize(total_ms, &self.tiers, &self.targets);
        let stage_ms =
            |stage: PipelineStage| summary.stage(stage).map_or(0, |s| s.duration_ms);

        metrics::histogram!("advisor_pipeline_total_ms").record(total_ms as f64);
        metrics::counter!("advisor_voice_sessions_total", "tier" => summary.tier.as_str())
            .increment(1);
        tracing::info!(
            session_id = %summary.session_id,
            phase = summary.phase.as_str(),
            total_ms,
            tier = summary.tier.as_str(),
            transcription_ms = stage_ms(PipelineStage::Transcription),
            generation_ms = stage_ms(PipelineStage::Generation),
            synthesis_ms = stage_ms(PipelineStage::Synthesis),
            fallbacks = ?summary.fallbacks,
            bottlenecks = ?summary.bottlenecks,
            "Voice pipeline summary"
        );
        summary
    }

    pub fn get(&self, session_id: &str) -> Option<PipelineSession> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// In-flight sessions, oldest first
    pub fn list_active(&self) -> Vec<ActiveSession> {
        let mut active: Vec<ActiveSession> = self
            .sessions
            .iter()
            .map(|entry| {
                let session = entry.value();
                ActiveSession {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id.clone(),
                    phase: session.phase,
                    started_at: session.started_at,
                    elapsed_ms: session.elapsed_ms(),
                    stages: session
                        .stages
                        .iter()
                        .map(|(stage, record)| (*stage, record.status))
                        .collect(),
                }
            })
            .collect();
        active.sort_by_key(|s| s.started_at);
        active
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PipelineTracker {
        PipelineTracker::new(Arc::new(DashMap::new()))
    }

    #[test]
    fn test_tier_bounds() {
        let tiers = TierBounds::default();
        assert_eq!(tiers.classify(0), PerformanceTier::Excellent);
        assert_eq!(tiers.classify(2_999), PerformanceTier::Excellent);
        assert_eq!(tiers.classify(3_000), PerformanceTier::Good);
        assert_eq!(tiers.classify(4_999), PerformanceTier::Good);
        assert_eq!(tiers.classify(7_999), PerformanceTier::Fair);
        assert_eq!(tiers.classify(8_000), PerformanceTier::Poor);
    }

    #[test]
    fn test_stage_lifecycle() {
        let tracker = tracker();
        tracker.create("s1", Some("u1")).unwrap();
        tracker
            .start_stage("s1", PipelineStage::Transcription, "groq", "whisper")
            .unwrap();
        assert_eq!(tracker.get("s1").unwrap().phase, SessionPhase::Transcribing);

        tracker
            .finish_stage("s1", PipelineStage::Transcription, StageStatus::Success, None)
            .unwrap();
        let session = tracker.get("s1").unwrap();
        let record = session.stage(PipelineStage::Transcription).unwrap();
        assert_eq!(record.status, StageStatus::Success);
        assert!(record.duration_ms.is_some());
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let tracker = tracker();
        tracker.create("s1", None).unwrap();

        // Finishing a stage that never started
        assert!(tracker
            .finish_stage("s1", PipelineStage::Generation, StageStatus::Success, None)
            .is_err());

        tracker
            .start_stage("s1", PipelineStage::Generation, "mock", "m")
            .unwrap();
        assert!(tracker
            .finish_stage("s1", PipelineStage::Generation, StageStatus::Running, None)
            .is_err());
        tracker
            .finish_stage("s1", PipelineStage::Generation, StageStatus::Fallback, None)
            .unwrap();

        // Terminal states are final
        assert!(tracker
            .finish_stage("s1", PipelineStage::Generation, StageStatus::Success, None)
            .is_err());
        assert!(tracker
            .start_stage("s1", PipelineStage::Generation, "mock", "m")
            .is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_sessions() {
        let tracker = tracker();
        tracker.create("s1", None).unwrap();
        assert!(matches!(
            tracker.create("s1", None),
            Err(PipelineError::DuplicateSession(_))
        ));
        assert!(matches!(
            tracker.start_stage("nope", PipelineStage::Synthesis, "x", "y"),
            Err(PipelineError::UnknownSession(_))
        ));
        assert!(tracker.complete("nope").is_err());
    }

    #[test]
    fn test_complete_evicts_and_summarizes() {
        let tracker = tracker();
        tracker.create("s1", None).unwrap();
        tracker
            .start_stage("s1", PipelineStage::Transcription, "groq", "whisper")
            .unwrap();
        tracker
            .finish_stage(
                "s1",
                PipelineStage::Transcription,
                StageStatus::Fallback,
                Some("down".into()),
            )
            .unwrap();
        tracker
            .start_stage("s1", PipelineStage::Generation, "groq", "llama")
            .unwrap();
        tracker
            .finish_stage("s1", PipelineStage::Generation, StageStatus::Success, None)
            .unwrap();

        let summary = tracker.complete("s1").unwrap();
        assert!(tracker.is_empty());
        assert_eq!(summary.phase, SessionPhase::Complete);
        assert_eq!(summary.fallbacks, vec![PipelineStage::Transcription]);
        assert_eq!(summary.stages.len(), 2);
        assert_eq!(
            summary.status(PipelineStage::Generation),
            Some(StageStatus::Success)
        );
        assert_eq!(summary.status(PipelineStage::Synthesis), None);
    }

    #[test]
    fn test_summary_reports_bottlenecks_and_tier() {
        let mut session = PipelineSession::new("s1", None);
        for stage in PipelineStage::ALL {
            session.start_stage(stage, "svc", "model").unwrap();
            session.finish_stage(stage, StageStatus::Success, None).unwrap();
        }
        session
            .stages
            .get_mut(&PipelineStage::Transcription)
            .unwrap()
            .duration_ms = Some(500);
        session
            .stages
            .get_mut(&PipelineStage::Generation)
            .unwrap()
            .duration_ms = Some(2_400);
        session
            .stages
            .get_mut(&PipelineStage::Synthesis)
            .unwrap()
            .duration_ms = Some(900);

        let summary =
            session.summarize(3_800, &TierBounds::default(), &StageTargets::default());
        assert_eq!(summary.tier, PerformanceTier::Good);
        assert_eq!(
            summary.bottlenecks,
            vec![PipelineStage::Generation, PipelineStage::Synthesis]
        );
        assert!(summary.fallbacks.is_empty());
        let generation = summary.stage(PipelineStage::Generation).unwrap();
        assert_eq!(generation.target_ms, 1_500);
        assert!(generation.over_target);
    }

    #[test]
    fn test_fail_marks_running_stage() {
        let tracker = tracker();
        tracker.create("s1", None).unwrap();
        tracker
            .start_stage("s1", PipelineStage::Synthesis, "deepgram", "aura")
            .unwrap();
        let summary = tracker.fail("s1", "client disconnected").unwrap();
        assert_eq!(summary.phase, SessionPhase::Failed);
        assert_eq!(summary.status(PipelineStage::Synthesis), Some(StageStatus::Failed));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_list_active_and_shared_registry() {
        let registry: SessionRegistry = Arc::new(DashMap::new());
        let first = PipelineTracker::new(registry.clone());
        let second = PipelineTracker::new(registry.clone());

        first.create("a", Some("u1")).unwrap();
        second.create("b", None).unwrap();
        second
            .start_stage("b", PipelineStage::Transcription, "groq", "whisper")
            .unwrap();

        let active = first.list_active();
        assert_eq!(active.len(), 2);
        let b = active.iter().find(|s| s.session_id == "b").unwrap();
        assert_eq!(b.phase, SessionPhase::Transcribing);
        assert_eq!(
            b.stages.get(&PipelineStage::Transcription),
            Some(&StageStatus::Running)
        );

        // Separate registries do not see each other
        let isolated = tracker();
        assert!(isolated.list_active().is_empty());
    }
}
