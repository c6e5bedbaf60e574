//! Intervention gate: turns a stream of observations into at most one
//! user-facing suggestion per cool-down window.
//!
//! The gate only decides. The presentation layer reads [`GateView`] from a
//! watch channel, renders whatever it likes, and reports the user's answer
//! back through [`SharedGate::dismiss`].

use crate::core::observation::LearningState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Which suggestion, if any, is currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionState {
    Idle,
    BreakSuggested,
    QuizSuggested,
    SleepSuggested,
}

impl std::fmt::Display for InterventionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InterventionState::Idle => "idle",
            InterventionState::BreakSuggested => "break suggested",
            InterventionState::QuizSuggested => "quiz suggested",
            InterventionState::SleepSuggested => "rest suggested",
        };
        f.write_str(label)
    }
}

/// Where a "Confused" learning state is routed.
///
/// `Sleep` keeps the established behavior of answering confusion with a
/// rest prompt; `Quiz` sends it to the quiz prompt instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfusedRouting {
    #[default]
    Sleep,
    Quiz,
}

/// The signals from one classification that the gate looks at.
#[derive(Debug, Clone, Default)]
pub struct GateCues {
    pub learning_state: LearningState,
    /// The classifier explicitly asked for a break
    pub break_requested: bool,
    pub is_sleeping: bool,
    /// Feedback text to show with the suggestion
    pub message: Option<String>,
    /// Link or route attached to the feedback
    pub resource: Option<String>,
}

/// A suggestion that fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub kind: InterventionState,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// How the user answered a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dismissal {
    Continue,
    Skip,
    Confirm,
    /// The user accepted and wants the attached resource opened
    TakeAction,
}

/// Tunables for the gate.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub cooldown: Duration,
    pub confused_routing: ConfusedRouting,
    pub sleep_detection: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(2),
            confused_routing: ConfusedRouting::Sleep,
            sleep_detection: false,
        }
    }
}

/// Read-only view of the gate published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateView {
    pub state: InterventionState,
    pub active: Option<Intervention>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// The throttling state machine.
#[derive(Debug, Clone)]
pub struct InterventionGate {
    policy: GatePolicy,
    active: Option<Intervention>,
    last_triggered_at: Option<DateTime<Utc>>,
}

impl InterventionGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            active: None,
            last_triggered_at: None,
        }
    }

    /// Current state; `Idle` when nothing is shown.
    pub fn state(&self) -> InterventionState {
        self.active
            .as_ref()
            .map(|i| i.kind)
            .unwrap_or(InterventionState::Idle)
    }

    pub fn active(&self) -> Option<&Intervention> {
        self.active.as_ref()
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at
    }

    /// Whether a new transition is allowed at `now`.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_triggered_at
            .map(|last| now - last >= self.policy.cooldown)
            .unwrap_or(true)
    }

    /// Feed one observation's cues. Returns the intervention if one fired.
    pub fn observe(&mut self, cues: &GateCues, now: DateTime<Utc>) -> Option<Intervention> {
        if self.active.is_some() || !self.cooldown_elapsed(now) {
            return None;
        }

        let kind = self.decide(cues)?;
        let intervention = Intervention {
            kind,
            triggered_at: now,
            message: cues.message.clone(),
            resource: cues.resource.clone(),
        };

        self.last_triggered_at = Some(now);
        self.active = Some(intervention.clone());
        Some(intervention)
    }

    /// Close the active suggestion. The cool-down keeps running from the
    /// original trigger time. Returns the suggestion that was closed.
    pub fn dismiss(&mut self, _dismissal: Dismissal) -> Option<Intervention> {
        self.active.take()
    }

    /// Priority order, first match wins.
    fn decide(&self, cues: &GateCues) -> Option<InterventionState> {
        if cues.break_requested {
            return Some(InterventionState::BreakSuggested);
        }

        if cues.learning_state == LearningState::Confused {
            return Some(match self.policy.confused_routing {
                ConfusedRouting::Sleep => InterventionState::SleepSuggested,
                ConfusedRouting::Quiz => InterventionState::QuizSuggested,
            });
        }

        if self.policy.sleep_detection && cues.is_sleeping {
            return Some(InterventionState::SleepSuggested);
        }

        None
    }

    fn view(&self) -> GateView {
        GateView {
            state: self.state(),
            active: self.active().cloned(),
            last_triggered_at: self.last_triggered_at(),
        }
    }
}

impl Default for InterventionGate {
    fn default() -> Self {
        Self::new(GatePolicy::default())
    }
}

/// Serialized access to an [`InterventionGate`].
///
/// Tick completions and user dismissals both go through the same mutex, so
/// a dismissal can never interleave with a trigger decision. Every change is
/// published on a watch channel.
#[derive(Clone)]
pub struct SharedGate {
    inner: Arc<Mutex<InterventionGate>>,
    updates: Arc<watch::Sender<GateView>>,
}

impl SharedGate {
    pub fn new(gate: InterventionGate) -> Self {
        let (tx, _rx) = watch::channel(gate.view());
        Self {
            inner: Arc::new(Mutex::new(gate)),
            updates: Arc::new(tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InterventionGate> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<GateView> {
        self.updates.subscribe()
    }

    /// Current view of the gate.
    pub fn view(&self) -> GateView {
        self.lock().view()
    }

    pub fn observe(&self, cues: &GateCues, now: DateTime<Utc>) -> Option<Intervention> {
        let mut gate = self.lock();
        let fired = gate.observe(cues, now);
        if let Some(ref intervention) = fired {
            info!(kind = %intervention.kind, "intervention triggered");
            self.updates.send_replace(gate.view());
        }
        fired
    }

    pub fn dismiss(&self, dismissal: Dismissal) -> Option<Intervention> {
        let mut gate = self.lock();
        let closed = gate.dismiss(dismissal);
        if let Some(ref intervention) = closed {
            debug!(kind = %intervention.kind, ?dismissal, "intervention dismissed");
            self.updates.send_replace(gate.view());
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn confused() -> GateCues {
        GateCues {
            learning_state: LearningState::Confused,
            ..GateCues::default()
        }
    }

    fn break_request() -> GateCues {
        GateCues {
            learning_state: LearningState::Tired,
            break_requested: true,
            message: Some("You seem tired.".to_string()),
            resource: Some("/mini-break".to_string()),
            ..GateCues::default()
        }
    }

    #[test]
    fn test_starts_idle() {
        let gate = InterventionGate::default();
        assert_eq!(gate.state(), InterventionState::Idle);
        assert_eq!(gate.last_triggered_at(), None);
    }

    #[test]
    fn test_break_has_priority_over_confusion() {
        let mut gate = InterventionGate::default();
        let cues = GateCues {
            learning_state: LearningState::Confused,
            break_requested: true,
            ..GateCues::default()
        };
        let fired = gate.observe(&cues, at(0)).unwrap();
        assert_eq!(fired.kind, InterventionState::BreakSuggested);
    }

    #[test]
    fn test_break_carries_feedback() {
        let mut gate = InterventionGate::default();
        let fired = gate.observe(&break_request(), at(0)).unwrap();
        assert_eq!(fired.message.as_deref(), Some("You seem tired."));
        assert_eq!(fired.resource.as_deref(), Some("/mini-break"));
    }

    #[test]
    fn test_confused_routes_to_sleep_by_default() {
        let mut gate = InterventionGate::default();
        gate.observe(&confused(), at(0));
        assert_eq!(gate.state(), InterventionState::SleepSuggested);
    }

    #[test]
    fn test_confused_routes_to_quiz_when_configured() {
        let mut gate = InterventionGate::new(GatePolicy {
            confused_routing: ConfusedRouting::Quiz,
            ..GatePolicy::default()
        });
        gate.observe(&confused(), at(0));
        assert_eq!(gate.state(), InterventionState::QuizSuggested);
    }

    #[test]
    fn test_other_states_do_not_transition() {
        let mut gate = InterventionGate::default();
        let cues = GateCues {
            learning_state: LearningState::Frustrated,
            is_sleeping: true,
            ..GateCues::default()
        };
        assert!(gate.observe(&cues, at(0)).is_none());
        assert_eq!(gate.state(), InterventionState::Idle);
        assert_eq!(gate.last_triggered_at(), None);
    }

    #[test]
    fn test_sleep_detection_opt_in() {
        let mut gate = InterventionGate::new(GatePolicy {
            sleep_detection: true,
            ..GatePolicy::default()
        });
        let cues = GateCues {
            is_sleeping: true,
            ..GateCues::default()
        };
        gate.observe(&cues, at(0));
        assert_eq!(gate.state(), InterventionState::SleepSuggested);
    }

    #[test]
    fn test_active_suggestion_is_not_overridden() {
        let mut gate = InterventionGate::default();
        gate.observe(&confused(), at(0));

        // Even after the cool-down, nothing replaces a visible suggestion
        assert!(gate.observe(&break_request(), at(600)).is_none());
        assert_eq!(gate.state(), InterventionState::SleepSuggested);
        assert_eq!(gate.last_triggered_at(), Some(at(0)));
    }

    #[test]
    fn test_cooldown_runs_from_trigger_not_dismissal() {
        let mut gate = InterventionGate::default();

        assert!(gate.observe(&confused(), at(0)).is_some());

        // Dismiss late; the window still counts from t=0
        let closed = gate.dismiss(Dismissal::Continue).unwrap();
        assert_eq!(closed.kind, InterventionState::SleepSuggested);
        assert_eq!(gate.state(), InterventionState::Idle);
        assert_eq!(gate.last_triggered_at(), Some(at(0)));

        assert!(gate.observe(&confused(), at(119)).is_none());
        assert!(gate.observe(&confused(), at(120)).is_some());
        assert_eq!(gate.last_triggered_at(), Some(at(120)));
    }

    #[test]
    fn test_dismiss_when_idle_is_noop() {
        let mut gate = InterventionGate::default();
        assert!(gate.dismiss(Dismissal::Skip).is_none());
        assert_eq!(gate.state(), InterventionState::Idle);
    }

    #[test]
    fn test_shared_gate_publishes_changes() {
        let shared = SharedGate::new(InterventionGate::default());
        let mut rx = shared.subscribe();
        assert_eq!(rx.borrow_and_update().state, InterventionState::Idle);

        shared.observe(&confused(), at(0));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().state,
            InterventionState::SleepSuggested
        );

        shared.dismiss(Dismissal::Confirm);
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.state, InterventionState::Idle);
        assert_eq!(view.last_triggered_at, Some(at(0)));
    }

    #[test]
    fn test_routing_serde_names() {
        let routing: ConfusedRouting = serde_json::from_str(r#""quiz""#).unwrap();
        assert_eq!(routing, ConfusedRouting::Quiz);
        assert_eq!(
            serde_json::to_string(&ConfusedRouting::Sleep).unwrap(),
            r#""sleep""#
        );
    }
}
