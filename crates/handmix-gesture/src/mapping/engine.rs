//! Gesture → command mapping engine
//!
//! Runs on the control thread once per tick. Each call:
//!
//! 1. Loads the active profile once (every command of the call comes from it)
//! 2. Turns each event into one proposal per matching rule
//! 3. Keeps one winner per target: priority, then most recent activation,
//!    then the later rule
//! 4. Applies the minimum-change throttle against the value estimate and
//!    emits [`ControlCommand`]s stamped with the tick time
//!
//! The engine keeps its own estimate of every target it has touched, seeded
//! from the declared defaults. Relative integration, toggles and restores
//! all work from that estimate.

use std::collections::HashMap;
use std::sync::Arc;

use handmix_core::engine::{ControlCommand, ParamClass, ParamKind, TargetKey};
use handmix_core::types::Micros;
use serde::{Deserialize, Serialize};

use super::profile::{MappingMode, MappingProfile, MappingRule, ProfileHandle, ValueRange};
use crate::classifier::{GestureEvent, GestureKind, HandSelector, Phase};

/// Output throttle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Smallest change worth sending, as a fraction of the parameter's span
    pub default_min_change: f32,
    /// Per-class overrides of `default_min_change`
    pub min_change: HashMap<ParamClass, f32>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_min_change: 0.01,
            min_change: HashMap::new(),
        }
    }
}

impl MappingConfig {
    /// Throttle fraction for a parameter class
    pub fn min_change_for(&self, class: ParamClass) -> f32 {
        self.min_change
            .get(&class)
            .copied()
            .unwrap_or(self.default_min_change)
            .max(0.0)
    }
}

/// Per (rule, hand) state within one activation
#[derive(Debug, Clone, Copy, Default)]
struct RuleState {
    /// Activation (its `activated_tick`) this state belongs to
    activation: Option<u64>,
    /// Absolute: parameter of the last emitted value
    last_accepted_p: Option<f32>,
    /// Relative: parameter the next delta is measured from
    prev_param: Option<f32>,
    /// Relative: applied change held back by the throttle
    pending: f32,
    /// Value to put back on release
    restore: Option<f32>,
    /// Gesture and target the activation drives
    origin: Option<(GestureKind, TargetKey)>,
}

type StateKey = (usize, HandSelector);

#[derive(Debug, Clone, Copy)]
enum Proposal {
    /// Absolute value at normalized parameter `p` (throttled)
    Level { value: f32, p: f32 },
    /// Relative change, clamped to `range` (throttled, accumulates)
    Nudge { change: f32, range: ValueRange },
    /// Set that bypasses the throttle
    Force { value: f32 },
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: TargetKey,
    state: StateKey,
    priority: i32,
    activated_tick: u64,
    rule: usize,
    proposal: Proposal,
}

impl Candidate {
    #[inline]
    fn rank(&self) -> (i32, u64, usize) {
        (self.priority, self.activated_tick, self.rule)
    }
}

/// Maps gesture events to engine commands under the active profile
pub struct MappingEngine {
    handle: Arc<ProfileHandle>,
    config: MappingConfig,
    num_stems: usize,
    /// Generation the rule state belongs to
    generation: Option<u64>,
    states: HashMap<StateKey, RuleState>,
    /// Last value sent per target
    estimates: HashMap<TargetKey, f32>,
}

impl MappingEngine {
    pub fn new(handle: Arc<ProfileHandle>, config: MappingConfig, num_stems: usize) -> Self {
        Self {
            handle,
            config,
            num_stems,
            generation: None,
            states: HashMap::new(),
            estimates: HashMap::new(),
        }
    }

    pub fn handle(&self) -> &Arc<ProfileHandle> {
        &self.handle
    }

    /// Current estimate of a target (its declared default until first written)
    pub fn target_value(&self, target: TargetKey) -> f32 {
        let key = TargetKey::new(target.stem, target.param);
        self.estimates
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.param.default_value())
    }

    /// Map one tick of gesture events to commands stamped `now_us`
    pub fn map(&mut self, events: &[GestureEvent], now_us: Micros) -> Vec<ControlCommand> {
        let (profile, generation) = self.handle.snapshot();
        if self.generation != Some(generation) {
            self.on_profile_change(&profile, generation);
        }

        // One winner per target, in order of first appearance
        let mut winners: Vec<Candidate> = Vec::new();
        for event in events {
            if !event.param.is_finite() {
                continue;
            }
            for (index, rule) in profile.rules.iter().enumerate() {
                if rule.gesture != event.kind || !rule.hand.accepts(event.hand) {
                    continue;
                }
                let Some(param) = rule.target.param_kind() else {
                    continue;
                };
                let key = TargetKey::new(rule.target.stem, param);
                let state = (index, event.hand);
                let Some(proposal) = self.propose(state, rule, &param, key, event) else {
                    continue;
                };
                let candidate = Candidate {
                    key,
                    state,
                    priority: rule.priority,
                    activated_tick: event.activated_tick,
                    rule: index,
                    proposal,
                };
                match winners.iter_mut().find(|w| w.key == key) {
                    Some(existing) => {
                        if candidate.rank() >= existing.rank() {
                            *existing = candidate;
                        }
                    }
                    None => winners.push(candidate),
                }
            }
        }

        winners
            .into_iter()
            .filter_map(|candidate| self.resolve(candidate, now_us))
            .collect()
    }

    fn on_profile_change(&mut self, profile: &MappingProfile, generation: u64) {
        if self.generation.is_some() {
            log::debug!(
                "[MAPPING] Profile '{}' is now active (generation {}), resetting rule state",
                profile.name,
                generation
            );
        }
        for (index, rule) in profile.rules.iter().enumerate() {
            let partner = rule.target.with.unwrap_or(0);
            if rule.target.stem >= self.num_stems || partner >= self.num_stems {
                log::warn!(
                    "[MAPPING] Rule {} of '{}' targets stem {} but only {} are mixed; the engine will reject it",
                    index,
                    profile.name,
                    rule.target.stem.max(partner),
                    self.num_stems
                );
            }
        }

        // Restores of gestures still held move to the new rules driving the same target
        let held: Vec<(HandSelector, GestureKind, TargetKey, u64, f32)> = self
            .states
            .drain()
            .filter_map(|((_, hand), state)| {
                let (kind, key) = state.origin?;
                Some((hand, kind, key, state.activation?, state.restore?))
            })
            .collect();
        for (hand, kind, key, activation, restore) in held {
            let mut carried = false;
            for (index, rule) in profile.rules.iter().enumerate() {
                let same_target = rule
                    .target
                    .param_kind()
                    .is_some_and(|param| TargetKey::new(rule.target.stem, param) == key);
                if rule.gesture == kind && rule.hand.accepts(hand) && rule.restore_on_release && same_target {
                    self.states.insert(
                        (index, hand),
                        RuleState {
                            activation: Some(activation),
                            restore: Some(restore),
                            origin: Some((kind, key)),
                            ..RuleState::default()
                        },
                    );
                    carried = true;
                }
            }
            if !carried {
                log::debug!(
                    "[MAPPING] Dropped pending restore of stem {} {:?}, no longer mapped by {}",
                    key.stem,
                    key.param,
                    kind
                );
            }
        }
        self.generation = Some(generation);
    }

    /// Turn one event into a proposal for one rule, updating the rule's state
    fn propose(
        &mut self,
        state_key: StateKey,
        rule: &MappingRule,
        param: &ParamKind,
        key: TargetKey,
        event: &GestureEvent,
    ) -> Option<Proposal> {
        let estimate = self.target_value(key);
        let range = rule.effective_range(param);
        let state = self.states.entry(state_key).or_default();

        if state.activation != Some(event.activated_tick) {
            *state = RuleState {
                activation: Some(event.activated_tick),
                origin: Some((event.kind, key)),
                ..RuleState::default()
            };
            if rule.restore_on_release && event.phase != Phase::Released {
                state.restore = Some(estimate);
            }
        }

        let mut p = if event.kind.has_signed_param() {
            (event.param + 1.0) * 0.5
        } else {
            event.param
        };
        p = p.clamp(0.0, 1.0);
        if rule.inverts() {
            p = 1.0 - p;
        }

        if event.phase == Phase::Released {
            let restore = state.restore.take();
            *state = RuleState::default();
            return restore.map(|value| Proposal::Force { value });
        }

        match rule.mode {
            MappingMode::Absolute => {
                if let Some(last) = state.last_accepted_p {
                    if (p - last).abs() < rule.deadzone {
                        return None;
                    }
                }
                Some(Proposal::Level { value: range.lerp(p), p })
            }
            MappingMode::Relative => {
                let Some(prev) = state.prev_param else {
                    state.prev_param = Some(p);
                    return None;
                };
                let delta = p - prev;
                if delta.abs() < rule.deadzone {
                    return None;
                }
                state.prev_param = Some(p);
                Some(Proposal::Nudge {
                    change: delta * rule.sensitivity * range.span(),
                    range,
                })
            }
            MappingMode::Trigger => {
                (event.phase == Phase::Began).then_some(Proposal::Force { value: range.max })
            }
            MappingMode::Toggle => {
                if event.phase != Phase::Began {
                    return None;
                }
                let value = if (estimate - range.min).abs() <= (estimate - range.max).abs() {
                    range.max
                } else {
                    range.min
                };
                Some(Proposal::Force { value })
            }
        }
    }

    /// Throttle a winning proposal and emit its command
    fn resolve(&mut self, candidate: Candidate, now_us: Micros) -> Option<ControlCommand> {
        let key = candidate.key;
        let param = key.param;
        let estimate = self.target_value(key);
        let threshold = (self.config.min_change_for(param.class()) * param.span()).max(f32::EPSILON);

        match candidate.proposal {
            Proposal::Level { value, p } => {
                let value = param.clamp(value);
                if (value - estimate).abs() < threshold {
                    return None;
                }
                self.estimates.insert(key, value);
                if let Some(state) = self.states.get_mut(&candidate.state) {
                    state.last_accepted_p = Some(p);
                }
                Some(ControlCommand::set(key.stem, param, value, now_us))
            }
            Proposal::Nudge { change, range } => {
                let state = self.states.entry(candidate.state).or_default();
                let target = param.clamp(range.clamp(estimate + state.pending + change));
                let applied = target - estimate;
                if applied.abs() < threshold {
                    // Only the part that can still move the value is kept
                    state.pending = applied;
                    return None;
                }
                state.pending = 0.0;
                self.estimates.insert(key, target);
                Some(ControlCommand::delta(key.stem, param, applied, now_us))
            }
            Proposal::Force { value } => {
                let value = param.clamp(value);
                self.estimates.insert(key, value);
                Some(ControlCommand::set(key.stem, param, value, now_us))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::GestureKind;
    use crate::mapping::profile::{ControlTarget, TargetParam};
    use handmix_core::engine::CommandMode;

    fn engine_with(rules: Vec<MappingRule>) -> MappingEngine {
        let handle = Arc::new(ProfileHandle::new(MappingProfile::new("test", rules)));
        MappingEngine::new(handle, MappingConfig::default(), 4)
    }

    fn event(kind: GestureKind, hand: HandSelector, param: f32, phase: Phase, tick: u64) -> GestureEvent {
        GestureEvent { kind, hand, confidence: 0.9, param, phase, activated_tick: tick }
    }

    fn rule(gesture: GestureKind, stem: usize, param: TargetParam, mode: MappingMode) -> MappingRule {
        MappingRule::new(gesture, HandSelector::Either, ControlTarget::new(stem, param), mode)
    }

    fn values(commands: &[ControlCommand]) -> Vec<f32> {
        commands.iter().map(|c| c.value).collect()
    }

    #[test]
    fn test_pinch_to_volume_is_inverse() {
        let mut engine = engine_with(vec![rule(GestureKind::Pinch, 0, TargetParam::Volume, MappingMode::Absolute)]);
        let mut sent = Vec::new();
        for (i, (param, phase)) in [(0.9, Phase::Began), (0.5, Phase::Held), (0.1, Phase::Held)].into_iter().enumerate() {
            let commands = engine.map(&[event(GestureKind::Pinch, HandSelector::Right, param, phase, 3)], i as u64 * 1000);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].mode, CommandMode::Set);
            assert_eq!(commands[0].param, ParamKind::Volume);
            sent.push(commands[0].value);
        }
        for (got, want) in sent.iter().zip([0.1, 0.5, 0.9]) {
            assert!((got - want).abs() < 1e-5, "{:?}", sent);
        }
        assert!((engine.target_value(TargetKey::new(0, ParamKind::Volume)) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_deadzone_repeated_param_emits_once() {
        let mut engine = engine_with(vec![
            rule(GestureKind::Fist, 0, TargetParam::Volume, MappingMode::Absolute).with_deadzone(0.05)
        ]);
        let mut total = 0;
        total += engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.4, Phase::Began, 1)], 0).len();
        for t in 1..20 {
            total += engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.4, Phase::Held, 1)], t).len();
        }
        assert_eq!(total, 1);

        // Inside the dead band of the last accepted parameter
        assert!(engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.43, Phase::Held, 1)], 30).is_empty());
        assert_eq!(engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.5, Phase::Held, 1)], 31).len(), 1);
    }

    #[test]
    fn test_repeated_param_without_deadzone_is_throttled() {
        let mut engine = engine_with(vec![rule(GestureKind::Fist, 1, TargetParam::Pan, MappingMode::Absolute)]);
        let sent: usize = (0..10)
            .map(|t| engine.map(&[event(GestureKind::Fist, HandSelector::Right, 0.7, Phase::Held, 1)], t).len())
            .sum();
        assert_eq!(sent, 1);
    }

    #[test]
    fn test_relative_accumulates_suppressed_deltas() {
        let mut engine = engine_with(vec![rule(GestureKind::Spread, 0, TargetParam::Volume, MappingMode::Relative)]);
        let mut feed = |param: f32, phase: Phase| engine.map(&[event(GestureKind::Spread, HandSelector::Left, param, phase, 5)], 0);

        // First event of an activation only records the parameter
        assert!(feed(0.5, Phase::Began).is_empty());

        let commands = feed(0.3, Phase::Held);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].mode, CommandMode::Delta);
        assert!((commands[0].value + 0.2).abs() < 1e-5);

        // Two sub-threshold steps, then one that pushes the total over
        assert!(feed(0.296, Phase::Held).is_empty());
        assert!(feed(0.292, Phase::Held).is_empty());
        let commands = feed(0.288, Phase::Held);
        assert_eq!(commands.len(), 1);
        assert!((commands[0].value + 0.012).abs() < 1e-4, "{}", commands[0].value);
        assert!((engine.target_value(TargetKey::new(0, ParamKind::Volume)) - 0.788).abs() < 1e-4);
    }

    #[test]
    fn test_relative_clamps_to_range() {
        let mut engine = engine_with(vec![rule(GestureKind::Spread, 0, TargetParam::Volume, MappingMode::Relative)]);
        engine.map(&[event(GestureKind::Spread, HandSelector::Left, 0.5, Phase::Began, 1)], 0);
        // Already at 1.0, pushing up moves nothing
        assert!(engine.map(&[event(GestureKind::Spread, HandSelector::Left, 0.8, Phase::Held, 1)], 0).is_empty());
        // Coming back down responds at once
        let commands = engine.map(&[event(GestureKind::Spread, HandSelector::Left, 0.6, Phase::Held, 1)], 0);
        assert!((commands[0].value + 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_trigger_and_toggle() {
        let mut engine = engine_with(vec![
            rule(GestureKind::PeaceSign, 2, TargetParam::SidechainDepth, MappingMode::Trigger).with_range(0.0, 0.8),
            rule(GestureKind::Fist, 3, TargetParam::Mute, MappingMode::Toggle),
        ]);
        let peace = |phase, tick| event(GestureKind::PeaceSign, HandSelector::Left, 0.5, phase, tick);
        let fist = |phase, tick| event(GestureKind::Fist, HandSelector::Right, 0.5, phase, tick);

        assert_eq!(values(&engine.map(&[peace(Phase::Began, 1)], 0)), vec![0.8]);
        assert!(engine.map(&[peace(Phase::Held, 1)], 0).is_empty());
        // Triggers bypass the throttle
        assert_eq!(values(&engine.map(&[peace(Phase::Began, 9)], 0)), vec![0.8]);

        assert_eq!(values(&engine.map(&[fist(Phase::Began, 2)], 0)), vec![1.0]);
        assert!(engine.map(&[fist(Phase::Held, 2)], 0).is_empty());
        assert!(engine.map(&[fist(Phase::Released, 2)], 0).is_empty());
        assert_eq!(values(&engine.map(&[fist(Phase::Began, 8)], 0)), vec![0.0]);
    }

    #[test]
    fn test_restore_on_release() {
        let mut engine = engine_with(vec![MappingRule::new(
            GestureKind::TwoHandPinch,
            HandSelector::Both,
            ControlTarget::crossfade(1, 0),
            MappingMode::Absolute,
        )
        .restoring()]);
        let pinch = |param, phase| event(GestureKind::TwoHandPinch, HandSelector::Both, param, phase, 4);

        let began = engine.map(&[pinch(0.8, Phase::Began)], 0);
        assert_eq!(began[0].stem, 0);
        assert_eq!(began[0].param, ParamKind::Crossfade { other: 1 });
        assert!((began[0].value - 0.8).abs() < 1e-6);
        engine.map(&[pinch(0.9, Phase::Held)], 0);

        let released = engine.map(&[pinch(0.9, Phase::Released)], 0);
        assert_eq!(values(&released), vec![0.5]);
        assert_eq!(engine.target_value(TargetKey::new(1, ParamKind::Crossfade { other: 0 })), 0.5);
    }

    #[test]
    fn test_conflicts_resolve_by_priority_then_recency_then_order() {
        let volume = |gesture, priority| {
            rule(gesture, 0, TargetParam::Volume, MappingMode::Absolute).with_priority(priority)
        };
        let events = |fist_tick, peace_tick| {
            [
                event(GestureKind::Fist, HandSelector::Left, 0.2, Phase::Held, fist_tick),
                event(GestureKind::PeaceSign, HandSelector::Right, 0.6, Phase::Held, peace_tick),
            ]
        };

        let mut engine = engine_with(vec![volume(GestureKind::Fist, 5), volume(GestureKind::PeaceSign, 0)]);
        assert_eq!(values(&engine.map(&events(1, 9), 0)), vec![0.2]);

        let mut engine = engine_with(vec![volume(GestureKind::Fist, 0), volume(GestureKind::PeaceSign, 0)]);
        assert_eq!(values(&engine.map(&events(1, 9), 0)), vec![0.6]);
        let mut engine = engine_with(vec![volume(GestureKind::Fist, 0), volume(GestureKind::PeaceSign, 0)]);
        assert_eq!(values(&engine.map(&events(9, 1), 0)), vec![0.2]);

        let mut engine = engine_with(vec![volume(GestureKind::Fist, 0), volume(GestureKind::PeaceSign, 0)]);
        assert_eq!(values(&engine.map(&events(3, 3), 0)), vec![0.6]);
    }

    #[test]
    fn test_hand_selector_filters_events() {
        let mut engine = engine_with(vec![MappingRule::new(
            GestureKind::Fist,
            HandSelector::Right,
            ControlTarget::new(0, TargetParam::Volume),
            MappingMode::Absolute,
        )]);
        assert!(engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.3, Phase::Began, 1)], 0).is_empty());
        assert_eq!(engine.map(&[event(GestureKind::Fist, HandSelector::Right, 0.3, Phase::Began, 1)], 0).len(), 1);
    }

    #[test]
    fn test_swipe_param_is_recentered() {
        let mut engine = engine_with(vec![rule(GestureKind::SwipeHorizontal, 2, TargetParam::Pan, MappingMode::Absolute)]);
        let swipe = |param| event(GestureKind::SwipeHorizontal, HandSelector::Left, param, Phase::Held, 1);
        assert_eq!(values(&engine.map(&[swipe(-1.0)], 0)), vec![-1.0]);
        assert!((engine.map(&[swipe(0.5)], 0)[0].value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_min_change_per_class() {
        let handle = Arc::new(ProfileHandle::new(MappingProfile::new(
            "test",
            vec![rule(GestureKind::Fist, 0, TargetParam::Volume, MappingMode::Absolute)],
        )));
        let mut config = MappingConfig::default();
        config.min_change.insert(ParamClass::Volume, 0.2);
        let mut engine = MappingEngine::new(handle, config, 4);
        let fist = |param| event(GestureKind::Fist, HandSelector::Left, param, Phase::Held, 1);

        assert_eq!(engine.map(&[fist(0.5)], 0).len(), 1);
        assert!(engine.map(&[fist(0.6)], 0).is_empty());
        assert_eq!(values(&engine.map(&[fist(0.75)], 0)), vec![0.75]);
    }

    #[test]
    fn test_profile_swap_clears_rule_state() {
        let relative = rule(GestureKind::Spread, 0, TargetParam::Volume, MappingMode::Relative);
        let mut engine = engine_with(vec![relative.clone()]);
        let spread = |param, phase| event(GestureKind::Spread, HandSelector::Left, param, phase, 2);

        engine.map(&[spread(0.5, Phase::Began)], 0);
        engine
            .handle()
            .activate(MappingProfile::new("other", vec![relative.with_sensitivity(2.0)]))
            .unwrap();

        // New generation: the first event re-records instead of integrating
        assert!(engine.map(&[spread(0.3, Phase::Held)], 0).is_empty());
        let commands = engine.map(&[spread(0.2, Phase::Held)], 0);
        assert!((commands[0].value + 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_profile_swap_keeps_pre_gesture_restore() {
        let restoring = rule(GestureKind::Pinch, 0, TargetParam::Volume, MappingMode::Absolute).restoring();
        let mut engine = engine_with(vec![restoring.clone()]);
        let pinch = |param, phase| event(GestureKind::Pinch, HandSelector::Left, param, phase, 6);

        assert_eq!(values(&engine.map(&[pinch(0.2, Phase::Began)], 0)), vec![0.8]);

        // Same target, now at another rule index
        let unrelated = rule(GestureKind::Fist, 1, TargetParam::Pan, MappingMode::Absolute);
        engine
            .handle()
            .activate(MappingProfile::new("swapped", vec![unrelated, restoring]))
            .unwrap();
        let held = engine.map(&[pinch(0.6, Phase::Held)], 0);
        assert!((held[0].value - 0.4).abs() < 1e-5);

        let released = engine.map(&[pinch(0.6, Phase::Released)], 0);
        assert_eq!(values(&released), vec![1.0]);
        assert_eq!(engine.target_value(TargetKey::new(0, ParamKind::Volume)), 1.0);
    }

    #[test]
    fn test_profile_swap_drops_restore_of_unmapped_target() {
        let mut engine = engine_with(vec![
            rule(GestureKind::Pinch, 0, TargetParam::Volume, MappingMode::Absolute).restoring()
        ]);
        let pinch = |param, phase| event(GestureKind::Pinch, HandSelector::Left, param, phase, 6);
        engine.map(&[pinch(0.2, Phase::Began)], 0);

        let elsewhere = rule(GestureKind::Pinch, 1, TargetParam::Volume, MappingMode::Absolute).restoring();
        engine.handle().activate(MappingProfile::new("elsewhere", vec![elsewhere])).unwrap();
        engine.map(&[pinch(0.6, Phase::Held)], 0);

        // The new rule restores what stem 1 had when it took over; stem 0 keeps its value
        let released = engine.map(&[pinch(0.6, Phase::Released)], 0);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].stem, 1);
        assert_eq!(released[0].value, 1.0);
        assert!((engine.target_value(TargetKey::new(0, ParamKind::Volume)) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_commands_carry_tick_time() {
        let mut engine = engine_with(vec![rule(GestureKind::Fist, 0, TargetParam::Volume, MappingMode::Absolute)]);
        let commands = engine.map(&[event(GestureKind::Fist, HandSelector::Left, 0.3, Phase::Began, 1)], 123_456);
        assert_eq!(commands[0].timestamp_us, 123_456);
    }
}
