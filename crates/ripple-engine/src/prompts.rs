//! Prompt text for every model-backed role.
//!
//! Instructions and output schemas go in the system prompt; runtime data
//! (simulation input, snapshots, history, evidence) goes only in the user
//! prompt. The decision agent's system prompt is the caller-supplied base
//! profile joined with the phase instructions below.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever instruction text changes.

use ripple_core::{AgentKind, TimeProgress};

/// Prompt version. Bump on any instruction change.
pub const PROMPT_VERSION: &str = "1.2.0";

// ── Decision agent: INIT ────────────────────────────────────────────────

pub const INIT_DYNAMICS_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. Analyse the \
scenario and choose the simulation's time dynamics.

Reply with exactly one JSON object:
{
  \"wave_time_window\": \"<real time covered by one wave, e.g. 4h or 1d>\",
  \"wave_time_window_reasoning\": \"<why>\",
  \"energy_decay_per_wave\": <0..1>,
  \"estimated_total_waves\": <integer, used only when no horizon is given>,
  \"platform_characteristics\": \"<short description>\"
}";

/// Appended to the dynamics instructions when the caller fixed a horizon.
pub fn init_dynamics_horizon_line(horizon: &str) -> String {
    format!(
        "\n\nThe simulation horizon is fixed at {}. Choose a wave_time_window that divides it into a sensible number of waves.",
        horizon
    )
}

pub const INIT_AGENTS_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. Design the \
population of simulated actors. Stars are individual, influential actors. Seas \
are groups or crowds. Both lists must be non-empty and every id must be unique.

Reply with exactly one JSON object:
{
  \"star_configs\": [{\"id\": \"<snake_case id>\", \"description\": \"<persona>\"}],
  \"sea_configs\": [{\"id\": \"<snake_case id>\", \"description\": \"<group profile>\"}]
}";

pub const INIT_TOPOLOGY_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. Describe how \
the actors are connected and write the seed ripple that starts the propagation.

Reply with exactly one JSON object:
{
  \"topology\": {\"edges\": [{\"from\": \"<id>\", \"to\": \"<id>\", \"weight\": <0..1>}]},
  \"seed_ripple\": {\"content\": \"<the content being propagated>\", \"initial_energy\": <0..1>}
}";

// ── Decision agent: RIPPLE ──────────────────────────────────────────────

pub const RIPPLE_PRINCIPLES: &str = "\
Propagation follows complex-adaptive-system dynamics: energy decays each wave \
unless actors amplify it, groups react collectively, and small perturbations \
can cascade. Only activate actors the ripple can plausibly reach.";

pub const RIPPLE_WAVE0_HINT: &str = "\n\
This is the first wave. The seed perturbation should reach at least one group \
(sea) actor.";

/// Verdict instructions for `wave`.
pub fn ripple_verdict_system(wave: u32) -> String {
    let hint = if wave == 0 { RIPPLE_WAVE0_HINT } else { "" };
    format!(
        "You are the omniscient coordinator of a propagation simulation, deciding wave {wave}.\n\n\
         {principles}{hint}\n\n\
         Reply with exactly one JSON object:\n\
         {{\n\
           \"wave_number\": {wave},\n\
           \"simulated_time_elapsed\": \"<e.g. 8h>\",\n\
           \"simulated_time_remaining\": \"<e.g. 40h>\",\n\
           \"continue_propagation\": true,\n\
           \"termination_reason\": \"<required when continue_propagation is false>\",\n\
           \"activated_agents\": [{{\"agent_id\": \"<id>\", \"incoming_ripple_energy\": 0.5, \"activation_reason\": \"<why>\"}}],\n\
           \"skipped_agents\": [{{\"agent_id\": \"<id>\", \"skip_reason\": \"<why>\"}}],\n\
           \"global_observation\": \"<one sentence>\"\n\
         }}\n\
         Only use agent ids from the roster.",
        wave = wave,
        principles = RIPPLE_PRINCIPLES,
        hint = hint,
    )
}

/// Runtime data for a verdict call.
pub fn ripple_verdict_user(
    wave: u32,
    time: Option<&TimeProgress>,
    snapshot_json: &str,
    history: &str,
    roster: &str,
) -> String {
    let time_line = time.map(|t| format!("{}\n\n", t.describe(wave))).unwrap_or_default();
    format!(
        "## Wave {}\n{}## Field snapshot\n{}\n\n## Propagation history\n{}\n\n## Available agents\n{}",
        wave, time_line, snapshot_json, history, roster
    )
}

// ── Decision agent: OBSERVE / SYNTHESIZE ────────────────────────────────

pub const OBSERVE_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. The waves are \
over. Classify the macro state and look for emergent cross-group phenomena.

Reply with exactly one JSON object:
{
  \"phase_vector\": {\"heat\": \"<growth|peak|decline|...>\", \"sentiment\": \"<...>\", \"coherence\": \"<...>\"},
  \"phase_transition_detected\": false,
  \"emergence_events\": [{\"description\": \"<what emerged>\", \"agents\": [\"<id>\"]}],
  \"topology_recommendations\": [\"<suggested change>\"]
}";

pub const SYNTHESIZE_RELATIVE_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. No historical \
baseline is available, so express the prediction as relative estimates \
(e.g. above/below typical, multiples of an unstated baseline).

Reply with exactly one JSON object:
{
  \"prediction\": {\"impact\": \"<relative estimate>\", \"confidence\": \"<low|medium|high>\"},
  \"timeline\": [{\"time\": \"<e.g. 12h>\", \"event\": \"<what happens>\"}],
  \"bifurcation_points\": [{\"wave\": 0, \"description\": \"<what could tip the outcome>\"}],
  \"agent_insights\": {\"<agent id>\": \"<insight>\"}
}";

pub const SYNTHESIZE_ANCHORED_SYSTEM: &str = "\
You are the omniscient coordinator of a propagation simulation. Historical \
data is available in the input; anchor every quantitative estimate to that \
baseline and state the anchor you used.

Reply with exactly one JSON object:
{
  \"prediction\": {\"impact\": \"<estimate anchored to the baseline>\", \"baseline\": \"<anchor>\", \"confidence\": \"<low|medium|high>\"},
  \"timeline\": [{\"time\": \"<e.g. 12h>\", \"event\": \"<what happens>\"}],
  \"bifurcation_points\": [{\"wave\": 0, \"description\": \"<what could tip the outcome>\"}],
  \"agent_insights\": {\"<agent id>\": \"<insight>\"}
}";

// ── Participants ────────────────────────────────────────────────────────

/// Participant instructions. `memory` is the pre-rendered memory section.
pub fn participant_system(kind: AgentKind, description: &str, memory: &str) -> String {
    let (role, content_key, extra) = match kind {
        AgentKind::Star => (
            "an individual, influential actor",
            "response_content",
            "",
        ),
        AgentKind::Sea => (
            "a group of people reacting collectively",
            "cluster_reaction",
            ",\n  \"sentiment_shift\": \"<how the group's sentiment moved>\"",
        ),
    };
    let allowed: Vec<&str> = kind.allowed_responses().iter().map(|r| r.as_str()).collect();
    format!(
        "You are {role} in a social simulation.\n\
         Who you are: {description}\n\
         {memory}\n\
         React to the content you receive the way you genuinely would.\n\
         Reply with exactly one JSON object:\n\
         {{\n  \"response_type\": \"<one of: {allowed}>\",\n  \"{content_key}\": \"<your reaction>\",\n  \
         \"outgoing_energy\": <0..1>,\n  \"reasoning\": \"<why>\"{extra}\n}}",
        role = role,
        description = description,
        memory = memory,
        allowed = allowed.join(", "),
        content_key = content_key,
        extra = extra,
    )
}

pub const PARTICIPANT_MEMORY_HEADER: &str = "\nWhat you reacted to before:\n";

pub fn participant_user(source: &str, energy: f64, content: &str) -> String {
    format!(
        "You received content from {} with energy {:.2}:\n\n{}",
        source, energy, content
    )
}

// ── Tribunal ────────────────────────────────────────────────────────────

/// Rubric used when the caller supplies none.
pub const TRIBUNAL_DEFAULT_RUBRIC: &str = "1=very weak, 2=weak, 3=moderate, 4=strong, 5=very strong";

/// Tribunal system prompt: the skill's tribunal profile, then the rubric.
pub fn tribunal_system(profile: &str, rubric: &str) -> String {
    let rubric_block = if rubric.trim().is_empty() {
        String::new()
    } else {
        format!("===== SCORING RUBRIC =====\n\n{}\n\n===== END SCORING RUBRIC =====", rubric)
    };
    layer(profile, &rubric_block)
}

pub fn tribunal_evaluate(
    role: &str,
    expertise: &str,
    perspective: &str,
    evidence: &str,
    rubric: &str,
    dimensions: &[String],
) -> String {
    format!(
        "You are a {} with expertise in {}.\nYour evaluation perspective: {}\n\n\
         ## Evidence from simulation\n{}\n\n## Scoring rubric\n{}\n\n## Dimensions to evaluate\n{}\n\n\
         Respond with JSON: {{\"scores\": {{dimension: 1-5}}, \"narrative\": \"your analysis\"}}",
        role,
        expertise,
        perspective,
        evidence,
        rubric,
        dimensions.join(", ")
    )
}

pub fn tribunal_challenge(role: &str, perspective: &str, target: &str, scores_json: &str, narrative: &str) -> String {
    format!(
        "You are a {}. Your perspective: {}\n\n\
         Another evaluator ({}) gave this assessment:\nScores: {}\nNarrative: {}\n\n\
         Respond with JSON: {{\"challenge\": \"your specific challenge to their assessment\"}}",
        role, perspective, target, scores_json, narrative
    )
}

pub fn tribunal_revise(
    role: &str,
    perspective: &str,
    prior_round: u32,
    scores_json: &str,
    narrative: &str,
    challenges: &[String],
) -> String {
    let listed: Vec<String> = challenges.iter().map(|c| format!("- {}", c)).collect();
    format!(
        "You are a {}. Your perspective: {}\n\n\
         Your previous assessment (round {}):\nScores: {}\nNarrative: {}\n\n\
         Challenges received:\n{}\n\n\
         Revise your assessment. You may keep, raise, or lower scores.\n\
         Respond with JSON: {{\"scores\": {{dimension: 1-5}}, \"narrative\": \"revised analysis\"}}",
        role,
        perspective,
        prior_round,
        scores_json,
        narrative,
        listed.join("\n")
    )
}

/// Join a base profile with phase instructions, skipping empty parts.
pub fn layer(base: &str, phase: &str) -> String {
    [base, phase]
        .iter()
        .filter(|p| !p.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_skips_empty_parts() {
        assert_eq!(layer("", "phase"), "phase");
        assert_eq!(layer("skill", "phase"), "skill\n\nphase");
        assert_eq!(layer("skill", "  "), "skill");
    }

    #[test]
    fn wave_zero_carries_hint() {
        assert!(ripple_verdict_system(0).contains("at least one group"));
        assert!(!ripple_verdict_system(3).contains("at least one group"));
        assert!(ripple_verdict_system(3).contains("\"wave_number\": 3"));
    }

    #[test]
    fn participant_prompt_lists_allowed_responses() {
        let star = participant_system(AgentKind::Star, "tech blogger", "");
        assert!(star.contains("amplify, create, comment, ignore"));
        assert!(star.contains("response_content"));
        let sea = participant_system(AgentKind::Sea, "students", "");
        assert!(sea.contains("absorb"));
        assert!(sea.contains("sentiment_shift"));
    }

    #[test]
    fn tribunal_system_wraps_rubric() {
        let text = tribunal_system("PMF skill", "5=excellent");
        assert!(text.starts_with("PMF skill\n\n===== SCORING RUBRIC ====="));
        assert!(text.contains("5=excellent"));
        assert_eq!(tribunal_system("", ""), "");
    }

    #[test]
    fn verdict_user_includes_time_progress() {
        let time = TimeProgress::at_wave(2, "4h", "48h");
        let text = ripple_verdict_user(2, time.as_ref(), "{}", "seed", "  - a");
        assert!(text.contains("8h elapsed"));
        let text = ripple_verdict_user(2, None, "{}", "seed", "  - a");
        assert!(!text.contains("elapsed"));
    }
}
