//! Deterministic keyword translator.
//!
//! Maps critique phrases ("rushed", "jarring", "more beach", "remove img-3")
//! to refinement commands with regex rules. It understands no grammar beyond
//! the patterns below; anything else yields no commands.

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::{AdapterError, AdapterResult, RefinementInput, RefinementTranslator};
use crate::domain::{AssetId, Evaluation, TransitionStyle};

use super::RefinementCommand;

/// Clip-length factor for "too fast" style critique; longer holds.
pub const SLOW_DOWN: f64 = 1.25;
/// Clip-length factor for "too slow" style critique; quicker cuts.
pub const SPEED_UP: f64 = 0.8;
/// Energy bias step per matching phrase.
pub const ENERGY_STEP: f64 = 0.2;
/// Blend lengthening for "jarring" style critique.
pub const SMOOTHING: f64 = 1.5;

/// Words after "more" that describe the edit, not a tag.
const NON_TAG_WORDS: [&str; 10] = [
    "energy", "energetic", "exciting", "dynamic", "variety", "movement", "action", "time",
    "calm", "clips",
];

#[derive(Debug, Clone, Copy)]
enum Action {
    Pacing(f64),
    Transition(TransitionStyle, f64),
    ExplicitStyle,
    Energy(f64),
    Tag,
    Exclude,
}

const RULES: [(&str, Action); 8] = [
    (
        r"(?i)\b(too fast|rushed|frantic|hectic|choppy|slow (it )?down)\b",
        Action::Pacing(SLOW_DOWN),
    ),
    (
        r"(?i)\b(too slow|sluggish|boring|drags|dragging|speed (it )?up)\b",
        Action::Pacing(SPEED_UP),
    ),
    (
        r"(?i)\b(jarring|abrupt|smoother|smooth)\b",
        Action::Transition(TransitionStyle::Crossfade, SMOOTHING),
    ),
    (r"(?i)\buse (crossfade|fade|cut)s?\b", Action::ExplicitStyle),
    (
        r"(?i)\b(calmer|calm down|relaxed|gentler|mellow)\b",
        Action::Energy(-ENERGY_STEP),
    ),
    (
        r"(?i)\b(more energy|more energetic|more exciting|livelier|more dynamic)\b",
        Action::Energy(ENERGY_STEP),
    ),
    (r"(?i)\bmore (?:of )?(?:the )?([a-z0-9_-]+)", Action::Tag),
    (
        r"(?i)\b(?:remove|drop|exclude|delete)\s+(?:the\s+)?(?:asset\s+)?([a-z0-9][a-z0-9_.-]*)",
        Action::Exclude,
    ),
];

struct Rule {
    pattern: Regex,
    action: Action,
}

/// Keyword and regex based [`RefinementTranslator`].
pub struct RuleBasedTranslator {
    rules: Vec<Rule>,
}

impl Default for RuleBasedTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedTranslator {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(pattern, action)| {
                Regex::new(pattern).ok().map(|pattern| Rule {
                    pattern,
                    action: *action,
                })
            })
            .collect();
        Self { rules }
    }

    /// Commands for free text, in rule order, each at most once.
    pub fn translate_text(&self, text: &str) -> Vec<RefinementCommand> {
        let mut commands = Vec::new();
        for rule in &self.rules {
            match rule.action {
                Action::Pacing(speed_multiplier) => {
                    if rule.pattern.is_match(text) {
                        commands.push(RefinementCommand::AdjustPacing { speed_multiplier });
                    }
                }
                Action::Transition(style, duration_multiplier) => {
                    if rule.pattern.is_match(text) {
                        commands.push(RefinementCommand::AdjustTransitions {
                            style,
                            duration_multiplier,
                        });
                    }
                }
                Action::Energy(bias) => {
                    if rule.pattern.is_match(text) {
                        commands.push(RefinementCommand::RebalanceEnergy { bias });
                    }
                }
                Action::ExplicitStyle => {
                    let style = rule
                        .pattern
                        .captures(text)
                        .and_then(|caps| caps.get(1))
                        .and_then(|m| parse_style(m.as_str()));
                    if let Some(style) = style {
                        commands.push(RefinementCommand::AdjustTransitions {
                            style,
                            duration_multiplier: 1.0,
                        });
                    }
                }
                Action::Tag => {
                    for caps in rule.pattern.captures_iter(text) {
                        let tag = caps[1].to_lowercase();
                        if NON_TAG_WORDS.contains(&tag.as_str()) {
                            continue;
                        }
                        let command = RefinementCommand::IncludeTag { tag };
                        if !commands.contains(&command) {
                            commands.push(command);
                        }
                    }
                }
                Action::Exclude => {
                    for caps in rule.pattern.captures_iter(text) {
                        let id = caps[1].trim_end_matches('.');
                        if id.is_empty() {
                            continue;
                        }
                        let command = RefinementCommand::ExcludeAsset {
                            asset_id: AssetId::new(id),
                        };
                        if !commands.contains(&command) {
                            commands.push(command);
                        }
                    }
                }
            }
        }
        commands
    }

    /// Commands for an evaluation, read from its issue list.
    pub fn translate_evaluation(&self, evaluation: &Evaluation) -> Vec<RefinementCommand> {
        self.translate_text(&evaluation.issues.join(". "))
    }
}

fn parse_style(word: &str) -> Option<TransitionStyle> {
    match word.to_ascii_lowercase().as_str() {
        "cut" => Some(TransitionStyle::Cut),
        "crossfade" => Some(TransitionStyle::Crossfade),
        "fade" => Some(TransitionStyle::Fade),
        _ => None,
    }
}

#[async_trait]
impl RefinementTranslator for RuleBasedTranslator {
    async fn translate(
        &self,
        input: RefinementInput<'_>,
        cancel: &CancellationToken,
    ) -> AdapterResult<Vec<RefinementCommand>> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let commands = match input {
            RefinementInput::Evaluation(evaluation) => self.translate_evaluation(evaluation),
            RefinementInput::FreeText(text) => self.translate_text(text),
        };
        debug!(commands = commands.len(), "rule-based translation");
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rule_compiles() {
        assert_eq!(RuleBasedTranslator::new().rules.len(), RULES.len());
    }

    #[test]
    fn test_rushed_and_jarring() {
        let commands =
            RuleBasedTranslator::new().translate_text("It feels rushed and the cuts are jarring");
        assert_eq!(
            commands,
            vec![
                RefinementCommand::AdjustPacing {
                    speed_multiplier: SLOW_DOWN
                },
                RefinementCommand::AdjustTransitions {
                    style: TransitionStyle::Crossfade,
                    duration_multiplier: SMOOTHING,
                },
            ]
        );
    }

    #[test]
    fn test_tag_and_exclusion() {
        let commands =
            RuleBasedTranslator::new().translate_text("More beach please, and remove IMG-3.");
        assert_eq!(
            commands,
            vec![
                RefinementCommand::IncludeTag { tag: "beach".into() },
                RefinementCommand::ExcludeAsset {
                    asset_id: AssetId::new("IMG-3")
                },
            ]
        );
    }

    #[test]
    fn test_more_energy_is_not_a_tag() {
        let commands = RuleBasedTranslator::new().translate_text("needs more energy");
        assert_eq!(
            commands,
            vec![RefinementCommand::RebalanceEnergy { bias: ENERGY_STEP }]
        );
    }

    #[test]
    fn test_explicit_style() {
        let commands = RuleBasedTranslator::new().translate_text("use fades between scenes");
        assert_eq!(
            commands,
            vec![RefinementCommand::AdjustTransitions {
                style: TransitionStyle::Fade,
                duration_multiplier: 1.0
            }]
        );
    }

    #[test]
    fn test_unmatched_text_yields_nothing() {
        assert!(RuleBasedTranslator::new()
            .translate_text("lovely")
            .is_empty());
    }

    #[tokio::test]
    async fn test_translates_evaluation_issues() {
        let evaluation = Evaluation::new(5.0, true)
            .with_issue("pacing is too slow")
            .with_issue("feels boring");
        let commands = RuleBasedTranslator::new()
            .translate(
                RefinementInput::Evaluation(&evaluation),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            commands,
            vec![RefinementCommand::AdjustPacing {
                speed_multiplier: SPEED_UP
            }]
        );
    }
}
