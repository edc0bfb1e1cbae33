use async_trait::async_trait;
use conductor_core::config::{FallbackStep, PlannerConfig, PlannerRule};
use conductor_core::planner::{Plan, PlanError, Planner};
use conductor_core::task::{Priority, Step, TaskContext};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// Maps a request to steps by keyword.
///
/// Every rule with a keyword appearing in the input as a whole word
/// contributes one step, in rule order. The plan takes the most urgent
/// priority among the matched rules. When nothing matches, the fallback step
/// (if any) receives the whole input.
pub struct KeywordPlanner {
    rules: Vec<CompiledRule>,
    fallback: Option<FallbackStep>,
}

struct CompiledRule {
    /// `None` when the rule lists no usable keyword; such a rule never fires.
    pattern: Option<Regex>,
    rule: PlannerRule,
}

impl KeywordPlanner {
    pub fn from_config(cfg: &PlannerConfig) -> Result<Self, regex::Error> {
        let rules = cfg
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule, regex::Error> {
                Ok(CompiledRule {
                    pattern: keyword_pattern(&rule.keywords)?,
                    rule: rule.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            fallback: cfg.fallback.clone(),
        })
    }
}

/// One case-insensitive alternation per rule. A keyword only counts when it
/// is not glued to other word characters, so `lock` stays silent on "unlock".
fn keyword_pattern(keywords: &[String]) -> Result<Option<Regex>, regex::Error> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&format!(r"(?:^|\W)(?:{})(?:$|\W)", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .map(Some)
}

fn rule_step(rule: &PlannerRule, input: &str) -> Step {
    let mut step = Step::new(&rule.agent, &rule.action);
    step.parameters = rule.parameters.clone();
    step.parameters
        .entry("text")
        .or_insert_with(|| Value::String(input.to_string()));
    step.critical = rule.critical;
    step
}

#[async_trait]
impl Planner for KeywordPlanner {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn plan(&self, input: &str, _context: &TaskContext) -> Result<Plan, PlanError> {
        let matched: Vec<&PlannerRule> = self
            .rules
            .iter()
            .filter(|c| c.pattern.as_ref().is_some_and(|p| p.is_match(input)))
            .map(|c| &c.rule)
            .collect();

        if matched.is_empty() {
            let mut plan = Plan::new(Priority::USER);
            if let Some(fallback) = &self.fallback {
                plan = plan.step(Step::new(&fallback.agent, &fallback.action).with_param("text", input));
            }
            tracing::debug!(steps = plan.steps.len(), "no planner rule matched");
            return Ok(plan);
        }

        let priority = matched
            .iter()
            .filter_map(|rule| rule.priority)
            .min()
            .map(Priority)
            .unwrap_or(Priority::USER);
        let plan = matched
            .into_iter()
            .fold(Plan::new(priority), |plan, rule| plan.step(rule_step(rule, input)));
        tracing::debug!(steps = plan.steps.len(), priority = %plan.priority, "planned request");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn planner() -> KeywordPlanner {
        let cfg: PlannerConfig = toml::from_str(
            r#"
            [[rules]]
            keywords = ["unlock"]
            agent = "device"
            action = "unlock"
            critical = true
            priority = 0
            parameters = { device = "front_door" }

            [[rules]]
            keywords = ["lights", "lamp"]
            agent = "device"
            action = "toggle"
            priority = 2
            parameters = { device = "lights" }

            [fallback]
            agent = "conversation"
            action = "respond"
        "#,
        )
        .unwrap();
        KeywordPlanner::from_config(&cfg).unwrap()
    }

    #[tokio::test]
    async fn test_matches_rules_in_order() {
        let plan = planner()
            .plan("Turn on the LIGHTS and unlock the door", &TaskContext::new())
            .await
            .unwrap();

        assert_eq!(plan.priority, Priority::EMERGENCY);
        let actions: Vec<&str> = plan.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["unlock", "toggle"]);
        assert!(plan.steps[0].critical);
        assert_eq!(plan.steps[0].parameters["device"], "front_door");
        assert_eq!(
            plan.steps[1].parameters["text"],
            "Turn on the LIGHTS and unlock the door"
        );
    }

    #[tokio::test]
    async fn test_fallback_receives_input() {
        let plan = planner().plan("hello", &TaskContext::new()).await.unwrap();
        assert_eq!(plan.priority, Priority::USER);
        assert_eq!(
            plan.steps,
            vec![Step::new("conversation", "respond").with_param("text", "hello")]
        );
    }

    #[tokio::test]
    async fn test_no_fallback_yields_empty_plan() {
        let planner = KeywordPlanner::from_config(&PlannerConfig::default()).unwrap();
        let plan = planner.plan("anything", &TaskContext::new()).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_keywords_match_whole_words_only() {
        let cfg: PlannerConfig = toml::from_str(
            r#"
            [[rules]]
            keywords = ["lock"]
            agent = "device"
            action = "lock"

            [[rules]]
            keywords = ["unlock"]
            agent = "device"
            action = "unlock"

            [[rules]]
            keywords = ["  ", ""]
            agent = "device"
            action = "never"
        "#,
        )
        .unwrap();
        let planner = KeywordPlanner::from_config(&cfg).unwrap();
        let ctx = TaskContext::new();

        let actions = |plan: Plan| -> Vec<String> {
            plan.steps.into_iter().map(|s| s.action).collect()
        };
        assert_eq!(
            actions(planner.plan("please UNLOCK the door", &ctx).await.unwrap()),
            vec!["unlock"]
        );
        assert_eq!(
            actions(planner.plan("lock.", &ctx).await.unwrap()),
            vec!["lock"]
        );
        assert!(planner.plan("the locksmith called", &ctx).await.unwrap().is_empty());
    }
}
