use crate::config::{ExcludeCriteria, MatchCriteria, Rule};
use crate::email::Email;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};

/// A rule pattern that failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDiagnostic {
    pub rule: String,
    pub pattern: String,
    pub error: String,
}

/// Matches emails against rules using case-insensitive regex search.
///
/// Patterns are compiled once up front. A pattern that fails to compile is
/// reported once and then simply never matches.
pub struct RuleMatcher {
    compiled_patterns: HashMap<String, Regex>,
    invalid_patterns: HashSet<String>,
    diagnostics: Vec<PatternDiagnostic>,
}

impl RuleMatcher {
    pub fn new(rules: &[Rule]) -> Self {
        let mut matcher = RuleMatcher {
            compiled_patterns: HashMap::new(),
            invalid_patterns: HashSet::new(),
            diagnostics: Vec::new(),
        };

        for rule in rules {
            matcher.compile_rule_patterns(rule);
        }
        matcher
    }

    fn compile_rule_patterns(&mut self, rule: &Rule) {
        let criteria = &rule.criteria;
        let positive = [
            &criteria.sender,
            &criteria.subject,
            &criteria.body,
            &criteria.to,
        ];
        for pattern in positive.into_iter().flatten() {
            self.compile_pattern(&rule.name, pattern);
        }

        let exclude = &rule.exclude;
        for pattern in exclude
            .any
            .iter()
            .chain(&exclude.subject)
            .chain(&exclude.body)
            .chain(&exclude.to)
        {
            self.compile_pattern(&rule.name, pattern);
        }
    }

    fn compile_pattern(&mut self, rule_name: &str, pattern: &str) {
        if self.compiled_patterns.contains_key(pattern) {
            return;
        }
        if self.invalid_patterns.contains(pattern) {
            // Same bad pattern in another rule still gets attributed to that rule.
            if !self
                .diagnostics
                .iter()
                .any(|d| d.rule == rule_name && d.pattern == pattern)
            {
                if let Some(first) = self.diagnostics.iter().find(|d| d.pattern == pattern) {
                    let error = first.error.clone();
                    self.diagnostics.push(PatternDiagnostic {
                        rule: rule_name.to_string(),
                        pattern: pattern.to_string(),
                        error,
                    });
                }
            }
            return;
        }

        match build_regex(pattern) {
            Ok(regex) => {
                self.compiled_patterns.insert(pattern.to_string(), regex);
            }
            Err(e) => {
                log::warn!("Rule '{rule_name}': invalid regex pattern '{pattern}': {e}");
                self.invalid_patterns.insert(pattern.to_string());
                self.diagnostics.push(PatternDiagnostic {
                    rule: rule_name.to_string(),
                    pattern: pattern.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn diagnostics(&self) -> &[PatternDiagnostic] {
        &self.diagnostics
    }

    /// True if the email satisfies every positive criterion and no exclusion.
    pub fn matches(&self, email: &Email, rule: &Rule) -> bool {
        self.matches_positive(email, &rule.criteria) && !self.matches_negative(email, &rule.exclude)
    }

    fn matches_positive(&self, email: &Email, criteria: &MatchCriteria) -> bool {
        if let Some(label) = &criteria.label_includes {
            if !email.has_label(label) {
                return false;
            }
        }

        if let Some(pattern) = &criteria.sender {
            if !self.search(pattern, &email.sender) {
                return false;
            }
        }

        if let Some(pattern) = &criteria.subject {
            if !self.search(pattern, &email.subject) {
                return false;
            }
        }

        if let Some(pattern) = &criteria.body {
            if !self.search(pattern, email.body_text()) {
                return false;
            }
        }

        if let Some(pattern) = &criteria.to {
            if !self.search(pattern, &email.recipients()) {
                return false;
            }
        }

        true
    }

    fn matches_negative(&self, email: &Email, exclude: &ExcludeCriteria) -> bool {
        let body = email.body_text();
        let recipients = email.recipients();

        let any_field = exclude.any.iter().any(|pattern| {
            self.search(pattern, &email.sender)
                || self.search(pattern, &email.subject)
                || self.search(pattern, body)
                || self.search(pattern, &recipients)
        });

        any_field
            || exclude.subject.iter().any(|p| self.search(p, &email.subject))
            || exclude.body.iter().any(|p| self.search(p, body))
            || exclude.to.iter().any(|p| self.search(p, &recipients))
    }

    fn search(&self, pattern: &str, text: &str) -> bool {
        if let Some(regex) = self.compiled_patterns.get(pattern) {
            return regex.is_match(text);
        }
        if self.invalid_patterns.contains(pattern) {
            return false;
        }
        // Rules not seen at construction time are compiled on demand.
        match build_regex(pattern) {
            Ok(regex) => regex.is_match(text),
            Err(e) => {
                log::debug!("Ignoring invalid regex pattern '{pattern}': {e}");
                false
            }
        }
    }
}

fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> Rule {
        Rule {
            name: name.to_string(),
            filter: String::new(),
            criteria: MatchCriteria::default(),
            exclude: ExcludeCriteria::default(),
            label: None,
            mark_important: false,
            retention: None,
        }
    }

    fn email() -> Email {
        Email {
            id: "m1".to_string(),
            subject: "Your Weekly Digest".to_string(),
            sender: "News <news@example.com>".to_string(),
            snippet: "Click to unsubscribe".to_string(),
            label_ids: vec!["INBOX".to_string()],
            to: "me@example.com".to_string(),
            list_id: "<digest.example.com>".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_criteria_match_everything() {
        let rule = rule("all");
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_positive_criteria_are_case_insensitive_searches() {
        let mut rule = rule("digest");
        rule.criteria.sender = Some("NEWS@example".to_string());
        rule.criteria.subject = Some("weekly".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_all_positive_criteria_must_hold() {
        let mut rule = rule("digest");
        rule.criteria.sender = Some("news@".to_string());
        rule.criteria.subject = Some("invoice".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(!matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_label_membership() {
        let mut rule = rule("inbox only");
        rule.criteria.label_includes = Some("INBOX".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(matcher.matches(&email(), &rule));

        rule.criteria.label_includes = Some("STARRED".to_string());
        assert!(!matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_body_falls_back_to_snippet() {
        let mut rule = rule("unsubscribe");
        rule.criteria.body = Some("unsubscribe".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(matcher.matches(&email(), &rule));

        let mut with_body = email();
        with_body.body = "Plain body without the magic word".to_string();
        assert!(!matcher.matches(&with_body, &rule));
    }

    #[test]
    fn test_recipients_cover_list_id() {
        let mut rule = rule("list");
        rule.criteria.to = Some(r"digest\.example\.com".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_exclude_any_checks_every_field() {
        let mut rule = rule("digest");
        rule.exclude.any = vec!["me@example".to_string()];
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));
        assert!(!matcher.matches(&email(), &rule));
    }

    #[test]
    fn test_scoped_excludes_only_check_their_field() {
        let mut subject_only = rule("subject exclude");
        subject_only.exclude.subject = vec!["news@".to_string()];
        let mut body_only = rule("body exclude");
        body_only.exclude.body = vec!["unsubscribe".to_string()];
        let mut to_only = rule("to exclude");
        to_only.exclude.to = vec!["weekly".to_string()];

        let rules = vec![subject_only, body_only, to_only];
        let matcher = RuleMatcher::new(&rules);

        // Sender text in a subject-only exclude does not exclude.
        assert!(matcher.matches(&email(), &rules[0]));
        assert!(!matcher.matches(&email(), &rules[1]));
        // Subject text in a recipients-only exclude does not exclude.
        assert!(matcher.matches(&email(), &rules[2]));
    }

    #[test]
    fn test_invalid_positive_pattern_never_matches() {
        let mut broken = rule("broken");
        broken.criteria.subject = Some("(unclosed".to_string());
        let matcher = RuleMatcher::new(std::slice::from_ref(&broken));

        assert!(!matcher.matches(&email(), &broken));
        assert_eq!(matcher.diagnostics().len(), 1);
        assert_eq!(matcher.diagnostics()[0].rule, "broken");
        assert_eq!(matcher.diagnostics()[0].pattern, "(unclosed");
    }

    #[test]
    fn test_invalid_exclude_pattern_does_not_exclude() {
        let mut rule = rule("lenient");
        rule.criteria.sender = Some("news@".to_string());
        rule.exclude.any = vec!["[bad".to_string()];
        let matcher = RuleMatcher::new(std::slice::from_ref(&rule));

        assert!(matcher.matches(&email(), &rule));
        assert_eq!(matcher.diagnostics().len(), 1);
    }

    #[test]
    fn test_shared_invalid_pattern_reported_per_rule_once() {
        let mut first = rule("first");
        first.criteria.subject = Some("(".to_string());
        first.exclude.subject = vec!["(".to_string()];
        let mut second = rule("second");
        second.criteria.body = Some("(".to_string());

        let matcher = RuleMatcher::new(&[first, second]);
        let rules: Vec<&str> = matcher.diagnostics().iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["first", "second"]);
    }
}
