//! Collapses volatile fragments of error messages so repeated failures fold together.

use regex::Regex;

struct Rule {
    re: Regex,
    placeholder: &'static str,
}

pub struct Sanitizer {
    rules: Vec<Rule>,
    collapse_spaces: bool,
}

pub struct WithCollapseSpaces(pub bool);

impl Sanitizer {
    pub fn new(opts: WithCollapseSpaces) -> Self {
        // Order matters: endpoints before bare addresses, hashes before short hex.
        let patterns: [(&str, &'static str); 6] = [
            (
                r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})\b",
                "<ts>",
            ),
            (r"\b1[5-9]\d{11}\b", "<unixms>"),
            (r"\b(?:\d{1,3}\.){3}\d{1,3}:\d{1,5}\b", "<endpoint>"),
            (r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "<ip4>"),
            (r"\b[0-9a-fA-F]{64}\b", "<hash>"),
            (r"\b[0-9a-fA-F]{12,63}\b", "<hex>"),
        ];
        let rules = patterns
            .iter()
            .filter_map(|(re, placeholder)| {
                Regex::new(re).ok().map(|re| Rule { re, placeholder })
            })
            .collect();

        Self {
            rules,
            collapse_spaces: opts.0,
        }
    }

    pub fn sanitize(&self, err: &str) -> String {
        if err.is_empty() {
            return String::new();
        }

        let mut result = err.to_string();
        for rule in &self.rules {
            result = rule.re.replace_all(&result, rule.placeholder).into_owned();
        }

        if self.collapse_spaces {
            result = result.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        result
    }
}
